use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Append-only stock ledger entry
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub product_id: i32,
    #[sea_orm(column_name = "type")]
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub qty: i32,
    pub notes: Option<String>,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum MovementType {
    #[sea_orm(string_value = "IN")]
    In,
    #[sea_orm(string_value = "OUT")]
    Out,
    #[sea_orm(string_value = "ADJUST")]
    Adjust,
}

impl MovementType {
    /// Stock level after applying a movement of `qty`, or `None` when it would go negative.
    /// ADJUST replaces the level outright.
    pub fn apply(self, current: i32, qty: i32) -> Option<i32> {
        let next = match self {
            MovementType::In => current.checked_add(qty)?,
            MovementType::Out => current.checked_sub(qty)?,
            MovementType::Adjust => qty,
        };
        (next >= 0).then_some(next)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if insert {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(MovementType::In, 7, 3, Some(10))]
    #[case(MovementType::Out, 7, 7, Some(0))]
    #[case(MovementType::Out, 7, 8, None)]
    #[case(MovementType::Adjust, 7, 20, Some(20))]
    #[case(MovementType::Adjust, 7, 0, Some(0))]
    fn apply_movement(
        #[case] kind: MovementType,
        #[case] current: i32,
        #[case] qty: i32,
        #[case] expected: Option<i32>,
    ) {
        assert_eq!(kind.apply(current, qty), expected);
    }

    #[test]
    fn parses_wire_names() {
        assert_eq!("ADJUST".parse::<MovementType>().unwrap(), MovementType::Adjust);
        assert!("SHRINK".parse::<MovementType>().is_err());
        assert_eq!(MovementType::Out.to_string(), "OUT");
    }
}
