use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Default unit of measure for new products
pub const DEFAULT_UNIT: &str = "pcs";
/// Default low-stock threshold for new products
pub const DEFAULT_MIN_STOCK: i32 = 5;

/// Sellable catalog item; `stock` caches the running total of the stock ledger
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "products")]
#[serde(rename_all = "camelCase")]
#[schema(as = Product)]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub sku: String,
    pub name: String,
    pub category_id: i32,
    pub unit: String,
    #[sea_orm(column_type = "Decimal(Some((15, 2)))")]
    pub buy_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((15, 2)))")]
    pub sell_price: Decimal,
    pub stock: i32,
    pub min_stock: i32,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id"
    )]
    Category,
    #[sea_orm(has_many = "super::sale_item::Entity")]
    SaleItems,
    #[sea_orm(has_many = "super::stock_movement::Entity")]
    StockMovements,
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl Related<super::sale_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SaleItems.def()
    }
}

impl Related<super::stock_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockMovements.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = active_model.is_active {
                active_model.is_active = Set(true);
            }
            if let ActiveValue::NotSet = active_model.unit {
                active_model.unit = Set(DEFAULT_UNIT.to_string());
            }
            if let ActiveValue::NotSet = active_model.stock {
                active_model.stock = Set(0);
            }
            if let ActiveValue::NotSet = active_model.min_stock {
                active_model.min_stock = Set(DEFAULT_MIN_STOCK);
            }
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);

        if let ActiveValue::Set(stock) | ActiveValue::Unchanged(stock) = &active_model.stock {
            if *stock < 0 {
                return Err(DbErr::Custom("Product stock cannot be negative".to_string()));
            }
        }

        Ok(active_model)
    }
}

impl Model {
    pub fn is_sellable(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn is_low_stock(&self) -> bool {
        self.stock < self.min_stock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(stock: i32, min_stock: i32) -> Model {
        let now = Utc::now();
        Model {
            id: 1,
            sku: "SMN-001".into(),
            name: "Semen Gresik 50kg".into(),
            category_id: 1,
            unit: "sak".into(),
            buy_price: dec!(65000),
            sell_price: dec!(75000),
            stock,
            min_stock,
            is_active: true,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn low_stock_is_strictly_below_threshold() {
        assert!(sample(4, 5).is_low_stock());
        assert!(!sample(5, 5).is_low_stock());
    }

    #[test]
    fn serializes_camel_case_fields() {
        let json = serde_json::to_value(sample(10, 5)).unwrap();
        assert_eq!(json["minStock"], 5);
        assert!(json.get("sellPrice").is_some());
        assert!(json.get("deletedAt").is_some());
    }
}
