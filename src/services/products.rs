use crate::{
    auth::AuthUser,
    db::{self, DbPool},
    dto::CategorySummary,
    entities::{category, product, sale, sale_item, stock_movement, MovementType},
    errors::ServiceError,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

pub const DEFAULT_SLOW_MOVING_DAYS: i64 = 30;
pub const DEFAULT_SLOW_MOVING_THRESHOLD: i64 = 5;

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    /// Substring of name or SKU
    pub search: Option<String>,
    pub category_id: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub category_id: i32,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub stock: Option<i32>,
    pub unit: Option<String>,
    pub min_stock: Option<i32>,
}

/// Partial update; stock is deliberately absent and only moves through the ledger
#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub category_id: Option<i32>,
    pub buy_price: Option<Decimal>,
    pub sell_price: Option<Decimal>,
    pub unit: Option<String>,
    pub min_stock: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductWithCategory {
    #[serde(flatten)]
    pub product: product::Model,
    pub category: Option<CategorySummary>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LowStockEntry {
    #[serde(flatten)]
    pub product: product::Model,
    pub category_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SlowMovingEntry {
    pub id: i32,
    pub sku: String,
    pub name: String,
    pub stock: i32,
    #[schema(value_type = String)]
    pub sell_price: Decimal,
    pub category_name: Option<String>,
    pub total_sold: i64,
}

fn require_text(field: &str, value: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::ValidationError(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn require_non_negative_price(field: &str, value: Decimal) -> Result<Decimal, ServiceError> {
    if value.is_sign_negative() {
        return Err(ServiceError::ValidationError(format!(
            "{field} cannot be negative"
        )));
    }
    Ok(value)
}

fn require_non_negative_count(field: &str, value: i32) -> Result<i32, ServiceError> {
    if value < 0 {
        return Err(ServiceError::ValidationError(format!(
            "{field} cannot be negative"
        )));
    }
    Ok(value)
}

fn conflict_on_duplicate(err: ServiceError, sku: &str) -> ServiceError {
    if err.is_unique_violation() {
        ServiceError::Conflict(format!("Product with SKU '{sku}' already exists"))
    } else {
        err
    }
}

/// Orders slow movers: least sold first, then most stock on hand
fn rank_slow_movers(entries: &mut [SlowMovingEntry]) {
    entries.sort_by(|a, b| {
        a.total_sold
            .cmp(&b.total_sold)
            .then_with(|| b.stock.cmp(&a.stock))
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[derive(Debug, Clone)]
pub struct ProductService {
    db: Arc<DbPool>,
}

impl ProductService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    async fn ensure_live_category(&self, category_id: i32) -> Result<(), ServiceError> {
        ensure_live_category_in(&*self.db, category_id).await
    }

    async fn find_live(&self, id: i32) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(id)
            .filter(product::Column::DeletedAt.is_null())
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
    }

    /// Non-deleted products by name
    #[instrument(skip(self))]
    pub async fn list(&self, filter: ProductFilter) -> Result<Vec<ProductWithCategory>, ServiceError> {
        let mut query = product::Entity::find().filter(product::Column::DeletedAt.is_null());

        if let Some(search) = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            query = query.filter(
                Condition::any()
                    .add(product::Column::Name.contains(search))
                    .add(product::Column::Sku.contains(search)),
            );
        }
        if let Some(category_id) = filter.category_id {
            query = query.filter(product::Column::CategoryId.eq(category_id));
        }
        if let Some(is_active) = filter.is_active {
            query = query.filter(product::Column::IsActive.eq(is_active));
        }

        let rows = query
            .order_by_asc(product::Column::Name)
            .find_also_related(category::Entity)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(product, category)| ProductWithCategory {
                product,
                category: category.as_ref().map(CategorySummary::from),
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: i32) -> Result<ProductWithCategory, ServiceError> {
        let (product, category) = product::Entity::find_by_id(id)
            .filter(product::Column::DeletedAt.is_null())
            .find_also_related(category::Entity)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

        Ok(ProductWithCategory {
            product,
            category: category.as_ref().map(CategorySummary::from),
        })
    }

    /// Creates a product; opening stock is recorded as an IN movement by `actor`
    #[instrument(skip(self, actor), fields(user_id = actor.user_id))]
    pub async fn create(
        &self,
        actor: &AuthUser,
        input: NewProduct,
    ) -> Result<ProductWithCategory, ServiceError> {
        let sku = require_text("sku", &input.sku)?;
        let name = require_text("name", &input.name)?;
        let buy_price = require_non_negative_price("buyPrice", input.buy_price)?;
        let sell_price = require_non_negative_price("sellPrice", input.sell_price)?;
        let stock = require_non_negative_count("stock", input.stock.unwrap_or(0))?;
        let min_stock = require_non_negative_count(
            "minStock",
            input.min_stock.unwrap_or(product::DEFAULT_MIN_STOCK),
        )?;
        let unit = input
            .unit
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| product::DEFAULT_UNIT.to_string());

        let user_id = actor.user_id;
        let category_id = input.category_id;
        let sku_for_error = sku.clone();

        let created = self
            .db
            .transaction::<_, product::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    db::claim_write_lock(txn).await?;
                    ensure_live_category_in(txn, category_id).await?;

                    let created = product::ActiveModel {
                        sku: Set(sku),
                        name: Set(name),
                        category_id: Set(category_id),
                        unit: Set(unit),
                        buy_price: Set(buy_price),
                        sell_price: Set(sell_price),
                        stock: Set(stock),
                        min_stock: Set(min_stock),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    if created.stock > 0 {
                        stock_movement::ActiveModel {
                            product_id: Set(created.id),
                            movement_type: Set(MovementType::In),
                            qty: Set(created.stock),
                            notes: Set(Some("Opening stock".to_string())),
                            user_id: Set(user_id),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await?;
                    }

                    Ok(created)
                })
            })
            .await
            .map_err(|e| conflict_on_duplicate(e.into(), &sku_for_error))?;

        info!(product_id = created.id, sku = %created.sku, "product created");
        self.get(created.id).await
    }

    #[instrument(skip(self))]
    pub async fn update(
        &self,
        id: i32,
        input: ProductUpdate,
    ) -> Result<ProductWithCategory, ServiceError> {
        let existing = self.find_live(id).await?;
        let mut sku_for_error = existing.sku.clone();
        let mut active: product::ActiveModel = existing.into();

        if let Some(sku) = input.sku {
            let sku = require_text("sku", &sku)?;
            sku_for_error = sku.clone();
            active.sku = Set(sku);
        }
        if let Some(name) = input.name {
            active.name = Set(require_text("name", &name)?);
        }
        if let Some(category_id) = input.category_id {
            self.ensure_live_category(category_id).await?;
            active.category_id = Set(category_id);
        }
        if let Some(price) = input.buy_price {
            active.buy_price = Set(require_non_negative_price("buyPrice", price)?);
        }
        if let Some(price) = input.sell_price {
            active.sell_price = Set(require_non_negative_price("sellPrice", price)?);
        }
        if let Some(unit) = input.unit {
            active.unit = Set(require_text("unit", &unit)?);
        }
        if let Some(min_stock) = input.min_stock {
            active.min_stock = Set(require_non_negative_count("minStock", min_stock)?);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }

        let updated = active
            .update(&*self.db)
            .await
            .map_err(|e| conflict_on_duplicate(e.into(), &sku_for_error))?;

        info!(product_id = updated.id, "product updated");
        self.get(updated.id).await
    }

    /// Soft delete: hidden from the catalog, still resolvable from sale history
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<product::Model, ServiceError> {
        let existing = self.find_live(id).await?;
        let mut active: product::ActiveModel = existing.into();
        active.deleted_at = Set(Some(Utc::now()));
        active.is_active = Set(false);
        let deleted = active.update(&*self.db).await?;

        info!(product_id = id, "product soft-deleted");
        Ok(deleted)
    }

    /// Active products below their minimum stock, lowest stock first
    #[instrument(skip(self))]
    pub async fn low_stock(&self) -> Result<Vec<LowStockEntry>, ServiceError> {
        let rows = product::Entity::find()
            .filter(product::Column::DeletedAt.is_null())
            .filter(product::Column::IsActive.eq(true))
            .filter(
                Expr::col((product::Entity, product::Column::Stock))
                    .lt(Expr::col((product::Entity, product::Column::MinStock))),
            )
            .order_by_asc(product::Column::Stock)
            .order_by_asc(product::Column::Id)
            .find_also_related(category::Entity)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(product, category)| LowStockEntry {
                product,
                category_name: category.map(|c| c.name),
            })
            .collect())
    }

    /// Active products that sold fewer than `threshold` units over the last `days` days
    #[instrument(skip(self))]
    pub async fn slow_moving(
        &self,
        days: i64,
        threshold: i64,
    ) -> Result<Vec<SlowMovingEntry>, ServiceError> {
        if days <= 0 || threshold <= 0 {
            return Err(ServiceError::ValidationError(
                "days and threshold must be positive".to_string(),
            ));
        }
        let db = &*self.db;
        let since = Utc::now() - Duration::days(days);

        let sold: HashMap<i32, i64> = sale_item::Entity::find()
            .select_only()
            .column(sale_item::Column::ProductId)
            .column_as(
                Expr::col((sale_item::Entity, sale_item::Column::Qty)).sum(),
                "total_sold",
            )
            .inner_join(sale::Entity)
            .filter(sale::Column::CreatedAt.gte(since))
            .group_by(sale_item::Column::ProductId)
            .into_tuple::<(i32, i64)>()
            .all(db)
            .await?
            .into_iter()
            .collect();

        let products = product::Entity::find()
            .filter(product::Column::DeletedAt.is_null())
            .filter(product::Column::IsActive.eq(true))
            .find_also_related(category::Entity)
            .all(db)
            .await?;

        let mut entries: Vec<SlowMovingEntry> = products
            .into_iter()
            .map(|(p, category)| SlowMovingEntry {
                total_sold: sold.get(&p.id).copied().unwrap_or(0),
                id: p.id,
                sku: p.sku,
                name: p.name,
                stock: p.stock,
                sell_price: p.sell_price,
                category_name: category.map(|c| c.name),
            })
            .filter(|entry| entry.total_sold < threshold)
            .collect();
        rank_slow_movers(&mut entries);

        Ok(entries)
    }
}

/// Products may only be filed under a category that has not been soft-deleted
async fn ensure_live_category_in<C: ConnectionTrait>(
    conn: &C,
    category_id: i32,
) -> Result<(), ServiceError> {
    let exists = category::Entity::find_by_id(category_id)
        .filter(category::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .is_some();
    if !exists {
        return Err(ServiceError::ValidationError(format!(
            "Category with ID {category_id} does not exist"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry(id: i32, stock: i32, total_sold: i64) -> SlowMovingEntry {
        SlowMovingEntry {
            id,
            sku: format!("SKU-{id}"),
            name: format!("Item {id}"),
            stock,
            sell_price: dec!(1000),
            category_name: None,
            total_sold,
        }
    }

    #[test]
    fn slow_movers_rank_by_sales_then_stock_descending() {
        let mut entries = vec![entry(1, 5, 3), entry(2, 50, 0), entry(3, 80, 0), entry(4, 10, 1)];
        rank_slow_movers(&mut entries);
        let order: Vec<i32> = entries.iter().map(|e| e.id).collect();
        assert_eq!(order, vec![3, 2, 4, 1]);
    }

    #[test]
    fn field_guards() {
        assert!(require_text("sku", "  ").is_err());
        assert_eq!(require_text("sku", " SMN-001 ").unwrap(), "SMN-001");
        assert!(require_non_negative_price("buyPrice", dec!(-1)).is_err());
        assert!(require_non_negative_price("buyPrice", dec!(0)).is_ok());
        assert!(require_non_negative_count("minStock", -1).is_err());
    }
}
