use crate::{
    auth::AuthUser,
    db::{self, DbPool},
    dto::{Page, ProductSummary, UserSummary},
    entities::{product, stock_movement, user, MovementType},
    errors::ServiceError,
    services::period::Period,
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    sea_query::{Expr, SimpleExpr},
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

pub const DEFAULT_HISTORY_PAGE_SIZE: u64 = 50;
const MAX_ADJUST_ATTEMPTS: u32 = 2;

type AppliedAdjustment = (stock_movement::Model, product::Model, Option<user::Model>);

/// Manual stock correction requested by an administrator
#[derive(Debug, Clone)]
pub struct StockAdjustment {
    pub product_id: i32,
    pub movement_type: String,
    pub qty: i32,
    pub notes: Option<String>,
}

/// Ledger entry with the product and user it refers to
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MovementView {
    pub id: i32,
    pub product_id: i32,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub qty: i32,
    pub notes: Option<String>,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub product: Option<ProductSummary>,
    pub user: Option<UserSummary>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentResult {
    pub movement: MovementView,
    pub updated_product: product::Model,
}

#[derive(Debug, Clone, Default)]
pub struct MovementFilter {
    pub product_id: Option<i32>,
    pub movement_type: Option<MovementType>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page: u64,
    pub limit: u64,
}

/// Parses and checks an adjustment before touching storage
pub fn validate_adjustment(request: &StockAdjustment) -> Result<MovementType, ServiceError> {
    let movement_type = request
        .movement_type
        .trim()
        .to_ascii_uppercase()
        .parse::<MovementType>()
        .map_err(|_| ServiceError::ValidationError("type must be IN, OUT, or ADJUST".to_string()))?;

    if request.qty <= 0 {
        return Err(ServiceError::ValidationError(
            "qty must be greater than zero".to_string(),
        ));
    }

    Ok(movement_type)
}

/// Stock ledger: manual adjustments and movement history
#[derive(Debug, Clone)]
pub struct InventoryService {
    db: Arc<DbPool>,
}

impl InventoryService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Applies an IN, OUT or ADJUST movement and records it in the ledger atomically
    #[instrument(skip(self, actor), fields(user_id = actor.user_id))]
    pub async fn adjust_stock(
        &self,
        actor: &AuthUser,
        request: StockAdjustment,
    ) -> Result<AdjustmentResult, ServiceError> {
        let movement_type = validate_adjustment(&request)?;
        let user_id = actor.user_id;

        let (movement, updated_product, user) = db::retry_on_contention(
            "adjust_stock",
            MAX_ADJUST_ATTEMPTS,
            "Stock was changed by another request at the same time, please retry",
            move |_| self.apply_adjustment(user_id, movement_type, request.clone()),
        )
        .await?;

        info!(
            product_id = updated_product.id,
            movement_type = %movement.movement_type,
            qty = movement.qty,
            stock = updated_product.stock,
            "stock adjusted"
        );

        Ok(AdjustmentResult {
            movement: MovementView {
                id: movement.id,
                product_id: movement.product_id,
                movement_type: movement.movement_type,
                qty: movement.qty,
                notes: movement.notes,
                user_id: movement.user_id,
                created_at: movement.created_at,
                product: Some(ProductSummary::from(&updated_product)),
                user: user.as_ref().map(UserSummary::from),
            },
            updated_product,
        })
    }

    /// One attempt at the adjustment unit
    async fn apply_adjustment(
        &self,
        user_id: i32,
        movement_type: MovementType,
        request: StockAdjustment,
    ) -> Result<AppliedAdjustment, ServiceError> {
        self.db
            .transaction::<_, AppliedAdjustment, ServiceError>(move |txn| {
                Box::pin(async move {
                    db::claim_write_lock(txn).await?;
                    let product = product::Entity::find_by_id(request.product_id)
                        .filter(product::Column::DeletedAt.is_null())
                        .one(txn)
                        .await?
                        .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

                    if movement_type.apply(product.stock, request.qty).is_none() {
                        warn!(
                            product_id = product.id,
                            available = product.stock,
                            requested = request.qty,
                            "adjustment rejected: insufficient stock"
                        );
                        return Err(ServiceError::InsufficientStock {
                            product: product.name,
                            available: product.stock,
                            requested: request.qty,
                        });
                    }

                    let new_stock: SimpleExpr = match movement_type {
                        MovementType::In => Expr::col(product::Column::Stock).add(request.qty),
                        MovementType::Out => Expr::col(product::Column::Stock).sub(request.qty),
                        MovementType::Adjust => Expr::value(request.qty),
                    };

                    let mut update = product::Entity::update_many()
                        .col_expr(product::Column::Stock, new_stock)
                        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
                        .filter(product::Column::Id.eq(product.id));
                    if movement_type == MovementType::Out {
                        update = update.filter(product::Column::Stock.gte(request.qty));
                    }

                    if update.exec(txn).await?.rows_affected != 1 {
                        let available = product::Entity::find_by_id(product.id)
                            .one(txn)
                            .await?
                            .map(|p| p.stock)
                            .unwrap_or(0);
                        return Err(ServiceError::InsufficientStock {
                            product: product.name,
                            available,
                            requested: request.qty,
                        });
                    }

                    let movement = stock_movement::ActiveModel {
                        product_id: Set(product.id),
                        movement_type: Set(movement_type),
                        qty: Set(request.qty),
                        notes: Set(request.notes.filter(|n| !n.trim().is_empty())),
                        user_id: Set(user_id),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    let updated = product::Entity::find_by_id(product.id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

                    let user = user::Entity::find_by_id(user_id).one(txn).await?;

                    Ok((movement, updated, user))
                })
            })
            .await
            .map_err(ServiceError::from)
    }

    /// Newest-first page of ledger entries
    #[instrument(skip(self))]
    pub async fn history(&self, filter: MovementFilter) -> Result<Page<MovementView>, ServiceError> {
        let db = &*self.db;
        let page = filter.page.max(1);
        let limit = if filter.limit == 0 {
            DEFAULT_HISTORY_PAGE_SIZE
        } else {
            filter.limit
        };

        let mut query = stock_movement::Entity::find();
        if let Some(product_id) = filter.product_id {
            query = query.filter(stock_movement::Column::ProductId.eq(product_id));
        }
        if let Some(kind) = filter.movement_type {
            query = query.filter(stock_movement::Column::MovementType.eq(kind));
        }
        let period = Period::local_days(filter.start_date, filter.end_date);
        if let Some(start) = period.start {
            query = query.filter(stock_movement::Column::CreatedAt.gte(start));
        }
        if let Some(end) = period.end {
            query = query.filter(stock_movement::Column::CreatedAt.lt(end));
        }

        let paginator = query
            .order_by_desc(stock_movement::Column::CreatedAt)
            .order_by_desc(stock_movement::Column::Id)
            .paginate(db, limit);
        let total = paginator.num_items().await?;
        let movements = paginator.fetch_page(page - 1).await?;

        let product_ids: Vec<i32> = movements.iter().map(|m| m.product_id).collect();
        let user_ids: Vec<i32> = movements.iter().map(|m| m.user_id).collect();

        let products: HashMap<i32, ProductSummary> = if product_ids.is_empty() {
            HashMap::new()
        } else {
            product::Entity::find()
                .filter(product::Column::Id.is_in(product_ids))
                .all(db)
                .await?
                .iter()
                .map(|p| (p.id, ProductSummary::from(p)))
                .collect()
        };
        let users: HashMap<i32, UserSummary> = if user_ids.is_empty() {
            HashMap::new()
        } else {
            user::Entity::find()
                .filter(user::Column::Id.is_in(user_ids))
                .all(db)
                .await?
                .iter()
                .map(|u| (u.id, UserSummary::from(u)))
                .collect()
        };

        let items = movements
            .into_iter()
            .map(|m| MovementView {
                product: products.get(&m.product_id).cloned(),
                user: users.get(&m.user_id).cloned(),
                id: m.id,
                product_id: m.product_id,
                movement_type: m.movement_type,
                qty: m.qty,
                notes: m.notes,
                user_id: m.user_id,
                created_at: m.created_at,
            })
            .collect();

        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }
}
