use crate::{
    auth::AuthUser,
    db::{self, DbPool},
    dto::{Page, ProductSummary, UserSummary},
    entities::{
        product, sale, sale_item, stock_movement, user, MovementType, PaymentMethod,
    },
    errors::ServiceError,
    services::period::Period,
};
use chrono::{DateTime, Local, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

/// A sale that loses to a concurrent writer is attempted this many times in total
const MAX_SALE_ATTEMPTS: u32 = 2;
const MAX_DAILY_INVOICES: u32 = 9999;
const SLOW_SALE_THRESHOLD: Duration = Duration::from_millis(500);
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// One requested cart line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartLine {
    pub product_id: i32,
    pub qty: i32,
}

/// Checkout request as received from the till
#[derive(Debug, Clone, Default)]
pub struct NewSale {
    pub items: Vec<CartLine>,
    pub payment_method: Option<String>,
}

/// Line priced against the catalog inside the atomic unit
#[derive(Debug, Clone)]
struct PricedLine {
    product_id: i32,
    product_name: String,
    qty: i32,
    price: Decimal,
    subtotal: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaleItemView {
    pub id: i32,
    pub product_id: i32,
    pub qty: i32,
    #[schema(value_type = String)]
    pub price: Decimal,
    #[schema(value_type = String)]
    pub subtotal: Decimal,
    /// Absent only if the product row has been purged
    pub product: Option<ProductSummary>,
}

/// Sale with its lines and cashier, as printed on the receipt
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaleView {
    pub id: i32,
    pub invoice_no: String,
    pub cashier_id: i32,
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub created_at: DateTime<Utc>,
    pub cashier: Option<UserSummary>,
    pub items: Vec<SaleItemView>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaleListEntry {
    pub id: i32,
    pub invoice_no: String,
    pub cashier_id: i32,
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub created_at: DateTime<Utc>,
    pub cashier: Option<UserSummary>,
    pub item_count: i64,
}

#[derive(Debug, Clone, Default)]
pub struct SaleFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub payment_method: Option<PaymentMethod>,
    pub page: u64,
    pub limit: u64,
}

/// Rejects malformed carts before any storage access
pub fn validate_sale(request: &NewSale) -> Result<PaymentMethod, ServiceError> {
    if request.items.is_empty() {
        return Err(ServiceError::ValidationError(
            "Transaction items are required".to_string(),
        ));
    }

    if let Some(line) = request.items.iter().find(|line| line.qty <= 0) {
        return Err(ServiceError::ValidationError(format!(
            "Quantity for product {} must be greater than zero",
            line.product_id
        )));
    }

    let raw = request
        .payment_method
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ServiceError::ValidationError("paymentMethod is required".to_string()))?;

    raw.to_ascii_uppercase().parse::<PaymentMethod>().map_err(|_| {
        ServiceError::ValidationError("paymentMethod must be CASH or TRANSFER".to_string())
    })
}

/// `INV-YYYYMMDD-NNNN`
pub fn format_invoice_no(day: NaiveDate, sequence: u32) -> String {
    format!("INV-{}-{:04}", day.format("%Y%m%d"), sequence)
}

fn invoice_prefix(day: NaiveDate) -> String {
    format!("INV-{}-", day.format("%Y%m%d"))
}

/// Next free invoice number for `day`, read inside the caller's transaction.
/// The unique index on `invoice_no` rejects a concurrent writer that read the same value.
async fn next_invoice_no<C: ConnectionTrait>(
    conn: &C,
    day: NaiveDate,
) -> Result<String, ServiceError> {
    let prefix = invoice_prefix(day);
    let last = sale::Entity::find()
        .filter(sale::Column::InvoiceNo.starts_with(&prefix))
        .order_by_desc(sale::Column::InvoiceNo)
        .one(conn)
        .await?;

    let last_sequence = last
        .as_ref()
        .and_then(|s| s.invoice_no.strip_prefix(&prefix))
        .and_then(|seq| seq.parse::<u32>().ok())
        .unwrap_or(0);

    if last_sequence >= MAX_DAILY_INVOICES {
        return Err(ServiceError::Conflict(format!(
            "Invoice numbers for {} are exhausted",
            day.format("%Y-%m-%d")
        )));
    }

    Ok(format_invoice_no(day, last_sequence + 1))
}

/// Sale workflow: cart validation, pricing, invoice numbering, stock decrement and ledger
#[derive(Debug, Clone)]
pub struct SaleService {
    db: Arc<DbPool>,
}

impl SaleService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Records a sale atomically and returns it as stored.
    #[instrument(skip(self, cashier, request), fields(cashier_id = cashier.user_id, lines = request.items.len()))]
    pub async fn create_sale(
        &self,
        cashier: &AuthUser,
        request: NewSale,
    ) -> Result<SaleView, ServiceError> {
        let payment_method = validate_sale(&request)?;
        let lines = request.items;
        let cashier_id = cashier.user_id;
        let started = Instant::now();

        let view = db::retry_on_contention(
            "create_sale",
            MAX_SALE_ATTEMPTS,
            "Another sale was recorded at the same time, please retry",
            move |_| self.record_sale(cashier_id, lines.clone(), payment_method),
        )
        .await?;

        crate::tracing::log_slow_operation("create_sale", started.elapsed(), SLOW_SALE_THRESHOLD);
        info!(
            sale_id = view.id,
            invoice_no = %view.invoice_no,
            total = %view.total_amount,
            "sale recorded"
        );
        Ok(view)
    }

    /// One attempt at the atomic unit. The receipt is read back before commit.
    async fn record_sale(
        &self,
        cashier_id: i32,
        lines: Vec<CartLine>,
        payment_method: PaymentMethod,
    ) -> Result<SaleView, ServiceError> {
        self.db
            .transaction::<_, SaleView, ServiceError>(move |txn| {
                Box::pin(async move {
                    db::claim_write_lock(txn).await?;
                    let priced = price_cart(txn, &lines).await?;
                    let total_amount: Decimal = priced.iter().map(|line| line.subtotal).sum();
                    let invoice_no = next_invoice_no(txn, Local::now().date_naive()).await?;

                    for line in &priced {
                        decrement_stock(txn, line).await?;

                        stock_movement::ActiveModel {
                            product_id: Set(line.product_id),
                            movement_type: Set(MovementType::Out),
                            qty: Set(line.qty),
                            notes: Set(Some(format!("Sale - {invoice_no}"))),
                            user_id: Set(cashier_id),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await?;
                    }

                    let sale = sale::ActiveModel {
                        invoice_no: Set(invoice_no),
                        cashier_id: Set(cashier_id),
                        total_amount: Set(total_amount),
                        payment_method: Set(payment_method),
                        created_at: Set(Utc::now()),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    for line in priced {
                        sale_item::ActiveModel {
                            transaction_id: Set(sale.id),
                            product_id: Set(line.product_id),
                            qty: Set(line.qty),
                            price: Set(line.price),
                            subtotal: Set(line.subtotal),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await?;
                    }

                    load_sale_view(txn, sale.id).await
                })
            })
            .await
            .map_err(ServiceError::from)
    }

    /// Fetch a sale with its lines and cashier
    #[instrument(skip(self))]
    pub async fn get_sale(&self, id: i32) -> Result<SaleView, ServiceError> {
        load_sale_view(&*self.db, id).await
    }

    /// Newest-first page of sales with cashier and line counts
    #[instrument(skip(self))]
    pub async fn list_sales(&self, filter: SaleFilter) -> Result<Page<SaleListEntry>, ServiceError> {
        let db = &*self.db;
        let page = filter.page.max(1);
        let limit = if filter.limit == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            filter.limit
        };

        let period = Period::local_days(filter.start_date, filter.end_date);
        let mut query = sale::Entity::find();
        if let Some(start) = period.start {
            query = query.filter(sale::Column::CreatedAt.gte(start));
        }
        if let Some(end) = period.end {
            query = query.filter(sale::Column::CreatedAt.lt(end));
        }
        if let Some(method) = filter.payment_method {
            query = query.filter(sale::Column::PaymentMethod.eq(method));
        }

        let paginator = query
            .order_by_desc(sale::Column::CreatedAt)
            .order_by_desc(sale::Column::Id)
            .paginate(db, limit);
        let total = paginator.num_items().await?;
        let sales = paginator.fetch_page(page - 1).await?;

        let sale_ids: Vec<i32> = sales.iter().map(|s| s.id).collect();
        let cashier_ids: Vec<i32> = sales.iter().map(|s| s.cashier_id).collect();

        let item_counts: HashMap<i32, i64> = if sale_ids.is_empty() {
            HashMap::new()
        } else {
            sale_item::Entity::find()
                .select_only()
                .column(sale_item::Column::TransactionId)
                .column_as(
                    Expr::col((sale_item::Entity, sale_item::Column::Id)).count(),
                    "item_count",
                )
                .filter(sale_item::Column::TransactionId.is_in(sale_ids))
                .group_by(sale_item::Column::TransactionId)
                .into_tuple::<(i32, i64)>()
                .all(db)
                .await?
                .into_iter()
                .collect()
        };

        let cashiers: HashMap<i32, user::Model> = if cashier_ids.is_empty() {
            HashMap::new()
        } else {
            user::Entity::find()
                .filter(user::Column::Id.is_in(cashier_ids))
                .all(db)
                .await?
                .into_iter()
                .map(|u| (u.id, u))
                .collect()
        };

        let items = sales
            .into_iter()
            .map(|s| SaleListEntry {
                item_count: item_counts.get(&s.id).copied().unwrap_or(0),
                cashier: cashiers.get(&s.cashier_id).map(UserSummary::from),
                id: s.id,
                invoice_no: s.invoice_no,
                cashier_id: s.cashier_id,
                total_amount: s.total_amount,
                payment_method: s.payment_method,
                created_at: s.created_at,
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

async fn load_sale_view<C: ConnectionTrait>(db: &C, id: i32) -> Result<SaleView, ServiceError> {
    let sale = sale::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Transaction not found".to_string()))?;

    let items = sale_item::Entity::find()
        .filter(sale_item::Column::TransactionId.eq(sale.id))
        .order_by_asc(sale_item::Column::Id)
        .find_also_related(product::Entity)
        .all(db)
        .await?;

    let cashier = user::Entity::find_by_id(sale.cashier_id).one(db).await?;

    Ok(SaleView {
        id: sale.id,
        invoice_no: sale.invoice_no,
        cashier_id: sale.cashier_id,
        total_amount: sale.total_amount,
        payment_method: sale.payment_method,
        created_at: sale.created_at,
        cashier: cashier.as_ref().map(UserSummary::with_email),
        items: items
            .into_iter()
            .map(|(item, product)| SaleItemView {
                id: item.id,
                product_id: item.product_id,
                qty: item.qty,
                price: item.price,
                subtotal: item.subtotal,
                product: product.as_ref().map(ProductSummary::from),
            })
            .collect(),
    })
}

/// Loads each line's product in cart order and checks stock, pricing at the current sell price
async fn price_cart(
    txn: &DatabaseTransaction,
    lines: &[CartLine],
) -> Result<Vec<PricedLine>, ServiceError> {
    let mut priced = Vec::with_capacity(lines.len());

    for line in lines {
        let product = product::Entity::find_by_id(line.product_id)
            .filter(product::Column::DeletedAt.is_null())
            .one(txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product with ID {} not found", line.product_id))
            })?;

        if product.stock < line.qty {
            warn!(
                product_id = product.id,
                available = product.stock,
                requested = line.qty,
                "sale rejected: insufficient stock"
            );
            return Err(ServiceError::InsufficientStock {
                product: product.name,
                available: product.stock,
                requested: line.qty,
            });
        }

        priced.push(PricedLine {
            product_id: product.id,
            subtotal: product.sell_price * Decimal::from(line.qty),
            price: product.sell_price,
            qty: line.qty,
            product_name: product.name,
        });
    }

    Ok(priced)
}

/// Conditional decrement: only succeeds while `stock >= qty` holds at write time
async fn decrement_stock(txn: &DatabaseTransaction, line: &PricedLine) -> Result<(), ServiceError> {
    let result = product::Entity::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).sub(line.qty),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(line.product_id))
        .filter(product::Column::Stock.gte(line.qty))
        .exec(txn)
        .await?;

    if result.rows_affected == 1 {
        return Ok(());
    }

    // Lost a race with another writer, or the cart repeats this product
    let available = product::Entity::find_by_id(line.product_id)
        .one(txn)
        .await?
        .map(|p| p.stock)
        .unwrap_or(0);
    warn!(
        product_id = line.product_id,
        available,
        requested = line.qty,
        "conditional stock decrement rejected"
    );
    Err(ServiceError::InsufficientStock {
        product: line.product_name.clone(),
        available,
        requested: line.qty,
    })
}
