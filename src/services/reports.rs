use crate::{
    db::DbPool,
    entities::{category, product, sale, sale_item},
    errors::ServiceError,
    services::period::Period,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

pub const TOP_PRODUCT_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportPeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SalesSummary {
    pub total_transactions: u64,
    #[schema(value_type = String)]
    pub total_revenue: Decimal,
    #[schema(value_type = String)]
    pub average_transaction: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct PaymentMethodTotal {
    pub count: u64,
    #[schema(value_type = String)]
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopProduct {
    pub product_id: i32,
    pub product_name: String,
    pub category: Option<String>,
    pub total_qty: i64,
    #[schema(value_type = String)]
    pub total_revenue: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SalesReport {
    pub period: ReportPeriod,
    pub summary: SalesSummary,
    /// Keyed by payment method (`CASH`, `TRANSFER`)
    pub by_payment_method: BTreeMap<String, PaymentMethodTotal>,
    pub top_products: Vec<TopProduct>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InventoryLine {
    pub id: i32,
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub stock: i32,
    pub unit: String,
    #[schema(value_type = String)]
    pub buy_price: Decimal,
    #[schema(value_type = String)]
    pub sell_price: Decimal,
    #[schema(value_type = String)]
    pub stock_value: Decimal,
    #[schema(value_type = String)]
    pub potential_revenue: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InventorySummary {
    pub total_items: u64,
    pub total_units: i64,
    #[schema(value_type = String)]
    pub total_stock_value: Decimal,
    #[schema(value_type = String)]
    pub total_potential_revenue: Decimal,
    #[schema(value_type = String)]
    pub estimated_profit: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReport {
    pub generated_at: DateTime<Utc>,
    pub summary: InventorySummary,
    pub items: Vec<InventoryLine>,
}

/// Mean ticket size rounded to cents; zero when nothing was sold
fn average(total: Decimal, count: u64) -> Decimal {
    if count == 0 {
        Decimal::ZERO
    } else {
        (total / Decimal::from(count)).round_dp(2)
    }
}

fn payment_breakdown(sales: &[sale::Model]) -> BTreeMap<String, PaymentMethodTotal> {
    sales.iter().fold(BTreeMap::new(), |mut acc, s| {
        let entry: &mut PaymentMethodTotal = acc.entry(s.payment_method.to_string()).or_default();
        entry.count += 1;
        entry.total += s.total_amount;
        acc
    })
}

fn summarize_inventory(items: &[InventoryLine]) -> InventorySummary {
    let mut summary = items
        .iter()
        .fold(InventorySummary::default(), |mut acc, line| {
            acc.total_items += 1;
            acc.total_units += i64::from(line.stock);
            acc.total_stock_value += line.stock_value;
            acc.total_potential_revenue += line.potential_revenue;
            acc
        });
    summary.estimated_profit = summary.total_potential_revenue - summary.total_stock_value;
    summary
}

#[derive(Debug, Clone)]
pub struct ReportService {
    db: Arc<DbPool>,
}

impl ReportService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Sales between two local days, both inclusive
    #[instrument(skip(self))]
    pub async fn sales_report(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<SalesReport, ServiceError> {
        if end_date < start_date {
            return Err(ServiceError::ValidationError(
                "startDate must not be after endDate".to_string(),
            ));
        }
        let db = &*self.db;
        let period = Period::local_days(Some(start_date), Some(end_date));

        let mut query = sale::Entity::find();
        if let Some(start) = period.start {
            query = query.filter(sale::Column::CreatedAt.gte(start));
        }
        if let Some(end) = period.end {
            query = query.filter(sale::Column::CreatedAt.lt(end));
        }
        let sales = query.all(db).await?;

        let total_revenue: Decimal = sales.iter().map(|s| s.total_amount).sum();
        let total_transactions = sales.len() as u64;
        let by_payment_method = payment_breakdown(&sales);

        let sale_ids: Vec<i32> = sales.iter().map(|s| s.id).collect();
        let top_products = if sale_ids.is_empty() {
            Vec::new()
        } else {
            self.top_products(sale_ids).await?
        };

        Ok(SalesReport {
            period: ReportPeriod {
                start_date,
                end_date,
            },
            summary: SalesSummary {
                total_transactions,
                total_revenue,
                average_transaction: average(total_revenue, total_transactions),
            },
            by_payment_method,
            top_products,
        })
    }

    async fn top_products(&self, sale_ids: Vec<i32>) -> Result<Vec<TopProduct>, ServiceError> {
        let db = &*self.db;
        let items = sale_item::Entity::find()
            .filter(sale_item::Column::TransactionId.is_in(sale_ids))
            .all(db)
            .await?;

        let mut totals: HashMap<i32, (i64, Decimal)> = HashMap::new();
        for item in &items {
            let entry = totals.entry(item.product_id).or_insert((0, Decimal::ZERO));
            entry.0 += i64::from(item.qty);
            entry.1 += item.subtotal;
        }

        let product_ids: Vec<i32> = totals.keys().copied().collect();
        let products: HashMap<i32, (product::Model, Option<category::Model>)> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .find_also_related(category::Entity)
            .all(db)
            .await?
            .into_iter()
            .map(|(p, c)| (p.id, (p, c)))
            .collect();

        let mut ranked: Vec<TopProduct> = totals
            .into_iter()
            .map(|(product_id, (total_qty, total_revenue))| {
                let (product_name, category) = match products.get(&product_id) {
                    Some((p, c)) => (p.name.clone(), c.as_ref().map(|c| c.name.clone())),
                    None => (format!("Product #{product_id}"), None),
                };
                TopProduct {
                    product_id,
                    product_name,
                    category,
                    total_qty,
                    total_revenue,
                }
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.total_revenue
                .cmp(&a.total_revenue)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        ranked.truncate(TOP_PRODUCT_LIMIT);

        Ok(ranked)
    }

    /// Valuation of live, active stock at buy and sell prices
    #[instrument(skip(self))]
    pub async fn inventory_report(&self) -> Result<InventoryReport, ServiceError> {
        let rows = product::Entity::find()
            .filter(product::Column::DeletedAt.is_null())
            .filter(product::Column::IsActive.eq(true))
            .order_by_asc(product::Column::Name)
            .find_also_related(category::Entity)
            .all(&*self.db)
            .await?;

        let items: Vec<InventoryLine> = rows
            .into_iter()
            .map(|(p, c)| {
                let units = Decimal::from(p.stock);
                InventoryLine {
                    stock_value: units * p.buy_price,
                    potential_revenue: units * p.sell_price,
                    id: p.id,
                    sku: p.sku,
                    name: p.name,
                    category: c.map(|c| c.name),
                    stock: p.stock,
                    unit: p.unit,
                    buy_price: p.buy_price,
                    sell_price: p.sell_price,
                }
            })
            .collect();

        Ok(InventoryReport {
            generated_at: Utc::now(),
            summary: summarize_inventory(&items),
            items,
        })
    }
}
