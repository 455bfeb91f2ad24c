//! Out-of-band jobs: retention sweep of soft-deleted rows and demo data seeding.

use crate::{
    auth::password::hash_password_blocking,
    db::{self, DbPool},
    entities::{category, product, sale, sale_item, stock_movement, user, MovementType, Role},
    errors::ServiceError,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// Outcome of one retention sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    pub products_purged: u64,
    pub products_skipped: u64,
    pub categories_purged: u64,
    pub categories_skipped: u64,
    pub users_purged: u64,
    pub users_skipped: u64,
}

impl PurgeReport {
    pub fn total_purged(&self) -> u64 {
        self.products_purged + self.categories_purged + self.users_purged
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReport {
    pub users: u64,
    pub categories: u64,
    pub products: u64,
}

/// Instant before which soft-deleted rows are eligible for purging
pub fn retention_cutoff(now: DateTime<Utc>, retention_days: i64) -> DateTime<Utc> {
    now - Duration::days(retention_days.max(0))
}

struct SeedProduct {
    sku: &'static str,
    name: &'static str,
    category: usize,
    buy_price: i64,
    sell_price: i64,
    stock: i32,
    unit: &'static str,
    min_stock: i32,
}

const SEED_CATEGORIES: &[(&str, &str)] = &[
    ("Semen", "Berbagai jenis semen"),
    ("Cat", "Cat tembok dan kayu"),
    ("Paku & Baut", "Paku, baut, sekrup"),
    ("Keramik", "Keramik lantai dan dinding"),
    ("Alat Tukang", "Palu, gergaji, dll"),
];

const SEED_PRODUCTS: &[SeedProduct] = &[
    SeedProduct { sku: "SMN-001", name: "Semen Gresik 50kg", category: 0, buy_price: 65000, sell_price: 75000, stock: 150, unit: "sak", min_stock: 20 },
    SeedProduct { sku: "SMN-002", name: "Semen Tiga Roda 50kg", category: 0, buy_price: 63000, sell_price: 73000, stock: 120, unit: "sak", min_stock: 20 },
    SeedProduct { sku: "CAT-RED", name: "Cat Avian Merah 1L", category: 1, buy_price: 45000, sell_price: 55000, stock: 3, unit: "klg", min_stock: 5 },
    SeedProduct { sku: "CAT-WHT", name: "Cat Avian Putih 5L", category: 1, buy_price: 180000, sell_price: 220000, stock: 25, unit: "klg", min_stock: 5 },
    SeedProduct { sku: "CAT-PLK", name: "Cat Pelapis Anti Bocor 4L", category: 1, buy_price: 100000, sell_price: 120000, stock: 18, unit: "klg", min_stock: 5 },
    SeedProduct { sku: "PKU-5CM", name: "Paku 5cm", category: 2, buy_price: 12000, sell_price: 15000, stock: 4, unit: "kg", min_stock: 10 },
    SeedProduct { sku: "PKU-10CM", name: "Paku 10cm", category: 2, buy_price: 13000, sell_price: 16000, stock: 30, unit: "kg", min_stock: 10 },
    SeedProduct { sku: "KRM-40", name: "Keramik Putih 40x40", category: 3, buy_price: 48000, sell_price: 58000, stock: 60, unit: "dus", min_stock: 15 },
    SeedProduct { sku: "ALT-PLU", name: "Palu Kambing", category: 4, buy_price: 35000, sell_price: 45000, stock: 12, unit: "pcs", min_stock: 5 },
];

#[derive(Debug, Clone)]
pub struct MaintenanceService {
    db: Arc<DbPool>,
}

impl MaintenanceService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Hard-deletes rows soft-deleted at or before `cutoff`, keeping anything sale history
    /// still points at. Runs as one transaction.
    #[instrument(skip(self))]
    pub async fn purge_expired_soft_deletes(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<PurgeReport, ServiceError> {
        let report = self
            .db
            .transaction::<_, PurgeReport, ServiceError>(move |txn| {
                Box::pin(async move {
                    db::claim_write_lock(txn).await?;
                    let mut report = PurgeReport::default();
                    purge_products(txn, cutoff, &mut report).await?;
                    purge_categories(txn, cutoff, &mut report).await?;
                    purge_users(txn, cutoff, &mut report).await?;
                    Ok(report)
                })
            })
            .await
            .map_err(ServiceError::from)?;

        info!(
            products = report.products_purged,
            categories = report.categories_purged,
            users = report.users_purged,
            skipped = report.products_skipped + report.categories_skipped + report.users_skipped,
            "retention sweep finished"
        );
        Ok(report)
    }

    /// Loads demo accounts and catalog. Returns `None` when accounts already exist.
    #[instrument(skip(self))]
    pub async fn seed_demo_data(&self) -> Result<Option<SeedReport>, ServiceError> {
        if user::Entity::find().count(&*self.db).await? > 0 {
            info!("users already present, skipping seed");
            return Ok(None);
        }

        let admin_hash = hash_password_blocking("admin123".to_string()).await?;
        let cashier_hash = hash_password_blocking("kasir123".to_string()).await?;

        let report = self
            .db
            .transaction::<_, SeedReport, ServiceError>(move |txn| {
                Box::pin(async move {
                    let mut report = SeedReport::default();

                    let admin = user::ActiveModel {
                        email: Set("admin@majujaya.com".to_string()),
                        password_hash: Set(admin_hash),
                        name: Set("Administrator".to_string()),
                        role: Set(Role::Admin),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;
                    user::ActiveModel {
                        email: Set("kasir@majujaya.com".to_string()),
                        password_hash: Set(cashier_hash),
                        name: Set("Kasir 1".to_string()),
                        role: Set(Role::Cashier),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;
                    report.users = 2;

                    let mut category_ids = Vec::with_capacity(SEED_CATEGORIES.len());
                    for (name, description) in SEED_CATEGORIES {
                        let created = category::ActiveModel {
                            name: Set((*name).to_string()),
                            description: Set(Some((*description).to_string())),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await?;
                        category_ids.push(created.id);
                    }
                    report.categories = category_ids.len() as u64;

                    for seed in SEED_PRODUCTS {
                        let category_id = category_ids.get(seed.category).copied().ok_or_else(
                            || ServiceError::InternalError(format!("no seed category for {}", seed.sku)),
                        )?;
                        let created = product::ActiveModel {
                            sku: Set(seed.sku.to_string()),
                            name: Set(seed.name.to_string()),
                            category_id: Set(category_id),
                            unit: Set(seed.unit.to_string()),
                            buy_price: Set(Decimal::from(seed.buy_price)),
                            sell_price: Set(Decimal::from(seed.sell_price)),
                            stock: Set(seed.stock),
                            min_stock: Set(seed.min_stock),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await?;

                        stock_movement::ActiveModel {
                            product_id: Set(created.id),
                            movement_type: Set(MovementType::In),
                            qty: Set(created.stock),
                            notes: Set(Some("Opening stock".to_string())),
                            user_id: Set(admin.id),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await?;
                        report.products += 1;
                    }

                    Ok(report)
                })
            })
            .await
            .map_err(ServiceError::from)?;

        info!(
            users = report.users,
            categories = report.categories,
            products = report.products,
            "demo data seeded"
        );
        Ok(Some(report))
    }
}

async fn purge_products<C: ConnectionTrait>(
    conn: &C,
    cutoff: DateTime<Utc>,
    report: &mut PurgeReport,
) -> Result<(), ServiceError> {
    let expired = product::Entity::find()
        .filter(product::Column::DeletedAt.lte(cutoff))
        .all(conn)
        .await?;

    for p in expired {
        let sold = sale_item::Entity::find()
            .filter(sale_item::Column::ProductId.eq(p.id))
            .count(conn)
            .await?;
        if sold > 0 {
            report.products_skipped += 1;
            continue;
        }

        stock_movement::Entity::delete_many()
            .filter(stock_movement::Column::ProductId.eq(p.id))
            .exec(conn)
            .await?;
        product::Entity::delete_by_id(p.id).exec(conn).await?;
        report.products_purged += 1;
    }
    Ok(())
}

async fn purge_categories<C: ConnectionTrait>(
    conn: &C,
    cutoff: DateTime<Utc>,
    report: &mut PurgeReport,
) -> Result<(), ServiceError> {
    let expired = category::Entity::find()
        .filter(category::Column::DeletedAt.lte(cutoff))
        .all(conn)
        .await?;

    for c in expired {
        // Any remaining product row pins the category, soft-deleted or not
        let referenced = product::Entity::find()
            .filter(product::Column::CategoryId.eq(c.id))
            .count(conn)
            .await?;
        if referenced > 0 {
            report.categories_skipped += 1;
            continue;
        }

        category::Entity::delete_by_id(c.id).exec(conn).await?;
        report.categories_purged += 1;
    }
    Ok(())
}

async fn purge_users<C: ConnectionTrait>(
    conn: &C,
    cutoff: DateTime<Utc>,
    report: &mut PurgeReport,
) -> Result<(), ServiceError> {
    let expired = user::Entity::find()
        .filter(user::Column::DeletedAt.lte(cutoff))
        .all(conn)
        .await?;

    for u in expired {
        let sales = sale::Entity::find()
            .filter(sale::Column::CashierId.eq(u.id))
            .count(conn)
            .await?;
        let movements = stock_movement::Entity::find()
            .filter(stock_movement::Column::UserId.eq(u.id))
            .count(conn)
            .await?;
        if sales > 0 || movements > 0 {
            report.users_skipped += 1;
            continue;
        }

        user::Entity::delete_by_id(u.id).exec(conn).await?;
        report.users_purged += 1;
    }
    Ok(())
}
