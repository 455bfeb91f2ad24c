// Checkout and stock ledger
pub mod inventory;
pub mod sales;

// Catalog and accounts
pub mod categories;
pub mod products;
pub mod users;

// Reporting
pub mod reports;

// Retention sweep and seeding
pub mod maintenance;

// Shared date handling
pub mod period;

use crate::db::DbPool;
use std::sync::Arc;

use self::{
    categories::CategoryService, inventory::InventoryService, maintenance::MaintenanceService,
    products::ProductService, reports::ReportService, sales::SaleService, users::UserService,
};

/// Service container holding all service instances over one shared pool
#[derive(Clone)]
pub struct AppServices {
    pub sales: Arc<SaleService>,
    pub inventory: Arc<InventoryService>,
    pub products: Arc<ProductService>,
    pub categories: Arc<CategoryService>,
    pub users: Arc<UserService>,
    pub reports: Arc<ReportService>,
    pub maintenance: Arc<MaintenanceService>,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self {
            sales: Arc::new(SaleService::new(db.clone())),
            inventory: Arc::new(InventoryService::new(db.clone())),
            products: Arc::new(ProductService::new(db.clone())),
            categories: Arc::new(CategoryService::new(db.clone())),
            users: Arc::new(UserService::new(db.clone())),
            reports: Arc::new(ReportService::new(db.clone())),
            maintenance: Arc::new(MaintenanceService::new(db)),
        }
    }
}
