use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{handlers, services};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Toko POS API",
        version = "0.2.0",
        description = r#"
# Toko POS API

Point-of-sale and inventory backend for a single retail store.

## Authentication

Sign in with `POST /api/auth/login`. The session token is returned in an HttpOnly
`token` cookie; clients that cannot keep cookies may send it as
`Authorization: Bearer <token>` instead. Catalog and account writes require the
ADMIN role.

## Error Handling

Every failure uses the same envelope:

```json
{
  "success": false,
  "error": "Bad Request",
  "message": "Insufficient stock for Paku 5cm. Available: 4, Requested: 8",
  "requestId": "5f0c...",
  "timestamp": "2024-06-01T09:30:00Z"
}
```

## Pagination

Transaction and stock history listings accept `page` (default 1) and `limit`
and return a `pagination` block next to `data`.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development")
    ),
    tags(
        (name = "auth", description = "Sign-in and session endpoints"),
        (name = "users", description = "Staff account administration"),
        (name = "categories", description = "Product categories"),
        (name = "products", description = "Catalog and stock alerts"),
        (name = "transactions", description = "Checkout and sales history"),
        (name = "inventory", description = "Stock adjustments and ledger"),
        (name = "reports", description = "Sales and inventory reports")
    ),
    paths(
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::me,
        handlers::users::list_users,
        handlers::users::get_user,
        handlers::users::create_user,
        handlers::users::update_user,
        handlers::users::delete_user,
        handlers::categories::list_categories,
        handlers::categories::get_category,
        handlers::categories::create_category,
        handlers::categories::update_category,
        handlers::categories::delete_category,
        handlers::products::list_products,
        handlers::products::get_product,
        handlers::products::low_stock,
        handlers::products::slow_moving,
        handlers::products::create_product,
        handlers::products::update_product,
        handlers::products::delete_product,
        handlers::transactions::create_transaction,
        handlers::transactions::list_transactions,
        handlers::transactions::get_transaction,
        handlers::inventory::adjust_stock,
        handlers::inventory::stock_history,
        handlers::reports::sales_report,
        handlers::reports::inventory_report,
    ),
    components(
        schemas(
            // Request bodies
            handlers::auth::LoginRequest,
            handlers::users::CreateUserRequest,
            handlers::users::UpdateUserRequest,
            handlers::categories::CreateCategoryRequest,
            handlers::categories::UpdateCategoryRequest,
            handlers::products::CreateProductRequest,
            handlers::products::UpdateProductRequest,
            handlers::transactions::CartLineRequest,
            handlers::transactions::CreateTransactionRequest,
            handlers::inventory::AdjustStockRequest,

            // Read models
            crate::dto::UserProfile,
            crate::dto::ProductSummary,
            crate::dto::UserSummary,
            crate::dto::CategorySummary,
            services::sales::SaleView,
            services::sales::SaleItemView,
            services::sales::SaleListEntry,
            services::inventory::MovementView,
            services::inventory::AdjustmentResult,
            services::reports::SalesReport,
            services::reports::InventoryReport,

            // Error types
            crate::errors::ErrorResponse,
        )
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
