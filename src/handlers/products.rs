use crate::{
    entities::product,
    errors::ServiceError,
    handlers::common::{
        created_response, message_response, parse_optional_bool, parse_optional_id,
        success_response, AppJson, AppQuery, IdPath,
    },
    services::products::{
        LowStockEntry, NewProduct, ProductFilter, ProductUpdate, ProductWithCategory,
        SlowMovingEntry, DEFAULT_SLOW_MOVING_DAYS, DEFAULT_SLOW_MOVING_THRESHOLD,
    },
    auth::AuthUser,
    AppState,
};
use axum::{extract::State, response::Response};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ProductListQuery {
    /// Substring of name or SKU
    pub search: Option<String>,
    pub category_id: Option<String>,
    pub is_active: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct SlowMovingQuery {
    /// Lookback window in days (default 30)
    pub days: Option<i64>,
    /// Units sold below which a product counts as slow (default 5)
    pub threshold: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub category_id: Option<i32>,
    #[schema(value_type = Option<f64>)]
    pub buy_price: Option<Decimal>,
    #[schema(value_type = Option<f64>)]
    pub sell_price: Option<Decimal>,
    pub stock: Option<i32>,
    pub unit: Option<String>,
    pub min_stock: Option<i32>,
}

impl TryFrom<CreateProductRequest> for NewProduct {
    type Error = ServiceError;

    fn try_from(req: CreateProductRequest) -> Result<Self, Self::Error> {
        match (req.sku, req.name, req.category_id, req.buy_price, req.sell_price) {
            (Some(sku), Some(name), Some(category_id), Some(buy_price), Some(sell_price)) => {
                Ok(NewProduct {
                    sku,
                    name,
                    category_id,
                    buy_price,
                    sell_price,
                    stock: req.stock,
                    unit: req.unit,
                    min_stock: req.min_stock,
                })
            }
            _ => Err(ServiceError::ValidationError(
                "SKU, name, category, buy price, and sell price are required".to_string(),
            )),
        }
    }
}

/// Stock is not accepted here; use the inventory adjustment endpoint
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub category_id: Option<i32>,
    #[schema(value_type = Option<f64>)]
    pub buy_price: Option<Decimal>,
    #[schema(value_type = Option<f64>)]
    pub sell_price: Option<Decimal>,
    pub unit: Option<String>,
    pub min_stock: Option<i32>,
    pub is_active: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/api/products",
    params(ProductListQuery),
    responses(
        (status = 200, description = "Live products by name", body = [ProductWithCategory]),
        (status = 400, description = "Malformed filter", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ProductListQuery>,
) -> Result<Response, ServiceError> {
    let filter = ProductFilter {
        search: query.search,
        category_id: parse_optional_id("categoryId", query.category_id.as_deref())?,
        is_active: parse_optional_bool("isActive", query.is_active.as_deref())?,
    };
    let products = state.services.products.list(filter).await?;
    Ok(success_response(products))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(("id" = i32, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product with its category", body = ProductWithCategory),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<Response, ServiceError> {
    let product = state.services.products.get(id).await?;
    Ok(success_response(product))
}

#[utoipa::path(
    get,
    path = "/api/products/low-stock",
    responses(
        (status = 200, description = "Active products below their minimum stock", body = [LowStockEntry])
    ),
    tag = "products"
)]
pub async fn low_stock(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let products = state.services.products.low_stock().await?;
    Ok(success_response(products))
}

#[utoipa::path(
    get,
    path = "/api/products/slow-moving",
    params(SlowMovingQuery),
    responses(
        (status = 200, description = "Products that sold below the threshold", body = [SlowMovingEntry]),
        (status = 400, description = "Non-positive window or threshold", body = crate::errors::ErrorResponse)
    ),
    tag = "products"
)]
pub async fn slow_moving(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<SlowMovingQuery>,
) -> Result<Response, ServiceError> {
    let products = state
        .services
        .products
        .slow_moving(
            query.days.unwrap_or(DEFAULT_SLOW_MOVING_DAYS),
            query.threshold.unwrap_or(DEFAULT_SLOW_MOVING_THRESHOLD),
        )
        .await?;
    Ok(success_response(products))
}

#[utoipa::path(
    post,
    path = "/api/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ProductWithCategory),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 409, description = "SKU already used", body = crate::errors::ErrorResponse)
    ),
    tag = "products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<CreateProductRequest>,
) -> Result<Response, ServiceError> {
    let input = NewProduct::try_from(payload)?;
    let product = state.services.products.create(&user, input).await?;
    Ok(created_response(product, "Product created successfully"))
}

#[utoipa::path(
    put,
    path = "/api/products/{id}",
    params(("id" = i32, Path, description = "Product ID")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated", body = ProductWithCategory),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "SKU already used", body = crate::errors::ErrorResponse)
    ),
    tag = "products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    AppJson(payload): AppJson<UpdateProductRequest>,
) -> Result<Response, ServiceError> {
    let product = state
        .services
        .products
        .update(
            id,
            ProductUpdate {
                sku: payload.sku,
                name: payload.name,
                category_id: payload.category_id,
                buy_price: payload.buy_price,
                sell_price: payload.sell_price,
                unit: payload.unit,
                min_stock: payload.min_stock,
                is_active: payload.is_active,
            },
        )
        .await?;
    Ok(message_response(product, "Product updated successfully"))
}

#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    params(("id" = i32, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product soft-deleted", body = product::Model),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<Response, ServiceError> {
    let product = state.services.products.delete(id).await?;
    Ok(message_response(product, "Product deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[test]
    fn create_request_requires_prices_and_category() {
        let req = CreateProductRequest {
            sku: Some("SMN-001".into()),
            name: Some("Semen Gresik 50kg".into()),
            category_id: Some(1),
            buy_price: Some(dec!(65000)),
            sell_price: None,
            stock: None,
            unit: None,
            min_stock: None,
        };
        assert_matches!(NewProduct::try_from(req), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn create_request_maps_optional_fields() {
        let req: CreateProductRequest = serde_json::from_str(
            r#"{"sku":"SMN-001","name":"Semen Gresik 50kg","categoryId":1,
                "buyPrice":65000,"sellPrice":75000,"stock":10,"unit":"sak"}"#,
        )
        .unwrap();
        let input = NewProduct::try_from(req).unwrap();
        assert_eq!(input.sell_price, dec!(75000));
        assert_eq!(input.stock, Some(10));
        assert_eq!(input.min_stock, None);
    }
}
