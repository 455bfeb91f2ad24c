use crate::{
    auth::AuthUser,
    entities::MovementType,
    errors::ServiceError,
    handlers::common::{
        created_response, paginated_response, parse_optional_id, parse_paging, AppJson, AppQuery,
    },
    services::{
        inventory::{AdjustmentResult, MovementFilter, MovementView, StockAdjustment},
        period::parse_optional_day,
    },
    AppState,
};
use axum::{extract::State, response::Response};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdjustStockRequest {
    pub product_id: Option<i32>,
    /// IN, OUT or ADJUST
    #[serde(rename = "type")]
    pub movement_type: Option<String>,
    pub qty: Option<i32>,
    pub notes: Option<String>,
}

impl TryFrom<AdjustStockRequest> for StockAdjustment {
    type Error = ServiceError;

    fn try_from(req: AdjustStockRequest) -> Result<Self, Self::Error> {
        match (req.product_id, req.movement_type, req.qty) {
            (Some(product_id), Some(movement_type), Some(qty)) => Ok(StockAdjustment {
                product_id,
                movement_type,
                qty,
                notes: req.notes,
            }),
            _ => Err(ServiceError::ValidationError(
                "productId, type, and qty are required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    pub product_id: Option<String>,
    /// IN, OUT or ADJUST
    #[serde(rename = "type")]
    pub movement_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl TryFrom<HistoryQuery> for MovementFilter {
    type Error = ServiceError;

    fn try_from(query: HistoryQuery) -> Result<Self, Self::Error> {
        let movement_type = match query.movement_type.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.to_ascii_uppercase().parse::<MovementType>().map_err(
                |_| ServiceError::ValidationError("type must be IN, OUT, or ADJUST".into()),
            )?),
        };
        let (page, limit) = parse_paging(query.page.as_deref(), query.limit.as_deref())?;

        Ok(MovementFilter {
            product_id: parse_optional_id("productId", query.product_id.as_deref())?,
            movement_type,
            start_date: parse_optional_day("startDate", query.start_date.as_deref())?,
            end_date: parse_optional_day("endDate", query.end_date.as_deref())?,
            page,
            limit,
        })
    }
}

/// Manual stock correction (ADMIN)
#[utoipa::path(
    post,
    path = "/api/inventory/adjust",
    request_body = AdjustStockRequest,
    responses(
        (status = 201, description = "Stock adjusted", body = AdjustmentResult),
        (status = 400, description = "Bad type or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<AdjustStockRequest>,
) -> Result<Response, ServiceError> {
    let request = StockAdjustment::try_from(payload)?;
    let result = state.services.inventory.adjust_stock(&user, request).await?;
    Ok(created_response(result, "Stock adjusted successfully"))
}

#[utoipa::path(
    get,
    path = "/api/inventory/history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Ledger entries, newest first", body = [MovementView]),
        (status = 400, description = "Malformed filter", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn stock_history(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<HistoryQuery>,
) -> Result<Response, ServiceError> {
    let filter = MovementFilter::try_from(query)?;
    let page = state.services.inventory.history(filter).await?;
    Ok(paginated_response(page))
}
