use crate::{
    errors::ServiceError,
    handlers::common::{success_response, AppQuery},
    services::{
        period::parse_optional_day,
        reports::{InventoryReport, SalesReport},
    },
    AppState,
};
use axum::{extract::State, response::Response};
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct SalesReportQuery {
    /// First local day, inclusive (YYYY-MM-DD)
    pub start_date: Option<String>,
    /// Last local day, inclusive (YYYY-MM-DD)
    pub end_date: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/reports/sales",
    params(SalesReportQuery),
    responses(
        (status = 200, description = "Sales totals for the period", body = SalesReport),
        (status = 400, description = "Missing or malformed dates", body = crate::errors::ErrorResponse)
    ),
    tag = "reports"
)]
pub async fn sales_report(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<SalesReportQuery>,
) -> Result<Response, ServiceError> {
    let start = parse_optional_day("startDate", query.start_date.as_deref())?;
    let end = parse_optional_day("endDate", query.end_date.as_deref())?;
    let (Some(start), Some(end)) = (start, end) else {
        return Err(ServiceError::ValidationError(
            "startDate and endDate are required".to_string(),
        ));
    };

    let report = state.services.reports.sales_report(start, end).await?;
    Ok(success_response(report))
}

#[utoipa::path(
    get,
    path = "/api/reports/inventory",
    responses(
        (status = 200, description = "Stock valuation", body = InventoryReport)
    ),
    tag = "reports"
)]
pub async fn inventory_report(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let report = state.services.reports.inventory_report().await?;
    Ok(success_response(report))
}
