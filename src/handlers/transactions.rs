use crate::{
    auth::AuthUser,
    entities::PaymentMethod,
    errors::ServiceError,
    handlers::common::{
        created_response, paginated_response, parse_paging, success_response, AppJson, AppQuery,
        IdPath,
    },
    services::{
        period::parse_optional_day,
        sales::{CartLine, NewSale, SaleFilter, SaleListEntry, SaleView},
    },
    AppState,
};
use axum::{extract::State, response::Response};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartLineRequest {
    pub product_id: i32,
    pub qty: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransactionRequest {
    #[serde(default)]
    pub items: Vec<CartLineRequest>,
    /// CASH or TRANSFER
    pub payment_method: Option<String>,
}

impl From<CreateTransactionRequest> for NewSale {
    fn from(req: CreateTransactionRequest) -> Self {
        NewSale {
            items: req
                .items
                .into_iter()
                .map(|line| CartLine {
                    product_id: line.product_id,
                    qty: line.qty,
                })
                .collect(),
            payment_method: req.payment_method,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct TransactionListQuery {
    /// First local day, inclusive (YYYY-MM-DD)
    pub start_date: Option<String>,
    /// Last local day, inclusive (YYYY-MM-DD)
    pub end_date: Option<String>,
    pub payment_method: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl TryFrom<TransactionListQuery> for SaleFilter {
    type Error = ServiceError;

    fn try_from(query: TransactionListQuery) -> Result<Self, Self::Error> {
        let payment_method = match query.payment_method.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.to_ascii_uppercase().parse::<PaymentMethod>().map_err(
                |_| ServiceError::ValidationError("paymentMethod must be CASH or TRANSFER".into()),
            )?),
        };
        let (page, limit) = parse_paging(query.page.as_deref(), query.limit.as_deref())?;

        Ok(SaleFilter {
            start_date: parse_optional_day("startDate", query.start_date.as_deref())?,
            end_date: parse_optional_day("endDate", query.end_date.as_deref())?,
            payment_method,
            page,
            limit,
        })
    }
}

/// Record a sale: prices the cart, decrements stock and writes the ledger atomically
#[utoipa::path(
    post,
    path = "/api/transactions",
    request_body = CreateTransactionRequest,
    responses(
        (status = 201, description = "Sale recorded", body = SaleView),
        (status = 400, description = "Invalid cart or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown product", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent invoice numbering conflict", body = crate::errors::ErrorResponse)
    ),
    tag = "transactions"
)]
pub async fn create_transaction(
    State(state): State<AppState>,
    cashier: AuthUser,
    AppJson(payload): AppJson<CreateTransactionRequest>,
) -> Result<Response, ServiceError> {
    let sale = state
        .services
        .sales
        .create_sale(&cashier, NewSale::from(payload))
        .await?;
    Ok(created_response(sale, "Transaction completed successfully"))
}

#[utoipa::path(
    get,
    path = "/api/transactions",
    params(TransactionListQuery),
    responses(
        (status = 200, description = "Sales, newest first", body = [SaleListEntry]),
        (status = 400, description = "Malformed filter", body = crate::errors::ErrorResponse)
    ),
    tag = "transactions"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<TransactionListQuery>,
) -> Result<Response, ServiceError> {
    let filter = SaleFilter::try_from(query)?;
    let page = state.services.sales.list_sales(filter).await?;
    Ok(paginated_response(page))
}

#[utoipa::path(
    get,
    path = "/api/transactions/{id}",
    params(("id" = i32, Path, description = "Transaction ID")),
    responses(
        (status = 200, description = "Sale with items and cashier", body = SaleView),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "transactions"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<Response, ServiceError> {
    let sale = state.services.sales.get_sale(id).await?;
    Ok(success_response(sale))
}
