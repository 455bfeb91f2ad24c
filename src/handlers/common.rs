use crate::{dto::Page, errors::ServiceError, ApiResponse, PaginationMeta};
use async_trait::async_trait;
use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use validator::Validate;

/// JSON body extractor whose rejections use the failure envelope
pub struct AppJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| AppJson(value))
            .map_err(|rejection| ServiceError::ValidationError(rejection.body_text()))
    }
}

/// Query-string extractor whose rejections use the failure envelope
pub struct AppQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| AppQuery(value))
            .map_err(|rejection| ServiceError::ValidationError(rejection.body_text()))
    }
}

/// Numeric `:id` path segment
pub struct IdPath(pub i32);

#[async_trait]
impl<S> FromRequestParts<S> for IdPath
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Path::<i32>::from_request_parts(parts, state)
            .await
            .map(|Path(id)| IdPath(id))
            .map_err(|_| ServiceError::ValidationError("id must be a positive integer".to_string()))
    }
}

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// Success response with a human-readable message
pub fn message_response<T: Serialize>(data: T, message: &str) -> Response {
    (
        StatusCode::OK,
        Json(ApiResponse::success(data).with_message(message)),
    )
        .into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T, message: &str) -> Response {
    (
        StatusCode::CREATED,
        Json(ApiResponse::success(data).with_message(message)),
    )
        .into_response()
}

/// Page of items plus pagination metadata
pub fn paginated_response<T: Serialize>(page: Page<T>) -> Response {
    let pagination = PaginationMeta::from_page(&page);
    (
        StatusCode::OK,
        Json(ApiResponse::success(page.items).with_pagination(pagination)),
    )
        .into_response()
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input.validate().map_err(ServiceError::from)
}

/// Optional numeric query parameter, treating blanks as absent
pub fn parse_optional_id(field: &str, raw: Option<&str>) -> Result<Option<i32>, ServiceError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<i32>()
            .map(Some)
            .map_err(|_| ServiceError::ValidationError(format!("{field} must be an integer"))),
    }
}

/// Optional boolean query parameter accepting `true`/`false`
pub fn parse_optional_bool(field: &str, raw: Option<&str>) -> Result<Option<bool>, ServiceError> {
    match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") => Ok(None),
        Some("true") => Ok(Some(true)),
        Some("false") => Ok(Some(false)),
        Some(_) => Err(ServiceError::ValidationError(format!(
            "{field} must be true or false"
        ))),
    }
}

/// Page/limit query values; zero or missing falls back to the service default
pub fn parse_paging(
    page: Option<&str>,
    limit: Option<&str>,
) -> Result<(u64, u64), ServiceError> {
    let parse = |field: &str, raw: Option<&str>| -> Result<u64, ServiceError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(0),
            Some(value) => value.parse::<u64>().map_err(|_| {
                ServiceError::ValidationError(format!("{field} must be a positive integer"))
            }),
        }
    };
    Ok((parse("page", page)?, parse("limit", limit)?))
}
