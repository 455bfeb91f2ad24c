use crate::{
    auth::{cookie_header, AuthUser},
    dto::UserProfile,
    errors::ServiceError,
    handlers::common::{success_response, validate_input, AppJson},
    AppState,
};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email and password are required"))]
    #[serde(default)]
    pub email: String,
    #[validate(length(min = 1, message = "Email and password are required"))]
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub user: UserProfile,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogoutResponse {
    pub success: bool,
    pub message: String,
}

/// Sign in and receive the session cookie
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in; session cookie set", body = LoginResponse),
        (status = 400, description = "Missing credentials", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid email or password", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Response, ServiceError> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(ServiceError::ValidationError(
            "Email and password are required".to_string(),
        ));
    }
    validate_input(&payload)?;

    let account = state
        .auth
        .authenticate(&payload.email, &payload.password)
        .await?;
    let token = state.auth.generate_token(&account)?;
    let cookie = cookie_header(&state.auth.session_cookie(&token))?;

    info!(user_id = account.id, role = %account.role, "user signed in");

    let body = LoginResponse {
        success: true,
        message: "Login successful".to_string(),
        user: UserProfile::from(account),
    };
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

/// Clear the session cookie
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Session cookie cleared", body = LogoutResponse)
    ),
    tag = "auth"
)]
pub async fn logout(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let cookie = cookie_header(&state.auth.clear_session_cookie())?;
    let body = LogoutResponse {
        success: true,
        message: "Logout successful".to_string(),
    };
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

/// Profile of the signed-in user
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserProfile),
        (status = 401, description = "Not signed in", body = crate::errors::ErrorResponse),
        (status = 404, description = "User no longer exists", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Response, ServiceError> {
    let profile = state.services.users.get(user.user_id).await?;
    Ok(success_response(profile))
}
