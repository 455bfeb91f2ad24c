use crate::{
    dto::UserProfile,
    entities::Role,
    errors::ServiceError,
    handlers::common::{
        created_response, message_response, success_response, validate_input, AppJson, IdPath,
    },
    services::users::{NewUser, UserUpdate},
    AppState,
};
use axum::{extract::State, response::Response};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Email, password, and name are required"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Email, password, and name are required"))]
    pub password: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Email, password, and name are required"))]
    pub name: String,
    /// Defaults to CASHIER
    pub role: Option<Role>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "Live accounts, newest first", body = [UserProfile]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    tag = "users"
)]
pub async fn list_users(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let users = state.services.users.list().await?;
    Ok(success_response(users))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "User returned", body = UserProfile),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<Response, ServiceError> {
    let user = state.services.users.get(id).await?;
    Ok(success_response(user))
}

#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserProfile),
        (status = 400, description = "Invalid request or duplicate email", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateUserRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let user = state
        .services
        .users
        .create(NewUser {
            email: payload.email,
            password: payload.password,
            name: payload.name,
            role: payload.role,
        })
        .await?;
    Ok(created_response(user, "User created successfully"))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = i32, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserProfile),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "users"
)]
pub async fn update_user(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    AppJson(payload): AppJson<UpdateUserRequest>,
) -> Result<Response, ServiceError> {
    let user = state
        .services
        .users
        .update(
            id,
            UserUpdate {
                email: payload.email,
                password: payload.password,
                name: payload.name,
                role: payload.role,
                is_active: payload.is_active,
            },
        )
        .await?;
    Ok(message_response(user, "User updated successfully"))
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "User soft-deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "users"
)]
pub async fn delete_user(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<Response, ServiceError> {
    state.services.users.delete(id).await?;
    Ok(message_response((), "User deleted successfully"))
}
