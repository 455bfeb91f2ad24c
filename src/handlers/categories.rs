use crate::{
    entities::category,
    errors::ServiceError,
    handlers::common::{created_response, message_response, success_response, AppJson, IdPath},
    services::categories::{CategoryDetail, CategoryUpdate, CategoryWithCount, NewCategory},
    AppState,
};
use axum::{extract::State, response::Response};
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryRequest {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/categories",
    responses(
        (status = 200, description = "Categories by name with live product counts", body = [CategoryWithCount]),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "categories"
)]
pub async fn list_categories(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let categories = state.services.categories.list().await?;
    Ok(success_response(categories))
}

#[utoipa::path(
    get,
    path = "/api/categories/{id}",
    params(("id" = i32, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category with its active products", body = CategoryDetail),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "categories"
)]
pub async fn get_category(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<Response, ServiceError> {
    let category = state.services.categories.get(id).await?;
    Ok(success_response(category))
}

#[utoipa::path(
    post,
    path = "/api/categories",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Category created", body = category::Model),
        (status = 400, description = "Name missing", body = crate::errors::ErrorResponse),
        (status = 409, description = "Name already used", body = crate::errors::ErrorResponse)
    ),
    tag = "categories"
)]
pub async fn create_category(
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateCategoryRequest>,
) -> Result<Response, ServiceError> {
    let category = state
        .services
        .categories
        .create(NewCategory {
            name: payload.name,
            description: payload.description,
        })
        .await?;
    Ok(created_response(category, "Category created successfully"))
}

#[utoipa::path(
    put,
    path = "/api/categories/{id}",
    params(("id" = i32, Path, description = "Category ID")),
    request_body = UpdateCategoryRequest,
    responses(
        (status = 200, description = "Category updated", body = category::Model),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Name already used", body = crate::errors::ErrorResponse)
    ),
    tag = "categories"
)]
pub async fn update_category(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    AppJson(payload): AppJson<UpdateCategoryRequest>,
) -> Result<Response, ServiceError> {
    let category = state
        .services
        .categories
        .update(
            id,
            CategoryUpdate {
                name: payload.name,
                description: payload.description,
            },
        )
        .await?;
    Ok(message_response(category, "Category updated successfully"))
}

#[utoipa::path(
    delete,
    path = "/api/categories/{id}",
    params(("id" = i32, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category soft-deleted"),
        (status = 400, description = "Live products still reference it", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "categories"
)]
pub async fn delete_category(
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> Result<Response, ServiceError> {
    state.services.categories.delete(id).await?;
    Ok(message_response((), "Category deleted successfully"))
}
