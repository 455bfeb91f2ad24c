use crate::{
    db::{self, DbPool},
    entities::{category, product},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

#[derive(Debug, Clone, Default)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryWithCount {
    #[serde(flatten)]
    pub category: category::Model,
    /// Live (non-deleted) products in this category
    pub product_count: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDetail {
    #[serde(flatten)]
    pub category: category::Model,
    pub product_count: i64,
    /// Active products only
    pub products: Vec<product::Model>,
}

fn conflict_on_duplicate(err: ServiceError, name: &str) -> ServiceError {
    if err.is_unique_violation() {
        ServiceError::Conflict(format!("Category '{name}' already exists"))
    } else {
        err
    }
}

#[derive(Debug, Clone)]
pub struct CategoryService {
    db: Arc<DbPool>,
}

impl CategoryService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    async fn find_live(&self, id: i32) -> Result<category::Model, ServiceError> {
        find_live_in(&*self.db, id).await
    }

    async fn live_product_count(&self, id: i32) -> Result<u64, ServiceError> {
        live_product_count_in(&*self.db, id).await
    }

    /// Non-deleted categories by name with their live product counts
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<CategoryWithCount>, ServiceError> {
        let db = &*self.db;
        let categories = category::Entity::find()
            .filter(category::Column::DeletedAt.is_null())
            .order_by_asc(category::Column::Name)
            .all(db)
            .await?;

        let counts: HashMap<i32, i64> = product::Entity::find()
            .select_only()
            .column(product::Column::CategoryId)
            .column_as(
                Expr::col((product::Entity, product::Column::Id)).count(),
                "product_count",
            )
            .filter(product::Column::DeletedAt.is_null())
            .group_by(product::Column::CategoryId)
            .into_tuple::<(i32, i64)>()
            .all(db)
            .await?
            .into_iter()
            .collect();

        Ok(categories
            .into_iter()
            .map(|category| CategoryWithCount {
                product_count: counts.get(&category.id).copied().unwrap_or(0),
                category,
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: i32) -> Result<CategoryDetail, ServiceError> {
        let category = self.find_live(id).await?;
        let product_count = self.live_product_count(id).await? as i64;
        let products = product::Entity::find()
            .filter(product::Column::CategoryId.eq(id))
            .filter(product::Column::DeletedAt.is_null())
            .filter(product::Column::IsActive.eq(true))
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await?;

        Ok(CategoryDetail {
            category,
            product_count,
            products,
        })
    }

    #[instrument(skip(self))]
    pub async fn create(&self, input: NewCategory) -> Result<category::Model, ServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::ValidationError(
                "Category name is required".to_string(),
            ));
        }

        let created = category::ActiveModel {
            name: Set(name.clone()),
            description: Set(input.description),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| conflict_on_duplicate(e.into(), &name))?;

        info!(category_id = created.id, name = %created.name, "category created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn update(
        &self,
        id: i32,
        input: CategoryUpdate,
    ) -> Result<category::Model, ServiceError> {
        let existing = self.find_live(id).await?;
        let mut active: category::ActiveModel = existing.into();

        let mut new_name = None;
        if let Some(name) = input.name.map(|n| n.trim().to_string()) {
            if name.is_empty() {
                return Err(ServiceError::ValidationError(
                    "Category name cannot be empty".to_string(),
                ));
            }
            active.name = Set(name.clone());
            new_name = Some(name);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }

        let updated = active.update(&*self.db).await.map_err(|e| {
            conflict_on_duplicate(e.into(), new_name.as_deref().unwrap_or_default())
        })?;

        info!(category_id = updated.id, "category updated");
        Ok(updated)
    }

    /// Soft delete; refused while live products still reference the category.
    /// The product check and the write run in one transaction.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<(), ServiceError> {
        self.db
            .transaction::<_, (), ServiceError>(move |txn| {
                Box::pin(async move {
                    db::claim_write_lock(txn).await?;
                    let existing = find_live_in(txn, id).await?;

                    let live_products = live_product_count_in(txn, id).await?;
                    if live_products > 0 {
                        warn!(category_id = id, live_products, "category delete refused");
                        return Err(ServiceError::ValidationError(format!(
                            "Cannot delete category. It has {live_products} active product(s) associated."
                        )));
                    }

                    let mut active: category::ActiveModel = existing.into();
                    active.deleted_at = Set(Some(Utc::now()));
                    active.update(txn).await?;
                    Ok(())
                })
            })
            .await?;

        info!(category_id = id, "category soft-deleted");
        Ok(())
    }
}

async fn find_live_in<C: ConnectionTrait>(conn: &C, id: i32) -> Result<category::Model, ServiceError> {
    category::Entity::find_by_id(id)
        .filter(category::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Category not found".to_string()))
}

async fn live_product_count_in<C: ConnectionTrait>(conn: &C, id: i32) -> Result<u64, ServiceError> {
    Ok(product::Entity::find()
        .filter(product::Column::CategoryId.eq(id))
        .filter(product::Column::DeletedAt.is_null())
        .count(conn)
        .await?)
}
