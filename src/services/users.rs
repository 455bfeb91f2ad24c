use crate::{
    auth::password::hash_password_blocking,
    db::DbPool,
    dto::UserProfile,
    entities::{user, Role},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use std::sync::Arc;
use tracing::{info, instrument};

pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

fn normalize_email(raw: &str) -> Result<String, ServiceError> {
    let email = raw.trim().to_lowercase();
    if !validator::validate_email(email.as_str()) {
        return Err(ServiceError::ValidationError(
            "A valid email is required".to_string(),
        ));
    }
    Ok(email)
}

fn check_password(password: &str) -> Result<(), ServiceError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ServiceError::ValidationError(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

fn check_name(name: &str) -> Result<String, ServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::ValidationError("name is required".to_string()));
    }
    Ok(name.to_string())
}

fn duplicate_email(err: ServiceError) -> ServiceError {
    if err.is_unique_violation() {
        ServiceError::ValidationError("User with this email already exists".to_string())
    } else {
        err
    }
}

/// Staff account administration
#[derive(Debug, Clone)]
pub struct UserService {
    db: Arc<DbPool>,
}

impl UserService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    async fn find_live(&self, id: i32) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(id)
            .filter(user::Column::DeletedAt.is_null())
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<UserProfile>, ServiceError> {
        let users = user::Entity::find()
            .filter(user::Column::DeletedAt.is_null())
            .order_by_desc(user::Column::CreatedAt)
            .order_by_desc(user::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(users.into_iter().map(UserProfile::from).collect())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: i32) -> Result<UserProfile, ServiceError> {
        self.find_live(id).await.map(UserProfile::from)
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create(&self, input: NewUser) -> Result<UserProfile, ServiceError> {
        let email = normalize_email(&input.email)?;
        let name = check_name(&input.name)?;
        check_password(&input.password)?;

        let password_hash = hash_password_blocking(input.password).await?;
        let created = user::ActiveModel {
            email: Set(email),
            password_hash: Set(password_hash),
            name: Set(name),
            role: Set(input.role.unwrap_or_default()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| duplicate_email(e.into()))?;

        info!(user_id = created.id, role = %created.role, "user created");
        Ok(created.into())
    }

    #[instrument(skip(self, input))]
    pub async fn update(&self, id: i32, input: UserUpdate) -> Result<UserProfile, ServiceError> {
        let existing = self.find_live(id).await?;
        let mut active: user::ActiveModel = existing.into();

        if let Some(email) = input.email {
            active.email = Set(normalize_email(&email)?);
        }
        if let Some(name) = input.name {
            active.name = Set(check_name(&name)?);
        }
        if let Some(password) = input.password {
            check_password(&password)?;
            active.password_hash = Set(hash_password_blocking(password).await?);
        }
        if let Some(role) = input.role {
            active.role = Set(role);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }

        let updated = active
            .update(&*self.db)
            .await
            .map_err(|e| duplicate_email(e.into()))?;

        info!(user_id = updated.id, "user updated");
        Ok(updated.into())
    }

    /// Soft delete; the account can no longer sign in
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<(), ServiceError> {
        let existing = self.find_live(id).await?;
        let mut active: user::ActiveModel = existing.into();
        active.deleted_at = Set(Some(Utc::now()));
        active.is_active = Set(false);
        active.update(&*self.db).await?;

        info!(user_id = id, "user soft-deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn email_is_trimmed_and_lowercased() {
        assert_eq!(
            normalize_email("  Kasir@MajuJaya.com ").unwrap(),
            "kasir@majujaya.com"
        );
        assert_matches!(
            normalize_email("not-an-email"),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(check_password("12345").is_err());
        assert!(check_password("123456").is_ok());
    }

    #[test]
    fn blank_name_is_rejected() {
        assert!(check_name("   ").is_err());
        assert_eq!(check_name(" Kasir 1 ").unwrap(), "Kasir 1");
    }
}
