use super::auth::PasswordHasher;
use super::identity::Identity;
use super::permissions::UserRole;
use crate::catalog::PageLimits;
use crate::entity_store::{
    EntityKind, EntityStore, FieldDelta, Query, SortOrder, StoreError, TypedEntityStore, User,
};
use crate::error::{ServiceError, ServiceResult};
use crate::favorites::FavoritesService;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

pub const MIN_PASSWORD_LENGTH: usize = 8;

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

/// A user as shown to other users. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub role: UserRole,
    pub favorite_count: usize,
    pub created_at: i64,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        UserSummary {
            id: user.id,
            email: user.email,
            role: user.role,
            favorite_count: user.favorite_ids.len(),
            created_at: user.created_at,
        }
    }
}

#[derive(Clone)]
pub struct UserManager {
    store: Arc<dyn EntityStore>,
    favorites: FavoritesService,
    hasher: PasswordHasher,
    limits: PageLimits,
}

fn normalize_email(email: &str) -> ServiceResult<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(ServiceError::InvalidInput("Email is required".to_string()));
    }
    if !EMAIL_REGEX.is_match(&email) {
        return Err(ServiceError::InvalidInput(format!(
            "'{}' is not a valid email address",
            email
        )));
    }
    Ok(email)
}

fn internal(err: anyhow::Error) -> ServiceError {
    ServiceError::Internal(err.to_string())
}

impl UserManager {
    pub fn new(
        store: Arc<dyn EntityStore>,
        favorites: FavoritesService,
        limits: PageLimits,
    ) -> Self {
        UserManager {
            store,
            favorites,
            hasher: PasswordHasher::default(),
            limits,
        }
    }

    /// Creates a user with any role, admin included. Operator bootstrap path.
    pub fn create_user(&self, email: &str, password: &str, role: UserRole) -> ServiceResult<String> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(ServiceError::InvalidInput(
                "Password is required".to_string(),
            ));
        }

        let user = User {
            id: String::new(),
            email: email.clone(),
            password_hash: self.hasher.hash(password).map_err(internal)?,
            role,
            favorite_ids: BTreeSet::new(),
            created_at: chrono::Utc::now().timestamp(),
        };
        let stored = match self.store.insert_record(&user) {
            Ok(stored) => stored,
            Err(StoreError::UniqueViolation { .. }) => {
                return Err(ServiceError::DuplicateEmail(email));
            }
            Err(e) => return Err(e.into()),
        };

        info!("Created {} user {} ({})", role, stored.id, email);
        Ok(stored.id)
    }

    /// Adds an editor or viewer. Admins cannot be created this way.
    pub fn add_user(&self, email: &str, password: &str, role: &str) -> ServiceResult<String> {
        let role = UserRole::from_str(role)
            .ok_or_else(|| ServiceError::InvalidInput(format!("Invalid role '{}'", role)))?;
        if role == UserRole::Admin {
            return Err(ServiceError::Forbidden(
                "Admin users cannot be added".to_string(),
            ));
        }
        self.create_user(email, password, role)
    }

    pub fn get_user(&self, user_id: &str) -> ServiceResult<UserSummary> {
        self.store
            .get_record::<User>(user_id)?
            .map(UserSummary::from)
            .ok_or_else(|| ServiceError::not_found(EntityKind::User, user_id))
    }

    pub fn find_by_email(&self, email: &str) -> ServiceResult<Option<UserSummary>> {
        Ok(self.user_by_email(email)?.map(UserSummary::from))
    }

    /// Newest first.
    pub fn list_users(
        &self,
        role: Option<UserRole>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> ServiceResult<Vec<UserSummary>> {
        let (limit, offset) = self.limits.clamp(limit, offset);
        let mut query = Query::new()
            .sorted(SortOrder::NewestFirst)
            .page(limit, offset);
        if let Some(role) = role {
            query = query.eq("role", role.as_str());
        }
        let users: Vec<User> = self.store.find_records(&query)?;
        Ok(users.into_iter().map(UserSummary::from).collect())
    }

    /// Deletes a non-admin user together with all of their favorites and
    /// returns the user's email.
    pub fn delete_user(&self, user_id: &str) -> ServiceResult<String> {
        let user = self
            .store
            .get_record::<User>(user_id)?
            .ok_or_else(|| ServiceError::not_found(EntityKind::User, user_id))?;
        if user.role == UserRole::Admin {
            return Err(ServiceError::Forbidden(
                "Admin users cannot be deleted".to_string(),
            ));
        }

        let removed = self.favorites.remove_all_for_user(user_id)?;
        if !self.store.delete(EntityKind::User, user_id)? {
            return Err(ServiceError::not_found(EntityKind::User, user_id));
        }
        info!(
            "Deleted user {} ({}) and {} favorite(s)",
            user_id, user.email, removed
        );
        Ok(user.email)
    }

    pub fn update_password(
        &self,
        identity: &Identity,
        old_password: &str,
        new_password: &str,
    ) -> ServiceResult<()> {
        if old_password.is_empty() || new_password.is_empty() {
            return Err(ServiceError::InvalidInput(
                "Both old and new passwords are required".to_string(),
            ));
        }
        if new_password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ServiceError::InvalidInput(format!(
                "New password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let user = self
            .store
            .get_record::<User>(&identity.user_id)?
            .ok_or_else(|| ServiceError::not_found(EntityKind::User, &identity.user_id))?;
        if !self
            .hasher
            .verify(old_password, &user.password_hash)
            .map_err(internal)?
        {
            warn!("Wrong old password for user {}", user.id);
            return Err(ServiceError::InvalidCredentials);
        }
        if old_password == new_password {
            return Err(ServiceError::InvalidInput(
                "New password must differ from the old one".to_string(),
            ));
        }

        let hash = self.hasher.hash(new_password).map_err(internal)?;
        self.store.patch(
            EntityKind::User,
            &user.id,
            &[FieldDelta::Set("password_hash".to_string(), Value::from(hash))],
        )?;
        info!("Password updated for user {}", user.id);
        Ok(())
    }

    /// Whether the email belongs to a user whose password matches.
    pub fn check_password(&self, email: &str, password: &str) -> ServiceResult<bool> {
        match self.user_by_email(email)? {
            Some(user) => self
                .hasher
                .verify(password, &user.password_hash)
                .map_err(internal),
            None => Ok(false),
        }
    }

    fn user_by_email(&self, email: &str) -> ServiceResult<Option<User>> {
        let email = email.trim().to_lowercase();
        let users: Vec<User> = self
            .store
            .find_records(&Query::new().eq("email", email).page(1, 0))?;
        Ok(users.into_iter().next())
    }
}
