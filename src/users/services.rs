use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::users::dto::{UserPayload, UserRecord};
use crate::users::store::{NewUser, UserStore};

/// Stored in place of real credentials. Password handling is a known gap
/// carried over from the original system: nothing is hashed and nothing is
/// ever verified. Do not treat accounts managed here as authenticated.
pub const PLACEHOLDER_PASSWORD: &str = "defaultPassword";

/// Errors surfaced by [`UserService`]. The first two are validation-level
/// rejections; `Store` carries storage faults through unmodified.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Duplicate(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Enforces the username/email uniqueness invariants and mediates between
/// the stored record and its public shape.
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, payload: UserPayload) -> Result<UserRecord, UserError> {
        if self.store.exists_by_username(&payload.username).await? {
            return Err(UserError::Duplicate("Username already exists".into()));
        }
        if self.store.exists_by_email(&payload.email).await? {
            return Err(UserError::Duplicate("Email already exists".into()));
        }

        let user = self
            .store
            .insert(NewUser {
                username: payload.username,
                email: payload.email,
                password: PLACEHOLDER_PASSWORD.into(),
                first_name: payload.first_name,
                last_name: payload.last_name,
                // New accounts always start active, whatever the payload says.
                active: true,
            })
            .await?;

        info!(user_id = user.id, username = %user.username, "user created");
        Ok(user.into())
    }

    pub async fn get(&self, id: i64) -> Result<UserRecord, UserError> {
        let user = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| UserError::NotFound(format!("User not found with id: {id}")))?;
        Ok(user.into())
    }

    pub async fn list(&self) -> Result<Vec<UserRecord>, UserError> {
        let users = self.store.find_all().await?;
        Ok(users.into_iter().map(UserRecord::from).collect())
    }

    pub async fn update(&self, id: i64, payload: UserPayload) -> Result<UserRecord, UserError> {
        let mut user = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| UserError::NotFound(format!("User not found with id: {id}")))?;

        // Uniqueness is only re-checked when the value actually changes, so
        // a record may always be updated to its own current username/email.
        if user.username != payload.username
            && self.store.exists_by_username(&payload.username).await?
        {
            return Err(UserError::Duplicate("Username already exists".into()));
        }
        if user.email != payload.email && self.store.exists_by_email(&payload.email).await? {
            return Err(UserError::Duplicate("Email already exists".into()));
        }

        user.username = payload.username;
        user.email = payload.email;
        user.first_name = payload.first_name;
        user.last_name = payload.last_name;
        user.active = payload.active;

        let updated = self.store.update(&user).await?;
        debug!(user_id = updated.id, "user updated");
        Ok(updated.into())
    }

    pub async fn delete(&self, id: i64) -> Result<(), UserError> {
        if !self.store.exists_by_id(id).await? {
            return Err(UserError::NotFound(format!("User not found with id: {id}")));
        }
        self.store.delete_by_id(id).await?;
        info!(user_id = id, "user deleted");
        Ok(())
    }

    pub async fn get_by_username(&self, username: &str) -> Result<UserRecord, UserError> {
        let user = self.store.find_by_username(username).await?.ok_or_else(|| {
            UserError::NotFound(format!("User not found with username: {username}"))
        })?;
        Ok(user.into())
    }
}
