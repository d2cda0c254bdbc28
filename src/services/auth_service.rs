//! Domain service for authentication and credential lifecycle.
//!
//! Handles login, session verification, password reset and account setup,
//! plus the administrative user operations that sit behind the
//! authorization evaluator.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::db::User;
use crate::domain::{Identity, UserId};

/// Errors specific to authentication operations.
///
/// The `Display` text of the first five variants is what callers see, so it
/// stays generic. Everything else is mapped to an opaque message at the edge.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown user, wrong password, locked, pending setup or deactivated.
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Unauthorized")]
    Unauthenticated,

    /// Unknown, expired or already used action token.
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("Forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

/// User info DTO for responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub requires_password_setup: bool,
    pub created_at: String,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            is_admin: user.is_admin,
            requires_password_setup: user.requires_password_setup,
            created_at: user.created_at,
        }
    }
}

/// Login result containing the bearer token and the account it was issued to.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserInfo,
}

/// Account creation request.
///
/// Without a `password` the account is created pending setup and an invite
/// is sent to `email`.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: Option<String>,
    pub is_admin: bool,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Verifies credentials and issues a session token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] for every kind of refusal,
    /// so callers cannot tell which check failed.
    async fn login(&self, username: &str, password: &str) -> Result<LoginResult, AuthError>;

    /// Resolves a bearer token to the identity it was issued for.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] for any invalid token.
    async fn authenticate(&self, bearer: &str) -> Result<Identity, AuthError>;

    /// Starts the forgot-password flow. Succeeds whether or not the address
    /// belongs to an account.
    async fn request_password_reset(&self, email: &str) -> Result<(), AuthError>;

    /// Spends a reset token and sets a new password.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidOrExpiredToken`] if the token is unknown,
    /// expired or already used, and [`AuthError::Validation`] for a weak
    /// password.
    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError>;

    /// Spends a setup token and sets the first password of an invited account.
    async fn complete_setup(&self, token: &str, new_password: &str) -> Result<(), AuthError>;

    async fn current_user(&self, identity: &Identity) -> Result<UserInfo, AuthError>;

    /// Changes the caller's own password.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] if `current_password` is wrong.
    async fn change_password(
        &self,
        identity: &Identity,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError>;

    async fn create_user(&self, actor: &Identity, user: NewUser) -> Result<UserInfo, AuthError>;

    /// Re-sends the setup invite of an account that has not completed setup.
    async fn invite_user(&self, actor: &Identity, user_id: UserId) -> Result<(), AuthError>;

    async fn admin_set_password(
        &self,
        actor: &Identity,
        user_id: UserId,
        new_password: &str,
    ) -> Result<(), AuthError>;

    async fn set_site_admin(
        &self,
        actor: &Identity,
        user_id: UserId,
        is_admin: bool,
    ) -> Result<UserInfo, AuthError>;

    async fn list_users(&self, actor: &Identity) -> Result<Vec<UserInfo>, AuthError>;

    async fn deactivate_user(&self, actor: &Identity, user_id: UserId) -> Result<(), AuthError>;
}
