use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait, UpdateMany, sea_query::Expr,
};

use crate::domain::UserId;
use crate::entities::users;
use crate::services::action_token::ActionTokenKind;
use crate::services::lockout::{LockoutPolicy, LockoutState};

/// User data returned from repository (without sensitive fields)
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub requires_password_setup: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: UserId::new(model.id),
            username: model.username,
            email: model.email,
            is_admin: model.is_admin,
            requires_password_setup: model.requires_password_setup,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Everything the login path needs to decide on a password attempt.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: User,
    pub password_hash: String,
    pub lockout: LockoutState,
}

impl From<users::Model> for Credentials {
    fn from(model: users::Model) -> Self {
        let password_hash = model.password_hash.clone();
        let lockout = LockoutState {
            failed_attempts: model.failed_login_attempts,
            locked_until: model.locked_until,
        };
        Self {
            user: User::from(model),
            password_hash,
            lockout,
        }
    }
}

/// An identity holding an unexpired action token of the requested kind.
#[derive(Debug, Clone)]
pub struct TokenCandidate {
    pub user: User,
    pub token_hash: String,
}

/// Row to insert for a new identity.
#[derive(Debug, Clone)]
pub struct NewUserRow {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub requires_password_setup: bool,
}

const fn token_columns(kind: ActionTokenKind) -> (users::Column, users::Column) {
    match kind {
        ActionTokenKind::Reset => (users::Column::ResetTokenHash, users::Column::ResetTokenExpiry),
        ActionTokenKind::Setup => (users::Column::SetupTokenHash, users::Column::SetupTokenExpiry),
    }
}

fn no_timestamp() -> Option<DateTime<Utc>> {
    None
}

/// Columns written by every password change: the new hash, a cleared
/// lockout, no pending setup and no outstanding action token of either kind.
fn with_password_set(update: UpdateMany<users::Entity>, password_hash: &str) -> UpdateMany<users::Entity> {
    update
        .col_expr(users::Column::PasswordHash, Expr::value(password_hash))
        .col_expr(users::Column::FailedLoginAttempts, Expr::value(0))
        .col_expr(users::Column::LockedUntil, Expr::value(no_timestamp()))
        .col_expr(users::Column::RequiresPasswordSetup, Expr::value(false))
        .col_expr(users::Column::ResetTokenHash, Expr::value(Option::<String>::None))
        .col_expr(users::Column::ResetTokenExpiry, Expr::value(no_timestamp()))
        .col_expr(users::Column::SetupTokenHash, Expr::value(Option::<String>::None))
        .col_expr(users::Column::SetupTokenExpiry, Expr::value(no_timestamp()))
        .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now().to_rfc3339()))
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Get an active (not deactivated) user by ID
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id.value())
            .filter(users::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(User::from))
    }

    /// Get an active user by username
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .filter(users::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await
            .context("Failed to query user by username")?;

        Ok(user.map(User::from))
    }

    /// Get an active user by email (expects the normalised, lower-cased form)
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .filter(users::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;

        Ok(user.map(User::from))
    }

    /// Whether a username or email is taken, including by deactivated users.
    pub async fn identity_taken(&self, username: &str, email: &str) -> Result<bool> {
        let existing = users::Entity::find()
            .filter(
                sea_orm::Condition::any()
                    .add(users::Column::Username.eq(username))
                    .add(users::Column::Email.eq(email)),
            )
            .one(&self.conn)
            .await
            .context("Failed to check for existing user")?;

        Ok(existing.is_some())
    }

    /// Credentials of an active user, for password verification
    pub async fn get_credentials_by_username(&self, username: &str) -> Result<Option<Credentials>> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .filter(users::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await
            .context("Failed to query user credentials")?;

        Ok(user.map(Credentials::from))
    }

    pub async fn get_credentials_by_id(&self, id: UserId) -> Result<Option<Credentials>> {
        let user = users::Entity::find_by_id(id.value())
            .filter(users::Column::DeletedAt.is_null())
            .one(&self.conn)
            .await
            .context("Failed to query user credentials")?;

        Ok(user.map(Credentials::from))
    }

    pub async fn list_active(&self) -> Result<Vec<User>> {
        let users = users::Entity::find()
            .filter(users::Column::DeletedAt.is_null())
            .order_by_asc(users::Column::Username)
            .all(&self.conn)
            .await
            .context("Failed to list users")?;

        Ok(users.into_iter().map(User::from).collect())
    }

    pub async fn create(&self, row: NewUserRow) -> Result<User> {
        let now = Utc::now().to_rfc3339();

        let active = users::ActiveModel {
            username: Set(row.username),
            email: Set(row.email),
            password_hash: Set(row.password_hash),
            is_admin: Set(row.is_admin),
            failed_login_attempts: Set(0),
            locked_until: Set(None),
            reset_token_hash: Set(None),
            reset_token_expiry: Set(None),
            setup_token_hash: Set(None),
            setup_token_expiry: Set(None),
            requires_password_setup: Set(row.requires_password_setup),
            deleted_at: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert user")?;

        Ok(User::from(model))
    }

    /// Count a failed password attempt and lock the account once the
    /// threshold is reached.
    ///
    /// Runs as one transaction of SQL-side updates, so concurrent attempts
    /// against the same row serialize instead of overwriting each other.
    /// A lock that has already elapsed starts the count over.
    pub async fn record_failed_login(
        &self,
        id: UserId,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<LockoutState> {
        let deadline = policy
            .lock_deadline(now)
            .ok_or_else(|| anyhow::anyhow!("Lock deadline is out of range"))?;

        let txn = self
            .conn
            .begin()
            .await
            .context("Failed to start lockout transaction")?;

        users::Entity::update_many()
            .col_expr(users::Column::FailedLoginAttempts, Expr::value(0))
            .col_expr(users::Column::LockedUntil, Expr::value(no_timestamp()))
            .filter(users::Column::Id.eq(id.value()))
            .filter(users::Column::LockedUntil.lte(now))
            .exec(&txn)
            .await
            .context("Failed to clear elapsed lock")?;

        users::Entity::update_many()
            .col_expr(
                users::Column::FailedLoginAttempts,
                Expr::col(users::Column::FailedLoginAttempts).add(1),
            )
            .filter(users::Column::Id.eq(id.value()))
            .exec(&txn)
            .await
            .context("Failed to increment failed login counter")?;

        users::Entity::update_many()
            .col_expr(users::Column::LockedUntil, Expr::value(Some(deadline)))
            .filter(users::Column::Id.eq(id.value()))
            .filter(users::Column::FailedLoginAttempts.gte(policy.threshold()))
            .filter(users::Column::LockedUntil.is_null())
            .exec(&txn)
            .await
            .context("Failed to lock account")?;

        let model = users::Entity::find_by_id(id.value())
            .one(&txn)
            .await
            .context("Failed to read lockout state")?
            .ok_or_else(|| anyhow::anyhow!("User disappeared during lockout update: {id}"))?;

        txn.commit()
            .await
            .context("Failed to commit lockout transaction")?;

        Ok(LockoutState {
            failed_attempts: model.failed_login_attempts,
            locked_until: model.locked_until,
        })
    }

    /// Clears the failure counter and any lock after a successful login.
    pub async fn reset_lockout(&self, id: UserId) -> Result<()> {
        users::Entity::update_many()
            .col_expr(users::Column::FailedLoginAttempts, Expr::value(0))
            .col_expr(users::Column::LockedUntil, Expr::value(no_timestamp()))
            .filter(users::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await
            .context("Failed to reset lockout")?;

        Ok(())
    }

    /// Set a new password hash directly (admin action or self-service change).
    /// Returns `false` when no active user has this ID.
    pub async fn set_password_hash(&self, id: UserId, password_hash: &str) -> Result<bool> {
        let result = with_password_set(users::Entity::update_many(), password_hash)
            .filter(users::Column::Id.eq(id.value()))
            .filter(users::Column::DeletedAt.is_null())
            .exec(&self.conn)
            .await
            .context("Failed to update password")?;

        Ok(result.rows_affected == 1)
    }

    /// Store a freshly issued action token, replacing any earlier one of the
    /// same kind.
    pub async fn store_action_token(
        &self,
        id: UserId,
        kind: ActionTokenKind,
        token_hash: &str,
        expiry: DateTime<Utc>,
    ) -> Result<bool> {
        let (hash_column, expiry_column) = token_columns(kind);

        let result = users::Entity::update_many()
            .col_expr(hash_column, Expr::value(token_hash))
            .col_expr(expiry_column, Expr::value(Some(expiry)))
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now().to_rfc3339()))
            .filter(users::Column::Id.eq(id.value()))
            .filter(users::Column::DeletedAt.is_null())
            .exec(&self.conn)
            .await
            .with_context(|| format!("Failed to store {kind} token"))?;

        Ok(result.rows_affected == 1)
    }

    /// Active users holding an unexpired token of `kind`. Setup candidates
    /// must still require setup.
    pub async fn action_token_candidates(
        &self,
        kind: ActionTokenKind,
        now: DateTime<Utc>,
    ) -> Result<Vec<TokenCandidate>> {
        let (hash_column, expiry_column) = token_columns(kind);

        let mut query = users::Entity::find()
            .filter(hash_column.is_not_null())
            .filter(expiry_column.gt(now))
            .filter(users::Column::DeletedAt.is_null());

        if kind == ActionTokenKind::Setup {
            query = query.filter(users::Column::RequiresPasswordSetup.eq(true));
        }

        let models = query
            .all(&self.conn)
            .await
            .with_context(|| format!("Failed to query {kind} token holders"))?;

        Ok(models
            .into_iter()
            .filter_map(|model| {
                let token_hash = match kind {
                    ActionTokenKind::Reset => model.reset_token_hash.clone(),
                    ActionTokenKind::Setup => model.setup_token_hash.clone(),
                }?;
                Some(TokenCandidate {
                    user: User::from(model),
                    token_hash,
                })
            })
            .collect())
    }

    /// Spend an action token and set the new password in one conditional
    /// update.
    ///
    /// The update only matches while the exact token hash is still stored and
    /// unexpired, so of two concurrent consumers exactly one gets `true`.
    pub async fn consume_action_token(
        &self,
        id: UserId,
        kind: ActionTokenKind,
        matched_token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let (hash_column, expiry_column) = token_columns(kind);

        let mut update = with_password_set(users::Entity::update_many(), new_password_hash)
            .filter(users::Column::Id.eq(id.value()))
            .filter(hash_column.eq(matched_token_hash))
            .filter(expiry_column.gt(now))
            .filter(users::Column::DeletedAt.is_null());

        if kind == ActionTokenKind::Setup {
            update = update.filter(users::Column::RequiresPasswordSetup.eq(true));
        }

        let result = update
            .exec(&self.conn)
            .await
            .with_context(|| format!("Failed to consume {kind} token"))?;

        Ok(result.rows_affected == 1)
    }

    pub async fn set_admin(&self, id: UserId, is_admin: bool) -> Result<bool> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::IsAdmin, Expr::value(is_admin))
            .col_expr(users::Column::UpdatedAt, Expr::value(Utc::now().to_rfc3339()))
            .filter(users::Column::Id.eq(id.value()))
            .filter(users::Column::DeletedAt.is_null())
            .exec(&self.conn)
            .await
            .context("Failed to update admin flag")?;

        Ok(result.rows_affected == 1)
    }

    /// Marks the user deactivated and drops any outstanding action tokens.
    pub async fn soft_delete(&self, id: UserId, now: DateTime<Utc>) -> Result<bool> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::DeletedAt, Expr::value(Some(now)))
            .col_expr(users::Column::ResetTokenHash, Expr::value(Option::<String>::None))
            .col_expr(users::Column::ResetTokenExpiry, Expr::value(no_timestamp()))
            .col_expr(users::Column::SetupTokenHash, Expr::value(Option::<String>::None))
            .col_expr(users::Column::SetupTokenExpiry, Expr::value(no_timestamp()))
            .col_expr(users::Column::UpdatedAt, Expr::value(now.to_rfc3339()))
            .filter(users::Column::Id.eq(id.value()))
            .filter(users::Column::DeletedAt.is_null())
            .exec(&self.conn)
            .await
            .context("Failed to deactivate user")?;

        Ok(result.rows_affected == 1)
    }
}
