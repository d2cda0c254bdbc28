//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::{NewUserRow, Store, User};
use crate::domain::{Identity, UserId};
use crate::services::action_token::{self, ActionTokenKind};
use crate::services::auth_service::{AuthError, AuthService, LoginResult, NewUser, UserInfo};
use crate::services::authorization::{Authorizer, Scope};
use crate::services::lockout::LockoutPolicy;
use crate::services::mailer::{self, ActionEmail, Mailer};
use crate::services::password::PasswordHasher;
use crate::services::session::SessionTokens;
use crate::services::validation;

fn count_login(outcome: &'static str) {
    metrics::counter!("auth_login_attempts_total", "outcome" => outcome).increment(1);
}

fn count_consumed(kind: ActionTokenKind, outcome: &'static str) {
    metrics::counter!(
        "auth_action_tokens_consumed_total",
        "kind" => kind.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

pub struct SeaOrmAuthService {
    store: Store,
    hasher: PasswordHasher,
    sessions: SessionTokens,
    lockout: LockoutPolicy,
    authorizer: Authorizer,
    mailer: Arc<dyn Mailer>,
    config: Config,
}

impl SeaOrmAuthService {
    pub fn new(store: Store, config: &Config, mailer: Arc<dyn Mailer>) -> anyhow::Result<Self> {
        let hasher = PasswordHasher::new(&config.security)?;
        let sessions = SessionTokens::new(&config.security.session)?;
        let authorizer = Authorizer::new(Arc::new(store.clone()));

        Ok(Self {
            store,
            hasher,
            sessions,
            lockout: LockoutPolicy::from_config(&config.security.lockout)?,
            authorizer,
            mailer,
            config: config.clone(),
        })
    }

    #[must_use]
    pub const fn sessions(&self) -> &SessionTokens {
        &self.sessions
    }

    #[must_use]
    pub const fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    /// Creates the first site administrator, pending setup, and returns the
    /// setup link instead of mailing it.
    pub async fn bootstrap_admin(&self, username: &str, email: &str) -> Result<String, AuthError> {
        let user = self
            .insert_user(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password: None,
                is_admin: true,
            })
            .await?;

        let (token, expires_at) = self.issue_action_token(&user, ActionTokenKind::Setup).await?;
        info!(
            user_id = %user.id,
            expires_at = %expires_at,
            "Bootstrap administrator created"
        );

        Ok(ActionTokenKind::Setup.link(&self.config.server.public_url, &token))
    }

    fn mail_timeout(&self) -> Duration {
        Duration::from_secs(self.config.mail.timeout_seconds)
    }

    /// Generates, stores and counts a new action token for `user`. The
    /// plaintext is returned exactly once.
    async fn issue_action_token(
        &self,
        user: &User,
        kind: ActionTokenKind,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let token = action_token::generate_token();
        let token_hash = self.hasher.hash_async(&token).await?;
        let expires_at = kind
            .expiry(&self.config.security.action_tokens, Utc::now())
            .ok_or_else(|| AuthError::Internal(format!("{kind} token TTL is out of range")))?;

        let stored = self
            .store
            .user_repo()
            .store_action_token(user.id, kind, &token_hash, expires_at)
            .await?;
        if !stored {
            return Err(AuthError::NotFound("User".to_string()));
        }

        metrics::counter!("auth_action_tokens_issued_total", "kind" => kind.as_str()).increment(1);
        Ok((token, expires_at))
    }

    /// Issues a token and hands the link to the mailer in the background.
    async fn send_action_link(&self, user: &User, kind: ActionTokenKind) -> Result<(), AuthError> {
        let (token, expires_at) = self.issue_action_token(user, kind).await?;

        let email = ActionEmail {
            to: user.email.clone(),
            username: user.username.clone(),
            kind,
            link: kind.link(&self.config.server.public_url, &token),
            expires_at,
        };
        mailer::dispatch(self.mailer.clone(), email, self.mail_timeout());

        Ok(())
    }

    async fn insert_user(&self, new_user: NewUser) -> Result<User, AuthError> {
        let username = validation::validate_username(&new_user.username)?.to_string();
        let email = validation::validate_email(&new_user.email)?;
        if let Some(password) = &new_user.password {
            validation::validate_password(password, self.config.security.min_password_length)?;
        }

        let repo = self.store.user_repo();
        if repo.identity_taken(&username, &email).await? {
            return Err(AuthError::Conflict(
                "Username or email already in use".to_string(),
            ));
        }

        // Invited accounts get a digest of a random value nobody knows, so
        // the column is never empty and never matches.
        let requires_password_setup = new_user.password.is_none();
        let password = new_user
            .password
            .unwrap_or_else(action_token::generate_token);
        let password_hash = self.hasher.hash_async(&password).await?;

        let user = repo
            .create(NewUserRow {
                username,
                email,
                password_hash,
                is_admin: new_user.is_admin,
                requires_password_setup,
            })
            .await?;

        info!(
            user_id = %user.id,
            is_admin = user.is_admin,
            requires_password_setup,
            "User created"
        );
        Ok(user)
    }

    /// Finds the holder of `token`, then spends it with a conditional update.
    async fn consume(
        &self,
        kind: ActionTokenKind,
        token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        validation::validate_password(new_password, self.config.security.min_password_length)?;

        let token = token.trim();
        if !action_token::is_well_formed(token) {
            count_consumed(kind, "rejected");
            info!(event = "token_rejected", kind = %kind, reason = "malformed", "Action token rejected");
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let now = Utc::now();
        let repo = self.store.user_repo();

        let mut matched = None;
        for candidate in repo.action_token_candidates(kind, now).await? {
            if self
                .hasher
                .verify_async(&candidate.token_hash, token)
                .await?
            {
                matched = Some(candidate);
                break;
            }
        }

        let Some(candidate) = matched else {
            count_consumed(kind, "rejected");
            info!(event = "token_rejected", kind = %kind, reason = "no_match", "Action token rejected");
            return Err(AuthError::InvalidOrExpiredToken);
        };

        let new_hash = self.hasher.hash_async(new_password).await?;
        let consumed = repo
            .consume_action_token(candidate.user.id, kind, &candidate.token_hash, &new_hash, now)
            .await?;

        if !consumed {
            count_consumed(kind, "rejected");
            info!(
                event = "token_rejected",
                kind = %kind,
                user_id = %candidate.user.id,
                reason = "already_consumed",
                "Action token rejected"
            );
            return Err(AuthError::InvalidOrExpiredToken);
        }

        count_consumed(kind, "success");
        info!(
            event = "token_consumed",
            kind = %kind,
            user_id = %candidate.user.id,
            "Action token consumed"
        );
        Ok(())
    }

    async fn active_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.store
            .user_repo()
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User".to_string()))
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResult, AuthError> {
        let repo = self.store.user_repo();
        let now = Utc::now();

        let Some(credentials) = repo.get_credentials_by_username(username.trim()).await? else {
            self.hasher.dummy_verify_async(password).await?;
            count_login("failure");
            info!(event = "login_failed", reason = "unknown_user", "Login failed");
            return Err(AuthError::InvalidCredentials);
        };
        let user_id = credentials.user.id;

        if credentials.lockout.is_locked(now) {
            count_login("locked");
            warn!(
                event = "login_locked",
                user_id = %user_id,
                locked_until = ?credentials.lockout.locked_until,
                "Login attempt on locked account"
            );
            return Err(AuthError::InvalidCredentials);
        }

        if credentials.user.requires_password_setup {
            self.hasher.dummy_verify_async(password).await?;
            count_login("failure");
            info!(event = "login_failed", user_id = %user_id, reason = "pending_setup", "Login failed");
            return Err(AuthError::InvalidCredentials);
        }

        let valid = self
            .hasher
            .verify_async(&credentials.password_hash, password)
            .await?;

        if !valid {
            let state = repo.record_failed_login(user_id, &self.lockout, now).await?;
            count_login("failure");
            info!(
                event = "login_failed",
                user_id = %user_id,
                reason = "bad_password",
                failed_attempts = state.failed_attempts,
                "Login failed"
            );

            if state.is_locked(now) && !credentials.lockout.is_locked(now) {
                metrics::counter!("auth_lockouts_total").increment(1);
                warn!(
                    event = "account_locked",
                    user_id = %user_id,
                    locked_until = ?state.locked_until,
                    "Account locked after repeated failures"
                );
            }
            return Err(AuthError::InvalidCredentials);
        }

        // Unconditional: a failure may have been counted while hashing.
        repo.reset_lockout(user_id).await?;

        let identity = Identity::new(user_id, credentials.user.is_admin);
        let session = self
            .sessions
            .issue_at(&identity, now)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        count_login("success");
        info!(user_id = %user_id, "Login succeeded");

        Ok(LoginResult {
            session_token: session.token,
            expires_at: session.expires_at,
            user: UserInfo::from(credentials.user),
        })
    }

    async fn authenticate(&self, bearer: &str) -> Result<Identity, AuthError> {
        self.sessions.verify(bearer.trim()).map_err(|e| {
            debug!(reason = %e, "Session token rejected");
            AuthError::Unauthenticated
        })
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = validation::normalize_email(email);

        let Some(user) = self.store.user_repo().get_by_email(&email).await? else {
            // Same hashing work as a real issuance.
            let decoy = action_token::generate_token();
            self.hasher.hash_async(&decoy).await?;
            info!(event = "reset_unknown_email", "Password reset requested for unknown email");
            return Ok(());
        };

        self.send_action_link(&user, ActionTokenKind::Reset).await?;
        info!(event = "reset_requested", user_id = %user.id, "Password reset requested");
        Ok(())
    }

    async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        self.consume(ActionTokenKind::Reset, token, new_password).await
    }

    async fn complete_setup(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        self.consume(ActionTokenKind::Setup, token, new_password).await
    }

    async fn current_user(&self, identity: &Identity) -> Result<UserInfo, AuthError> {
        // A deactivated account's outstanding token still verifies; it just
        // has nothing left to show.
        let user = self
            .store
            .user_repo()
            .get_by_id(identity.subject)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        Ok(UserInfo::from(user))
    }

    async fn change_password(
        &self,
        identity: &Identity,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        validation::validate_password(new_password, self.config.security.min_password_length)?;

        if current_password == new_password {
            return Err(AuthError::Validation(
                "New password must be different from current password".to_string(),
            ));
        }

        let repo = self.store.user_repo();
        let credentials = repo
            .get_credentials_by_id(identity.subject)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        let valid = self
            .hasher
            .verify_async(&credentials.password_hash, current_password)
            .await?;
        if !valid {
            info!(event = "login_failed", user_id = %identity.subject, reason = "bad_current_password", "Password change refused");
            return Err(AuthError::InvalidCredentials);
        }

        let new_hash = self.hasher.hash_async(new_password).await?;
        if !repo.set_password_hash(identity.subject, &new_hash).await? {
            return Err(AuthError::Unauthenticated);
        }

        info!(user_id = %identity.subject, "Password changed");
        Ok(())
    }

    async fn create_user(&self, actor: &Identity, user: NewUser) -> Result<UserInfo, AuthError> {
        self.authorizer.require(actor, Scope::Global).await?;

        let user = self.insert_user(user).await?;
        if user.requires_password_setup {
            self.send_action_link(&user, ActionTokenKind::Setup).await?;
        }

        Ok(UserInfo::from(user))
    }

    async fn invite_user(&self, actor: &Identity, user_id: UserId) -> Result<(), AuthError> {
        self.authorizer.require(actor, Scope::Global).await?;

        let user = self.active_user(user_id).await?;
        if !user.requires_password_setup {
            return Err(AuthError::Conflict(
                "User has already completed setup".to_string(),
            ));
        }

        self.send_action_link(&user, ActionTokenKind::Setup).await?;
        info!(user_id = %user.id, actor = %actor.subject, "Setup invite issued");
        Ok(())
    }

    async fn admin_set_password(
        &self,
        actor: &Identity,
        user_id: UserId,
        new_password: &str,
    ) -> Result<(), AuthError> {
        self.authorizer.require(actor, Scope::Global).await?;
        validation::validate_password(new_password, self.config.security.min_password_length)?;

        let new_hash = self.hasher.hash_async(new_password).await?;
        if !self.store.user_repo().set_password_hash(user_id, &new_hash).await? {
            return Err(AuthError::NotFound("User".to_string()));
        }

        info!(user_id = %user_id, actor = %actor.subject, "Password set by administrator");
        Ok(())
    }

    async fn set_site_admin(
        &self,
        actor: &Identity,
        user_id: UserId,
        is_admin: bool,
    ) -> Result<UserInfo, AuthError> {
        self.authorizer.require(actor, Scope::Global).await?;

        if actor.subject == user_id && !is_admin {
            return Err(AuthError::Validation(
                "Administrators cannot remove their own admin role".to_string(),
            ));
        }

        let repo = self.store.user_repo();
        if !repo.set_admin(user_id, is_admin).await? {
            return Err(AuthError::NotFound("User".to_string()));
        }

        info!(user_id = %user_id, actor = %actor.subject, is_admin, "Site admin flag changed");
        Ok(UserInfo::from(self.active_user(user_id).await?))
    }

    async fn list_users(&self, actor: &Identity) -> Result<Vec<UserInfo>, AuthError> {
        self.authorizer.require(actor, Scope::Global).await?;

        let users = self.store.user_repo().list_active().await?;
        Ok(users.into_iter().map(UserInfo::from).collect())
    }

    async fn deactivate_user(&self, actor: &Identity, user_id: UserId) -> Result<(), AuthError> {
        self.authorizer.require(actor, Scope::Global).await?;

        if actor.subject == user_id {
            return Err(AuthError::Validation(
                "Administrators cannot deactivate themselves".to_string(),
            ));
        }

        if !self.store.user_repo().soft_delete(user_id, Utc::now()).await? {
            return Err(AuthError::NotFound("User".to_string()));
        }

        info!(user_id = %user_id, actor = %actor.subject, "User deactivated");
        Ok(())
    }
}
