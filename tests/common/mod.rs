#![allow(dead_code)]

use async_trait::async_trait;
use pawgate::config::{Config, MIN_JWT_SECRET_LEN};
use pawgate::db::{NewUserRow, Store};
use pawgate::domain::Identity;
use pawgate::services::{ActionEmail, ActionTokenKind, Mailer, PasswordHasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory store, cheap Argon2 parameters. One pooled connection so every
/// query sees the same in-memory database.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.general.max_db_connections = 1;
    config.general.min_db_connections = 1;
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config.security.session.jwt_secret = "k".repeat(MIN_JWT_SECRET_LEN);
    config.server.public_url = "https://volunteers.example.org".to_string();
    config
}

pub async fn test_store(config: &Config) -> Store {
    Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await
    .expect("Failed to open in-memory store")
}

/// Records every message instead of delivering it.
#[derive(Default)]
pub struct CaptureMailer {
    sent: Mutex<Vec<ActionEmail>>,
}

#[async_trait]
impl Mailer for CaptureMailer {
    async fn send(&self, email: &ActionEmail) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

impl CaptureMailer {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Waits for the background delivery of the `n`th message (1-based) and
    /// returns it.
    pub async fn wait_for(&self, n: usize) -> ActionEmail {
        for _ in 0..200 {
            if let Some(email) = self.sent.lock().unwrap().get(n - 1).cloned() {
                return email;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no email #{n} was delivered");
    }

    /// Token of the latest message of `kind` among the first `n` delivered.
    pub async fn token(&self, n: usize, kind: ActionTokenKind) -> String {
        let email = self.wait_for(n).await;
        assert_eq!(email.kind, kind);
        token_from_link(&email.link)
    }
}

pub fn token_from_link(link: &str) -> String {
    link.split_once("token=")
        .map(|(_, token)| token.to_string())
        .expect("link carries a token")
}

/// Inserts an active account with a known password.
pub async fn seed_user(
    store: &Store,
    config: &Config,
    username: &str,
    password: &str,
    is_admin: bool,
) -> Identity {
    let hasher = PasswordHasher::new(&config.security).unwrap();
    let user = store
        .user_repo()
        .create(NewUserRow {
            username: username.to_string(),
            email: format!("{username}@shelter.org"),
            password_hash: hasher.hash(password).unwrap(),
            is_admin,
            requires_password_setup: false,
        })
        .await
        .unwrap();

    Identity::new(user.id, is_admin)
}

pub fn mailer() -> Arc<CaptureMailer> {
    Arc::new(CaptureMailer::default())
}
