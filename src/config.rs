use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Minimum accepted length of the session signing secret, in bytes.
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Longest accepted session lifetime (30 days).
pub const MAX_SESSION_TTL_HOURS: i64 = 30 * 24;

/// Longest accepted reset-link lifetime (1 day).
pub const MAX_RESET_TTL_MINUTES: i64 = 24 * 60;

/// Longest accepted invite-link lifetime (7 days).
pub const MAX_SETUP_TTL_HOURS: i64 = 7 * 24;

/// Longest accepted lock (1 day).
pub const MAX_LOCKOUT_SECONDS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub security: SecurityConfig,

    pub mail: MailConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 19456 = 19MB, the OWASP baseline)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations) - higher = more CPU work
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,

    /// Shortest password accepted for any password set or change.
    pub min_password_length: usize,

    pub lockout: LockoutConfig,

    pub session: SessionConfig,

    pub action_tokens: ActionTokenConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutConfig {
    /// Consecutive failed logins that lock the account.
    pub max_attempts: u32,

    /// How long a locked account stays locked.
    pub lockout_seconds: u64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_seconds: 15 * 60,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// HMAC secret used to sign session tokens.
    /// Prefer `PAWGATE_JWT_SECRET` over writing it to the config file.
    /// Changing it invalidates every outstanding session.
    pub jwt_secret: String,

    /// Absolute lifetime of a session token, fixed at issuance.
    pub token_ttl_hours: i64,

    pub issuer: String,
}

// Keeps the secret out of debug logs.
impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_hours: 24,
            issuer: "pawgate".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionTokenConfig {
    /// Lifetime of a password-reset token.
    pub reset_ttl_minutes: i64,

    /// Lifetime of an invite / password-setup token.
    pub setup_ttl_hours: i64,
}

impl Default for ActionTokenConfig {
    fn default() -> Self {
        Self {
            reset_ttl_minutes: 60,
            setup_ttl_hours: 24,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 19456,
            argon2_time_cost: 2,
            argon2_parallelism: 1,
            min_password_length: 8,
            lockout: LockoutConfig::default(),
            session: SessionConfig::default(),
            action_tokens: ActionTokenConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// When false, outgoing mail is only logged.
    pub enabled: bool,

    /// Endpoint of the mail relay; receives one JSON document per message.
    pub webhook_url: String,

    /// Upper bound for a single delivery attempt (default: 30)
    pub timeout_seconds: u64,

    pub from_address: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: String::new(),
            timeout_seconds: 30,
            from_address: "no-reply@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Base URL of the web front-end; reset and setup links are built on it.
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 6790,
            cors_allowed_origins: vec![
                "http://localhost:6790".to_string(),
                "http://127.0.0.1:6790".to_string(),
            ],
            public_url: "http://localhost:6790".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/pawgate.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            security: SecurityConfig::default(),
            mail: MailConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        let mut config = None;
        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                config = Some(Self::load_from_path(path)?);
                break;
            }
        }

        let mut config = config.unwrap_or_else(|| {
            info!("No config file found, using defaults");
            Self::default()
        });
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Secrets and deployment-specific values may come from the environment
    /// (or a `.env` file loaded by `dotenvy`) instead of the TOML file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("PAWGATE_JWT_SECRET")
            && !secret.is_empty()
        {
            self.security.session.jwt_secret = secret;
        }

        if let Ok(url) = std::env::var("PAWGATE_DATABASE_URL")
            && !url.is_empty()
        {
            self.general.database_path = url;
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("pawgate").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".pawgate").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        let security = &self.security;

        if security.session.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            anyhow::bail!(
                "Session secret must be at least {MIN_JWT_SECRET_LEN} bytes (set PAWGATE_JWT_SECRET)"
            );
        }

        if !(1..=MAX_SESSION_TTL_HOURS).contains(&security.session.token_ttl_hours) {
            anyhow::bail!("Session token TTL must be between 1 and {MAX_SESSION_TTL_HOURS} hours");
        }

        if security.lockout.max_attempts == 0 {
            anyhow::bail!("Lockout threshold must be > 0");
        }

        if !(1..=MAX_LOCKOUT_SECONDS).contains(&security.lockout.lockout_seconds) {
            anyhow::bail!("Lockout duration must be between 1 and {MAX_LOCKOUT_SECONDS} seconds");
        }

        if !(1..=MAX_RESET_TTL_MINUTES).contains(&security.action_tokens.reset_ttl_minutes) {
            anyhow::bail!("Reset token TTL must be between 1 and {MAX_RESET_TTL_MINUTES} minutes");
        }

        if !(1..=MAX_SETUP_TTL_HOURS).contains(&security.action_tokens.setup_ttl_hours) {
            anyhow::bail!("Setup token TTL must be between 1 and {MAX_SETUP_TTL_HOURS} hours");
        }

        if security.min_password_length == 0 {
            anyhow::bail!("Minimum password length must be > 0");
        }

        url::Url::parse(&self.server.public_url).context("Invalid server.public_url")?;

        if self.mail.enabled {
            if self.mail.webhook_url.is_empty() {
                anyhow::bail!("mail.webhook_url cannot be empty when mail is enabled");
            }
            url::Url::parse(&self.mail.webhook_url).context("Invalid mail.webhook_url")?;
        }

        Ok(())
    }
}
