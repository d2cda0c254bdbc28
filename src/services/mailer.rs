//! Delivery of reset and setup links.
//!
//! Delivery is fire-and-forget: [`dispatch`] spawns the send, bounds it with a
//! timeout and only logs the outcome. A slow or broken relay never changes
//! what the caller of a reset or invite sees.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::config::MailConfig;
use crate::services::action_token::ActionTokenKind;

/// One outgoing message carrying a plaintext action link.
#[derive(Clone, Serialize)]
pub struct ActionEmail {
    pub to: String,
    pub username: String,
    pub kind: ActionTokenKind,
    pub link: String,
    pub expires_at: DateTime<Utc>,
}

// The link embeds a live token; never print it.
impl std::fmt::Debug for ActionEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionEmail")
            .field("to", &self.to)
            .field("username", &self.username)
            .field("kind", &self.kind)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl ActionEmail {
    #[must_use]
    pub fn subject(&self) -> &'static str {
        match self.kind {
            ActionTokenKind::Reset => "Reset your password",
            ActionTokenKind::Setup => "Set up your volunteer account",
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &ActionEmail) -> Result<()>;
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    username: &'a str,
    kind: ActionTokenKind,
    link: &'a str,
    expires_at: String,
}

/// Posts each message as JSON to a mail relay.
pub struct WebhookMailer {
    client: reqwest::Client,
    endpoint: url::Url,
    from: String,
}

impl WebhookMailer {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let endpoint = url::Url::parse(&config.webhook_url).context("Invalid mail webhook URL")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("Pawgate/1.0")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build mail HTTP client: {e}"))?;

        Ok(Self {
            client,
            endpoint,
            from: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send(&self, email: &ActionEmail) -> Result<()> {
        let payload = WebhookPayload {
            from: &self.from,
            to: &email.to,
            subject: email.subject(),
            username: &email.username,
            kind: email.kind,
            link: &email.link,
            expires_at: email.expires_at.to_rfc3339(),
        };

        self.client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .context("Mail relay request failed")?
            .error_for_status()
            .context("Mail relay rejected message")?;

        Ok(())
    }
}

/// Used when mail is disabled. Records that a message would have gone out.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &ActionEmail) -> Result<()> {
        info!(
            to = %email.to,
            kind = %email.kind,
            "Mail delivery disabled; message not sent"
        );
        Ok(())
    }
}

/// Builds the mailer selected by config.
pub fn from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    if config.enabled {
        Ok(Arc::new(WebhookMailer::new(config)?))
    } else {
        Ok(Arc::new(LogMailer))
    }
}

/// Sends `email` in the background, bounded by `timeout`.
pub fn dispatch(
    mailer: Arc<dyn Mailer>,
    email: ActionEmail,
    timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = tokio::time::timeout(timeout, mailer.send(&email)).await;

        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => format!("{e:#}"),
            Err(_) => format!("timed out after {}s", timeout.as_secs()),
        };

        metrics::counter!("auth_mail_failures_total", "kind" => email.kind.as_str()).increment(1);
        error!(
            event = "mail_delivery_failed",
            to = %email.to,
            kind = %email.kind,
            error = %failure,
            "Failed to deliver account email"
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn email() -> ActionEmail {
        ActionEmail {
            to: "sam@example.org".to_string(),
            username: "sam".to_string(),
            kind: ActionTokenKind::Reset,
            link: "http://localhost/reset-password?token=deadbeef".to_string(),
            expires_at: Utc::now(),
        }
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<String>>);

    #[async_trait]
    impl Mailer for Recording {
        async fn send(&self, email: &ActionEmail) -> Result<()> {
            self.0.lock().unwrap().push(email.to.clone());
            Ok(())
        }
    }

    struct Stalled;

    #[async_trait]
    impl Mailer for Stalled {
        async fn send(&self, _: &ActionEmail) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[test]
    fn debug_hides_link() {
        let rendered = format!("{:?}", email());
        assert!(!rendered.contains("deadbeef"));
        assert!(rendered.contains("sam@example.org"));
    }

    #[tokio::test]
    async fn dispatch_delivers() {
        let mailer = Arc::new(Recording::default());
        dispatch(mailer.clone(), email(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(*mailer.0.lock().unwrap(), vec!["sam@example.org".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_gives_up_on_stalled_relay() {
        let handle = dispatch(Arc::new(Stalled), email(), Duration::from_secs(30));
        handle.await.unwrap();
    }

    #[test]
    fn disabled_mail_uses_log_mailer() {
        assert!(from_config(&MailConfig::default()).is_ok());

        let broken = MailConfig {
            enabled: true,
            webhook_url: "not a url".to_string(),
            ..MailConfig::default()
        };
        assert!(from_config(&broken).is_err());
    }
}
