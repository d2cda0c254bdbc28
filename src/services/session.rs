//! Signed, stateless session tokens (HS256 JWT).
//!
//! Nothing about a session is persisted. A token is valid while its signature
//! checks out against the process secret and its `exp` lies in the future.
//! Rotating the secret invalidates every outstanding token.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SessionConfig;
use crate::domain::{Identity, UserId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("malformed token")]
    Malformed,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("invalid claims")]
    InvalidClaims,

    #[error("signing failed: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    /// Identity id, as a string per RFC 7519.
    pub sub: String,
    /// Site-admin flag at issuance time.
    pub adm: bool,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// A freshly signed token and its absolute expiry.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies session tokens with a secret fixed at startup.
#[derive(Clone)]
pub struct SessionTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    issuer: String,
}

impl SessionTokens {
    pub fn new(config: &SessionConfig) -> anyhow::Result<Self> {
        if config.jwt_secret.is_empty() {
            anyhow::bail!("Session signing secret is not configured");
        }

        let secret = config.jwt_secret.as_bytes();
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::try_hours(config.token_ttl_hours)
                .ok_or_else(|| anyhow::anyhow!("Session token TTL is out of range"))?,
            issuer: config.issuer.clone(),
        })
    }

    pub fn issue(&self, identity: &Identity) -> Result<IssuedSession, SessionError> {
        self.issue_at(identity, Utc::now())
    }

    pub fn issue_at(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<IssuedSession, SessionError> {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| SessionError::Signing("expiry is out of range".to_string()))?;
        let claims = SessionClaims {
            sub: identity.subject.to_string(),
            adm: identity.is_site_admin,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| SessionError::Signing(e.to_string()))?;

        Ok(IssuedSession { token, expires_at })
    }

    pub fn verify(&self, token: &str) -> Result<Identity, SessionError> {
        self.verify_at(token, Utc::now())
    }

    /// Signature is checked before any claim is looked at; expiry is then
    /// compared against `now` with no leeway.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss"]);
        validation.set_issuer(&[&self.issuer]);

        let data = decode::<SessionClaims>(token, &self.decoding, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::InvalidSignature => SessionError::InvalidSignature,
                ErrorKind::InvalidIssuer | ErrorKind::MissingRequiredClaim(_) => {
                    SessionError::InvalidClaims
                }
                _ => SessionError::Malformed,
            }
        })?;

        let claims = data.claims;
        if claims.exp <= now.timestamp() {
            return Err(SessionError::Expired);
        }

        let subject = claims
            .sub
            .parse::<i32>()
            .map_err(|_| SessionError::InvalidClaims)?;

        Ok(Identity::new(UserId::new(subject), claims.adm))
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }
}
