//! # Session Authority
//!
//! Issues and verifies the storefront's own signed session token.
//!
//! Token format: `v1.<base64url(json claims)>.<base64url(hmac-sha256)>`.
//! The MAC covers the encoded claims part. Verification failures of any kind
//! (bad format, bad signature, expired) all surface as `None`, so callers
//! cannot tell a tampered token from an absent one.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use crate::error::{CheckoutError, CheckoutResult};

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION: &str = "v1";
const MAX_TOKEN_LEN: usize = 2048;
const MIN_SECRET_LEN: usize = 32;

/// Default session lifetime
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

/// User role carried in the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

/// Verified session contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id
    pub sub: String,
    pub role: Role,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expires at (unix seconds)
    pub exp: i64,
}

impl SessionClaims {
    pub fn user_id(&self) -> &str {
        &self.sub
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// A freshly issued token together with its claims
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub value: String,
    pub claims: SessionClaims,
}

/// Issues, verifies and refreshes session tokens
#[derive(Clone)]
pub struct SessionAuthority {
    secret: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for SessionAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAuthority")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SessionAuthority {
    /// Create an authority; the secret must be at least 32 bytes
    pub fn new(secret: impl Into<Vec<u8>>, ttl: Duration) -> CheckoutResult<Self> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(CheckoutError::Configuration(format!(
                "session secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if ttl <= Duration::zero() {
            return Err(CheckoutError::Configuration(
                "session ttl must be positive".to_string(),
            ));
        }
        Ok(Self { secret, ttl })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for a user (`set`)
    pub fn issue(&self, user_id: &str, role: Role) -> CheckoutResult<SessionToken> {
        self.issue_at(user_id, role, Utc::now())
    }

    pub fn issue_at(
        &self,
        user_id: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> CheckoutResult<SessionToken> {
        let claims = SessionClaims {
            sub: user_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        let payload = serde_json::to_vec(&claims)
            .map_err(|e| CheckoutError::Internal(format!("encode session claims: {e}")))?;
        let payload_part = URL_SAFE_NO_PAD.encode(payload);
        let sig_part = URL_SAFE_NO_PAD.encode(self.sign(payload_part.as_bytes())?);

        Ok(SessionToken {
            value: format!("{TOKEN_VERSION}.{payload_part}.{sig_part}"),
            claims,
        })
    }

    /// Verify a token (`get`); `None` for anything but a valid, unexpired token
    pub fn verify(&self, token: &str) -> Option<SessionClaims> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Option<SessionClaims> {
        match self.decode(token, now) {
            Ok(claims) => Some(claims),
            Err(reason) => {
                debug!(reason, "Session token rejected");
                None
            }
        }
    }

    /// Re-issue a valid token with a fresh expiry; `None` if there is no valid session
    pub fn refresh(&self, token: &str) -> Option<SessionToken> {
        self.refresh_at(token, Utc::now())
    }

    pub fn refresh_at(&self, token: &str, now: DateTime<Utc>) -> Option<SessionToken> {
        let claims = self.verify_at(token, now)?;
        self.issue_at(&claims.sub, claims.role, now).ok()
    }

    fn sign(&self, message: &[u8]) -> CheckoutResult<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| CheckoutError::Internal(e.to_string()))?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, &'static str> {
        if token.is_empty() || token.len() > MAX_TOKEN_LEN {
            return Err("length");
        }

        let parts: Vec<&str> = token.split('.').collect();
        let [version, payload_part, sig_part] = parts.as_slice() else {
            return Err("format");
        };
        if *version != TOKEN_VERSION {
            return Err("version");
        }

        let signature = URL_SAFE_NO_PAD.decode(sig_part).map_err(|_| "signature encoding")?;
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|_| "key")?;
        mac.update(payload_part.as_bytes());
        mac.verify_slice(&signature).map_err(|_| "signature")?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_part)
            .map_err(|_| "payload encoding")?;
        let claims: SessionClaims = serde_json::from_slice(&payload).map_err(|_| "payload")?;

        if claims.exp <= now.timestamp() {
            return Err("expired");
        }
        Ok(claims)
    }
}
