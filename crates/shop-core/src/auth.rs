//! # Identity Provider
//!
//! The external auth collaborator. It turns credentials into a user id and a
//! role claim, which the [`SessionAuthority`](crate::session::SessionAuthority)
//! then re-signs into the storefront's own session.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::error::{CheckoutError, CheckoutResult};
use crate::session::Role;

/// An authenticated user as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

/// External identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Check credentials. Bad credentials are `Unauthenticated`.
    async fn authenticate(&self, email: &str, password: &str) -> CheckoutResult<Identity>;

    fn provider_name(&self) -> &'static str;
}

/// A configured user of [`StaticIdentityProvider`]
#[derive(Debug, Clone, Deserialize)]
pub struct StaticUser {
    pub user_id: String,
    pub email: String,
    /// Hex SHA-256 digest of the password
    pub password_sha256: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Default, Deserialize)]
struct StaticUsersFile {
    #[serde(default)]
    users: Vec<StaticUser>,
}

/// Identity provider backed by a fixed user list (development and tests)
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    users: HashMap<String, StaticUser>,
}

impl StaticIdentityProvider {
    pub fn new(users: impl IntoIterator<Item = StaticUser>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|u| (u.email.to_lowercase(), u))
                .collect(),
        }
    }

    /// Load users from a TOML `[[users]]` list
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let file: StaticUsersFile = toml::from_str(toml_str)?;
        Ok(Self::new(file.users))
    }

    /// Builder: add a user with a plaintext password
    pub fn with_user(
        mut self,
        user_id: impl Into<String>,
        email: impl Into<String>,
        password: &str,
        role: Role,
    ) -> Self {
        let email = email.into();
        self.users.insert(
            email.to_lowercase(),
            StaticUser {
                user_id: user_id.into(),
                email,
                password_sha256: password_digest(password),
                role,
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn authenticate(&self, email: &str, password: &str) -> CheckoutResult<Identity> {
        let user = self
            .users
            .get(&email.to_lowercase())
            .ok_or(CheckoutError::Unauthenticated)?;

        let digest = password_digest(password);
        if !constant_time_eq(digest.as_bytes(), user.password_sha256.to_lowercase().as_bytes()) {
            return Err(CheckoutError::Unauthenticated);
        }

        Ok(Identity {
            user_id: user.user_id.clone(),
            email: user.email.clone(),
            role: user.role,
        })
    }

    fn provider_name(&self) -> &'static str {
        "static"
    }
}

/// Hex SHA-256 digest of a password
pub fn password_digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}
