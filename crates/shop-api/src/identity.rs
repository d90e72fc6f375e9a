//! # Supabase Identity Provider
//!
//! Password-grant login against a Supabase (GoTrue) auth endpoint.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use shop_core::{CheckoutError, CheckoutResult, Identity, IdentityProvider, Role};
use tracing::{instrument, warn};

const SERVICE: &str = "supabase";

/// Identity provider backed by Supabase Auth
pub struct SupabaseIdentityProvider {
    base_url: String,
    anon_key: String,
    client: Client,
}

impl SupabaseIdentityProvider {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> CheckoutResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| CheckoutError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            client,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    user: SupabaseUser,
}

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    app_metadata: serde_json::Value,
}

impl SupabaseUser {
    fn role(&self) -> Role {
        match self.app_metadata.get("role").and_then(|r| r.as_str()) {
            Some("admin") => Role::Admin,
            _ => Role::Customer,
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentityProvider {
    #[instrument(skip(self, password))]
    async fn authenticate(&self, email: &str, password: &str) -> CheckoutResult<Identity> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| CheckoutError::upstream(SERVICE, e))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            warn!("Login rejected by identity provider");
            return Err(CheckoutError::Unauthenticated);
        }
        if !status.is_success() {
            return Err(CheckoutError::upstream(SERVICE, format!("HTTP {status}")));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| CheckoutError::upstream(SERVICE, format!("unexpected response: {e}")))?;

        let role = body.user.role();
        Ok(Identity {
            user_id: body.user.id,
            email: body.user.email.unwrap_or_else(|| email.to_string()),
            role,
        })
    }

    fn provider_name(&self) -> &'static str {
        SERVICE
    }
}
