//! # HTTP Mail Relay
//!
//! [`Mailer`] that POSTs each message as JSON to a mail relay service.

use async_trait::async_trait;
use reqwest::Client;
use shop_core::{CheckoutError, CheckoutResult, EmailMessage, Mailer};
use tracing::{debug, instrument};

const SERVICE: &str = "mail";

pub struct HttpMailer {
    relay_url: String,
    client: Client,
}

impl HttpMailer {
    pub fn new(relay_url: impl Into<String>) -> CheckoutResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| CheckoutError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            relay_url: relay_url.into(),
            client,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    #[instrument(skip_all, fields(template = message.template_name().unwrap_or("-")))]
    async fn send(&self, message: EmailMessage) -> CheckoutResult<()> {
        let response = self
            .client
            .post(&self.relay_url)
            .json(&message)
            .send()
            .await
            .map_err(|e| CheckoutError::upstream(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CheckoutError::upstream(
                SERVICE,
                format!("HTTP {status}: {body}"),
            ));
        }

        debug!("Email accepted by relay");
        Ok(())
    }
}
