//! # Email Notifications
//!
//! The email collaborator. Messages carry either a rendered body or a
//! template name plus data; rendering templates is the mail service's job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;

use crate::error::CheckoutResult;

/// Template sent when an order is paid
pub const ORDER_CONFIRMATION_TEMPLATE: &str = "order-confirmation";

/// Message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmailContent {
    /// Pre-rendered content
    Body {
        subject: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        html: Option<String>,
    },
    /// Rendered by the mail service
    Template { template: EmailTemplate },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub name: String,
    pub data: serde_json::Value,
}

/// An outgoing email
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    #[serde(flatten)]
    pub content: EmailContent,
}

impl EmailMessage {
    /// Plain-text message
    pub fn text(to: impl Into<String>, subject: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            content: EmailContent::Body {
                subject: subject.into(),
                text: Some(text.into()),
                html: None,
            },
        }
    }

    /// Templated message
    pub fn template(to: impl Into<String>, name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            to: to.into(),
            content: EmailContent::Template {
                template: EmailTemplate {
                    name: name.into(),
                    data,
                },
            },
        }
    }

    pub fn template_name(&self) -> Option<&str> {
        match &self.content {
            EmailContent::Template { template } => Some(&template.name),
            EmailContent::Body { .. } => None,
        }
    }
}

/// Outbound email port
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> CheckoutResult<()>;
}

/// Mailer that only logs (default when no relay is configured)
#[derive(Debug, Default)]
pub struct LoggingMailer;

#[async_trait]
impl Mailer for LoggingMailer {
    async fn send(&self, message: EmailMessage) -> CheckoutResult<()> {
        info!(
            to = %message.to,
            template = message.template_name().unwrap_or("-"),
            "Email dispatched (logging mailer)"
        );
        Ok(())
    }
}

/// Mailer that keeps every message in memory
#[derive(Debug, Default)]
pub struct OutboxMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl OutboxMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, message: EmailMessage) -> CheckoutResult<()> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message);
        Ok(())
    }
}
