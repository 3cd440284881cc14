use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use slog::{info, warn, Logger};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::config::EmailConfig;

pub mod templates;

/// Outbound email, relayed as-is to the mail transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl EmailMessage {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailReceipt {
    pub success: bool,
    #[serde(default, rename = "messageId")]
    pub message_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Email transport error: {0}")]
    Transport(String),
    #[error("Email relay rejected message: {0}")]
    Rejected(String),
    #[error("Email relay not configured")]
    NotConfigured,
}

impl From<reqwest::Error> for NotificationError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Sends one email. Implementations never panic on transport failure; the
/// caller decides whether a failure matters.
#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    async fn send_email(&self, message: EmailMessage) -> Result<EmailReceipt, NotificationError>;
}

/// Writes messages to the log instead of sending them. Used when email is
/// disabled.
#[derive(Clone)]
pub struct LoggingEmailDispatcher {
    logger: Logger,
}

impl LoggingEmailDispatcher {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl EmailDispatcher for LoggingEmailDispatcher {
    async fn send_email(&self, message: EmailMessage) -> Result<EmailReceipt, NotificationError> {
        info!(self.logger, "email suppressed (delivery disabled)";
            "to" => &message.to,
            "subject" => &message.subject
        );
        Ok(EmailReceipt {
            success: true,
            message_id: Some(format!("logged-{}", Uuid::new_v4())),
        })
    }
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: String,
    to: &'a str,
    subject: &'a str,
    content: &'a str,
    metadata: &'a BTreeMap<String, String>,
}

/// Posts messages to an HTTP mail relay.
#[derive(Clone)]
pub struct RelayEmailDispatcher {
    client: reqwest::Client,
    config: EmailConfig,
    logger: Logger,
}

impl RelayEmailDispatcher {
    pub fn new(config: EmailConfig, logger: Logger) -> Result<Self, NotificationError> {
        if config.relay_url.is_none() {
            return Err(NotificationError::NotConfigured);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config,
            logger,
        })
    }
}

#[async_trait]
impl EmailDispatcher for RelayEmailDispatcher {
    #[instrument(skip(self, message), fields(to = %message.to))]
    async fn send_email(&self, message: EmailMessage) -> Result<EmailReceipt, NotificationError> {
        let url = self
            .config
            .relay_url
            .as_deref()
            .ok_or(NotificationError::NotConfigured)?;

        let payload = RelayPayload {
            from: format!("{} <{}>", self.config.from_name, self.config.from_address),
            to: &message.to,
            subject: &message.subject,
            content: &message.content,
            metadata: &message.metadata,
        };

        let response = self.client.post(url).json(&payload).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            warn!(self.logger, "email relay rejected message";
                "status" => status.as_u16(),
                "to" => &message.to
            );
            return Err(NotificationError::Rejected(status.to_string()));
        }

        let receipt = response.json::<EmailReceipt>().await.unwrap_or(EmailReceipt {
            success: true,
            message_id: None,
        });
        info!(self.logger, "email relayed"; "to" => &message.to, "subject" => &message.subject);
        Ok(receipt)
    }
}

/// Builds the dispatcher selected by configuration.
pub fn dispatcher_from_config(config: &EmailConfig, logger: Logger) -> Arc<dyn EmailDispatcher> {
    if config.enabled {
        match RelayEmailDispatcher::new(config.clone(), logger.clone()) {
            Ok(relay) => return Arc::new(relay),
            Err(e) => warn!(logger, "email enabled but relay unusable; logging instead"; "error" => %e),
        }
    }
    Arc::new(LoggingEmailDispatcher::new(logger))
}

/// Best-effort delivery helpers on top of a dispatcher.
#[derive(Clone)]
pub struct Notifier {
    dispatcher: Arc<dyn EmailDispatcher>,
    logger: Logger,
}

impl Notifier {
    pub fn new(dispatcher: Arc<dyn EmailDispatcher>, logger: Logger) -> Self {
        Self { dispatcher, logger }
    }

    /// Sends one message, logging rather than returning a failure.
    pub async fn notify(&self, message: EmailMessage) -> bool {
        let to = message.to.clone();
        match self.dispatcher.send_email(message).await {
            Ok(receipt) if receipt.success => true,
            Ok(_) => {
                warn!(self.logger, "email dispatcher reported failure"; "to" => to);
                false
            }
            Err(e) => {
                warn!(self.logger, "email delivery failed"; "to" => to, "error" => %e);
                false
            }
        }
    }

    /// Sends every message concurrently; one failed recipient does not stop
    /// the rest. Returns how many were delivered.
    pub async fn notify_all(&self, messages: Vec<EmailMessage>) -> usize {
        self.notify_each(messages)
            .await
            .into_iter()
            .filter(|delivered| *delivered)
            .count()
    }

    /// Like [`Notifier::notify_all`] but reports delivery per message, in
    /// input order.
    pub async fn notify_each(&self, messages: Vec<EmailMessage>) -> Vec<bool> {
        join_all(messages.into_iter().map(|m| self.notify(m))).await
    }

    /// Like [`Notifier::notify`] but surfaces the failure to callers that
    /// record delivery state.
    pub async fn deliver(&self, message: EmailMessage) -> Result<EmailReceipt, NotificationError> {
        self.dispatcher.send_email(message).await
    }
}
