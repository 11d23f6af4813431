//! Receipt delivery after a successful checkout.
//!
//! Delivery is best effort: callers log a failure and move on.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::EmailConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("email is not configured: {0}")]
    NotConfigured(&'static str),

    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("could not build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

#[async_trait]
pub trait ReceiptNotifier: Send + Sync {
    async fn send_receipt(&self, receipt: &Receipt) -> Result<(), NotifyError>;
}

/// Build the notifier described by the config
pub fn from_config(config: &EmailConfig) -> Arc<dyn ReceiptNotifier> {
    if config.is_configured() {
        Arc::new(SmtpNotifier::new(config.clone()))
    } else {
        info!("Email not configured, receipts will only be logged");
        Arc::new(LogNotifier)
    }
}

/// Mails receipts through an SMTP relay
pub struct SmtpNotifier {
    config: EmailConfig,
}

impl SmtpNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, receipt: &Receipt) -> Result<Message, NotifyError> {
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or(NotifyError::NotConfigured("from address"))?;

        let from: Mailbox = format!("{} <{}>", self.config.from_name, from_address).parse()?;
        let to: Mailbox = receipt.to.parse()?;

        Ok(Message::builder()
            .from(from)
            .to(to)
            .subject(receipt.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(receipt.body.clone())?)
    }
}

#[async_trait]
impl ReceiptNotifier for SmtpNotifier {
    async fn send_receipt(&self, receipt: &Receipt) -> Result<(), NotifyError> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or(NotifyError::NotConfigured("SMTP host"))?;
        let email = self.build_message(receipt)?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;
        info!(to = %receipt.to, "Sent receipt");
        Ok(())
    }
}

/// Writes receipts to the log instead of sending them
pub struct LogNotifier;

#[async_trait]
impl ReceiptNotifier for LogNotifier {
    async fn send_receipt(&self, receipt: &Receipt) -> Result<(), NotifyError> {
        info!(to = %receipt.to, subject = %receipt.subject, body = %receipt.body, "Receipt");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(to: &str) -> Receipt {
        Receipt {
            to: to.into(),
            subject: "Pizza receipt".into(),
            body: "TOTAL: 12.50".into(),
        }
    }

    fn smtp_config() -> EmailConfig {
        EmailConfig {
            smtp_host: Some("localhost".into()),
            from_address: Some("orders@example.com".into()),
            ..EmailConfig::default()
        }
    }

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        LogNotifier.send_receipt(&receipt("jane@example.com")).await.unwrap();
    }

    #[test]
    fn test_build_message() {
        let notifier = SmtpNotifier::new(smtp_config());
        let message = notifier.build_message(&receipt("jane@example.com")).unwrap();
        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("Subject: Pizza receipt"));
        assert!(formatted.contains("To: jane@example.com"));
        assert!(formatted.contains("TOTAL: 12.50"));
    }

    #[test]
    fn test_bad_recipient() {
        let notifier = SmtpNotifier::new(smtp_config());
        let err = notifier.build_message(&receipt("not an address")).unwrap_err();
        assert!(matches!(err, NotifyError::Address(_)));
    }

    #[test]
    fn test_missing_sender() {
        let notifier = SmtpNotifier::new(EmailConfig {
            from_address: None,
            ..smtp_config()
        });
        let err = notifier.build_message(&receipt("jane@example.com")).unwrap_err();
        assert!(matches!(err, NotifyError::NotConfigured(_)));
    }
}
