//! Payment submission.
//!
//! Checkout hands a [`Charge`] to a [`PaymentGateway`] and only cares whether
//! it went through.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::PaymentsConfig;

/// What to charge and who gets the provider's receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    /// Minor currency units
    pub amount: u64,
    pub description: String,
    pub receipt_email: String,
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payments are not configured")]
    NotConfigured,

    #[error("payment provider answered with status {0}")]
    Rejected(u16),

    #[error("payment request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, charge: &Charge) -> Result<(), PaymentError>;
}

/// Build the gateway described by the config
pub fn from_config(config: &PaymentsConfig) -> Arc<dyn PaymentGateway> {
    match &config.stripe_secret_key {
        Some(key) => Arc::new(StripeGateway::new(config, key.clone())),
        None => {
            warn!("No payment provider configured, checkouts will be rejected");
            Arc::new(DisabledGateway)
        }
    }
}

/// Charges through the Stripe charges endpoint
pub struct StripeGateway {
    http_client: reqwest::Client,
    endpoint: String,
    secret_key: String,
    currency: String,
    source: String,
}

#[derive(Serialize)]
struct ChargeForm<'a> {
    currency: &'a str,
    source: &'a str,
    amount: u64,
    description: &'a str,
    receipt_email: &'a str,
}

impl StripeGateway {
    pub fn new(config: &PaymentsConfig, secret_key: String) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            endpoint: format!("{}/v1/charges", config.api_base.trim_end_matches('/')),
            secret_key,
            currency: config.currency.clone(),
            source: config.source.clone(),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn charge(&self, charge: &Charge) -> Result<(), PaymentError> {
        let form = ChargeForm {
            currency: &self.currency,
            source: &self.source,
            amount: charge.amount,
            description: &charge.description,
            receipt_email: &charge.receipt_email,
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.secret_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), amount = charge.amount, "Payment provider responded");
        if status.is_success() {
            Ok(())
        } else {
            Err(PaymentError::Rejected(status.as_u16()))
        }
    }
}

/// Used when no provider is configured
pub struct DisabledGateway;

#[async_trait]
impl PaymentGateway for DisabledGateway {
    async fn charge(&self, _charge: &Charge) -> Result<(), PaymentError> {
        Err(PaymentError::NotConfigured)
    }
}
