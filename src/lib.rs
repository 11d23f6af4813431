pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod notifications;
pub mod payments;
pub mod server;
pub mod store;
pub mod utils;

use config::Config;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{PasswordHasher, TokenAuthority};
use crate::notifications::ReceiptNotifier;
use crate::payments::PaymentGateway;
use crate::store::DocumentStore;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn DocumentStore>,
    pub tokens: TokenAuthority,
    pub payments: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn ReceiptNotifier>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn DocumentStore>,
        payments: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn ReceiptNotifier>,
    ) -> Self {
        let tokens = TokenAuthority::new(
            store.clone(),
            PasswordHasher::new(&config.auth.hashing_secret),
            Duration::from_secs(config.auth.token_ttl_secs),
        );
        Self {
            config,
            store,
            tokens,
            payments,
            notifier,
        }
    }
}
