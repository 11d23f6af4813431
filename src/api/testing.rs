//! Test harness for resource operations: a real `FileStore` in a temp dir,
//! recording collaborators and a store wrapper that fails on demand.

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use super::dispatcher::{Dispatcher, ReplyBody};
use super::{ensure_menu, route_table};
use crate::config::Config;
use crate::models::{merge_lines, CartLine};
use crate::notifications::{NotifyError, Receipt, ReceiptNotifier};
use crate::payments::{Charge, PaymentError, PaymentGateway};
use crate::store::{
    typed_mutation, Collection, Document, DocumentStore, FileStore, Mutation, StoreError,
};
use crate::AppState;

pub const EMAIL: &str = "jane@example.com";
pub const PASSWORD: &str = "pepperoni42";

/// Cart lines merged into a cart while a charge is being made
type CartChange = (Arc<dyn DocumentStore>, String, Vec<CartLine>);

#[derive(Default)]
pub struct RecordingGateway {
    charges: Mutex<Vec<Charge>>,
    fail: AtomicBool,
    during_charge: Mutex<Option<CartChange>>,
}

impl RecordingGateway {
    pub fn charges(&self) -> Vec<Charge> {
        self.charges.lock().unwrap().clone()
    }

    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// On the next charge, add `lines` to the cart of `email` before answering
    pub fn add_to_cart_during_charge(
        &self,
        store: Arc<dyn DocumentStore>,
        email: &str,
        lines: Vec<CartLine>,
    ) {
        *self.during_charge.lock().unwrap() = Some((store, email.to_string(), lines));
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn charge(&self, charge: &Charge) -> Result<(), PaymentError> {
        let change = self.during_charge.lock().unwrap().take();
        if let Some((store, email, lines)) = change {
            let mutation = typed_mutation(
                Collection::ShoppingCarts,
                &email,
                move |cart: &mut Vec<CartLine>| {
                    merge_lines(cart, &lines);
                    Ok(())
                },
            );
            store
                .modify(Collection::ShoppingCarts, &email, mutation)
                .await
                .unwrap();
        }

        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(PaymentError::Rejected(402));
        }
        self.charges.lock().unwrap().push(charge.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    receipts: Mutex<Vec<Receipt>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn receipts(&self) -> Vec<Receipt> {
        self.receipts.lock().unwrap().clone()
    }

    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReceiptNotifier for RecordingNotifier {
    async fn send_receipt(&self, receipt: &Receipt) -> Result<(), NotifyError> {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(NotifyError::NotConfigured("SMTP host"));
        }
        self.receipts.lock().unwrap().push(receipt.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Create,
    Update,
    Delete,
}

/// Passes everything through except the listed operations
pub struct FlakyStore {
    inner: Arc<dyn DocumentStore>,
    failures: Vec<(Collection, StoreOp)>,
}

impl FlakyStore {
    fn check(&self, collection: Collection, op: StoreOp) -> Result<(), StoreError> {
        if self.failures.contains(&(collection, op)) {
            return Err(StoreError::Io(std::io::Error::other("injected failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn create(
        &self,
        collection: Collection,
        key: &str,
        doc: &Document,
    ) -> Result<(), StoreError> {
        self.check(collection, StoreOp::Create)?;
        self.inner.create(collection, key, doc).await
    }

    async fn read(&self, collection: Collection, key: &str) -> Result<Document, StoreError> {
        self.inner.read(collection, key).await
    }

    async fn update(
        &self,
        collection: Collection,
        key: &str,
        doc: &Document,
    ) -> Result<(), StoreError> {
        self.check(collection, StoreOp::Update)?;
        self.inner.update(collection, key, doc).await
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<(), StoreError> {
        self.check(collection, StoreOp::Delete)?;
        self.inner.delete(collection, key).await
    }

    async fn modify(
        &self,
        collection: Collection,
        key: &str,
        mutation: Mutation,
    ) -> Result<Document, StoreError> {
        self.check(collection, StoreOp::Update)?;
        self.inner.modify(collection, key, mutation).await
    }
}

pub struct TestApp {
    _dir: TempDir,
    /// Unwrapped store, for arranging and inspecting state
    pub store: Arc<dyn DocumentStore>,
    pub state: Arc<AppState>,
    pub payments: Arc<RecordingGateway>,
    pub notifier: Arc<RecordingNotifier>,
    dispatcher: Dispatcher,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_failures(&[]).await
    }

    /// Handlers see a store where `op` on `collection` always fails
    pub async fn with_failure(collection: Collection, op: StoreOp) -> Self {
        Self::with_failures(&[(collection, op)]).await
    }

    pub async fn with_failures(failures: &[(Collection, StoreOp)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn DocumentStore> = Arc::new(FileStore::open(dir.path()).await.unwrap());
        let handler_store: Arc<dyn DocumentStore> = if failures.is_empty() {
            store.clone()
        } else {
            Arc::new(FlakyStore {
                inner: store.clone(),
                failures: failures.to_vec(),
            })
        };

        let mut config = Config::default();
        config.auth.hashing_secret = "test-secret".to_string();

        let payments = Arc::new(RecordingGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let state = Arc::new(AppState::new(
            config,
            handler_store,
            payments.clone(),
            notifier.clone(),
        ));
        let dispatcher = Dispatcher::new(route_table(state.clone()));

        Self {
            _dir: dir,
            store,
            state,
            payments,
            notifier,
            dispatcher,
        }
    }

    /// Dispatch a request. `target` may carry a query string.
    pub async fn call(
        &self,
        method: Method,
        target: &str,
        token: Option<&str>,
        body: Value,
    ) -> (StatusCode, Value) {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_query(query)),
            None => (target, HashMap::new()),
        };

        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            headers.insert("token", HeaderValue::from_str(token).unwrap());
        }

        let body = serde_json::to_vec(&body).unwrap();
        let reply = self
            .dispatcher
            .route(method, path, headers, query, &body)
            .await;
        let value = match reply.body {
            ReplyBody::Json(value) => value,
            ReplyBody::Html(markup) => Value::String(markup),
        };
        (reply.status, value)
    }

    pub async fn register(&self, email: &str) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            "/users",
            None,
            json!({
                "name": "Jane",
                "address": "1 Main St",
                "email": email,
                "password": PASSWORD,
                "tosAgreement": true
            }),
        )
        .await
    }

    /// Log in and return the token id
    pub async fn login(&self, email: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/tokens",
                None,
                json!({"email": email, "password": PASSWORD}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["id"].as_str().unwrap().to_string()
    }

    pub async fn seed_menu(&self) {
        assert!(ensure_menu(self.store.as_ref()).await.unwrap());
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
