//! Checkout: turn the cart into a paid purchase.
//!
//! The cart is claimed (emptied under its key lock) before anything is
//! charged, so a second checkout of the same cart finds it empty and lines
//! added while the payment is in flight stay in the cart for next time. A
//! declined payment puts the claimed lines back. Once the payment has gone
//! through, a failure to record the purchase is a partial failure and is
//! logged for manual follow-up; a failed receipt is only logged.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use super::dispatcher::{ApiRequest, Reply, Resource, Verb};
use super::error::ApiError;
use super::{authorize, validation};
use crate::auth::TOKEN_ID_LEN;
use crate::models::{merge_lines, Bill, CartLine, MenuItem, Purchase, MENU_KEY};
use crate::notifications::Receipt;
use crate::payments::Charge;
use crate::store::{read_as, typed_mutation, Collection, DocumentStore, StoreError};
use crate::utils::random_id;
use crate::AppState;

pub const RECEIPT_SUBJECT: &str = "Pizza receipt";

const EMPTY_CART: &str = "The shopping cart is empty";

pub struct Purchases {
    state: Arc<AppState>,
}

impl Purchases {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    async fn checkout(&self, request: &ApiRequest) -> Result<Reply, ApiError> {
        let email = validation::email(request.query("email")).ok_or_else(ApiError::missing_field)?;
        authorize(&self.state, request, &email).await?;

        let store = self.state.store.as_ref();
        let menu: Vec<MenuItem> = read_as(store, Collection::Menu, MENU_KEY)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    ApiError::not_found("The menu is not available")
                } else {
                    e.into()
                }
            })?;

        let cart = claim_cart(store, &email).await?;

        let bill = Bill::compute(&cart, &menu);
        let charge = Charge {
            amount: bill.charge,
            description: bill.description.clone(),
            receipt_email: email.clone(),
        };
        if let Err(e) = self.state.payments.charge(&charge).await {
            warn!(email = %email, amount = bill.charge, error = %e, "Payment failed");
            restore_cart(store, &email, cart).await?;
            return Err(ApiError::external("Could not make payment"));
        }

        let purchase = Purchase {
            id: random_id(TOKEN_ID_LEN),
            email: email.clone(),
            items: cart,
            charge: bill.charge,
            created_at: Utc::now(),
        };
        if let Err(e) = store
            .create(
                Collection::Purchases,
                &purchase.id,
                &serde_json::to_value(&purchase)?,
            )
            .await
        {
            error!(
                email = %email,
                collection = %Collection::Purchases,
                key = %purchase.id,
                amount = bill.charge,
                items = ?purchase.items,
                error = %e,
                "Payment taken but the purchase could not be recorded"
            );
            return Err(ApiError::partial_failure(
                "Payment was made but the purchase could not be recorded",
            ));
        }

        info!(email = %email, purchase = %purchase.id, amount = bill.charge, "Checkout complete");

        let receipt = Receipt {
            to: email.clone(),
            subject: RECEIPT_SUBJECT.to_string(),
            body: bill.description,
        };
        if let Err(e) = self.state.notifier.send_receipt(&receipt).await {
            warn!(email = %email, purchase = %purchase.id, error = %e, "Could not send receipt");
        }

        Ok(Reply::json(serde_json::to_value(&purchase)?))
    }
}

/// Empty the cart in one locked step and hand back what it held.
async fn claim_cart(store: &dyn DocumentStore, email: &str) -> Result<Vec<CartLine>, ApiError> {
    let (tx, mut rx) = oneshot::channel();
    let mutation = typed_mutation(
        Collection::ShoppingCarts,
        email,
        move |cart: &mut Vec<CartLine>| {
            if cart.is_empty() {
                return Err(StoreError::Aborted(EMPTY_CART.to_string()));
            }
            let _ = tx.send(std::mem::take(cart));
            Ok(())
        },
    );

    store
        .modify(Collection::ShoppingCarts, email, mutation)
        .await
        .map_err(|e| match e {
            StoreError::NotFound { .. } => ApiError::not_found("Could not find shopping cart"),
            StoreError::Aborted(_) => ApiError::validation(EMPTY_CART),
            other => other.into(),
        })?;

    rx.try_recv()
        .map_err(|_| ApiError::internal("The shopping cart could not be claimed"))
}

/// Merge claimed lines back after a declined payment, keeping anything
/// added in the meantime.
async fn restore_cart(
    store: &dyn DocumentStore,
    email: &str,
    lines: Vec<CartLine>,
) -> Result<(), ApiError> {
    let claimed = format!("{:?}", lines);
    let mutation = typed_mutation(
        Collection::ShoppingCarts,
        email,
        move |cart: &mut Vec<CartLine>| {
            merge_lines(cart, &lines);
            Ok(())
        },
    );
    match store.modify(Collection::ShoppingCarts, email, mutation).await {
        Ok(_) => Ok(()),
        Err(e) => {
            error!(
                email,
                collection = %Collection::ShoppingCarts,
                key = email,
                lines = %claimed,
                error = %e,
                "Payment failed and the shopping cart could not be restored"
            );
            Err(ApiError::partial_failure(
                "Could not make payment and the shopping cart could not be restored",
            ))
        }
    }
}

#[async_trait]
impl Resource for Purchases {
    fn verbs(&self) -> &'static [Verb] {
        &[Verb::Post]
    }

    async fn handle(&self, request: &ApiRequest) -> Result<Reply, ApiError> {
        match request.verb {
            Verb::Post => self.checkout(request).await,
            _ => Err(ApiError::method_not_allowed()),
        }
    }
}
