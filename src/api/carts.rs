//! Shopping cart read, merge-add and remove-one.
//!
//! Cart changes go through [`DocumentStore::modify`] so concurrent requests
//! against the same cart are applied one after the other.
//!
//! [`DocumentStore::modify`]: crate::store::DocumentStore::modify

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::dispatcher::{ApiRequest, Reply, Resource, Verb};
use super::error::ApiError;
use super::{authorize, validation};
use crate::models::{merge_lines, remove_one, CartLine};
use crate::store::{read_as, typed_mutation, Collection, StoreError};
use crate::AppState;

const ITEM_NOT_FOUND: &str = "Could not find item";

pub struct ShoppingCarts {
    state: Arc<AppState>,
}

impl ShoppingCarts {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    async fn owner(&self, request: &ApiRequest) -> Result<String, ApiError> {
        let email = validation::email(request.query("email")).ok_or_else(ApiError::missing_field)?;
        authorize(&self.state, request, &email).await?;
        Ok(email)
    }

    async fn get(&self, request: &ApiRequest) -> Result<Reply, ApiError> {
        let email = self.owner(request).await?;

        let cart: Vec<CartLine> =
            read_as(self.state.store.as_ref(), Collection::ShoppingCarts, &email)
                .await
                .map_err(cart_error)?;
        Ok(Reply::json(serde_json::to_value(cart)?))
    }

    async fn add(&self, request: &ApiRequest) -> Result<Reply, ApiError> {
        let incoming =
            validation::cart_lines(request.field("items")).ok_or_else(ApiError::missing_field)?;
        let email = self.owner(request).await?;

        let mutation = typed_mutation(
            Collection::ShoppingCarts,
            &email,
            move |cart: &mut Vec<CartLine>| {
                merge_lines(cart, &incoming);
                Ok(())
            },
        );
        self.state
            .store
            .modify(Collection::ShoppingCarts, &email, mutation)
            .await
            .map_err(cart_error)?;

        debug!(email = %email, "Added items to shopping cart");
        Ok(Reply::ok())
    }

    async fn remove(&self, request: &ApiRequest) -> Result<Reply, ApiError> {
        let id = validation::item_id(request.field("item")).ok_or_else(ApiError::missing_field)?;
        let email = self.owner(request).await?;

        let mutation = typed_mutation(
            Collection::ShoppingCarts,
            &email,
            move |cart: &mut Vec<CartLine>| {
                if remove_one(cart, id) {
                    Ok(())
                } else {
                    Err(StoreError::Aborted(ITEM_NOT_FOUND.to_string()))
                }
            },
        );
        self.state
            .store
            .modify(Collection::ShoppingCarts, &email, mutation)
            .await
            .map_err(cart_error)?;

        debug!(email = %email, item = id, "Removed item from shopping cart");
        Ok(Reply::ok())
    }
}

fn cart_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound { .. } => ApiError::unknown("Could not find shopping cart"),
        StoreError::Aborted(_) => ApiError::not_found(ITEM_NOT_FOUND),
        other => other.into(),
    }
}

#[async_trait]
impl Resource for ShoppingCarts {
    fn verbs(&self) -> &'static [Verb] {
        &[Verb::Get, Verb::Put, Verb::Delete]
    }

    async fn handle(&self, request: &ApiRequest) -> Result<Reply, ApiError> {
        match request.verb {
            Verb::Get => self.get(request).await,
            Verb::Put => self.add(request).await,
            Verb::Delete => self.remove(request).await,
            _ => Err(ApiError::method_not_allowed()),
        }
    }
}
