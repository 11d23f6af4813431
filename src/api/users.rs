//! Account registration and self-service profile management.
//!
//! A user document and its shopping cart are created and destroyed as a
//! pair. When one half of the pair fails the handler either undoes the other
//! half or reports a partial failure with enough logged detail to reconcile.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::dispatcher::{ApiRequest, Reply, Resource, Verb};
use super::error::ApiError;
use super::{authorize, validation};
use crate::models::{User, UserResponse};
use crate::store::{exists, read_as, typed_mutation, Collection};
use crate::AppState;

pub struct Users {
    state: Arc<AppState>,
}

impl Users {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    async fn create(&self, request: &ApiRequest) -> Result<Reply, ApiError> {
        let name = validation::non_empty(request.body_str("name"));
        let address = validation::non_empty(request.body_str("address"));
        let email = validation::email(request.body_str("email"));
        let password = validation::password(request.body_str("password"));
        let tos_agreement = validation::accepted(request.field("tosAgreement"));

        let (Some(name), Some(address), Some(email), Some(password), true) =
            (name, address, email, password, tos_agreement)
        else {
            return Err(ApiError::missing_fields());
        };

        let store = self.state.store.as_ref();
        if exists(store, Collection::Users, &email).await? {
            return Err(ApiError::conflict("A user with that email already exists"));
        }

        let user = User {
            name,
            address,
            email: email.clone(),
            hashed_password: self.state.tokens.hasher().hash(&password),
            tos_agreement: true,
        };
        match store
            .create(Collection::Users, &email, &serde_json::to_value(&user)?)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => {
                return Err(ApiError::conflict("A user with that email already exists"))
            }
            Err(e) => {
                error!(email = %email, error = %e, "Could not create user");
                return Err(ApiError::internal("Could not create the new user"));
            }
        }

        self.create_cart(&email).await?;

        info!(email = %email, "Registered user");
        Ok(Reply::ok())
    }

    /// Second half of registration. On failure the user document is removed
    /// again so the pair never exists half-made.
    async fn create_cart(&self, email: &str) -> Result<(), ApiError> {
        let store = self.state.store.as_ref();
        let empty = json!([]);

        let err = match store.create(Collection::ShoppingCarts, email, &empty).await {
            Ok(()) => return Ok(()),
            // Left behind by an earlier deletion that only got halfway
            Err(e) if e.is_already_exists() => {
                match store.update(Collection::ShoppingCarts, email, &empty).await {
                    Ok(()) => {
                        warn!(email, "Reset leftover shopping cart for new user");
                        return Ok(());
                    }
                    Err(e) => e,
                }
            }
            Err(e) => e,
        };

        error!(email, error = %err, "Could not create shopping cart, removing user");
        match store.delete(Collection::Users, email).await {
            Ok(()) => Err(ApiError::internal("Could not create the shopping cart")),
            Err(rollback) => {
                error!(
                    email,
                    collection = %Collection::Users,
                    key = email,
                    error = %rollback,
                    "User exists without a shopping cart and could not be removed"
                );
                Err(ApiError::partial_failure(
                    "The user was created but the shopping cart was not",
                ))
            }
        }
    }

    async fn get(&self, request: &ApiRequest) -> Result<Reply, ApiError> {
        let email = validation::email(request.query("email")).ok_or_else(ApiError::missing_field)?;
        authorize(&self.state, request, &email).await?;

        let user: User = read_as(self.state.store.as_ref(), Collection::Users, &email)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    ApiError::not_found("The specified user does not exist")
                } else {
                    e.into()
                }
            })?;

        Ok(Reply::json(serde_json::to_value(UserResponse::from(user))?))
    }

    async fn update(&self, request: &ApiRequest) -> Result<Reply, ApiError> {
        let email = validation::email(request.body_str("email")).ok_or_else(ApiError::missing_field)?;
        let name = validation::non_empty(request.body_str("name"));
        let address = validation::non_empty(request.body_str("address"));
        let password = validation::password(request.body_str("password"));

        if name.is_none() && address.is_none() && password.is_none() {
            return Err(ApiError::validation("Missing fields to update"));
        }
        authorize(&self.state, request, &email).await?;

        let hashed_password = password.map(|p| self.state.tokens.hasher().hash(&p));
        let mutation = typed_mutation(Collection::Users, &email, move |user: &mut User| {
            if let Some(name) = name {
                user.name = name;
            }
            if let Some(address) = address {
                user.address = address;
            }
            if let Some(hashed_password) = hashed_password {
                user.hashed_password = hashed_password;
            }
            Ok(())
        });

        match self
            .state
            .store
            .modify(Collection::Users, &email, mutation)
            .await
        {
            Ok(_) => Ok(Reply::ok()),
            Err(e) if e.is_not_found() => {
                Err(ApiError::unknown("The specified user does not exist"))
            }
            Err(e) => {
                error!(email = %email, error = %e, "Could not update user");
                Err(ApiError::internal("Could not update the user"))
            }
        }
    }

    async fn delete(&self, request: &ApiRequest) -> Result<Reply, ApiError> {
        let email = validation::email(request.query("email")).ok_or_else(ApiError::missing_field)?;
        authorize(&self.state, request, &email).await?;

        let store = self.state.store.as_ref();
        match store.delete(Collection::Users, &email).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                return Err(ApiError::unknown("Could not find the specified user"))
            }
            Err(e) => {
                error!(email = %email, error = %e, "Could not delete user");
                return Err(ApiError::internal("Could not delete the specified user"));
            }
        }

        match store.delete(Collection::ShoppingCarts, &email).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => warn!(email = %email, "Deleted user had no shopping cart"),
            Err(e) => {
                error!(
                    email = %email,
                    collection = %Collection::ShoppingCarts,
                    key = %email,
                    error = %e,
                    "User deleted but the shopping cart remains and must be removed by hand"
                );
                return Err(ApiError::partial_failure(
                    "Could not delete the user shopping cart",
                ));
            }
        }

        info!(email = %email, "Deleted user");
        Ok(Reply::ok())
    }
}

#[async_trait]
impl Resource for Users {
    fn verbs(&self) -> &'static [Verb] {
        &[Verb::Post, Verb::Get, Verb::Put, Verb::Delete]
    }

    async fn handle(&self, request: &ApiRequest) -> Result<Reply, ApiError> {
        match request.verb {
            Verb::Post => self.create(request).await,
            Verb::Get => self.get(request).await,
            Verb::Put => self.update(request).await,
            Verb::Delete => self.delete(request).await,
        }
    }
}
