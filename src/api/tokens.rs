//! Login, token lookup, renewal and logout.

use async_trait::async_trait;
use std::sync::Arc;

use super::dispatcher::{ApiRequest, Reply, Resource, Verb};
use super::error::ApiError;
use super::validation;
use crate::auth::AuthError;
use crate::AppState;

pub struct Tokens {
    state: Arc<AppState>,
}

impl Tokens {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    async fn create(&self, request: &ApiRequest) -> Result<Reply, ApiError> {
        let email = validation::email(request.body_str("email"));
        let password = validation::non_empty(request.body_str("password"));
        let (Some(email), Some(password)) = (email, password) else {
            return Err(ApiError::missing_fields());
        };

        let token = self.state.tokens.issue(&email, &password).await?;
        Ok(Reply::json(serde_json::to_value(token)?))
    }

    async fn get(&self, request: &ApiRequest) -> Result<Reply, ApiError> {
        let id = validation::token_id(request.query("id")).ok_or_else(ApiError::missing_field)?;

        let token = self.state.tokens.lookup(&id).await.map_err(|e| match e {
            AuthError::TokenNotFound(_) => ApiError::not_found("Could not find the specified token"),
            other => other.into(),
        })?;
        Ok(Reply::json(serde_json::to_value(token)?))
    }

    async fn update(&self, request: &ApiRequest) -> Result<Reply, ApiError> {
        let id = validation::token_id(request.body_str("id"));
        let extend = validation::accepted(request.field("extend"));
        let (Some(id), true) = (id, extend) else {
            return Err(ApiError::validation(
                "Missing required field(s) or field(s) are invalid",
            ));
        };

        self.state.tokens.renew(&id).await?;
        Ok(Reply::ok())
    }

    async fn delete(&self, request: &ApiRequest) -> Result<Reply, ApiError> {
        let id = validation::token_id(request.query("id")).ok_or_else(ApiError::missing_field)?;

        self.state.tokens.revoke(&id).await.map_err(|e| match e {
            AuthError::TokenNotFound(_) => ApiError::unknown("Could not find the specified token"),
            other => other.into(),
        })?;
        Ok(Reply::ok())
    }
}

#[async_trait]
impl Resource for Tokens {
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
