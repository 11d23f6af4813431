use async_trait::async_trait;

use super::dispatcher::{ApiRequest, Reply, Resource, Verb};
use super::error::ApiError;

/// Liveness check
pub struct Ping;

#[async_trait]
impl Resource for Ping {
    fn verbs(&self) -> &'static [Verb] {
        &[Verb::Get]
    }

    async fn handle(&self, _request: &ApiRequest) -> Result<Reply, ApiError> {
        Ok(Reply::ok())
    }
}
