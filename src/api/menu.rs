use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::dispatcher::{ApiRequest, Reply, Resource, Verb};
use super::error::ApiError;
use super::{authorize, validation};
use crate::models::{default_menu, MENU_KEY};
use crate::store::{Collection, DocumentStore, StoreError};
use crate::AppState;

/// Read-only catalog, visible to any signed-in user
pub struct Menu {
    state: Arc<AppState>,
}

impl Menu {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Resource for Menu {
    fn verbs(&self) -> &'static [Verb] {
        &[Verb::Get]
    }

    async fn handle(&self, request: &ApiRequest) -> Result<Reply, ApiError> {
        let email = validation::email(request.query("email").or_else(|| request.body_str("email")))
            .ok_or_else(ApiError::missing_field)?;
        authorize(&self.state, request, &email).await?;

        match self.state.store.read(Collection::Menu, MENU_KEY).await {
            Ok(menu) => Ok(Reply::json(menu)),
            Err(e) if e.is_not_found() => Err(ApiError::not_found("The menu is not available")),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write the default catalog unless one is already stored. Returns whether
/// anything was written.
pub async fn ensure_menu(store: &dyn DocumentStore) -> Result<bool, StoreError> {
    let catalog = serde_json::to_value(default_menu())?;
    match store.create(Collection::Menu, MENU_KEY, &catalog).await {
        Ok(()) => {
            info!("Seeded default menu");
            Ok(true)
        }
        Err(e) if e.is_already_exists() => Ok(false),
        Err(e) => Err(e),
    }
}
