mod carts;
mod dispatcher;
pub mod error;
mod menu;
mod ping;
mod purchases;
mod tokens;
mod users;
pub mod validation;

#[cfg(test)]
mod testing;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, Method, Uri},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use dispatcher::{
    normalize_path, parse_payload, ApiRequest, Dispatcher, Reply, ReplyBody, Resource, RouteTable,
    Verb,
};
pub use error::{ApiError, ErrorCode};
pub use menu::ensure_menu;

use crate::AppState;

/// Every resource the service exposes, keyed by path
pub fn route_table(state: Arc<AppState>) -> RouteTable {
    RouteTable::new()
        .with("ping", ping::Ping)
        .with("users", users::Users::new(state.clone()))
        .with("tokens", tokens::Tokens::new(state.clone()))
        .with("menu", menu::Menu::new(state.clone()))
        .with("shoppingCarts", carts::ShoppingCarts::new(state.clone()))
        .with("purchases", purchases::Purchases::new(state))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let dispatcher = Arc::new(Dispatcher::new(route_table(state)));

    Router::new()
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

/// Every request lands here; the route table decides what happens next
async fn dispatch(
    State(dispatcher): State<Arc<Dispatcher>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    query: Option<Query<HashMap<String, String>>>,
    body: Bytes,
) -> Reply {
    let query = query.map(|Query(query)| query).unwrap_or_default();
    dispatcher
        .route(method, uri.path(), headers, query, &body)
        .await
}

/// Gate for every owner-scoped operation: the `token` header must hold a live
/// token issued to `email`.
async fn authorize(state: &AppState, request: &ApiRequest, email: &str) -> Result<(), ApiError> {
    if state.tokens.verify(request.token(), email).await {
        Ok(())
    } else {
        Err(ApiError::invalid_token())
    }
}
