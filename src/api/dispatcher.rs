//! Request dispatch.
//!
//! A [`RouteTable`] is built once at startup and handed to the [`Dispatcher`].
//! Each path maps to one [`Resource`], which declares the verbs it answers.
//! Lookup failures never reach a resource: an unknown path is a 404 and a
//! verb outside the resource's set is a 405.

use async_trait::async_trait;
use axum::{
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::ApiError;

/// HTTP verbs a resource can answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(Verb::Get),
            Method::POST => Some(Verb::Post),
            Method::PUT => Some(Verb::Put),
            Method::DELETE => Some(Verb::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::Post => "post",
            Verb::Put => "put",
            Verb::Delete => "delete",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a resource operation gets to see about a request
#[derive(Debug)]
pub struct ApiRequest {
    pub verb: Verb,
    pub path: String,
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
    /// Decoded body; an empty object when the body was absent or unparseable
    pub payload: Value,
}

impl ApiRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Bearer token from the `token` header, empty when absent
    pub fn token(&self) -> &str {
        self.header("token").unwrap_or("")
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    /// A body field, if it is a string
    pub fn body_str(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    Json(Value),
    Html(String),
}

/// Status plus body. Serialized with the matching content type.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: ReplyBody,
}

impl Reply {
    /// 200 with an empty object
    pub fn ok() -> Self {
        Self::json(Value::Object(Map::new()))
    }

    pub fn json(value: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: ReplyBody::Json(value),
        }
    }

    pub fn html(markup: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            body: ReplyBody::Html(markup.into()),
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn content_type(&self) -> &'static str {
        match self.body {
            ReplyBody::Json(_) => "application/json",
            ReplyBody::Html(_) => "text/html; charset=utf-8",
        }
    }
}

impl From<ApiError> for Reply {
    fn from(err: ApiError) -> Self {
        let body = serde_json::to_value(err.body()).unwrap_or_default();
        Reply::json(body).with_status(err.status())
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let content_type = HeaderValue::from_static(self.content_type());
        let body = match self.body {
            ReplyBody::Json(value) => value.to_string(),
            ReplyBody::Html(markup) => markup,
        };
        (self.status, [(header::CONTENT_TYPE, content_type)], body).into_response()
    }
}

/// One addressable resource and the operations it supports
#[async_trait]
pub trait Resource: Send + Sync {
    /// Verbs this resource answers; anything else is a 405
    fn verbs(&self) -> &'static [Verb];

    async fn handle(&self, request: &ApiRequest) -> Result<Reply, ApiError>;
}

/// Immutable mapping from normalized path to resource
#[derive(Default)]
pub struct RouteTable {
    routes: HashMap<String, Arc<dyn Resource>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource under `path`. Surrounding slashes are ignored.
    pub fn with(mut self, path: &str, resource: impl Resource + 'static) -> Self {
        self.routes
            .insert(normalize_path(path).to_string(), Arc::new(resource));
        self
    }

    pub fn get(&self, path: &str) -> Option<&Arc<dyn Resource>> {
        self.routes.get(path)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

pub struct Dispatcher {
    routes: RouteTable,
}

impl Dispatcher {
    pub fn new(routes: RouteTable) -> Self {
        Self { routes }
    }

    pub async fn route(
        &self,
        method: Method,
        path: &str,
        headers: HeaderMap,
        query: HashMap<String, String>,
        body: &[u8],
    ) -> Reply {
        let path = normalize_path(path);

        let reply = match self.routes.get(path) {
            None => ApiError::not_found("Not found").into(),
            Some(resource) => match Verb::from_method(&method) {
                Some(verb) if resource.verbs().contains(&verb) => {
                    let request = ApiRequest {
                        verb,
                        path: path.to_string(),
                        headers,
                        query,
                        payload: parse_payload(body),
                    };
                    resource
                        .handle(&request)
                        .await
                        .unwrap_or_else(Reply::from)
                }
                _ => ApiError::method_not_allowed().into(),
            },
        };

        let status = reply.status.as_u16();
        if reply.status.is_success() {
            info!(method = %method, path, status, "Request handled");
        } else {
            warn!(method = %method, path, status, "Request failed");
        }
        reply
    }
}

/// Strip leading and trailing slashes
pub fn normalize_path(path: &str) -> &str {
    path.trim_matches('/')
}

/// Decode a request body. Absent or malformed bodies become an empty object
/// so field validation reports the missing fields.
pub fn parse_payload(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Object(Map::new());
    }
    serde_json::from_slice(body).unwrap_or_else(|_| Value::Object(Map::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Resource for Echo {
        fn verbs(&self) -> &'static [Verb] {
            &[Verb::Get, Verb::Post]
        }

        async fn handle(&self, request: &ApiRequest) -> Result<Reply, ApiError> {
            match request.body_str("fail") {
                Some(message) => Err(ApiError::validation(message)),
                None => Ok(Reply::json(request.payload.clone())),
            }
        }
    }

    struct Page;

    #[async_trait]
    impl Resource for Page {
        fn verbs(&self) -> &'static [Verb] {
            &[Verb::Get]
        }

        async fn handle(&self, _request: &ApiRequest) -> Result<Reply, ApiError> {
            Ok(Reply::html("<h1>Pizza</h1>"))
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(RouteTable::new().with("echo", Echo).with("/page/", Page))
    }

    async fn call(method: Method, path: &str, body: &[u8]) -> Reply {
        dispatcher()
            .route(method, path, HeaderMap::new(), HashMap::new(), body)
            .await
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/users/"), "users");
        assert_eq!(normalize_path("//ping"), "ping");
        assert_eq!(normalize_path("menu"), "menu");
        assert_eq!(normalize_path("/"), "");
    }

    #[test]
    fn test_parse_payload_is_lenient() {
        assert_eq!(parse_payload(b""), json!({}));
        assert_eq!(parse_payload(b"{not json"), json!({}));
        assert_eq!(parse_payload(br#"{"a": 1}"#), json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let reply = call(Method::GET, "/nope", b"").await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.body, ReplyBody::Json(json!({"Error": "Not found"})));
    }

    #[tokio::test]
    async fn test_unsupported_verb_is_405() {
        let reply = call(Method::DELETE, "/echo", b"").await;
        assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);

        let reply = call(Method::PATCH, "/echo", b"").await;
        assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_dispatches_with_normalized_path() {
        let reply = call(Method::POST, "/echo/", br#"{"x": [1, 2]}"#).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, ReplyBody::Json(json!({"x": [1, 2]})));
    }

    #[tokio::test]
    async fn test_malformed_body_reaches_handler_as_empty() {
        let reply = call(Method::POST, "echo", b"{{{").await;
        assert_eq!(reply.body, ReplyBody::Json(json!({})));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_error_body() {
        let reply = call(Method::POST, "echo", br#"{"fail": "Missing required fields"}"#).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            reply.body,
            ReplyBody::Json(json!({"Error": "Missing required fields"}))
        );
    }

    #[tokio::test]
    async fn test_content_type_follows_body() {
        let reply = call(Method::GET, "page", b"").await;
        assert_eq!(reply.content_type(), "text/html; charset=utf-8");

        let response = reply.into_response();
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html; charset=utf-8"
        );

        let response = call(Method::GET, "echo", b"").await.into_response();
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }
}
