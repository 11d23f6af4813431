//! Token issuance, verification, renewal and revocation.
//!
//! Tokens and users are plain documents in the store. A token is valid for
//! an email while it exists, names that email, and has not expired. Expiry is
//! evaluated on every check; nothing sweeps expired tokens.

mod password;

pub use password::PasswordHasher;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{Token, User};
use crate::store::{read_as, Collection, DocumentStore, StoreError};
use crate::utils::random_id;

/// Length of generated token identifiers
pub const TOKEN_ID_LEN: usize = 20;

/// Attempts at finding an unused token id before giving up
const MAX_ID_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no user registered with email {0}")]
    UserNotFound(String),

    #[error("password does not match the stored password")]
    InvalidCredentials,

    #[error("token {0} does not exist")]
    TokenNotFound(String),

    #[error("token {0} has already expired")]
    AlreadyExpired(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct TokenAuthority {
    store: Arc<dyn DocumentStore>,
    hasher: PasswordHasher,
    ttl: Duration,
}

impl TokenAuthority {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        hasher: PasswordHasher,
        ttl: std::time::Duration,
    ) -> Self {
        let ttl = Duration::from_std(ttl).unwrap_or_else(|_| Duration::hours(1));
        Self { store, hasher, ttl }
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    /// Expiry for a token issued or renewed at `now`, at the millisecond
    /// precision it is persisted with
    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        (now + self.ttl).trunc_subsecs(3)
    }

    /// Check credentials and persist a fresh token for the user
    pub async fn issue(&self, email: &str, password: &str) -> Result<Token, AuthError> {
        let user: User = match read_as(self.store.as_ref(), Collection::Users, email).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => return Err(AuthError::UserNotFound(email.to_string())),
            Err(e) => return Err(e.into()),
        };

        if !self.hasher.matches(password, &user.hashed_password) {
            debug!(email, "Password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            let token = Token {
                email: user.email.clone(),
                id: random_id(TOKEN_ID_LEN),
                expires: self.expiry_from(Utc::now()),
            };
            let doc = serde_json::to_value(&token).map_err(StoreError::from)?;

            match self.store.create(Collection::Tokens, &token.id, &doc).await {
                Ok(()) => {
                    info!(email = %token.email, "Issued token");
                    return Ok(token);
                }
                Err(e) if e.is_already_exists() && attempts < MAX_ID_ATTEMPTS => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Whether `token_id` is currently valid for `email`. Never fails; any
    /// problem reading the token counts as invalid.
    pub async fn verify(&self, token_id: &str, email: &str) -> bool {
        match read_as::<Token>(self.store.as_ref(), Collection::Tokens, token_id).await {
            Ok(token) => token.email == email && token.is_active(),
            Err(StoreError::NotFound { .. } | StoreError::InvalidKey(_)) => false,
            Err(e) => {
                warn!(error = %e, "Token lookup failed during verification");
                false
            }
        }
    }

    pub async fn lookup(&self, token_id: &str) -> Result<Token, AuthError> {
        read_as(self.store.as_ref(), Collection::Tokens, token_id)
            .await
            .map_err(|e| token_error(token_id, e))
    }

    /// Push the expiry of an active token to one TTL from now. Expired tokens
    /// stay expired; the new expiry is never earlier than the old one.
    pub async fn renew(&self, token_id: &str) -> Result<Token, AuthError> {
        let mut token = self.lookup(token_id).await?;
        let now = Utc::now();
        if !token.is_active_at(now) {
            return Err(AuthError::AlreadyExpired(token_id.to_string()));
        }

        token.expires = token.expires.max(self.expiry_from(now));
        let doc = serde_json::to_value(&token).map_err(StoreError::from)?;
        self.store
            .update(Collection::Tokens, &token.id, &doc)
            .await
            .map_err(|e| token_error(token_id, e))?;

        debug!(email = %token.email, "Renewed token");
        Ok(token)
    }

    pub async fn revoke(&self, token_id: &str) -> Result<(), AuthError> {
        self.store
            .delete(Collection::Tokens, token_id)
            .await
            .map_err(|e| token_error(token_id, e))?;
        info!("Revoked token");
        Ok(())
    }
}

fn token_error(token_id: &str, e: StoreError) -> AuthError {
    match e {
        StoreError::NotFound { .. } | StoreError::InvalidKey(_) => {
            AuthError::TokenNotFound(token_id.to_string())
        }
        other => AuthError::Store(other),
    }
}
