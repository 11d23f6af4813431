use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bearer token. `expires` is persisted as epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub email: String,
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires: DateTime<Utc>,
}

impl Token {
    /// Active while the expiry lies strictly in the future
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires > now
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }
}
