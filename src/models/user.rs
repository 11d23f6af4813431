//! Account models.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name: String,
    pub address: String,
    pub email: String,
    pub hashed_password: String,
    pub tos_agreement: bool,
}

/// A user as returned to its owner, without the password hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub name: String,
    pub address: String,
    pub email: String,
    pub tos_agreement: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            name: user.name,
            address: user.address,
            email: user.email,
            tos_agreement: user.tos_agreement,
        }
    }
}
