use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Keyed one-way password hashing (HMAC-SHA256, hex encoded).
///
/// The same instance hashes passwords at registration and at login, so only
/// hashes are ever compared.
#[derive(Clone)]
pub struct PasswordHasher {
    secret: Vec<u8>,
}

impl PasswordHasher {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    pub fn hash(&self, password: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length");
        mac.update(password.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Hash `password` and compare against a stored hash in constant time
    pub fn matches(&self, password: &str, stored_hash: &str) -> bool {
        let computed = self.hash(password);
        computed.len() == stored_hash.len()
            && computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}
