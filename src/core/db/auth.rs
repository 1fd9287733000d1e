use sha2::{Digest, Sha256};

use crate::core::gateway::Session;

/// Single configured admin account for the local backend.
#[derive(Debug, Clone)]
pub struct AdminCredential {
    email: String,
    password_sha256: String,
}

impl AdminCredential {
    pub fn new(email: impl Into<String>, password_sha256: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password_sha256: password_sha256.into().to_lowercase(),
        }
    }

    /// Build from a plain password (tests and first-time setup).
    pub fn from_password(email: impl Into<String>, password: &str) -> Self {
        Self::new(email, hash_password(password))
    }

    pub(super) fn verify(&self, email: &str, password: &str) -> Option<Session> {
        let matches = self.email.eq_ignore_ascii_case(email.trim())
            && hash_password(password) == self.password_sha256;
        matches.then(|| Session {
            email: self.email.clone(),
            access_token: uuid::Uuid::new_v4().to_string(),
        })
    }
}

pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}
