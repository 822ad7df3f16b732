//! Password hashing and verification.
//!
//! Argon2id with a per-password random salt, stored as a PHC string. The iteration
//! count comes from `PASSWORD_HASH_COST`; memory and parallelism stay at the crate's
//! recommended defaults.

use std::fmt;

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::rngs::OsRng;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("invalid argon2 parameters: {0}")]
    InvalidParams(String),

    #[error("password hashing failed: {0}")]
    HashingFailed(String),

    #[error("stored password hash is not a valid PHC string")]
    InvalidHashFormat,

    #[error("password hashing task was cancelled")]
    TaskCancelled,
}

/// Clear text password, wiped from memory on drop. Debug output is redacted.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ClearTextPassword(String);

impl ClearTextPassword {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for ClearTextPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClearTextPassword")
            .field(&"[REDACTED]")
            .finish()
    }
}

/// Argon2id hash in PHC string format. Safe to persist.
#[derive(Clone, PartialEq, Eq)]
pub struct HashedPassword {
    hash: String,
}

impl HashedPassword {
    /// Wraps a PHC string loaded from storage, rejecting anything that does not parse.
    pub fn from_phc_string(s: impl Into<String>) -> Result<Self, PasswordError> {
        let hash = s.into();
        PasswordHash::new(&hash).map_err(|_| PasswordError::InvalidHashFormat)?;
        Ok(Self { hash })
    }

    pub fn as_phc_string(&self) -> &str {
        &self.hash
    }

    pub fn into_phc_string(self) -> String {
        self.hash
    }

    /// Constant-time verification. The parameters are read back from the PHC string,
    /// so hashes created under an older cost still verify.
    pub fn verify(&self, password: &ClearTextPassword) -> bool {
        let Ok(parsed) = PasswordHash::new(&self.hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

impl fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashedPassword")
            .field("hash", &"[HASH]")
            .finish()
    }
}

/// PasswordHasherConfig
///
/// Cost-parameterised Argon2id hasher shared through application state.
#[derive(Clone, Copy, Debug)]
pub struct PasswordHasherConfig {
    cost: u32,
}

impl PasswordHasherConfig {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    fn argon2(&self) -> Result<Argon2<'static>, PasswordError> {
        let params = Params::new(
            Params::DEFAULT_M_COST,
            self.cost,
            Params::DEFAULT_P_COST,
            None,
        )
        .map_err(|e| PasswordError::InvalidParams(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    pub fn hash(&self, password: &ClearTextPassword) -> Result<HashedPassword, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;
        Ok(HashedPassword {
            hash: hash.to_string(),
        })
    }

    /// Hashes on the blocking pool so a slow hash never stalls the async workers.
    pub async fn hash_blocking(
        self,
        password: ClearTextPassword,
    ) -> Result<HashedPassword, PasswordError> {
        tokio::task::spawn_blocking(move || self.hash(&password))
            .await
            .map_err(|_| PasswordError::TaskCancelled)?
    }

    pub async fn verify_blocking(
        hashed: HashedPassword,
        password: ClearTextPassword,
    ) -> Result<bool, PasswordError> {
        tokio::task::spawn_blocking(move || hashed.verify(&password))
            .await
            .map_err(|_| PasswordError::TaskCancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hasher = PasswordHasherConfig::new(1);
        let hashed = hasher.hash(&ClearTextPassword::new("correct horse")).unwrap();

        assert!(hashed.as_phc_string().starts_with("$argon2id$"));
        assert!(hashed.verify(&ClearTextPassword::new("correct horse")));
        assert!(!hashed.verify(&ClearTextPassword::new("battery staple")));
    }

    #[test]
    fn salts_differ_between_hashes() {
        let hasher = PasswordHasherConfig::new(1);
        let a = hasher.hash(&ClearTextPassword::new("same")).unwrap();
        let b = hasher.hash(&ClearTextPassword::new("same")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn cost_is_recorded_in_the_phc_string() {
        let hashed = PasswordHasherConfig::new(3)
            .hash(&ClearTextPassword::new("pw"))
            .unwrap();
        assert!(hashed.as_phc_string().contains("t=3"));
    }

    #[test]
    fn rejects_malformed_phc_strings() {
        assert!(HashedPassword::from_phc_string("not-a-phc-string").is_err());
    }

    #[test]
    fn debug_output_is_redacted() {
        let password = ClearTextPassword::new("hunter2");
        assert!(!format!("{password:?}").contains("hunter2"));
    }
}
