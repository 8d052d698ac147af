//! Signer configuration loaded from environment variables.

use crate::algorithm::JwtAlgorithm;
use crate::error::{KeyRingError, KeyRingResult};
use crate::keyring::KeyRing;
use crate::signer::KeyRingSigner;
use std::env;

/// Comma delimited signing keys, newest first.
pub const KEYS_VAR: &str = "JWT_SIGNING_KEYS";

/// Signing algorithm name, HS512 when unset.
pub const ALGORITHM_VAR: &str = "JWT_ALGORITHM";

/// Key ring signer configuration.
#[derive(Debug, Clone)]
pub struct SignerConfig {
    /// Signing keys
    pub keys: KeyRing,
    /// Signing algorithm
    pub algorithm: JwtAlgorithm,
}

impl SignerConfig {
    /// Load configuration from environment variables, reading `.env` first
    /// when present.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `JWT_SIGNING_KEYS` is missing or
    /// holds no key, or if `JWT_ALGORITHM` is not supported.
    pub fn from_env() -> KeyRingResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`SignerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> KeyRingResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let keys = lookup(KEYS_VAR)
            .ok_or_else(|| KeyRingError::config(format!("{} is not set", KEYS_VAR)))?;
        let keys = KeyRing::from_delimited(&keys)?;

        let algorithm = match lookup(ALGORITHM_VAR) {
            Some(name) => name.parse()?,
            None => JwtAlgorithm::default(),
        };

        Ok(Self { keys, algorithm })
    }

    /// Build the HMAC signer described by this configuration.
    #[must_use]
    pub fn into_signer(self) -> KeyRingSigner {
        KeyRingSigner::new(self.keys, self.algorithm)
    }
}
