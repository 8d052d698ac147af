//! Error types using thiserror 2.0.
//!
//! Construction and call-time misconfiguration surface as [`KeyRingError`].
//! Failing to authenticate a token is not an error; see
//! [`Verification`](crate::Verification).

use thiserror::Error;

/// Errors raised by the signing primitive.
#[derive(Error, Debug)]
pub enum JwsError {
    /// Token does not have the compact `header.payload.signature` shape
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// A token segment is not valid base64url
    #[error("Invalid base64url segment: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A token segment is not valid JSON
    #[error("Invalid JSON segment: {0}")]
    Json(#[from] serde_json::Error),

    /// The underlying HMAC operation failed
    #[error("Signature operation failed: {0}")]
    Crypto(#[from] jsonwebtoken::errors::Error),
}

impl JwsError {
    /// Create a malformed token error.
    #[must_use]
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

/// Key ring signer errors.
#[derive(Error, Debug)]
pub enum KeyRingError {
    /// Signer could not be built from the supplied settings
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Key ring is empty at call time
    #[error("No signing keys configured")]
    NoKeysConfigured,

    /// Payload could not be serialized for signing
    #[error("Payload serialization failed: {0}")]
    Payload(#[source] serde_json::Error),

    /// Signing primitive failed while encoding
    #[error(transparent)]
    Jws(#[from] JwsError),
}

/// Result type for key ring operations.
pub type KeyRingResult<T> = Result<T, KeyRingError>;

impl KeyRingError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Check if the error comes from signer setup rather than a signing call.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidConfiguration(_) | Self::NoKeysConfigured)
    }
}
