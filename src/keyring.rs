//! Ordered ring of signing secrets.
//!
//! Position 0 is the primary key and the only one used for signing. Every
//! other position holds a previously primary key kept so that tokens issued
//! before a rotation still verify.

use crate::error::{KeyRingError, KeyRingResult};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::Arc;

/// Separator accepted by [`KeyRing::from_delimited`].
pub const KEY_DELIMITER: char = ',';

/// Immutable, non-empty, ordered list of HMAC secrets.
///
/// Cloning is cheap and shares the underlying secrets.
#[derive(Clone)]
pub struct KeyRing {
    keys: Arc<[SecretString]>,
}

impl KeyRing {
    /// Build a ring from an ordered sequence of keys, newest first.
    ///
    /// Key content is not inspected.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the sequence is empty.
    pub fn new<I, K>(keys: I) -> KeyRingResult<Self>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys: Vec<SecretString> = keys
            .into_iter()
            .map(|key| SecretString::from(key.into()))
            .collect();

        if keys.is_empty() {
            return Err(KeyRingError::config(
                "key ring needs at least one key, given as a comma delimited string or a sequence",
            ));
        }

        Ok(Self { keys: keys.into() })
    }

    /// Build a ring from a comma delimited list of keys.
    ///
    /// Every segment is a key, empty ones included, so positions match the
    /// delimited list. No whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `keys` is empty.
    pub fn from_delimited(keys: &str) -> KeyRingResult<Self> {
        if keys.is_empty() {
            return Err(KeyRingError::config("delimited key list is empty"));
        }
        Self::new(keys.split(KEY_DELIMITER))
    }

    /// Number of keys in the ring.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false for a ring built through the public constructors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The key used for signing.
    #[must_use]
    pub fn primary(&self) -> Option<&SecretString> {
        self.keys.first()
    }

    /// Keys in rotation order, primary first.
    pub fn iter(&self) -> impl Iterator<Item = &SecretString> {
        self.keys.iter()
    }

    /// New ring with `key` as primary and the current keys shifted one
    /// position back.
    #[must_use]
    pub fn with_primary(&self, key: impl Into<String>) -> Self {
        let keys: Vec<SecretString> = std::iter::once(SecretString::from(key.into()))
            .chain(self.iter().map(copy_secret))
            .collect();
        Self { keys: keys.into() }
    }

    /// New ring keeping only the `max_keys` most recent keys.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `max_keys` is zero.
    pub fn truncated(&self, max_keys: usize) -> KeyRingResult<Self> {
        let max_keys = NonZeroUsize::new(max_keys)
            .ok_or_else(|| KeyRingError::config("key ring must retain at least one key"))?;
        Ok(self.retaining(max_keys))
    }

    pub(crate) fn retaining(&self, max_keys: NonZeroUsize) -> Self {
        let keys: Vec<SecretString> = self.iter().take(max_keys.get()).map(copy_secret).collect();
        Self { keys: keys.into() }
    }

    #[cfg(test)]
    pub(crate) fn empty_unchecked() -> Self {
        Self {
            keys: Vec::new().into(),
        }
    }
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_owned())
}

impl FromStr for KeyRing {
    type Err = KeyRingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_delimited(s)
    }
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRing")
            .field("len", &self.keys.len())
            .finish_non_exhaustive()
    }
}
