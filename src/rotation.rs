//! Atomic replacement of the active signer.
//!
//! A [`KeyRingSigner`] never changes. Rotating keys means building a new one
//! and swapping it in; requests already holding the previous signer finish
//! with it.

use crate::error::{KeyRingError, KeyRingResult};
use crate::header::HeaderFields;
use crate::jws::{HmacJws, JwsPrimitive};
use crate::signer::{KeyRingSigner, Verification};
use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::info;

/// Shared handle to the signer currently in use.
pub struct ActiveSigner<J = HmacJws> {
    active: ArcSwap<KeyRingSigner<J>>,
}

impl<J: JwsPrimitive> ActiveSigner<J> {
    /// Creates a handle starting with `signer`.
    #[must_use]
    pub fn new(signer: KeyRingSigner<J>) -> Self {
        Self {
            active: ArcSwap::from_pointee(signer),
        }
    }

    /// Gets the signer currently in use.
    #[must_use]
    pub fn current(&self) -> Arc<KeyRingSigner<J>> {
        self.active.load_full()
    }

    /// Swaps in `signer` and returns the one it replaced.
    pub fn replace(&self, signer: KeyRingSigner<J>) -> Arc<KeyRingSigner<J>> {
        let ring_size = signer.keys().len();
        let previous = self.active.swap(Arc::new(signer));
        info!(ring_size, "Active signer replaced");
        previous
    }

    /// Encodes with the current signer.
    ///
    /// # Errors
    ///
    /// Same as [`KeyRingSigner::encode`].
    pub fn encode<P>(&self, payload: &P, headers: Option<&HeaderFields>) -> KeyRingResult<String>
    where
        P: Serialize + ?Sized,
    {
        self.active.load().encode(payload, headers)
    }

    /// Decodes with the current signer.
    ///
    /// # Errors
    ///
    /// Same as [`KeyRingSigner::decode`].
    pub fn decode<P>(&self, token: &str) -> KeyRingResult<Verification<P>>
    where
        P: DeserializeOwned,
    {
        self.active.load().decode(token)
    }

    /// Decodes with the current signer, returning only the payload.
    ///
    /// # Errors
    ///
    /// Same as [`KeyRingSigner::decode_payload`].
    pub fn decode_payload<P>(&self, token: &str) -> KeyRingResult<Option<P>>
    where
        P: DeserializeOwned,
    {
        self.active.load().decode_payload(token)
    }
}

impl<J: JwsPrimitive + Clone> ActiveSigner<J> {
    /// Makes `key` the new primary, keeping the current keys for
    /// verification, and returns the replaced signer.
    pub fn rotate(&self, key: impl Into<String>) -> Arc<KeyRingSigner<J>> {
        let key: String = key.into();
        let previous = self.active.rcu(|current| current.rotated(key.clone()));
        info!(ring_size = previous.keys().len() + 1, "Signing key rotated");
        previous
    }

    /// Makes `key` the new primary and keeps at most `max_keys` keys in the
    /// ring, dropping the oldest. Returns the replaced signer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `max_keys` is zero.
    pub fn rotate_within(
        &self,
        key: impl Into<String>,
        max_keys: usize,
    ) -> KeyRingResult<Arc<KeyRingSigner<J>>> {
        let max_keys = NonZeroUsize::new(max_keys)
            .ok_or_else(|| KeyRingError::config("key ring must retain at least one key"))?;
        let key: String = key.into();
        let previous = self
            .active
            .rcu(|current| current.rotated_within(key.clone(), max_keys));
        info!(
            ring_size = (previous.keys().len() + 1).min(max_keys.get()),
            max_keys = max_keys.get(),
            "Signing key rotated"
        );
        Ok(previous)
    }
}

impl<J> std::fmt::Debug for ActiveSigner<J>
where
    J: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveSigner")
            .field("active", &self.active.load())
            .finish()
    }
}
