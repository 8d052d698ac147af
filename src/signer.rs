//! Key ring signer: encodes with the primary key, decodes with any key.
//!
//! Decoding scans the ring from position 0 upward and reports the position of
//! the key that verified the token. A position above 0 means the token was
//! signed before the last rotation and should be reissued.

use crate::algorithm::JwtAlgorithm;
use crate::error::{JwsError, KeyRingError, KeyRingResult};
use crate::header::{normalize_header, HeaderFields};
use crate::jws::{HmacJws, JwsPrimitive};
use crate::keyring::KeyRing;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::num::NonZeroUsize;
use tracing::{debug, info};

/// A token that verified under one of the ring's keys.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedToken<P> {
    /// Header fields as signed
    pub header: HeaderFields,
    /// Payload
    pub payload: P,
    /// Base64url encoded signature
    pub signature: String,
    /// Ring position of the key that verified the token
    pub index: usize,
}

impl<P> DecodedToken<P> {
    /// Signed with the primary key.
    #[must_use]
    pub const fn is_current(&self) -> bool {
        self.index == 0
    }

    /// Signed with a key that has since been rotated out of position 0.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        self.index > 0
    }
}

/// Outcome of a decode.
///
/// Callers only learn whether the token authenticated, never why it did not.
#[derive(Debug, Clone, PartialEq)]
pub enum Verification<P> {
    /// Verified under the key at `index`
    Authenticated(DecodedToken<P>),
    /// No key verified the token, or the token could not be read
    Unauthenticated,
}

impl<P> Verification<P> {
    /// Check if the token authenticated.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// Ring position of the verifying key.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Authenticated(decoded) => Some(decoded.index),
            Self::Unauthenticated => None,
        }
    }

    /// Full decoded token, if authenticated.
    #[must_use]
    pub fn into_decoded(self) -> Option<DecodedToken<P>> {
        match self {
            Self::Authenticated(decoded) => Some(decoded),
            Self::Unauthenticated => None,
        }
    }

    /// Payload only, if authenticated.
    #[must_use]
    pub fn into_payload(self) -> Option<P> {
        self.into_decoded().map(|decoded| decoded.payload)
    }
}

/// Signs with the primary key of a [`KeyRing`] and verifies against all of
/// them, under an algorithm fixed at construction.
#[derive(Debug, Clone)]
pub struct KeyRingSigner<J = HmacJws> {
    keys: KeyRing,
    algorithm: JwtAlgorithm,
    primitive: J,
}

impl KeyRingSigner<HmacJws> {
    /// Create a signer using the default HMAC primitive.
    #[must_use]
    pub fn new(keys: KeyRing, algorithm: JwtAlgorithm) -> Self {
        Self::with_primitive(keys, algorithm, HmacJws)
    }

    /// Create an HS512 signer from an ordered sequence of keys.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if no key is given.
    pub fn from_keys<I, K>(keys: I) -> KeyRingResult<Self>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Ok(Self::new(KeyRing::new(keys)?, JwtAlgorithm::default()))
    }

    /// Create a signer from a comma delimited key list and an optional
    /// algorithm name. A missing algorithm means HS512.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if no key is given or the algorithm is
    /// not supported.
    pub fn from_delimited(keys: &str, algorithm: Option<&str>) -> KeyRingResult<Self> {
        let algorithm = match algorithm {
            Some(name) => name.parse()?,
            None => JwtAlgorithm::default(),
        };
        Ok(Self::new(KeyRing::from_delimited(keys)?, algorithm))
    }
}

impl<J: JwsPrimitive> KeyRingSigner<J> {
    /// Create a signer over a custom signing primitive.
    #[must_use]
    pub fn with_primitive(keys: KeyRing, algorithm: JwtAlgorithm, primitive: J) -> Self {
        Self {
            keys,
            algorithm,
            primitive,
        }
    }

    /// The signer's key ring.
    #[must_use]
    pub fn keys(&self) -> &KeyRing {
        &self.keys
    }

    /// The fixed signing algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> JwtAlgorithm {
        self.algorithm
    }

    /// Sign `payload` with the primary key.
    ///
    /// `headers` are copied into the token header; `typ` and `alg` are always
    /// overwritten and `index` is removed.
    ///
    /// # Errors
    ///
    /// Returns `NoKeysConfigured` for an empty ring, `Payload` if the payload
    /// cannot be serialized, and the primitive's error if signing fails.
    pub fn encode<P>(&self, payload: &P, headers: Option<&HeaderFields>) -> KeyRingResult<String>
    where
        P: Serialize + ?Sized,
    {
        let header = normalize_header(headers, self.algorithm);
        let primary = self.keys.primary().ok_or(KeyRingError::NoKeysConfigured)?;
        let payload = serde_json::to_value(payload).map_err(KeyRingError::Payload)?;

        let token = self
            .primitive
            .sign(&header, &payload, primary.expose_secret().as_bytes())?;

        debug!(algorithm = %self.algorithm, "Token signed with primary key");
        Ok(token)
    }

    /// Verify `token` against the ring and return header, payload, signature
    /// and the position of the verifying key.
    ///
    /// Malformed, forged and foreign-key tokens all yield
    /// [`Verification::Unauthenticated`].
    ///
    /// # Errors
    ///
    /// Returns `NoKeysConfigured` for an empty ring.
    pub fn decode<P>(&self, token: &str) -> KeyRingResult<Verification<P>>
    where
        P: DeserializeOwned,
    {
        if self.keys.is_empty() {
            return Err(KeyRingError::NoKeysConfigured);
        }

        match self.scan(token) {
            Ok(Some(decoded)) => {
                if decoded.is_stale() {
                    info!(
                        key_index = decoded.index,
                        ring_size = self.keys.len(),
                        "Token verified with rotated key"
                    );
                } else {
                    debug!(key_index = decoded.index, "Token verified with primary key");
                }
                Ok(Verification::Authenticated(decoded))
            }
            Ok(None) => {
                debug!(ring_size = self.keys.len(), "No key verified token");
                Ok(Verification::Unauthenticated)
            }
            Err(error) => {
                debug!(error = %error, "Token rejected");
                Ok(Verification::Unauthenticated)
            }
        }
    }

    /// Like [`KeyRingSigner::decode`] but return only the payload.
    ///
    /// # Errors
    ///
    /// Returns `NoKeysConfigured` for an empty ring.
    pub fn decode_payload<P>(&self, token: &str) -> KeyRingResult<Option<P>>
    where
        P: DeserializeOwned,
    {
        Ok(self.decode(token)?.into_payload())
    }

    /// Sign a stale token's payload again with the primary key.
    ///
    /// Returns `None` when the token is already current. Non-reserved header
    /// fields are carried over.
    ///
    /// # Errors
    ///
    /// Same as [`KeyRingSigner::encode`].
    pub fn reissue<P>(&self, decoded: &DecodedToken<P>) -> KeyRingResult<Option<String>>
    where
        P: Serialize,
    {
        if decoded.is_current() {
            return Ok(None);
        }
        self.encode(&decoded.payload, Some(&decoded.header)).map(Some)
    }

    // First key to verify wins; any error ends the scan.
    fn scan<P: DeserializeOwned>(&self, token: &str) -> Result<Option<DecodedToken<P>>, JwsError> {
        for (index, key) in self.keys.iter().enumerate() {
            if !self
                .primitive
                .verify(token, self.algorithm, key.expose_secret().as_bytes())?
            {
                continue;
            }

            let raw = self.primitive.decode(token)?;
            return Ok(Some(DecodedToken {
                header: raw.header,
                payload: serde_json::from_value(raw.payload)?,
                signature: raw.signature,
                index,
            }));
        }
        Ok(None)
    }
}

impl<J: JwsPrimitive + Clone> KeyRingSigner<J> {
    /// New signer whose ring has `key` as primary and the current keys
    /// shifted back one position. Algorithm and primitive are kept.
    #[must_use]
    pub fn rotated(&self, key: impl Into<String>) -> Self {
        Self::with_primitive(self.keys.with_primary(key), self.algorithm, self.primitive.clone())
    }

    /// Like [`KeyRingSigner::rotated`], then keeps only the `max_keys` most
    /// recent keys.
    #[must_use]
    pub fn rotated_within(&self, key: impl Into<String>, max_keys: NonZeroUsize) -> Self {
        Self::with_primitive(
            self.keys.with_primary(key).retaining(max_keys),
            self.algorithm,
            self.primitive.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jws::RawToken;
    use serde::Deserialize;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const KEY1: &str = "abcdefgh12345678";
    const KEY2: &str = "o0110o|o0110o";

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Scope {
        scope: String,
    }

    fn signer() -> KeyRingSigner {
        KeyRingSigner::from_keys([KEY1, KEY2]).unwrap()
    }

    fn sign_with(key: &str, payload: &Value) -> String {
        HmacJws
            .sign(
                &normalize_header(None, JwtAlgorithm::HS512),
                payload,
                key.as_bytes(),
            )
            .unwrap()
    }

    /// Primitive that fails every call and counts verify attempts.
    #[derive(Clone, Default)]
    struct FailingJws {
        verify_calls: Arc<AtomicUsize>,
    }

    impl JwsPrimitive for FailingJws {
        fn sign(&self, _: &HeaderFields, _: &Value, _: &[u8]) -> Result<String, JwsError> {
            Err(JwsError::malformed("signing backend unavailable"))
        }

        fn verify(&self, _: &str, _: JwtAlgorithm, _: &[u8]) -> Result<bool, JwsError> {
            self.verify_calls.fetch_add(1, Ordering::SeqCst);
            Err(JwsError::malformed("cannot parse"))
        }

        fn decode(&self, _: &str) -> Result<RawToken, JwsError> {
            Err(JwsError::malformed("cannot parse"))
        }
    }

    /// Primitive that accepts a token under every key.
    #[derive(Clone, Default)]
    struct AcceptAllJws {
        verify_calls: Arc<AtomicUsize>,
    }

    impl JwsPrimitive for AcceptAllJws {
        fn sign(&self, header: &HeaderFields, payload: &Value, secret: &[u8]) -> Result<String, JwsError> {
            HmacJws.sign(header, payload, secret)
        }

        fn verify(&self, _: &str, _: JwtAlgorithm, _: &[u8]) -> Result<bool, JwsError> {
            self.verify_calls.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        fn decode(&self, token: &str) -> Result<RawToken, JwsError> {
            HmacJws.decode(token)
        }
    }

    #[test]
    fn test_round_trip_payload() {
        let signer = signer();
        let content = Scope {
            scope: "root".to_string(),
        };

        let token = signer.encode(&content, None).unwrap();
        let decoded: Option<Scope> = signer.decode_payload(&token).unwrap();

        assert_eq!(decoded, Some(content));
    }

    #[test]
    fn test_encode_uses_primary_key() {
        let payload = json!({"scope": "root"});
        let token = signer().encode(&payload, None).unwrap();

        assert_eq!(token, sign_with(KEY1, &payload));
    }

    #[test]
    fn test_decode_reports_primary_index() {
        let token = sign_with(KEY1, &json!({"scope": "root"}));
        let decoded = signer().decode::<Value>(&token).unwrap().into_decoded().unwrap();

        assert_eq!(decoded.index, 0);
        assert!(decoded.is_current());
        assert_eq!(decoded.header["typ"], "JWT");
        assert_eq!(decoded.header["alg"], "HS512");
    }

    #[test]
    fn test_decode_reports_stale_index() {
        let token = sign_with(KEY2, &json!({"scope": "root"}));
        let decoded = signer().decode::<Scope>(&token).unwrap().into_decoded().unwrap();

        assert_eq!(decoded.index, 1);
        assert!(decoded.is_stale());
        assert_eq!(decoded.payload.scope, "root");
        assert_eq!(decoded.signature, token.rsplit('.').next().unwrap());
    }

    #[test]
    fn test_foreign_key_is_unauthenticated() {
        let token = sign_with("bad-key", &json!({"scope": "root"}));

        assert_eq!(
            signer().decode::<Value>(&token).unwrap(),
            Verification::Unauthenticated
        );
        assert_eq!(signer().decode_payload::<Value>(&token).unwrap(), None);
    }

    #[test]
    fn test_garbage_token_is_unauthenticated() {
        for token in ["", "not-a-token", "a.b.c", "...."] {
            let result = signer().decode::<Value>(token).unwrap();
            assert!(!result.is_authenticated(), "{token}");
            assert_eq!(result.index(), None);
        }
    }

    #[test]
    fn test_payload_shape_mismatch_is_unauthenticated() {
        let token = signer().encode(&json!({"other": 1}), None).unwrap();
        let result = signer().decode::<Scope>(&token).unwrap();

        assert_eq!(result, Verification::Unauthenticated);
    }

    #[test]
    fn test_algorithm_fixed_at_construction() {
        let hs256 = KeyRingSigner::from_delimited(KEY1, Some("HS256")).unwrap();
        let token = hs256.encode(&json!({"a": 1}), None).unwrap();

        // Same key, different algorithm: not accepted.
        assert!(!signer().decode::<Value>(&token).unwrap().is_authenticated());
        assert!(hs256.decode::<Value>(&token).unwrap().is_authenticated());
    }

    #[test]
    fn test_header_overrides_signed() {
        let mut headers = HeaderFields::new();
        headers.insert("kid".to_string(), json!("2024-01"));
        headers.insert("alg".to_string(), json!("none"));
        headers.insert("index".to_string(), json!(7));

        let signer = signer();
        let token = signer.encode(&json!({"a": 1}), Some(&headers)).unwrap();
        let decoded = signer.decode::<Value>(&token).unwrap().into_decoded().unwrap();

        assert_eq!(decoded.header["kid"], "2024-01");
        assert_eq!(decoded.header["alg"], "HS512");
        assert!(!decoded.header.contains_key("index"));
        assert_eq!(decoded.index, 0);
        assert_eq!(headers["alg"], "none");
        assert_eq!(headers["index"], 7);
    }

    #[test]
    fn test_scan_errors_are_swallowed() {
        let jws = FailingJws::default();
        let signer = KeyRingSigner::with_primitive(
            KeyRing::new([KEY1, KEY2]).unwrap(),
            JwtAlgorithm::HS512,
            jws.clone(),
        );

        let result = signer.decode::<Value>("anything").unwrap();

        assert_eq!(result, Verification::Unauthenticated);
        // The first error ends the scan.
        assert_eq!(jws.verify_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_first_match_wins() {
        let jws = AcceptAllJws::default();
        let signer = KeyRingSigner::with_primitive(
            KeyRing::new(["a", "b", "c"]).unwrap(),
            JwtAlgorithm::HS512,
            jws.clone(),
        );
        let token = signer.encode(&json!({"a": 1}), None).unwrap();

        assert_eq!(signer.decode::<Value>(&token).unwrap().index(), Some(0));
        assert_eq!(jws.verify_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sign_errors_propagate() {
        let signer = KeyRingSigner::with_primitive(
            KeyRing::new([KEY1]).unwrap(),
            JwtAlgorithm::HS512,
            FailingJws::default(),
        );

        let err = signer.encode(&json!({}), None).unwrap_err();
        assert!(matches!(err, KeyRingError::Jws(JwsError::Malformed(_))));
    }

    #[test]
    fn test_empty_ring_fails_loudly() {
        let signer = KeyRingSigner::new(KeyRing::empty_unchecked(), JwtAlgorithm::HS512);

        assert!(matches!(
            signer.encode(&json!({}), None),
            Err(KeyRingError::NoKeysConfigured)
        ));
        assert!(matches!(
            signer.decode::<Value>("a.b.c"),
            Err(KeyRingError::NoKeysConfigured)
        ));
    }

    #[test]
    fn test_missing_keys_rejected() {
        assert!(matches!(
            KeyRingSigner::from_keys(Vec::<&str>::new()),
            Err(KeyRingError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            KeyRingSigner::from_delimited("", None),
            Err(KeyRingError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            KeyRingSigner::from_delimited(KEY1, Some("RS256")),
            Err(KeyRingError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_reissue_stale_token() {
        let old = KeyRingSigner::from_keys([KEY2]).unwrap();
        let mut headers = HeaderFields::new();
        headers.insert("kid".to_string(), json!("previous"));
        let token = old.encode(&json!({"scope": "root"}), Some(&headers)).unwrap();

        let signer = signer();
        let decoded = signer.decode::<Value>(&token).unwrap().into_decoded().unwrap();
        let fresh = signer.reissue(&decoded).unwrap().unwrap();
        let redecoded = signer.decode::<Value>(&fresh).unwrap().into_decoded().unwrap();

        assert_eq!(redecoded.index, 0);
        assert_eq!(redecoded.payload, json!({"scope": "root"}));
        assert_eq!(redecoded.header["kid"], "previous");
        assert_eq!(signer.reissue(&redecoded).unwrap(), None);
    }

    #[test]
    fn test_rotated_within_drops_oldest() {
        let signer = signer();
        let oldest = signer.encode(&json!({"a": 1}), None).unwrap();
        let max_keys = NonZeroUsize::new(2).unwrap();

        let rotated = signer.rotated_within("fresh-key", max_keys);

        assert_eq!(rotated.keys().len(), 2);
        assert_eq!(rotated.decode::<Value>(&oldest).unwrap().index(), Some(1));

        let rotated = rotated.rotated_within("fresher-key", max_keys);
        assert_eq!(rotated.keys().len(), 2);
        assert!(!rotated.decode::<Value>(&oldest).unwrap().is_authenticated());
    }

    #[test]
    fn test_rotated_signer() {
        let signer = signer();
        let token = signer.encode(&json!({"a": 1}), None).unwrap();

        let rotated = signer.rotated("fresh-key");
        assert_eq!(rotated.keys().len(), 3);
        assert_eq!(rotated.algorithm(), JwtAlgorithm::HS512);
        assert_eq!(rotated.decode::<Value>(&token).unwrap().index(), Some(1));
        assert_eq!(signer.decode::<Value>(&token).unwrap().index(), Some(0));
    }
}
