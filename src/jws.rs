//! Signing primitive seam and the default HMAC implementation.
//!
//! [`JwsPrimitive`] is everything the key ring needs from a JWS library:
//! produce a compact token, check a signature under one key, and read a token
//! back without checking it. [`HmacJws`] provides it on top of
//! `jsonwebtoken::crypto`.

use crate::algorithm::JwtAlgorithm;
use crate::error::JwsError;
use crate::header::HeaderFields;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{crypto, DecodingKey, EncodingKey};
use serde_json::Value;

/// Token parts recovered without signature verification.
#[derive(Debug, Clone, PartialEq)]
pub struct RawToken {
    /// Header fields
    pub header: HeaderFields,
    /// Payload
    pub payload: Value,
    /// Base64url encoded signature
    pub signature: String,
}

/// Compact JWS operations used by the key ring signer.
pub trait JwsPrimitive: Send + Sync {
    /// Sign `header` and `payload` with `secret` and return the compact token.
    ///
    /// # Errors
    ///
    /// Returns an error if the parts cannot be serialized or signed.
    fn sign(&self, header: &HeaderFields, payload: &Value, secret: &[u8]) -> Result<String, JwsError>;

    /// Check the token signature under `algorithm` and `secret`.
    ///
    /// A signature mismatch is `Ok(false)`.
    ///
    /// # Errors
    ///
    /// May return an error for tokens that cannot be parsed.
    fn verify(&self, token: &str, algorithm: JwtAlgorithm, secret: &[u8]) -> Result<bool, JwsError>;

    /// Parse the token without checking its signature.
    ///
    /// Only call this after [`JwsPrimitive::verify`] succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed.
    fn decode(&self, token: &str) -> Result<RawToken, JwsError>;
}

/// HMAC compact JWS backed by `jsonwebtoken`.
///
/// Tokens are `base64url(header).base64url(payload).signature` and are
/// interchangeable with `jsonwebtoken::encode` for equal header fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacJws;

struct Segments<'a> {
    header: &'a str,
    payload: &'a str,
    signing_input: &'a str,
    signature: &'a str,
}

fn split_token(token: &str) -> Result<Segments<'_>, JwsError> {
    let (signing_input, signature) = token
        .rsplit_once('.')
        .ok_or_else(|| JwsError::malformed("expected three segments"))?;
    let (header, payload) = signing_input
        .split_once('.')
        .ok_or_else(|| JwsError::malformed("expected three segments"))?;

    if payload.contains('.') {
        return Err(JwsError::malformed("expected three segments"));
    }

    Ok(Segments {
        header,
        payload,
        signing_input,
        signature,
    })
}

fn encode_segment<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, JwsError> {
    let json = serde_json::to_vec(value)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, JwsError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment)?;
    Ok(serde_json::from_slice(&bytes)?)
}

impl JwsPrimitive for HmacJws {
    fn sign(&self, header: &HeaderFields, payload: &Value, secret: &[u8]) -> Result<String, JwsError> {
        let algorithm: JwtAlgorithm = header
            .get("alg")
            .and_then(Value::as_str)
            .ok_or_else(|| JwsError::malformed("header has no alg"))?
            .parse()
            .map_err(|_| JwsError::malformed("header alg is not an HMAC algorithm"))?;

        let message = format!("{}.{}", encode_segment(header)?, encode_segment(payload)?);
        let signature = crypto::sign(
            message.as_bytes(),
            &EncodingKey::from_secret(secret),
            algorithm.to_jose(),
        )?;

        Ok(format!("{}.{}", message, signature))
    }

    fn verify(&self, token: &str, algorithm: JwtAlgorithm, secret: &[u8]) -> Result<bool, JwsError> {
        let segments = split_token(token)?;

        // The fixed algorithm decides; a token announcing another one never matches.
        let header: HeaderFields = decode_segment(segments.header)?;
        if header.get("alg").and_then(Value::as_str) != Some(algorithm.as_str()) {
            return Ok(false);
        }

        Ok(crypto::verify(
            segments.signature,
            segments.signing_input.as_bytes(),
            &DecodingKey::from_secret(secret),
            algorithm.to_jose(),
        )?)
    }

    fn decode(&self, token: &str) -> Result<RawToken, JwsError> {
        let segments = split_token(token)?;

        Ok(RawToken {
            header: decode_segment(segments.header)?,
            payload: decode_segment(segments.payload)?,
            signature: segments.signature.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::normalize_header;
    use jsonwebtoken::{encode, Algorithm, Header};
    use serde_json::json;

    const SECRET: &[u8] = b"test-secret-key-for-testing-only";

    #[test]
    fn test_sign_matches_jsonwebtoken() {
        let header = normalize_header(None, JwtAlgorithm::HS256);
        let payload = json!({"scope": "root"});

        let ours = HmacJws.sign(&header, &payload, SECRET).unwrap();
        let theirs = encode(
            &Header::new(Algorithm::HS256),
            &payload,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert_eq!(ours, theirs);
    }

    #[test]
    fn test_verify_and_decode() {
        let header = normalize_header(None, JwtAlgorithm::HS512);
        let payload = json!({"sub": "user-123", "n": [1, 2]});
        let token = HmacJws.sign(&header, &payload, SECRET).unwrap();

        assert!(HmacJws.verify(&token, JwtAlgorithm::HS512, SECRET).unwrap());
        assert!(!HmacJws.verify(&token, JwtAlgorithm::HS512, b"other").unwrap());

        let raw = HmacJws.decode(&token).unwrap();
        assert_eq!(raw.header, header);
        assert_eq!(raw.payload, payload);
        assert_eq!(raw.signature, token.rsplit('.').next().unwrap());
    }

    #[test]
    fn test_verify_rejects_announced_algorithm_mismatch() {
        let header = normalize_header(None, JwtAlgorithm::HS256);
        let token = HmacJws.sign(&header, &json!({}), SECRET).unwrap();

        assert!(!HmacJws.verify(&token, JwtAlgorithm::HS512, SECRET).unwrap());
    }

    #[test]
    fn test_verify_rejects_forged_alg_header() {
        // Signed with HS512 but announcing "none".
        let mut header = normalize_header(None, JwtAlgorithm::HS512);
        let token = HmacJws.sign(&header, &json!({"a": 1}), SECRET).unwrap();
        let signature = token.rsplit('.').next().unwrap();

        header.insert("alg".to_string(), json!("none"));
        let forged = format!(
            "{}.{}.{}",
            encode_segment(&header).unwrap(),
            encode_segment(&json!({"a": 1})).unwrap(),
            signature
        );

        assert!(!HmacJws.verify(&forged, JwtAlgorithm::HS512, SECRET).unwrap());
    }

    #[test]
    fn test_malformed_tokens_error() {
        for token in ["", "abc", "a.b", "a.b.c.d", "!!.??.sig"] {
            assert!(HmacJws.verify(token, JwtAlgorithm::HS512, SECRET).is_err(), "{token}");
            assert!(HmacJws.decode(token).is_err(), "{token}");
        }
    }

    #[test]
    fn test_sign_requires_hmac_alg() {
        let mut header = normalize_header(None, JwtAlgorithm::HS512);
        header.insert("alg".to_string(), json!("RS256"));

        let err = HmacJws.sign(&header, &json!({}), SECRET).unwrap_err();
        assert!(matches!(err, JwsError::Malformed(_)));
    }
}
