//! JOSE header normalization.

use crate::algorithm::JwtAlgorithm;
use serde_json::{Map, Value};

/// Header fields, kept in insertion order.
pub type HeaderFields = Map<String, Value>;

/// Token type marker written to every header.
pub const TOKEN_TYPE: &str = "JWT";

/// Token type field, always [`TOKEN_TYPE`].
pub const TYPE_FIELD: &str = "typ";

/// Algorithm field, always the signer's algorithm.
pub const ALGORITHM_FIELD: &str = "alg";

/// Decode-time field that must never be signed.
pub const INDEX_FIELD: &str = "index";

/// Build the header to sign from caller supplied fields.
///
/// The result starts with `typ` and `alg`, both controlled here, followed by
/// the caller's remaining fields in their original order. Any `index` field is
/// dropped. Values are cloned, so the caller's map is left untouched and no
/// nested value is shared with it.
#[must_use]
pub fn normalize_header(overrides: Option<&HeaderFields>, algorithm: JwtAlgorithm) -> HeaderFields {
    let mut header = HeaderFields::new();
    header.insert(TYPE_FIELD.to_string(), Value::from(TOKEN_TYPE));
    header.insert(ALGORITHM_FIELD.to_string(), Value::from(algorithm.as_str()));

    if let Some(fields) = overrides {
        for (name, value) in fields {
            if [TYPE_FIELD, ALGORITHM_FIELD, INDEX_FIELD].contains(&name.as_str()) {
                continue;
            }
            header.insert(name.clone(), value.clone());
        }
    }

    header
}
