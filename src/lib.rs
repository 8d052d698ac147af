//! JWT signing over a rotating ring of HMAC keys.
//!
//! New tokens are always signed with the primary key (position 0). Tokens are
//! verified against every key in ring order, and the position of the key that
//! verified them is reported back: a position above 0 means the token predates
//! the last rotation and should be reissued. The signing algorithm is fixed
//! when the signer is built and is never taken from a token.
//!
//! ```
//! use jwt_keyring::{KeyRingSigner, Verification};
//! use serde_json::{json, Value};
//!
//! # fn main() -> Result<(), jwt_keyring::KeyRingError> {
//! let old = KeyRingSigner::from_keys(["previous-secret"])?;
//! let token = old.encode(&json!({"scope": "root"}), None)?;
//!
//! let signer = KeyRingSigner::from_keys(["current-secret", "previous-secret"])?;
//! match signer.decode::<Value>(&token)? {
//!     Verification::Authenticated(decoded) => {
//!         assert_eq!(decoded.index, 1);
//!         let fresh = signer.reissue(&decoded)?;
//!         assert!(fresh.is_some());
//!     }
//!     Verification::Unauthenticated => unreachable!(),
//! }
//! # Ok(())
//! # }
//! ```

pub mod algorithm;
pub mod config;
pub mod error;
pub mod header;
pub mod jws;
pub mod keyring;
pub mod rotation;
pub mod signer;

// Re-exports for convenience
pub use algorithm::JwtAlgorithm;
pub use config::SignerConfig;
pub use error::{JwsError, KeyRingError, KeyRingResult};
pub use header::{normalize_header, HeaderFields};
pub use jws::{HmacJws, JwsPrimitive, RawToken};
pub use keyring::KeyRing;
pub use rotation::ActiveSigner;
pub use signer::{DecodedToken, KeyRingSigner, Verification};
