//! # TSODB Codec
//!
//! CBOR encoding/decoding of persistent game objects.
//!
//! The object store never interprets application state. It hands every
//! value to this crate on the way into a record and gets it back on the way
//! out, so the wire format of a persistent object is decided here and only
//! here. Any `serde` type can be stored.
//!
//! ## Usage
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use tsodb_codec::{from_cbor, to_cbor};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Player {
//!     name: String,
//!     hp: i32,
//! }
//!
//! let bytes = to_cbor(&Player { name: "ayla".into(), hp: 30 }).unwrap();
//! let back: Player = from_cbor(&bytes).unwrap();
//! assert_eq!(back.hp, 30);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;

pub use error::{CodecError, CodecResult};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a value to CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::EncodingFailed`] if the value's `Serialize`
/// implementation fails.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buf)
}

/// Decodes a value from CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] if the bytes are not valid CBOR or
/// do not match the shape of `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}
