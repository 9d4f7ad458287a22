//! Stored object record envelope.
//!
//! Every persistent object is stored as one record:
//!
//! ```text
//! | format (1) | version (8, LE) | tag_len (2, LE) | tag (tag_len) | payload (..) |
//! ```
//!
//! `version` is the commit sequence number that last wrote the object and is
//! what commit validation compares. The payload is the CBOR encoding of the
//! object produced by `tsodb_codec`.

use crate::error::{CoreError, CoreResult};
use crate::object::ObjectId;
use crate::types::SequenceNumber;

/// Current record format.
pub const RECORD_FORMAT: u8 = 1;

/// Size of the fixed header preceding the type tag.
const HEADER_LEN: usize = 1 + 8 + 2;

/// A decoded object record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    /// Commit sequence number that produced this record.
    pub version: SequenceNumber,
    /// Type tag of the stored object.
    pub type_tag: String,
    /// CBOR payload.
    pub payload: Vec<u8>,
}

impl ObjectRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(version: SequenceNumber, type_tag: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            version,
            type_tag: type_tag.into(),
            payload,
        }
    }

    /// Serializes the record.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the type tag does not fit a u16 length.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let tag = self.type_tag.as_bytes();
        let tag_len = u16::try_from(tag.len())
            .map_err(|_| CoreError::invalid_operation("type tag longer than 65535 bytes"))?;

        let mut buf = Vec::with_capacity(HEADER_LEN + tag.len() + self.payload.len());
        buf.push(RECORD_FORMAT);
        buf.extend_from_slice(&self.version.as_u64().to_le_bytes());
        buf.extend_from_slice(&tag_len.to_le_bytes());
        buf.extend_from_slice(tag);
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Parses a record read for `object`.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if the bytes are truncated, use an unknown format
    /// or carry a tag that is not UTF-8.
    pub fn decode(object: ObjectId, bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(CoreError::corrupted(object, "record shorter than header"));
        }
        if bytes[0] != RECORD_FORMAT {
            return Err(CoreError::corrupted(
                object,
                format!("unknown record format {}", bytes[0]),
            ));
        }

        let mut version = [0u8; 8];
        version.copy_from_slice(&bytes[1..9]);
        let tag_len = usize::from(u16::from_le_bytes([bytes[9], bytes[10]]));

        let tag_end = HEADER_LEN + tag_len;
        if bytes.len() < tag_end {
            return Err(CoreError::corrupted(object, "type tag truncated"));
        }
        let type_tag = std::str::from_utf8(&bytes[HEADER_LEN..tag_end])
            .map_err(|_| CoreError::corrupted(object, "type tag is not UTF-8"))?
            .to_string();

        Ok(Self {
            version: SequenceNumber::new(u64::from_le_bytes(version)),
            type_tag,
            payload: bytes[tag_end..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> ObjectId {
        ObjectId::from_bytes([9; 16])
    }

    #[test]
    fn encode_decode() {
        let record = ObjectRecord::new(SequenceNumber::new(42), "game.Player", vec![0xa1, 1, 2]);
        let bytes = record.encode().unwrap();
        assert_eq!(bytes[0], RECORD_FORMAT);
        assert_eq!(ObjectRecord::decode(id(), &bytes).unwrap(), record);
    }

    #[test]
    fn empty_payload_allowed() {
        let record = ObjectRecord::new(SequenceNumber::new(1), "unit", Vec::new());
        let bytes = record.encode().unwrap();
        assert_eq!(ObjectRecord::decode(id(), &bytes).unwrap(), record);
    }

    #[test]
    fn truncated_header_is_corrupted() {
        let result = ObjectRecord::decode(id(), &[RECORD_FORMAT, 0, 0]);
        assert!(matches!(result, Err(CoreError::Corrupted { .. })));
    }

    #[test]
    fn truncated_tag_is_corrupted() {
        let record = ObjectRecord::new(SequenceNumber::new(1), "long.type.tag", vec![]);
        let bytes = record.encode().unwrap();
        let result = ObjectRecord::decode(id(), &bytes[..HEADER_LEN + 3]);
        assert!(matches!(result, Err(CoreError::Corrupted { .. })));
    }

    #[test]
    fn unknown_format_is_corrupted() {
        let mut bytes = ObjectRecord::new(SequenceNumber::new(1), "t", vec![])
            .encode()
            .unwrap();
        bytes[0] = 7;
        assert!(matches!(
            ObjectRecord::decode(id(), &bytes),
            Err(CoreError::Corrupted { .. })
        ));
    }
}
