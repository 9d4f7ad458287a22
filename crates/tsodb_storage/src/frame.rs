//! Log frame format for the file backend.
//!
//! ```text
//! | magic "TSOF" (4) | kind (1) | length u32 LE (4) | header crc (4) | payload crc (4) | payload |
//! ```
//!
//! The header CRC covers magic, kind and length, so a damaged length is
//! caught before it is trusted. The payload CRC covers the payload.

use crate::backend::{AppNamespace, ObjectKey};
use crate::batch::{BatchOp, WriteBatch};
use crate::error::{StorageError, StorageResult};

/// Magic bytes identifying a log frame.
pub(crate) const FRAME_MAGIC: [u8; 4] = *b"TSOF";

/// Size of the fixed frame header.
pub(crate) const HEADER_SIZE: usize = 17;

const KIND_BATCH: u8 = 1;
const KIND_CLEAR: u8 = 2;

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;

/// A decoded log frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Frame {
    /// An atomically applied batch.
    Batch {
        app: AppNamespace,
        batch: WriteBatch,
    },
    /// A namespace wipe.
    Clear { app: AppNamespace },
}

/// Outcome of decoding the frame at an offset.
#[derive(Debug)]
pub(crate) enum FrameRead {
    /// A complete, verified frame and the offset just past it.
    Complete(Frame, usize),
    /// The log ends partway through a frame.
    Torn,
}

impl Frame {
    pub(crate) fn encode(&self) -> StorageResult<Vec<u8>> {
        let (kind, payload) = match self {
            Self::Batch { app, batch } => (KIND_BATCH, encode_batch(*app, batch)?),
            Self::Clear { app } => (KIND_CLEAR, app.to_le_bytes().to_vec()),
        };
        let len = u32::try_from(payload.len()).map_err(|_| {
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("frame payload too large: {} bytes", payload.len()),
            ))
        })?;

        let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
        out.extend_from_slice(&FRAME_MAGIC);
        out.push(kind);
        out.extend_from_slice(&len.to_le_bytes());
        let header_crc = compute_crc32(&out[..9]);
        out.extend_from_slice(&header_crc.to_le_bytes());
        out.extend_from_slice(&compute_crc32(&payload).to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Decodes the frame starting at `offset` within `data`.
    ///
    /// Only a frame whose header verifies and whose payload runs into the
    /// end of `data` counts as torn. Anything else that fails to verify is
    /// corruption.
    pub(crate) fn read(data: &[u8], offset: usize) -> StorageResult<FrameRead> {
        let rest = &data[offset..];
        if rest.len() < HEADER_SIZE {
            return Ok(FrameRead::Torn);
        }
        if rest[..4] != FRAME_MAGIC {
            return Err(StorageError::corrupted(offset as u64, "bad frame magic"));
        }
        let stored_header_crc = u32::from_le_bytes([rest[9], rest[10], rest[11], rest[12]]);
        if compute_crc32(&rest[..9]) != stored_header_crc {
            return Err(StorageError::corrupted(offset as u64, "header checksum mismatch"));
        }
        let kind = rest[4];
        let len = u32::from_le_bytes([rest[5], rest[6], rest[7], rest[8]]);
        let stored_payload_crc = u32::from_le_bytes([rest[13], rest[14], rest[15], rest[16]]);

        let end = HEADER_SIZE + len as usize;
        if rest.len() < end {
            return Ok(FrameRead::Torn);
        }
        let payload = &rest[HEADER_SIZE..end];
        if compute_crc32(payload) != stored_payload_crc {
            // The last frame may have been cut off mid-flush
            if offset + end == data.len() {
                return Ok(FrameRead::Torn);
            }
            return Err(StorageError::corrupted(offset as u64, "payload checksum mismatch"));
        }

        let frame = match kind {
            KIND_BATCH => decode_batch(payload, offset as u64)?,
            KIND_CLEAR => Self::Clear {
                app: read_u64(payload, &mut 0, offset as u64)?,
            },
            other => {
                return Err(StorageError::corrupted(
                    offset as u64,
                    format!("unknown frame kind {other}"),
                ))
            }
        };
        Ok(FrameRead::Complete(frame, offset + end))
    }
}

fn encode_batch(app: AppNamespace, batch: &WriteBatch) -> StorageResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(12 + batch.len() * 21 + batch.payload_bytes());
    buf.extend_from_slice(&app.to_le_bytes());
    buf.extend_from_slice(&(batch.len() as u32).to_le_bytes());
    for (key, op) in batch.iter() {
        buf.extend_from_slice(key);
        match op {
            BatchOp::Put(bytes) => {
                let len = u32::try_from(bytes.len()).map_err(|_| {
                    StorageError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("record too large: {} bytes", bytes.len()),
                    ))
                })?;
                buf.push(OP_PUT);
                buf.extend_from_slice(&len.to_le_bytes());
                buf.extend_from_slice(bytes);
            }
            BatchOp::Delete => buf.push(OP_DELETE),
        }
    }
    Ok(buf)
}

fn decode_batch(payload: &[u8], offset: u64) -> StorageResult<Frame> {
    let mut cursor = 0;
    let app = read_u64(payload, &mut cursor, offset)?;
    let count = read_u32(payload, &mut cursor, offset)?;

    let mut batch = WriteBatch::new();
    for _ in 0..count {
        let key: ObjectKey = take(payload, &mut cursor, 16, offset)?
            .try_into()
            .map_err(|_| StorageError::corrupted(offset, "invalid key"))?;
        let op = take(payload, &mut cursor, 1, offset)?[0];
        match op {
            OP_PUT => {
                let len = read_u32(payload, &mut cursor, offset)? as usize;
                batch.put(key, take(payload, &mut cursor, len, offset)?.to_vec());
            }
            OP_DELETE => batch.delete(key),
            other => {
                return Err(StorageError::corrupted(
                    offset,
                    format!("unknown batch op {other}"),
                ))
            }
        }
    }
    if cursor != payload.len() {
        return Err(StorageError::corrupted(
            offset,
            format!(
                "trailing bytes in batch frame: expected {} bytes, got {}",
                cursor,
                payload.len()
            ),
        ));
    }
    Ok(Frame::Batch { app, batch })
}

fn take<'a>(payload: &'a [u8], cursor: &mut usize, len: usize, offset: u64) -> StorageResult<&'a [u8]> {
    if *cursor + len > payload.len() {
        return Err(StorageError::corrupted(offset, "unexpected end of payload"));
    }
    let slice = &payload[*cursor..*cursor + len];
    *cursor += len;
    Ok(slice)
}

fn read_u32(payload: &[u8], cursor: &mut usize, offset: u64) -> StorageResult<u32> {
    let bytes = take(payload, cursor, 4, offset)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u64(payload: &[u8], cursor: &mut usize, offset: u64) -> StorageResult<u64> {
    let bytes: [u8; 8] = take(payload, cursor, 8, offset)?
        .try_into()
        .map_err(|_| StorageError::corrupted(offset, "invalid u64"))?;
    Ok(u64::from_le_bytes(bytes))
}

/// Computes CRC32 checksum for data.
pub fn compute_crc32(data: &[u8]) -> u32 {
    // IEEE polynomial, table built at compile time
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_batch() -> WriteBatch {
        let mut batch = WriteBatch::new();
        batch.put([1; 16], vec![0xCA, 0xFE]);
        batch.delete([2; 16]);
        batch.put([3; 16], Vec::new());
        batch
    }

    #[test]
    fn batch_frame_decodes() {
        let frame = Frame::Batch {
            app: 42,
            batch: sample_batch(),
        };
        let bytes = frame.encode().unwrap();
        match Frame::read(&bytes, 0).unwrap() {
            FrameRead::Complete(decoded, next) => {
                assert_eq!(decoded, frame);
                assert_eq!(next, bytes.len());
            }
            FrameRead::Torn => panic!("expected complete frame"),
        }
    }

    #[test]
    fn short_tail_is_torn() {
        let bytes = Frame::Clear { app: 1 }.encode().unwrap();
        let cut = &bytes[..bytes.len() - 3];
        assert!(matches!(Frame::read(cut, 0).unwrap(), FrameRead::Torn));
    }

    #[test]
    fn bad_checksum_in_middle_is_corruption() {
        let mut bytes = Frame::Clear { app: 1 }.encode().unwrap();
        let first_len = bytes.len();
        bytes.extend(Frame::Clear { app: 2 }.encode().unwrap());
        bytes[first_len - 1] ^= 0xFF;

        assert!(matches!(
            Frame::read(&bytes, 0),
            Err(StorageError::Corrupted { offset: 0, .. })
        ));
    }

    #[test]
    fn damaged_length_is_corruption_not_torn() {
        let mut bytes = Frame::Clear { app: 1 }.encode().unwrap();
        bytes.extend(Frame::Clear { app: 2 }.encode().unwrap());
        // High byte of the first frame's length: claims more than the log holds
        bytes[8] = 0x7F;

        assert!(matches!(
            Frame::read(&bytes, 0),
            Err(StorageError::Corrupted { offset: 0, .. })
        ));
    }

    #[test]
    fn damaged_kind_is_corruption() {
        let mut bytes = Frame::Clear { app: 1 }.encode().unwrap();
        bytes[4] = KIND_BATCH;
        assert!(matches!(
            Frame::read(&bytes, 0),
            Err(StorageError::Corrupted { .. })
        ));
    }

    #[test]
    fn bad_payload_checksum_on_last_frame_is_torn() {
        let mut bytes = Frame::Clear { app: 1 }.encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(Frame::read(&bytes, 0).unwrap(), FrameRead::Torn));
    }

    #[test]
    fn bad_magic_is_corruption() {
        let mut bytes = Frame::Clear { app: 1 }.encode().unwrap();
        bytes[0] = b'X';
        assert!(Frame::read(&bytes, 0).is_err());
    }

    #[test]
    fn crc32_known_value() {
        // Known test vector: "123456789" should give 0xCBF43926
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn crc32_empty() {
        assert_eq!(compute_crc32(b""), 0);
    }
}
