use bincode::Options;
use garuda_types::UserRecord;

use crate::error::{StoreError, StoreResult};

/// Current on-disk format of a stored record.
pub const FORMAT_VERSION: u8 = 1;

/// Maximum size of an encoded record, including the version byte.
pub const MAX_RECORD_SIZE: usize = 4 * 1024 * 1024;

/// Codec for the bytes stored under each username.
///
/// Layout: `[1 byte format version][varint bincode UserRecord]`.
pub struct RecordCodec;

impl RecordCodec {
    /// Encode a record for storage.
    pub fn encode(record: &UserRecord) -> StoreResult<Vec<u8>> {
        let payload = bincode::DefaultOptions::new()
            .serialize(record)
            .map_err(|e| StoreError::Encode(e.to_string()))?;
        if payload.len() + 1 > MAX_RECORD_SIZE {
            return Err(StoreError::RecordTooLarge {
                username: record.username().to_string(),
                size: payload.len() + 1,
                max: MAX_RECORD_SIZE,
            });
        }
        let mut buf = Vec::with_capacity(1 + payload.len());
        buf.push(FORMAT_VERSION);
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode stored bytes. Malformed input is an error, never a panic.
    pub fn decode(data: &[u8]) -> StoreResult<UserRecord> {
        let (&version, payload) = data
            .split_first()
            .ok_or_else(|| StoreError::Decode("empty record".into()))?;
        if version != FORMAT_VERSION {
            return Err(StoreError::Decode(format!(
                "unsupported record format version {version}"
            )));
        }
        if data.len() > MAX_RECORD_SIZE {
            return Err(StoreError::Decode(format!(
                "record of {} bytes exceeds {MAX_RECORD_SIZE}",
                data.len()
            )));
        }

        let record: UserRecord = bincode::DefaultOptions::new()
            .with_limit(MAX_RECORD_SIZE as u64)
            .deserialize(payload)
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        record
            .check_invariants()
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(record)
    }
}
