//! Byte-level layout of everything persisted in a shard: record encoding,
//! key encoding and the content hashes used as flyweight keys.

use serde::de::DeserializeOwned;
use serde::Serialize;
use xxhash_rust::xxh3::xxh3_128;

use crate::errors::{IndexError, IndexResult};
use crate::types::{CombinationId, FieldKind, ValueId};

/// Serialize a record with bincode
pub fn encode_record<T: Serialize>(record: &T) -> IndexResult<Vec<u8>> {
    Ok(bincode::serialize(record)?)
}

/// Deserialize a stored record, reporting the partition and key on failure
pub fn decode_record<T: DeserializeOwned>(
    partition: &'static str,
    key: &[u8],
    bytes: &[u8],
) -> IndexResult<T> {
    bincode::deserialize(bytes).map_err(|e| IndexError::corrupt(partition, key, e))
}

/// Fixed-width big-endian protein key, so record iteration follows id order
pub fn protein_key(id: u32) -> [u8; 4] {
    id.to_be_bytes()
}

/// Id of an annotation value. The kind is hashed in so that the same text
/// under two different fields never shares an id.
pub fn value_id(kind: FieldKind, text: &str) -> ValueId {
    let mut buf = Vec::with_capacity(text.len() + 1);
    buf.push(kind.slot() as u8);
    buf.extend_from_slice(text.as_bytes());
    ValueId(xxh3_128(&buf))
}

/// Id of an annotation tuple, hashed over its canonical encoding
pub fn combination_id(slots: &[Option<ValueId>; 4]) -> CombinationId {
    let mut buf = Vec::with_capacity(4 * 17);
    for slot in slots {
        match slot {
            Some(id) => {
                buf.push(1);
                buf.extend_from_slice(&id.to_bytes());
            }
            None => buf.push(0),
        }
    }
    CombinationId(xxh3_128(&buf))
}
