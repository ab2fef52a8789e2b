pub mod actor;
pub mod de;
pub mod domain;
pub mod entity;
pub mod errors;
pub mod raw;
pub mod scope;

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub use actor::ActorRef;
pub use domain::{Board, DomainIdGenerator, Issue};
pub use entity::{
    record_set_digest, Entity, EntityRecord, Layer, Provenance, PROVENANCE_COLUMNS, RAW_DATA_ID,
    RAW_DATA_PARAMS, RAW_DATA_REMARK, RAW_DATA_TABLE,
};
pub use errors::{ContractError, DecodeError, MappingError};
pub use raw::{NewRawRow, RawRow};
pub use scope::{Partition, ScopeDim, ScopeKey, CONNECTION_ID_KEY};

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut output = String::with_capacity(digest.len() * 2);
    for byte in digest {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

/// Renders `value` as JSON with object keys sorted at every depth, so equal
/// values always produce identical bytes.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, ContractError> {
    let json =
        serde_json::to_value(value).map_err(|err| ContractError::Serialization(err.to_string()))?;
    let canonical = canonicalize_value(json);
    serde_json::to_string(&canonical).map_err(|err| ContractError::Serialization(err.to_string()))
}

pub(crate) fn canonicalize_value(value: Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut entries: Vec<(String, Value)> = object.into_iter().collect();
            entries.sort_by(|left, right| left.0.cmp(&right.0));

            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, canonicalize_value(value));
            }
            Value::Object(sorted)
        }
        Value::Array(values) => Value::Array(values.into_iter().map(canonicalize_value).collect()),
        scalar => scalar,
    }
}
