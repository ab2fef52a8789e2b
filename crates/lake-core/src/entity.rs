use crate::errors::ContractError;
use crate::raw::RawRow;
use crate::{canonical_json, sha256_hex};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const RAW_DATA_PARAMS: &str = "_raw_data_params";
pub const RAW_DATA_TABLE: &str = "_raw_data_table";
pub const RAW_DATA_ID: &str = "_raw_data_id";
pub const RAW_DATA_REMARK: &str = "_raw_data_remark";

/// Linkage columns every stored entity row carries. They are bookkeeping,
/// not domain content, and are left out of snapshot comparisons.
pub const PROVENANCE_COLUMNS: [&str; 4] =
    [RAW_DATA_PARAMS, RAW_DATA_TABLE, RAW_DATA_ID, RAW_DATA_REMARK];

/// A typed row in a tool-specific or domain table.
pub trait Entity: Serialize + DeserializeOwned {
    const TABLE: &'static str;

    /// Primary key within [`Entity::TABLE`], e.g. `"{connection_id}:{id}"`.
    fn key(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Tool,
    Domain,
}

impl Layer {
    pub fn as_str(self) -> &'static str {
        match self {
            Layer::Tool => "tool",
            Layer::Domain => "domain",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Layer {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "tool" => Ok(Layer::Tool),
            "domain" => Ok(Layer::Domain),
            other => Err(format!("unknown layer: {other}")),
        }
    }
}

/// Which raw row an entity row was ultimately derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    pub params: String,
    pub table: String,
    pub raw_id: u64,
    pub remark: String,
}

impl Provenance {
    pub fn from_raw(row: &RawRow) -> Self {
        Self {
            params: row.params.clone(),
            table: row.table.clone(),
            raw_id: row.id,
            remark: row.remark.clone(),
        }
    }
}

/// A type-erased entity row: table, key and canonical JSON body. Extract
/// functions emit these so one raw row can fan out into several tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRecord {
    pub table: String,
    pub key: String,
    pub body: String,
    pub provenance: Provenance,
}

impl EntityRecord {
    /// Fails when the body would not decode back into `E`, e.g. a `NaN`
    /// field that JSON stores as `null`.
    pub fn encode<E: Entity>(entity: &E) -> Result<Self, ContractError> {
        let key = entity.key();
        let body = canonical_json(entity)?;
        if let Err(err) = serde_json::from_str::<E>(&body) {
            return Err(ContractError::LossyBody {
                table: E::TABLE.to_string(),
                key,
                reason: err.to_string(),
            });
        }
        Ok(Self {
            table: E::TABLE.to_string(),
            key,
            body,
            provenance: Provenance::default(),
        })
    }

    pub fn decode<E: Entity>(&self) -> Result<E, ContractError> {
        serde_json::from_str(&self.body).map_err(|err| {
            ContractError::Serialization(format!("{} {}: {err}", self.table, self.key))
        })
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Flattens body fields and provenance columns into one column map, the
    /// shape used for column-by-column verification.
    pub fn columns(&self) -> Result<BTreeMap<String, Value>, ContractError> {
        let body: Value = serde_json::from_str(&self.body)
            .map_err(|err| ContractError::Serialization(err.to_string()))?;
        let Value::Object(body) = body else {
            return Err(ContractError::NonObjectBody {
                table: self.table.clone(),
            });
        };

        let mut columns: BTreeMap<String, Value> = body.into_iter().collect();
        columns.insert(
            RAW_DATA_PARAMS.to_string(),
            Value::String(self.provenance.params.clone()),
        );
        columns.insert(
            RAW_DATA_TABLE.to_string(),
            Value::String(self.provenance.table.clone()),
        );
        columns.insert(RAW_DATA_ID.to_string(), Value::from(self.provenance.raw_id));
        columns.insert(
            RAW_DATA_REMARK.to_string(),
            Value::String(self.provenance.remark.clone()),
        );
        Ok(columns)
    }
}

/// Order-independent digest of a record set: equal sets hash equal no matter
/// which order rows were produced in.
pub fn record_set_digest(records: &[EntityRecord]) -> String {
    let mut lines = records
        .iter()
        .map(|record| {
            let mut line = Map::new();
            line.insert("table".to_string(), Value::String(record.table.clone()));
            line.insert("key".to_string(), Value::String(record.key.clone()));
            line.insert("body".to_string(), Value::String(record.body.clone()));
            Value::Object(line).to_string()
        })
        .collect::<Vec<_>>();
    lines.sort();
    sha256_hex(lines.join("\n").as_bytes())
}
