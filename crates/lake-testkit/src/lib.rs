//! Data-flow verification harness: load raw rows from JSON-lines fixtures,
//! run single subtasks against an in-memory store and compare the resulting
//! entity tables with JSON-lines snapshots.

use lake_core::{
    canonical_json, ContractError, Layer, NewRawRow, Partition, ScopeKey, PROVENANCE_COLUMNS,
};
use lake_engine::{CancelToken, EngineError, SubtaskMeta, SubtaskReport, TaskContext};
use lake_storage::{LakeStore, StorageError};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

pub const UPDATE_SNAPSHOTS_ENV: &str = "LAKE_UPDATE_SNAPSHOTS";

#[derive(Debug, Error)]
pub enum TestkitError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("contract error: {0}")]
    Contract(#[from] ContractError),
    #[error("{path}:{line}: invalid fixture line: {reason}")]
    Fixture {
        path: String,
        line: usize,
        reason: String,
    },
    #[error("{table} does not match snapshot: {detail}")]
    Mismatch { table: String, detail: String },
}

/// One line of a raw fixture. `params` may be an object (canonicalized on
/// import) or an already-serialized string; `data` may be any JSON value or
/// a string holding the verbatim payload.
#[derive(Debug, Deserialize)]
struct RawFixtureLine {
    params: Value,
    data: Value,
    #[serde(default)]
    url: String,
    #[serde(default)]
    input: Option<Value>,
    #[serde(default)]
    remark: String,
}

pub struct DataFlowTester {
    store: LakeStore,
    cancel: CancelToken,
    compare_provenance: bool,
}

impl DataFlowTester {
    pub fn new() -> Result<Self, TestkitError> {
        Ok(Self {
            store: LakeStore::open_in_memory()?,
            cancel: CancelToken::new(),
            compare_provenance: false,
        })
    }

    /// Also compare `_raw_data_*` columns when they are listed as targets.
    pub fn compare_provenance(mut self, enabled: bool) -> Self {
        self.compare_provenance = enabled;
        self
    }

    pub fn store(&self) -> &LakeStore {
        &self.store
    }

    /// Appends every line of `path` to `table`, in file order.
    pub fn import_raw_jsonl(
        &self,
        path: impl AsRef<Path>,
        table: &str,
    ) -> Result<usize, TestkitError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut imported = 0;
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let fixture_error = |reason: String| TestkitError::Fixture {
                path: path.display().to_string(),
                line: index + 1,
                reason,
            };
            let fixture: RawFixtureLine =
                serde_json::from_str(line).map_err(|err| fixture_error(err.to_string()))?;
            let params = match fixture.params {
                Value::String(params) => params,
                object @ Value::Object(_) => canonical_json(&object)?,
                other => {
                    return Err(fixture_error(format!(
                        "params must be an object, got {other}"
                    )))
                }
            };
            let mut row = NewRawRow::new(json_text(fixture.data)).with_url(fixture.url);
            if let Some(input) = fixture.input {
                row = row.with_input(json_text(input));
            }
            row = row.with_remark(fixture.remark);
            self.store.insert_raw(&Partition::new(table, params), &row)?;
            imported += 1;
        }
        info!(event = "fixture_imported", table = table, rows = imported);
        Ok(imported)
    }

    pub fn flush_table(&self, layer: Layer, table: &str) -> Result<usize, TestkitError> {
        Ok(self.store.flush_table(layer, table)?)
    }

    pub fn run_subtask(
        &self,
        meta: &SubtaskMeta,
        scope: &ScopeKey,
    ) -> Result<SubtaskReport, TestkitError> {
        let ctx = TaskContext::new(&self.store, scope, &self.cancel);
        Ok((meta.entry)(&ctx)?)
    }

    /// Compares every row of `table` against the snapshot at `snapshot`,
    /// matching rows on `keys` and comparing `targets`. With
    /// `LAKE_UPDATE_SNAPSHOTS=1` the snapshot is rewritten instead.
    pub fn verify_table(
        &self,
        layer: Layer,
        table: &str,
        snapshot: impl AsRef<Path>,
        keys: &[&str],
        targets: &[&str],
    ) -> Result<(), TestkitError> {
        let columns = keys
            .iter()
            .chain(targets.iter())
            .copied()
            .filter(|column| self.compare_provenance || !PROVENANCE_COLUMNS.contains(column))
            .collect::<Vec<_>>();

        let mut actual = Vec::new();
        for record in self.store.table_entities(layer, table)? {
            actual.push(project(&record.columns()?, &columns));
        }
        actual.sort_by(|left, right| compare_keys(left, right, keys));

        let snapshot = snapshot.as_ref();
        if update_requested() {
            write_snapshot(snapshot, &actual)?;
            info!(event = "snapshot_updated", table = table, rows = actual.len());
            return Ok(());
        }

        let mut expected = read_snapshot(snapshot)?
            .into_iter()
            .map(|row| project(&row, &columns))
            .collect::<Vec<_>>();
        expected.sort_by(|left, right| compare_keys(left, right, keys));

        let mismatch = |detail: String| TestkitError::Mismatch {
            table: table.to_string(),
            detail,
        };
        if actual.len() != expected.len() {
            return Err(mismatch(format!(
                "expected {} rows, found {}",
                expected.len(),
                actual.len()
            )));
        }
        for (expected_row, actual_row) in expected.iter().zip(actual.iter()) {
            for column in &columns {
                let want = expected_row.get(*column).unwrap_or(&Value::Null);
                let got = actual_row.get(*column).unwrap_or(&Value::Null);
                if !values_match(want, got) {
                    return Err(mismatch(format!(
                        "row {} column {column}: expected {want}, found {got}",
                        render_keys(expected_row, keys)
                    )));
                }
            }
        }
        Ok(())
    }
}

fn json_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn update_requested() -> bool {
    std::env::var(UPDATE_SNAPSHOTS_ENV)
        .map(|value| matches!(value.trim(), "1" | "true"))
        .unwrap_or(false)
}

fn project(row: &BTreeMap<String, Value>, columns: &[&str]) -> Map<String, Value> {
    let mut projected = Map::new();
    for column in columns {
        let value = row.get(*column).cloned().unwrap_or(Value::Null);
        projected.insert((*column).to_string(), value);
    }
    projected
}

fn key_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn compare_keys(left: &Map<String, Value>, right: &Map<String, Value>, keys: &[&str]) -> Ordering {
    for key in keys {
        let ordering = match (left.get(*key), right.get(*key)) {
            (Some(Value::Number(a)), Some(Value::Number(b))) => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .unwrap_or(Ordering::Equal),
            (a, b) => key_text(a).cmp(&key_text(b)),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn render_keys(row: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .map(|key| format!("{key}={}", key_text(row.get(*key))))
        .collect::<Vec<_>>()
        .join(",")
}

/// Numbers compare by value so `2` in a snapshot matches a stored `2.0`.
fn values_match(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => expected == actual,
    }
}

fn read_snapshot(path: &Path) -> Result<Vec<BTreeMap<String, Value>>, TestkitError> {
    let content = fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row: BTreeMap<String, Value> =
            serde_json::from_str(line).map_err(|err| TestkitError::Fixture {
                path: path.display().to_string(),
                line: index + 1,
                reason: err.to_string(),
            })?;
        rows.push(row);
    }
    Ok(rows)
}

fn write_snapshot(path: &Path, rows: &[Map<String, Value>]) -> Result<(), TestkitError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut content = String::new();
    for row in rows {
        content.push_str(&Value::Object(row.clone()).to_string());
        content.push('\n');
    }
    fs::write(path, content)?;
    Ok(())
}
