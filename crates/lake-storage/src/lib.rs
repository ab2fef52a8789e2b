use chrono::{DateTime, Utc};
use lake_core::{EntityRecord, Layer, NewRawRow, Partition, Provenance, RawRow};
use rusqlite::{params, Connection, Row};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

pub const LAKE_SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("timestamp parse error: {0}")]
    Timestamp(String),
    #[error("value out of range for {field}: {value}")]
    OutOfRange { field: &'static str, value: u64 },
    #[error("store connection lock poisoned")]
    LockPoisoned,
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

/// `written` counts distinct `(entity_table, entity_key)` rows persisted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceSummary {
    pub deleted: usize,
    pub written: usize,
}

/// Raw payload rows plus the tool and domain entity tables derived from them.
///
/// One connection is shared behind a mutex, so a store can be used from many
/// worker threads; every replace runs as a single transaction.
pub struct LakeStore {
    conn: Mutex<Connection>,
}

impl LakeStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(self
            .conn()?
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let current = self.schema_version()?;
        if current > LAKE_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: LAKE_SCHEMA_VERSION,
            });
        }

        if current < 1 {
            let conn = self.conn()?;
            let sql = include_str!("../migrations/0001_lake_schema.sql");
            conn.execute_batch(sql)?;
            conn.execute("PRAGMA user_version = 1", []).map(|_| ())?;
        }

        Ok(())
    }

    pub fn insert_raw(&self, partition: &Partition, row: &NewRawRow) -> Result<u64, StorageError> {
        let conn = self.conn()?;
        insert_raw_row(&conn, partition, row, Utc::now())
    }

    /// Appends a batch of raw rows in one transaction and returns their ids.
    pub fn insert_raw_rows(
        &self,
        partition: &Partition,
        rows: &[NewRawRow],
    ) -> Result<Vec<u64>, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let created_at = Utc::now();
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(insert_raw_row(&tx, partition, row, created_at)?);
        }
        tx.commit()?;
        Ok(ids)
    }

    /// Every raw row of exactly this table and params, oldest first.
    pub fn raw_rows(&self, partition: &Partition) -> Result<Vec<RawRow>, StorageError> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(
            "
            SELECT id, table_name, params, data, url, input, remark, created_at
            FROM raw_rows
            WHERE table_name = ?1 AND params = ?2
            ORDER BY id ASC
            ",
        )?;

        let rows = statement.query_map(params![partition.table(), partition.params()], |row| {
            let created_at = parse_timestamp(row.get::<_, String>(7)?).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    7,
                    rusqlite::types::Type::Text,
                    Box::new(err),
                )
            })?;
            Ok(RawRow {
                id: row.get::<_, i64>(0)? as u64,
                table: row.get(1)?,
                params: row.get(2)?,
                data: row.get(3)?,
                url: row.get(4)?,
                input: row.get(5)?,
                remark: row.get(6)?,
                created_at,
            })
        })?;

        let mut raw_rows = Vec::new();
        for row in rows {
            raw_rows.push(row?);
        }
        Ok(raw_rows)
    }

    pub fn raw_row_count(&self, partition: &Partition) -> Result<i64, StorageError> {
        let count = self.conn()?.query_row(
            "SELECT COUNT(*) FROM raw_rows WHERE table_name = ?1 AND params = ?2",
            params![partition.table(), partition.params()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn delete_raw(&self, partition: &Partition) -> Result<usize, StorageError> {
        let deleted = self.conn()?.execute(
            "DELETE FROM raw_rows WHERE table_name = ?1 AND params = ?2",
            params![partition.table(), partition.params()],
        )?;
        Ok(deleted)
    }

    /// Substitutes everything previously written for `(scope_params,
    /// source_table)` in `layer` with `records`, atomically.
    ///
    /// Rows from the previous run that are not produced again are gone
    /// afterwards; an empty `records` clears the partition. Records sharing a
    /// table and key collapse to the last one.
    pub fn replace(
        &self,
        layer: Layer,
        scope_params: &str,
        source_table: &str,
        records: &[EntityRecord],
    ) -> Result<ReplaceSummary, StorageError> {
        let table = entity_table_name(layer);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let deleted = tx.execute(
            &format!("DELETE FROM {table} WHERE scope_params = ?1 AND source_table = ?2"),
            params![scope_params, source_table],
        )?;

        {
            let mut statement = tx.prepare(&format!(
                "
                INSERT INTO {table} (
                    entity_table,
                    entity_key,
                    scope_params,
                    source_table,
                    body_json,
                    raw_data_params,
                    raw_data_table,
                    raw_data_id,
                    raw_data_remark
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(entity_table, entity_key) DO UPDATE SET
                    scope_params=excluded.scope_params,
                    source_table=excluded.source_table,
                    body_json=excluded.body_json,
                    raw_data_params=excluded.raw_data_params,
                    raw_data_table=excluded.raw_data_table,
                    raw_data_id=excluded.raw_data_id,
                    raw_data_remark=excluded.raw_data_remark
                "
            ))?;

            for record in records {
                statement.execute(params![
                    record.table,
                    record.key,
                    scope_params,
                    source_table,
                    record.body,
                    record.provenance.params,
                    record.provenance.table,
                    to_sql_id("raw_data_id", record.provenance.raw_id)?,
                    record.provenance.remark,
                ])?;
            }
        }

        tx.commit()?;

        let written = records
            .iter()
            .map(|record| (record.table.as_str(), record.key.as_str()))
            .collect::<BTreeSet<_>>()
            .len();
        Ok(ReplaceSummary { deleted, written })
    }

    /// Entity rows of one table that belong to exactly this scope, by key.
    pub fn entities(
        &self,
        layer: Layer,
        scope_params: &str,
        entity_table: &str,
    ) -> Result<Vec<EntityRecord>, StorageError> {
        let table = entity_table_name(layer);
        let conn = self.conn()?;
        let mut statement = conn.prepare(&format!(
            "
            SELECT entity_table, entity_key, body_json, raw_data_params, raw_data_table,
                   raw_data_id, raw_data_remark
            FROM {table}
            WHERE entity_table = ?1 AND scope_params = ?2
            ORDER BY entity_key ASC
            "
        ))?;

        let rows =
            statement.query_map(params![entity_table, scope_params], entity_record_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Every row of one entity table across all scopes, by key.
    pub fn table_entities(
        &self,
        layer: Layer,
        entity_table: &str,
    ) -> Result<Vec<EntityRecord>, StorageError> {
        let table = entity_table_name(layer);
        let conn = self.conn()?;
        let mut statement = conn.prepare(&format!(
            "
            SELECT entity_table, entity_key, body_json, raw_data_params, raw_data_table,
                   raw_data_id, raw_data_remark
            FROM {table}
            WHERE entity_table = ?1
            ORDER BY entity_key ASC
            "
        ))?;

        let rows = statement.query_map([entity_table], entity_record_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn entity_count(&self, layer: Layer, entity_table: &str) -> Result<i64, StorageError> {
        let table = entity_table_name(layer);
        let count = self.conn()?.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE entity_table = ?1"),
            [entity_table],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Drops every row of one entity table regardless of scope.
    pub fn flush_table(&self, layer: Layer, entity_table: &str) -> Result<usize, StorageError> {
        let table = entity_table_name(layer);
        let deleted = self.conn()?.execute(
            &format!("DELETE FROM {table} WHERE entity_table = ?1"),
            [entity_table],
        )?;
        Ok(deleted)
    }
}

fn insert_raw_row(
    conn: &Connection,
    partition: &Partition,
    row: &NewRawRow,
    created_at: DateTime<Utc>,
) -> Result<u64, StorageError> {
    conn.execute(
        "
        INSERT INTO raw_rows (table_name, params, data, url, input, remark, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ",
        params![
            partition.table(),
            partition.params(),
            row.data,
            row.url,
            row.input,
            row.remark,
            created_at.to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid() as u64)
}

fn entity_record_from_row(row: &Row<'_>) -> rusqlite::Result<EntityRecord> {
    Ok(EntityRecord {
        table: row.get(0)?,
        key: row.get(1)?,
        body: row.get(2)?,
        provenance: Provenance {
            params: row.get(3)?,
            table: row.get(4)?,
            raw_id: row.get::<_, i64>(5)? as u64,
            remark: row.get(6)?,
        },
    })
}

fn entity_table_name(layer: Layer) -> &'static str {
    match layer {
        Layer::Tool => "tool_entities",
        Layer::Domain => "domain_entities",
    }
}

fn to_sql_id(field: &'static str, value: u64) -> Result<i64, StorageError> {
    i64::try_from(value).map_err(|_| StorageError::OutOfRange { field, value })
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|err| StorageError::Timestamp(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lake_core::{ScopeDim, ScopeKey};
    use tempfile::NamedTempFile;

    const RAW_TABLE: &str = "_raw_widgets";
    const TOOL_TABLE: &str = "_tool_widgets";

    fn scope(workspace_id: u64) -> ScopeKey {
        ScopeKey::new(1, ScopeDim::new("WorkspaceId", workspace_id))
    }

    fn record(key: &str, body: &str, raw_id: u64, scope: &ScopeKey) -> EntityRecord {
        EntityRecord {
            table: TOOL_TABLE.to_string(),
            key: key.to_string(),
            body: body.to_string(),
            provenance: Provenance {
                params: scope.params(),
                table: RAW_TABLE.to_string(),
                raw_id,
                remark: String::new(),
            },
        }
    }

    #[test]
    fn migration_creates_lake_tables() {
        let store = LakeStore::open_in_memory().expect("open db");
        let conn = store.conn().expect("lock");
        for table in ["raw_rows", "tool_entities", "domain_entities"] {
            let found: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .expect("table check");
            assert_eq!(found, 1, "missing {table}");
        }
        drop(conn);
        assert_eq!(
            store.schema_version().expect("schema version"),
            LAKE_SCHEMA_VERSION
        );
    }

    #[test]
    fn raw_rows_are_read_by_exact_partition() {
        let store = LakeStore::open_in_memory().expect("open db");
        let nine = scope(9).partition(RAW_TABLE);
        let ninety_nine = scope(99).partition(RAW_TABLE);

        store
            .insert_raw(&nine, &NewRawRow::new(r#"{"id":1}"#))
            .expect("insert 9");
        store
            .insert_raw_rows(
                &ninety_nine,
                &[
                    NewRawRow::new(r#"{"id":2}"#).with_url("https://example.test/2"),
                    NewRawRow::new(r#"{"id":3}"#).with_input(r#"{"page":1}"#),
                ],
            )
            .expect("insert 99");

        let rows = store.raw_rows(&ninety_nine).expect("query 99");
        assert_eq!(rows.len(), 2);
        assert!(rows[0].id < rows[1].id);
        assert_eq!(rows[0].url, "https://example.test/2");
        assert_eq!(rows[1].input.as_deref(), Some(r#"{"page":1}"#));
        assert!(rows.iter().all(|row| row.params == scope(99).params()));

        assert_eq!(store.raw_row_count(&nine).expect("count 9"), 1);
        assert_eq!(
            store
                .raw_row_count(&scope(99).partition("_raw_other"))
                .expect("count other"),
            0
        );
    }

    #[test]
    fn replace_is_idempotent_and_prunes_stale_rows() {
        let store = LakeStore::open_in_memory().expect("open db");
        let scope = scope(99);
        let first = vec![
            record("1:1", r#"{"id":1}"#, 1, &scope),
            record("1:2", r#"{"id":2}"#, 2, &scope),
        ];

        store
            .replace(Layer::Tool, &scope.params(), RAW_TABLE, &first)
            .expect("first replace");
        let summary = store
            .replace(Layer::Tool, &scope.params(), RAW_TABLE, &first)
            .expect("repeat replace");
        assert_eq!(summary, ReplaceSummary { deleted: 2, written: 2 });
        assert_eq!(store.entity_count(Layer::Tool, TOOL_TABLE).expect("count"), 2);

        let second = vec![record("1:2", r#"{"id":2,"name":"renamed"}"#, 2, &scope)];
        store
            .replace(Layer::Tool, &scope.params(), RAW_TABLE, &second)
            .expect("second replace");

        let stored = store
            .entities(Layer::Tool, &scope.params(), TOOL_TABLE)
            .expect("query");
        assert_eq!(stored, second);
    }

    #[test]
    fn duplicate_keys_in_one_replace_count_once() {
        let store = LakeStore::open_in_memory().expect("open db");
        let scope = scope(99);
        let records = vec![
            record("1:991", r#"{"id":991,"name":"old"}"#, 1, &scope),
            record("1:991", r#"{"id":991,"name":"new"}"#, 2, &scope),
        ];

        let summary = store
            .replace(Layer::Tool, &scope.params(), RAW_TABLE, &records)
            .expect("replace");
        assert_eq!(summary.written, 1);
        let stored = store
            .entities(Layer::Tool, &scope.params(), TOOL_TABLE)
            .expect("query");
        assert_eq!(stored, vec![records[1].clone()]);
    }

    #[test]
    fn empty_replace_clears_only_that_partition() {
        let store = LakeStore::open_in_memory().expect("open db");
        let a = scope(1);
        let b = scope(2);
        store
            .replace(
                Layer::Tool,
                &a.params(),
                RAW_TABLE,
                &[record("1:1", "{}", 1, &a)],
            )
            .expect("replace a");
        store
            .replace(
                Layer::Tool,
                &b.params(),
                RAW_TABLE,
                &[record("1:2", "{}", 2, &b)],
            )
            .expect("replace b");
        store
            .replace(
                Layer::Tool,
                &a.params(),
                "_raw_other",
                &[record("1:3", "{}", 3, &a)],
            )
            .expect("replace other source");

        let summary = store
            .replace(Layer::Tool, &a.params(), RAW_TABLE, &[])
            .expect("clear a");
        assert_eq!(summary.deleted, 1);

        let remaining_a = store
            .entities(Layer::Tool, &a.params(), TOOL_TABLE)
            .expect("query a");
        assert_eq!(remaining_a.len(), 1);
        assert_eq!(remaining_a[0].key, "1:3");
        assert_eq!(
            store
                .entities(Layer::Tool, &b.params(), TOOL_TABLE)
                .expect("query b")
                .len(),
            1
        );
    }

    #[test]
    fn layers_are_independent() {
        let store = LakeStore::open_in_memory().expect("open db");
        let scope = scope(99);
        store
            .replace(
                Layer::Tool,
                &scope.params(),
                RAW_TABLE,
                &[record("1:1", "{}", 1, &scope)],
            )
            .expect("tool replace");

        assert!(store
            .entities(Layer::Domain, &scope.params(), TOOL_TABLE)
            .expect("domain query")
            .is_empty());
        assert_eq!(store.flush_table(Layer::Domain, TOOL_TABLE).expect("flush"), 0);
        assert_eq!(store.flush_table(Layer::Tool, TOOL_TABLE).expect("flush"), 1);
        assert!(store
            .table_entities(Layer::Tool, TOOL_TABLE)
            .expect("tool query")
            .is_empty());
    }

    #[test]
    fn store_reopens_with_data_and_schema_intact() {
        let file = NamedTempFile::new().expect("temp db");
        let scope = scope(5);
        {
            let store = LakeStore::open(file.path()).expect("open db");
            store
                .insert_raw(&scope.partition(RAW_TABLE), &NewRawRow::new("{}"))
                .expect("insert raw");
            store
                .replace(
                    Layer::Tool,
                    &scope.params(),
                    RAW_TABLE,
                    &[record("1:1", "{}", 1, &scope)],
                )
                .expect("replace");
        }

        let reopened = LakeStore::open(file.path()).expect("reopen db");
        assert_eq!(
            reopened
                .raw_row_count(&scope.partition(RAW_TABLE))
                .expect("raw count"),
            1
        );
        assert_eq!(
            reopened
                .table_entities(Layer::Tool, TOOL_TABLE)
                .expect("entities")
                .len(),
            1
        );
    }

    #[test]
    fn delete_raw_removes_only_the_partition() {
        let store = LakeStore::open_in_memory().expect("open db");
        store
            .insert_raw(&scope(1).partition(RAW_TABLE), &NewRawRow::new("{}"))
            .expect("insert 1");
        store
            .insert_raw(&scope(2).partition(RAW_TABLE), &NewRawRow::new("{}"))
            .expect("insert 2");

        assert_eq!(
            store
                .delete_raw(&scope(1).partition(RAW_TABLE))
                .expect("delete"),
            1
        );
        assert_eq!(
            store
                .raw_row_count(&scope(2).partition(RAW_TABLE))
                .expect("count"),
            1
        );
    }
}
