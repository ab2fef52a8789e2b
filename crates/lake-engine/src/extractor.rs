use crate::subtask::TaskContext;
use crate::{EngineError, SubtaskOutcome, SubtaskReport};
use lake_core::{
    record_set_digest, DecodeError, EntityRecord, Layer, Provenance, RawRow, ScopeKey,
};
use rayon::prelude::*;
use tracing::{debug, info, warn};

/// Turns the raw rows of one table and scope into tool-layer entity rows.
///
/// `decode` runs once per raw row, possibly on several threads, and may emit
/// any number of records, including records for more than one table. All
/// output is buffered and written as a single replace keyed by the scope
/// params and the raw table, so a failed or cancelled run leaves the previous
/// output untouched.
pub struct Extractor<'a, F> {
    ctx: TaskContext<'a>,
    scope: ScopeKey,
    subtask: &'static str,
    raw_table: &'static str,
    decode: F,
}

impl<'a, F> Extractor<'a, F>
where
    F: Fn(&RawRow) -> Result<Vec<EntityRecord>, DecodeError> + Sync,
{
    pub fn new(
        ctx: &TaskContext<'a>,
        subtask: &'static str,
        raw_table: &'static str,
        decode: F,
    ) -> Self {
        Self {
            ctx: *ctx,
            scope: ctx.scope.clone(),
            subtask,
            raw_table,
            decode,
        }
    }

    /// The run becomes a no-op unless `dimension` is present and nonzero.
    pub fn require(mut self, dimension: &str) -> Self {
        self.scope = self.scope.require(dimension);
        self
    }

    pub fn execute(self) -> Result<SubtaskReport, EngineError> {
        let params = self.scope.params();
        if !self.scope.is_applicable() {
            warn!(
                event = "subtask_skipped",
                subtask = self.subtask,
                params = %params,
                missing = ?self.scope.missing_requirements()
            );
            return Ok(SubtaskReport::skipped(self.subtask, params));
        }
        self.ctx.cancel.check(&params)?;

        let rows = self
            .ctx
            .store
            .raw_rows(&self.scope.partition(self.raw_table))?;
        info!(
            event = "extract_start",
            subtask = self.subtask,
            table = self.raw_table,
            params = %params,
            rows = rows.len()
        );

        let cancel = self.ctx.cancel;
        let decode = &self.decode;
        let batches = rows
            .par_iter()
            .map(|row| -> Result<Vec<EntityRecord>, EngineError> {
                cancel.check(&params)?;
                let records = decode(row).map_err(|source| EngineError::Decode {
                    table: row.table.clone(),
                    row_id: row.id,
                    source,
                })?;
                let provenance = Provenance::from_raw(row);
                Ok(records
                    .into_iter()
                    .map(|record| record.with_provenance(provenance.clone()))
                    .collect())
            })
            .collect::<Result<Vec<_>, EngineError>>()
            .map_err(|err| {
                if !matches!(err, EngineError::Cancelled { .. }) {
                    warn!(
                        event = "extract_failed",
                        subtask = self.subtask,
                        params = %params,
                        error = %err
                    );
                }
                err
            })?;
        let records = batches.into_iter().flatten().collect::<Vec<_>>();

        cancel.check(&params)?;
        let summary = self
            .ctx
            .store
            .replace(Layer::Tool, &params, self.raw_table, &records)?;
        debug!(
            event = "tool_replace",
            subtask = self.subtask,
            params = %params,
            deleted = summary.deleted,
            written = summary.written
        );
        info!(
            event = "extract_done",
            subtask = self.subtask,
            params = %params,
            entities = records.len()
        );

        Ok(SubtaskReport {
            subtask: self.subtask.to_string(),
            params,
            outcome: SubtaskOutcome::Completed,
            rows_read: rows.len(),
            entities_written: summary.written,
            digest: Some(record_set_digest(&records)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use lake_core::{Entity, NewRawRow, ScopeDim};
    use lake_storage::LakeStore;
    use serde::{Deserialize, Serialize};

    const RAW_TABLE: &str = "_raw_widgets";

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        connection_id: u64,
        id: u64,
        name: String,
    }

    impl Entity for Widget {
        const TABLE: &'static str = "_tool_widgets";

        fn key(&self) -> String {
            format!("{}:{}", self.connection_id, self.id)
        }
    }

    #[derive(Debug, Deserialize)]
    struct WidgetRes {
        id: u64,
        name: String,
    }

    fn decode_widget(row: &RawRow) -> Result<Vec<EntityRecord>, DecodeError> {
        let res: WidgetRes = row.decode()?;
        let widget = Widget {
            connection_id: 1,
            id: res.id,
            name: res.name,
        };
        Ok(vec![EntityRecord::encode(&widget)?])
    }

    fn scope(workspace_id: u64) -> ScopeKey {
        ScopeKey::new(1, ScopeDim::new("WorkspaceId", workspace_id))
    }

    #[test]
    fn stamps_raw_provenance_on_each_record() {
        let store = LakeStore::open_in_memory().expect("open db");
        let scope = scope(99);
        let raw_id = store
            .insert_raw(
                &scope.partition(RAW_TABLE),
                &NewRawRow::new(r#"{"id":991,"name":"Sub"}"#).with_remark("page 1"),
            )
            .expect("insert raw");
        let cancel = CancelToken::new();
        let ctx = TaskContext::new(&store, &scope, &cancel);

        let report = Extractor::new(&ctx, "extractWidgets", RAW_TABLE, decode_widget)
            .execute()
            .expect("extract");
        assert_eq!(report.outcome, SubtaskOutcome::Completed);
        assert_eq!(report.rows_read, 1);
        assert_eq!(report.entities_written, 1);

        let stored = store
            .entities(Layer::Tool, &scope.params(), Widget::TABLE)
            .expect("query");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].provenance.raw_id, raw_id);
        assert_eq!(stored[0].provenance.table, RAW_TABLE);
        assert_eq!(stored[0].provenance.params, scope.params());
        assert_eq!(stored[0].provenance.remark, "page 1");
    }

    #[test]
    fn unmet_requirement_skips_without_reading() {
        let store = LakeStore::open_in_memory().expect("open db");
        let scope = scope(0);
        store
            .insert_raw(&scope.partition(RAW_TABLE), &NewRawRow::new("not json"))
            .expect("insert raw");
        let cancel = CancelToken::new();
        let ctx = TaskContext::new(&store, &scope, &cancel);

        let report = Extractor::new(&ctx, "extractWidgets", RAW_TABLE, decode_widget)
            .require("WorkspaceId")
            .execute()
            .expect("skip is not an error");
        assert!(report.is_skipped());
        assert_eq!(report.digest, None);
        assert_eq!(store.entity_count(Layer::Tool, Widget::TABLE).expect("count"), 0);
    }

    #[test]
    fn decode_error_names_the_row() {
        let store = LakeStore::open_in_memory().expect("open db");
        let scope = scope(99);
        let bad_id = store
            .insert_raw(&scope.partition(RAW_TABLE), &NewRawRow::new(r#"{"id":"x"}"#))
            .expect("insert raw");
        let cancel = CancelToken::new();
        let ctx = TaskContext::new(&store, &scope, &cancel);

        let err = Extractor::new(&ctx, "extractWidgets", RAW_TABLE, decode_widget)
            .execute()
            .expect_err("decode must fail");
        match err {
            EngineError::Decode { table, row_id, .. } => {
                assert_eq!(table, RAW_TABLE);
                assert_eq!(row_id, bad_id);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
