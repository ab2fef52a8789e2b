use crate::subtask::TaskContext;
use crate::{EngineError, SubtaskOutcome, SubtaskReport};
use lake_core::{
    record_set_digest, DecodeError, Entity, EntityRecord, Layer, MappingError, ScopeKey,
};
use rayon::prelude::*;
use std::marker::PhantomData;
use tracing::{debug, info, warn};

/// Maps the tool-layer rows of `T` for one scope into domain rows of `D`.
///
/// Only the tool layer is read. Each domain row inherits the provenance of
/// the tool row it came from, and the output replaces whatever the previous
/// run wrote for the same scope and tool table.
pub struct Converter<'a, T, D, F> {
    ctx: TaskContext<'a>,
    scope: ScopeKey,
    subtask: &'static str,
    map: F,
    _types: PhantomData<fn(&T) -> D>,
}

impl<'a, T, D, F> Converter<'a, T, D, F>
where
    T: Entity,
    D: Entity,
    F: Fn(&T) -> Result<D, MappingError> + Sync,
{
    pub fn new(ctx: &TaskContext<'a>, subtask: &'static str, map: F) -> Self {
        Self {
            ctx: *ctx,
            scope: ctx.scope.clone(),
            subtask,
            map,
            _types: PhantomData,
        }
    }

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

        let tool_rows = self.ctx.store.entities(Layer::Tool, &params, T::TABLE)?;
        info!(
            event = "convert_start",
            subtask = self.subtask,
            table = T::TABLE,
            params = %params,
            rows = tool_rows.len()
        );

        let cancel = self.ctx.cancel;
        let map = &self.map;
        let records = tool_rows
            .par_iter()
            .map(|row| -> Result<EntityRecord, EngineError> {
                cancel.check(&params)?;
                let entity: T = row.decode().map_err(|err| EngineError::Decode {
                    table: row.table.clone(),
                    row_id: row.provenance.raw_id,
                    source: DecodeError::from(err),
                })?;
                let domain = map(&entity).map_err(|source| EngineError::Mapping {
                    table: row.table.clone(),
                    key: row.key.clone(),
                    source,
                })?;
                Ok(EntityRecord::encode(&domain)?.with_provenance(row.provenance.clone()))
            })
            .collect::<Result<Vec<_>, EngineError>>()
            .map_err(|err| {
                if !matches!(err, EngineError::Cancelled { .. }) {
                    warn!(
                        event = "convert_failed",
                        subtask = self.subtask,
                        params = %params,
                        error = %err
                    );
                }
                err
            })?;

        cancel.check(&params)?;
        let summary = self
            .ctx
            .store
            .replace(Layer::Domain, &params, T::TABLE, &records)?;
        debug!(
            event = "domain_replace",
            subtask = self.subtask,
            params = %params,
            deleted = summary.deleted,
            written = summary.written
        );
        info!(
            event = "convert_done",
            subtask = self.subtask,
            params = %params,
            entities = records.len()
        );

        Ok(SubtaskReport {
            subtask: self.subtask.to_string(),
            params,
            outcome: SubtaskOutcome::Completed,
            rows_read: tool_rows.len(),
            entities_written: summary.written,
            digest: Some(record_set_digest(&records)),
        })
    }
}
