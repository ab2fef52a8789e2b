use crate::cancel::CancelToken;
use crate::subtask::{Plugin, TaskContext};
use crate::{EngineError, SubtaskReport};
use lake_core::ScopeKey;
use lake_storage::LakeStore;
use rayon::prelude::*;
use tracing::{info, warn};

/// One plugin pipeline over one scope.
pub struct ScopeJob<'a> {
    pub plugin: &'a dyn Plugin,
    pub scope: ScopeKey,
}

#[derive(Debug)]
pub struct ScopeRun {
    pub plugin: &'static str,
    pub params: String,
    pub result: Result<Vec<SubtaskReport>, EngineError>,
}

impl ScopeRun {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs the plugin's default-enabled subtasks for `scope` in registration
/// order, stopping at the first failure.
pub fn run_plugin(
    plugin: &dyn Plugin,
    store: &LakeStore,
    scope: &ScopeKey,
    cancel: &CancelToken,
) -> Result<Vec<SubtaskReport>, EngineError> {
    let ctx = TaskContext::new(store, scope, cancel);
    let mut reports = Vec::new();
    for meta in plugin
        .subtasks()
        .iter()
        .filter(|meta| meta.enabled_by_default)
    {
        let report = (meta.entry)(&ctx)?;
        reports.push(report);
    }
    Ok(reports)
}

/// Runs every job on a pool of `workers` threads. Jobs are independent: one
/// scope failing leaves the others running, and each outcome is reported in
/// job order.
pub fn run_scopes(
    store: &LakeStore,
    jobs: &[ScopeJob<'_>],
    workers: usize,
    cancel: &CancelToken,
) -> Result<Vec<ScopeRun>, EngineError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|err| EngineError::WorkerPool(err.to_string()))?;

    let runs = pool.install(|| {
        jobs.par_iter()
            .map(|job| {
                let params = job.scope.params();
                let result = run_plugin(job.plugin, store, &job.scope, cancel);
                match &result {
                    Ok(reports) => info!(
                        event = "scope_done",
                        plugin = job.plugin.name(),
                        params = %params,
                        subtasks = reports.len()
                    ),
                    Err(err) => warn!(
                        event = "scope_failed",
                        plugin = job.plugin.name(),
                        params = %params,
                        error = %err
                    ),
                }
                ScopeRun {
                    plugin: job.plugin.name(),
                    params,
                    result,
                }
            })
            .collect::<Vec<_>>()
    });
    Ok(runs)
}
