pub mod cancel;
pub mod converter;
pub mod extractor;
pub mod runner;
pub mod subtask;

use lake_core::{ContractError, DecodeError, MappingError};
use lake_storage::StorageError;
use thiserror::Error;

pub use cancel::CancelToken;
pub use converter::Converter;
pub use extractor::Extractor;
pub use runner::{run_plugin, run_scopes, ScopeJob, ScopeRun};
pub use subtask::{Plugin, SubtaskEntry, SubtaskMeta, TaskContext};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("decode failed for {table} row {row_id}: {source}")]
    Decode {
        table: String,
        row_id: u64,
        #[source]
        source: DecodeError,
    },
    #[error("mapping failed for {table} {key}: {source}")]
    Mapping {
        table: String,
        key: String,
        #[source]
        source: MappingError,
    },
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("contract error: {0}")]
    Contract(#[from] ContractError),
    #[error("cancelled while processing {params}")]
    Cancelled { params: String },
    #[error("worker pool error: {0}")]
    WorkerPool(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtaskOutcome {
    Completed,
    /// The scope lacked a dimension the subtask depends on; nothing was read
    /// or written.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtaskReport {
    pub subtask: String,
    pub params: String,
    pub outcome: SubtaskOutcome,
    pub rows_read: usize,
    pub entities_written: usize,
    /// Order-independent digest of the written record set; `None` when skipped.
    pub digest: Option<String>,
}

impl SubtaskReport {
    pub fn skipped(subtask: &str, params: String) -> Self {
        Self {
            subtask: subtask.to_string(),
            params,
            outcome: SubtaskOutcome::Skipped,
            rows_read: 0,
            entities_written: 0,
            digest: None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.outcome == SubtaskOutcome::Skipped
    }
}
