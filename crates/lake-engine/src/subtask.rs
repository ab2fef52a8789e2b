use crate::cancel::CancelToken;
use crate::{EngineError, SubtaskReport};
use lake_core::ScopeKey;
use lake_storage::LakeStore;

pub type SubtaskEntry = fn(&TaskContext<'_>) -> Result<SubtaskReport, EngineError>;

/// Everything one subtask invocation may touch.
#[derive(Clone, Copy)]
pub struct TaskContext<'a> {
    pub store: &'a LakeStore,
    pub scope: &'a ScopeKey,
    pub cancel: &'a CancelToken,
}

impl<'a> TaskContext<'a> {
    pub fn new(store: &'a LakeStore, scope: &'a ScopeKey, cancel: &'a CancelToken) -> Self {
        Self {
            store,
            scope,
            cancel,
        }
    }
}

#[derive(Clone, Copy)]
pub struct SubtaskMeta {
    pub name: &'static str,
    pub entry: SubtaskEntry,
    pub enabled_by_default: bool,
    pub description: &'static str,
    pub domain_types: &'static [&'static str],
}

impl std::fmt::Debug for SubtaskMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubtaskMeta")
            .field("name", &self.name)
            .field("enabled_by_default", &self.enabled_by_default)
            .field("domain_types", &self.domain_types)
            .finish()
    }
}

/// A source-tool integration: how to build its scope keys and which
/// subtasks to run for each, in order.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Extract subtasks first, then the converters that read their output.
    fn subtasks(&self) -> &'static [SubtaskMeta];

    fn scope_key(&self, connection_id: u64, primary: u64, secondary: Option<u64>) -> ScopeKey;
}
