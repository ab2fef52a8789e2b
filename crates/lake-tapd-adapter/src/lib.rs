pub mod models;
pub mod tasks;

use lake_core::{ScopeDim, ScopeKey};
use lake_engine::{Plugin, SubtaskMeta};

pub use models::{TapdSubWorkspace, TapdSubWorkspaceRes};
pub use tasks::{
    convert_sub_workspaces, extract_sub_workspaces, sub_workspace_to_board, CONVERT_SUB_WORKSPACES,
    EXTRACT_SUB_WORKSPACES, RAW_SUB_WORKSPACE_TABLE, WORKSPACE_ID,
};

static SUBTASKS: [SubtaskMeta; 2] = [EXTRACT_SUB_WORKSPACES, CONVERT_SUB_WORKSPACES];

#[derive(Debug, Clone, Copy, Default)]
pub struct Tapd;

impl Plugin for Tapd {
    fn name(&self) -> &'static str {
        "tapd"
    }

    fn description(&self) -> &'static str {
        "Collects TAPD workspace data into boards"
    }

    fn subtasks(&self) -> &'static [SubtaskMeta] {
        &SUBTASKS
    }

    /// `primary` is the workspace id; TAPD has no secondary dimension.
    fn scope_key(&self, connection_id: u64, primary: u64, _secondary: Option<u64>) -> ScopeKey {
        ScopeKey::new(connection_id, ScopeDim::new(WORKSPACE_ID, primary))
    }
}
