pub mod models;
pub mod tasks;

use lake_core::{ScopeDim, ScopeKey};
use lake_engine::{Plugin, SubtaskMeta};

pub use models::{ZentaoProjectStory, ZentaoStory, ZentaoStoryRes};
pub use tasks::{
    convert_stories, extract_stories, story_to_issue, CONVERT_STORIES, EXTRACT_STORIES,
    PRODUCT_ID, PROJECT_ID, RAW_STORY_TABLE,
};

static SUBTASKS: [SubtaskMeta; 2] = [EXTRACT_STORIES, CONVERT_STORIES];

#[derive(Debug, Clone, Copy, Default)]
pub struct Zentao;

impl Plugin for Zentao {
    fn name(&self) -> &'static str {
        "zentao"
    }

    fn description(&self) -> &'static str {
        "Collects Zentao product stories into issues"
    }

    fn subtasks(&self) -> &'static [SubtaskMeta] {
        &SUBTASKS
    }

    /// `primary` is the product id and `secondary` the project id. Both are
    /// always part of the params, zero when unset.
    fn scope_key(&self, connection_id: u64, primary: u64, secondary: Option<u64>) -> ScopeKey {
        ScopeKey::new(connection_id, ScopeDim::new(PRODUCT_ID, primary))
            .with_secondary(ScopeDim::new(PROJECT_ID, secondary.unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_key_always_declares_project() {
        assert_eq!(
            Zentao.scope_key(1, 3, None).params(),
            r#"{"ConnectionId":1,"ProductId":3,"ProjectId":0}"#
        );
        assert_eq!(
            Zentao.scope_key(1, 3, Some(5)).params(),
            r#"{"ConnectionId":1,"ProductId":3,"ProjectId":5}"#
        );
    }
}
