//! Tool-agnostic domain entities shared by every integration.

use crate::entity::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub const ISSUE_TYPE_REQUIREMENT: &str = "REQUIREMENT";

pub const ISSUE_STATUS_TODO: &str = "TODO";
pub const ISSUE_STATUS_IN_PROGRESS: &str = "IN_PROGRESS";
pub const ISSUE_STATUS_DONE: &str = "DONE";

/// Builds global domain ids of the form `<plugin>:<ToolType>:<part>:<part>…`,
/// e.g. `tapd:TapdWorkspace:1:991`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainIdGenerator {
    prefix: String,
}

impl DomainIdGenerator {
    pub fn new(plugin: &str, tool_type: &str) -> Self {
        Self {
            prefix: format!("{plugin}:{tool_type}"),
        }
    }

    pub fn generate<I, P>(&self, parts: I) -> String
    where
        I: IntoIterator<Item = P>,
        P: Display,
    {
        let mut id = self.prefix.clone();
        for part in parts {
            id.push(':');
            id.push_str(&part.to_string());
        }
        id
    }
}

/// A container of tickets: a project, workspace, product or board in the
/// source tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub id: String,
    pub name: String,
    pub description: String,
    pub url: String,
    pub created_date: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub board_type: String,
}

impl Entity for Board {
    const TABLE: &'static str = "boards";

    fn key(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub url: String,
    pub issue_key: String,
    pub title: String,
    #[serde(rename = "type")]
    pub issue_type: String,
    pub original_type: String,
    pub status: String,
    pub original_status: String,
    pub priority: String,
    pub story_point: f64,
    pub creator_id: String,
    pub creator_name: String,
    pub assignee_id: String,
    pub assignee_name: String,
    pub created_date: Option<DateTime<Utc>>,
    pub resolution_date: Option<DateTime<Utc>>,
}

impl Entity for Issue {
    const TABLE: &'static str = "issues";

    fn key(&self) -> String {
        self.id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_scope_qualified_ids() {
        let generator = DomainIdGenerator::new("tapd", "TapdWorkspace");
        assert_eq!(generator.generate([1_u64, 991]), "tapd:TapdWorkspace:1:991");
        assert_eq!(
            generator.generate(Vec::<u64>::new()),
            "tapd:TapdWorkspace"
        );
    }

    #[test]
    fn board_serializes_type_field() {
        let board = Board {
            id: "tapd:TapdWorkspace:1:991".to_string(),
            name: "Sub".to_string(),
            board_type: "project".to_string(),
            ..Board::default()
        };
        let value = serde_json::to_value(&board).expect("encode");
        assert_eq!(value["type"], "project");
        assert_eq!(board.key(), "tapd:TapdWorkspace:1:991");
    }
}
