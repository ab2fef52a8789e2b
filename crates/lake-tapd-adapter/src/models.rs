use chrono::{DateTime, Utc};
use lake_core::de::{flexible_datetime, flexible_u64};
use lake_core::{DecodeError, Entity};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A sub-workspace as returned by the TAPD workspace API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TapdSubWorkspaceRes {
    #[serde(deserialize_with = "flexible_u64")]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub pretty_name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "flexible_datetime")]
    pub begin_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "flexible_datetime")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub external_on: String,
    #[serde(default, alias = "parentId", deserialize_with = "flexible_u64")]
    pub parent_id: u64,
    #[serde(default)]
    pub creator: String,
    #[serde(default, deserialize_with = "flexible_datetime")]
    pub created: Option<DateTime<Utc>>,
}

impl TapdSubWorkspaceRes {
    /// Accepts both the bare object and the `{"Workspace": {...}}` envelope
    /// the list endpoint wraps each item in.
    pub fn decode(data: &str) -> Result<Self, DecodeError> {
        let mut value: Value = serde_json::from_str(data)?;
        if let Some(inner) = value.get_mut("Workspace").map(Value::take) {
            value = inner;
        }
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TapdSubWorkspace {
    pub connection_id: u64,
    pub id: u64,
    pub name: String,
    pub pretty_name: String,
    pub category: String,
    pub status: String,
    pub description: String,
    pub begin_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub external_on: String,
    pub parent_id: u64,
    pub creator: String,
    pub created: Option<DateTime<Utc>>,
}

impl TapdSubWorkspace {
    pub fn from_res(connection_id: u64, res: TapdSubWorkspaceRes) -> Self {
        Self {
            connection_id,
            id: res.id,
            name: res.name,
            pretty_name: res.pretty_name,
            category: res.category,
            status: res.status,
            description: res.description,
            begin_date: res.begin_date,
            end_date: res.end_date,
            external_on: res.external_on,
            parent_id: res.parent_id,
            creator: res.creator,
            created: res.created,
        }
    }
}

impl Entity for TapdSubWorkspace {
    const TABLE: &'static str = "_tool_tapd_sub_workspaces";

    fn key(&self) -> String {
        format!("{}:{}", self.connection_id, self.id)
    }
}
