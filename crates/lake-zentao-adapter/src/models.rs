use chrono::{DateTime, Utc};
use lake_core::de::{flexible_bool, flexible_datetime, flexible_f64, flexible_u64};
use lake_core::{ActorRef, Entity};
use serde::{Deserialize, Serialize};

/// A story as returned by the Zentao stories API. Actor fields come either
/// as `id#name` strings or as user objects; both decode into [`ActorRef`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZentaoStoryRes {
    #[serde(deserialize_with = "flexible_u64")]
    pub id: u64,
    #[serde(default, deserialize_with = "flexible_u64")]
    pub product: u64,
    #[serde(default, deserialize_with = "flexible_u64")]
    pub branch: u64,
    #[serde(default, deserialize_with = "flexible_u64")]
    pub version: u64,
    #[serde(default, deserialize_with = "flexible_u64")]
    pub module: u64,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub keywords: String,
    #[serde(default, rename = "type")]
    pub story_type: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, deserialize_with = "flexible_u64")]
    pub pri: u64,
    #[serde(default, deserialize_with = "flexible_f64")]
    pub estimate: f64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub sub_status: String,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub opened_by: ActorRef,
    #[serde(default, deserialize_with = "flexible_datetime")]
    pub opened_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigned_to: ActorRef,
    #[serde(default, deserialize_with = "flexible_datetime")]
    pub assigned_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_edited_by: ActorRef,
    #[serde(default, deserialize_with = "flexible_datetime")]
    pub last_edited_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_by: ActorRef,
    #[serde(default, deserialize_with = "flexible_datetime")]
    pub closed_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_reason: String,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub deleted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZentaoStory {
    pub connection_id: u64,
    pub id: u64,
    pub product: u64,
    pub branch: u64,
    pub version: u64,
    pub module: u64,
    pub source: String,
    pub title: String,
    pub keywords: String,
    pub story_type: String,
    pub category: String,
    pub pri: u64,
    pub estimate: f64,
    pub status: String,
    pub sub_status: String,
    pub stage: String,
    pub opened_by_id: String,
    pub opened_by_name: String,
    pub opened_date: Option<DateTime<Utc>>,
    pub assigned_to_id: String,
    pub assigned_to_name: String,
    pub assigned_date: Option<DateTime<Utc>>,
    pub last_edited_id: String,
    pub last_edited_date: Option<DateTime<Utc>>,
    pub closed_by_id: String,
    pub closed_by_name: String,
    pub closed_date: Option<DateTime<Utc>>,
    pub closed_reason: String,
    pub deleted: bool,
}

impl ZentaoStory {
    pub fn from_res(connection_id: u64, res: ZentaoStoryRes) -> Self {
        let (opened_by_id, opened_by_name) = res.opened_by.into_parts();
        let (assigned_to_id, assigned_to_name) = res.assigned_to.into_parts();
        let (closed_by_id, closed_by_name) = res.closed_by.into_parts();
        Self {
            connection_id,
            id: res.id,
            product: res.product,
            branch: res.branch,
            version: res.version,
            module: res.module,
            source: res.source,
            title: res.title,
            keywords: res.keywords,
            story_type: res.story_type,
            category: res.category,
            pri: res.pri,
            estimate: res.estimate,
            status: res.status,
            sub_status: res.sub_status,
            stage: res.stage,
            opened_by_id,
            opened_by_name,
            opened_date: res.opened_date,
            assigned_to_id,
            assigned_to_name,
            assigned_date: res.assigned_date,
            last_edited_id: res.last_edited_by.id().to_string(),
            last_edited_date: res.last_edited_date,
            closed_by_id,
            closed_by_name,
            closed_date: res.closed_date,
            closed_reason: res.closed_reason,
            deleted: res.deleted,
        }
    }
}

impl Entity for ZentaoStory {
    const TABLE: &'static str = "_tool_zentao_stories";

    fn key(&self) -> String {
        format!("{}:{}", self.connection_id, self.id)
    }
}

/// Links a story to the project it was collected under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZentaoProjectStory {
    pub connection_id: u64,
    pub project_id: u64,
    pub story_id: u64,
}

impl Entity for ZentaoProjectStory {
    const TABLE: &'static str = "_tool_zentao_project_stories";

    fn key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.connection_id, self.project_id, self.story_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_fields_split_into_id_and_name() {
        let res: ZentaoStoryRes = serde_json::from_str(
            r#"{
                "id": "12",
                "title": "Login page",
                "openedBy": "42#Alice",
                "assignedTo": {"id": 7, "account": "bob", "realname": "Bob"},
                "closedBy": null,
                "lastEditedBy": "Carol"
            }"#,
        )
        .expect("decode");
        let story = ZentaoStory::from_res(1, res);
        assert_eq!(story.opened_by_id, "42");
        assert_eq!(story.opened_by_name, "Alice");
        assert_eq!(story.assigned_to_name, "Bob");
        assert_eq!(story.closed_by_id, "");
        assert_eq!(story.closed_by_name, "");
        assert_eq!(story.last_edited_id, "");
        assert_eq!(story.key(), "1:12");
    }

    #[test]
    fn zeroed_dates_and_string_numbers_decode() {
        let res: ZentaoStoryRes = serde_json::from_str(
            r#"{"id":3,"pri":"2","estimate":"1.5","closedDate":"0000-00-00 00:00:00","deleted":"0"}"#,
        )
        .expect("decode");
        assert_eq!(res.pri, 2);
        assert_eq!(res.estimate, 1.5);
        assert!(res.closed_date.is_none());
        assert!(!res.deleted);
    }

    #[test]
    fn project_story_key_names_both_sides() {
        let link = ZentaoProjectStory {
            connection_id: 1,
            project_id: 5,
            story_id: 12,
        };
        assert_eq!(link.key(), "1:5:12");
    }
}
