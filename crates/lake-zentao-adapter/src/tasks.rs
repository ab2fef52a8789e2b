use crate::models::{ZentaoProjectStory, ZentaoStory, ZentaoStoryRes};
use lake_core::domain::{
    ISSUE_STATUS_DONE, ISSUE_STATUS_IN_PROGRESS, ISSUE_STATUS_TODO, ISSUE_TYPE_REQUIREMENT,
};
use lake_core::{DecodeError, DomainIdGenerator, EntityRecord, Issue, MappingError, RawRow};
use lake_engine::{Converter, EngineError, Extractor, SubtaskMeta, SubtaskReport, TaskContext};

pub const PRODUCT_ID: &str = "ProductId";
pub const PROJECT_ID: &str = "ProjectId";
pub const RAW_STORY_TABLE: &str = "_raw_zentao_api_stories";

pub const EXTRACT_STORIES: SubtaskMeta = SubtaskMeta {
    name: "extractStory",
    entry: extract_stories,
    enabled_by_default: true,
    description: "Extract Zentao stories into _tool_zentao_stories",
    domain_types: &["TICKET"],
};

pub const CONVERT_STORIES: SubtaskMeta = SubtaskMeta {
    name: "convertStory",
    entry: convert_stories,
    enabled_by_default: true,
    description: "Convert _tool_zentao_stories into domain layer table issues",
    domain_types: &["TICKET"],
};

/// Stories are collected per product; a scope without a product is skipped.
pub fn extract_stories(ctx: &TaskContext<'_>) -> Result<SubtaskReport, EngineError> {
    let connection_id = ctx.scope.connection_id();
    let project_id = ctx.scope.dimension(PROJECT_ID).unwrap_or(0);
    Extractor::new(
        ctx,
        EXTRACT_STORIES.name,
        RAW_STORY_TABLE,
        move |row: &RawRow| -> Result<Vec<EntityRecord>, DecodeError> {
            let res: ZentaoStoryRes = row.decode()?;
            let story = ZentaoStory::from_res(connection_id, res);
            let mut records = vec![EntityRecord::encode(&story)?];
            if project_id != 0 {
                records.push(EntityRecord::encode(&ZentaoProjectStory {
                    connection_id,
                    project_id,
                    story_id: story.id,
                })?);
            }
            Ok(records)
        },
    )
    .require(PRODUCT_ID)
    .execute()
}

pub fn convert_stories(ctx: &TaskContext<'_>) -> Result<SubtaskReport, EngineError> {
    Converter::new(ctx, CONVERT_STORIES.name, story_to_issue)
        .require(PRODUCT_ID)
        .execute()
}

pub fn story_to_issue(story: &ZentaoStory) -> Result<Issue, MappingError> {
    Ok(Issue {
        id: DomainIdGenerator::new("zentao", "ZentaoStory")
            .generate([story.connection_id, story.id]),
        url: format!("story-view-{}.html", story.id),
        issue_key: story.id.to_string(),
        title: story.title.clone(),
        issue_type: ISSUE_TYPE_REQUIREMENT.to_string(),
        original_type: story.story_type.clone(),
        status: story_status(&story.status, &story.stage)?.to_string(),
        original_status: story.status.clone(),
        priority: story.pri.to_string(),
        story_point: story.estimate,
        creator_id: story.opened_by_id.clone(),
        creator_name: story.opened_by_name.clone(),
        assignee_id: story.assigned_to_id.clone(),
        assignee_name: story.assigned_to_name.clone(),
        created_date: story.opened_date,
        resolution_date: story.closed_date,
    })
}

/// Reviewable states are to-do; an accepted story follows its development
/// stage.
fn story_status(status: &str, stage: &str) -> Result<&'static str, MappingError> {
    match status {
        "closed" => Ok(ISSUE_STATUS_DONE),
        "draft" | "reviewing" => Ok(ISSUE_STATUS_TODO),
        "active" | "changing" | "changed" => match stage {
            "" | "wait" | "planned" | "projected" => Ok(ISSUE_STATUS_TODO),
            "developing" | "developed" | "testing" | "tested" | "verified" => {
                Ok(ISSUE_STATUS_IN_PROGRESS)
            }
            "released" | "closed" => Ok(ISSUE_STATUS_DONE),
            other => Err(MappingError::new("stage", format!("unknown story stage `{other}`"))),
        },
        other => Err(MappingError::new(
            "status",
            format!("unknown story status `{other}`"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(status: &str, stage: &str) -> ZentaoStory {
        ZentaoStory {
            connection_id: 1,
            id: 12,
            title: "Login page".to_string(),
            story_type: "story".to_string(),
            pri: 2,
            estimate: 3.0,
            status: status.to_string(),
            stage: stage.to_string(),
            opened_by_id: "42".to_string(),
            opened_by_name: "Alice".to_string(),
            ..ZentaoStory::default()
        }
    }

    #[test]
    fn maps_story_fields_onto_issue() {
        let issue = story_to_issue(&story("active", "developing")).expect("map");
        assert_eq!(issue.id, "zentao:ZentaoStory:1:12");
        assert_eq!(issue.issue_key, "12");
        assert_eq!(issue.issue_type, ISSUE_TYPE_REQUIREMENT);
        assert_eq!(issue.original_type, "story");
        assert_eq!(issue.status, ISSUE_STATUS_IN_PROGRESS);
        assert_eq!(issue.original_status, "active");
        assert_eq!(issue.priority, "2");
        assert_eq!(issue.story_point, 3.0);
        assert_eq!(issue.creator_id, "42");
        assert_eq!(issue.creator_name, "Alice");
    }

    #[test]
    fn status_follows_review_state_then_stage() {
        let status = |status: &str, stage: &str| {
            story_to_issue(&story(status, stage))
                .expect("map")
                .status
        };
        assert_eq!(status("closed", "developing"), ISSUE_STATUS_DONE);
        assert_eq!(status("draft", ""), ISSUE_STATUS_TODO);
        assert_eq!(status("active", "wait"), ISSUE_STATUS_TODO);
        assert_eq!(status("changing", "testing"), ISSUE_STATUS_IN_PROGRESS);
        assert_eq!(status("active", "released"), ISSUE_STATUS_DONE);
    }

    #[test]
    fn unknown_status_is_a_mapping_error() {
        let err = story_to_issue(&story("archived", "")).expect_err("unknown status");
        assert_eq!(err.field(), "status");
        let err = story_to_issue(&story("active", "shipping")).expect_err("unknown stage");
        assert_eq!(err.field(), "stage");
    }
}
