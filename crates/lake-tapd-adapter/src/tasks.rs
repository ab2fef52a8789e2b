use crate::models::{TapdSubWorkspace, TapdSubWorkspaceRes};
use lake_core::{Board, DecodeError, DomainIdGenerator, EntityRecord, MappingError, RawRow};
use lake_engine::{Converter, EngineError, Extractor, SubtaskMeta, SubtaskReport, TaskContext};

pub const WORKSPACE_ID: &str = "WorkspaceId";
pub const RAW_SUB_WORKSPACE_TABLE: &str = "_raw_tapd_api_sub_workspaces";

pub const EXTRACT_SUB_WORKSPACES: SubtaskMeta = SubtaskMeta {
    name: "extractSubWorkspaces",
    entry: extract_sub_workspaces,
    enabled_by_default: true,
    description: "Extract raw sub-workspace data into tool layer table _tool_tapd_sub_workspaces",
    domain_types: &["TICKET"],
};

pub const CONVERT_SUB_WORKSPACES: SubtaskMeta = SubtaskMeta {
    name: "convertSubWorkspaces",
    entry: convert_sub_workspaces,
    enabled_by_default: true,
    description: "Convert tool layer table _tool_tapd_sub_workspaces into domain layer table boards",
    domain_types: &["TICKET"],
};

pub fn extract_sub_workspaces(ctx: &TaskContext<'_>) -> Result<SubtaskReport, EngineError> {
    let connection_id = ctx.scope.connection_id();
    Extractor::new(
        ctx,
        EXTRACT_SUB_WORKSPACES.name,
        RAW_SUB_WORKSPACE_TABLE,
        move |row: &RawRow| -> Result<Vec<EntityRecord>, DecodeError> {
            let res = TapdSubWorkspaceRes::decode(&row.data)?;
            let entity = TapdSubWorkspace::from_res(connection_id, res);
            Ok(vec![EntityRecord::encode(&entity)?])
        },
    )
    .require(WORKSPACE_ID)
    .execute()
}

pub fn convert_sub_workspaces(ctx: &TaskContext<'_>) -> Result<SubtaskReport, EngineError> {
    Converter::new(ctx, CONVERT_SUB_WORKSPACES.name, sub_workspace_to_board)
        .require(WORKSPACE_ID)
        .execute()
}

pub fn sub_workspace_to_board(workspace: &TapdSubWorkspace) -> Result<Board, MappingError> {
    if workspace.id == 0 {
        return Err(MappingError::new("id", "sub-workspace has no id"));
    }
    Ok(Board {
        id: DomainIdGenerator::new("tapd", "TapdWorkspace")
            .generate([workspace.connection_id, workspace.id]),
        name: workspace.name.clone(),
        description: workspace.description.clone(),
        url: format!("https://www.tapd.cn/{}", workspace.id),
        created_date: workspace.created,
        board_type: workspace.category.clone(),
    })
}
