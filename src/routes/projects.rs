use axum::{extract::State, response::IntoResponse};
use std::sync::Arc;

use crate::api::{Created, DataResponse, NoContent, ValidJson, ValidPath};
use crate::app::AppState;
use crate::domain::CreateProjectRequest;
use crate::error::ApiResult;

/// Create a new project
pub async fn create_project(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<CreateProjectRequest>,
) -> ApiResult<impl IntoResponse> {
    tracing::info!(project_name = %req.project_name, "Creating project");

    let project = state.store.create_project(&req.project_name)?;
    Ok(Created(project))
}

/// List projects (id and name only)
pub async fn list_projects(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    DataResponse::new(state.store.list_projects())
}

/// Get a specific project with all its scopes
pub async fn get_project(
    State(state): State<Arc<AppState>>,
    ValidPath(project_id): ValidPath<String>,
) -> ApiResult<impl IntoResponse> {
    let project = state.store.get_project(&project_id)?;
    Ok(DataResponse::new(project))
}

/// Delete a project and everything under it
pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    ValidPath(project_id): ValidPath<String>,
) -> ApiResult<impl IntoResponse> {
    state.store.delete_project(&project_id)?;
    Ok(NoContent)
}
