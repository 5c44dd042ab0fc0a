use axum::{
    extract::{Multipart, State},
    http::HeaderMap,
    response::IntoResponse,
};
use std::sync::Arc;

use super::upload::UploadForm;
use crate::api::{Created, DataResponse, ValidPath};
use crate::app::AppState;
use crate::error::ApiResult;
use crate::middleware::RequestIdExt;
use crate::services::scopes;

/// Add a scope of work, with an optional specification file.
///
/// POST /projects/:project_id/scopes
/// multipart: `scope_of_work` (text), `spec_file` (file, optional)
pub async fn add_scope(
    State(state): State<Arc<AppState>>,
    ValidPath(project_id): ValidPath<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut form = UploadForm::read(multipart).await?;
    let scope_of_work = form.required_text("scope_of_work")?.to_string();
    let spec = form.take_file("spec_file");

    tracing::info!(
        request_id = ?headers.request_id(),
        project_id = %project_id,
        has_spec = spec.is_some(),
        "Adding scope"
    );

    let scope = scopes::add_scope(
        &state.store,
        &state.ai_client,
        &project_id,
        &scope_of_work,
        spec,
    )
    .await?;

    Ok(Created(scope))
}

/// GET /projects/:project_id/scopes/:scope_id
pub async fn get_scope(
    State(state): State<Arc<AppState>>,
    ValidPath((project_id, scope_id)): ValidPath<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let scope = state.store.find_scope(&project_id, &scope_id)?;
    Ok(DataResponse::new(scope))
}
