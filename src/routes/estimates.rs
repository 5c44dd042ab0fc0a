//! Takeoff upload, price edits and cost analysis for a scope.

use axum::{
    extract::{Multipart, State},
    http::HeaderMap,
    response::IntoResponse,
};
use std::sync::Arc;

use super::upload::UploadForm;
use crate::api::{DataResponse, ValidJson, ValidPath};
use crate::app::AppState;
use crate::domain::UpdatePriceRequest;
use crate::error::{ApiError, ApiResult};
use crate::middleware::RequestIdExt;
use crate::services::estimates;

/// Upload a takeoff table, replacing the scope's line items.
///
/// POST /projects/:project_id/scopes/:scope_id/estimate
/// multipart: `estimate_file` (.csv, .xlsx, .xls)
pub async fn upload_estimate(
    State(state): State<Arc<AppState>>,
    ValidPath((project_id, scope_id)): ValidPath<(String, String)>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut form = UploadForm::read(multipart).await?;
    let upload = form
        .take_file("estimate_file")
        .ok_or_else(|| ApiError::validation("estimate_file is required"))?;

    tracing::info!(
        project_id = %project_id,
        scope_id = %scope_id,
        filename = %upload.filename,
        "Uploading estimate"
    );

    let scope =
        estimates::load_estimate_file(&state.store, &project_id, &scope_id, &upload).await?;
    Ok(DataResponse::new(scope))
}

/// Set a line item's unit price.
///
/// PUT /projects/:project_id/scopes/:scope_id/estimate/items/:item_index
pub async fn update_item_price(
    State(state): State<Arc<AppState>>,
    ValidPath((project_id, scope_id, item_index)): ValidPath<(String, String, i64)>,
    ValidJson(req): ValidJson<UpdatePriceRequest>,
) -> ApiResult<impl IntoResponse> {
    let item = estimates::update_price(
        &state.store,
        &project_id,
        &scope_id,
        item_index,
        req.unit_price,
    )?;
    Ok(DataResponse::new(item))
}

/// Run cost analysis over the priced line items.
///
/// POST /projects/:project_id/scopes/:scope_id/analysis
pub async fn analyze_estimate(
    State(state): State<Arc<AppState>>,
    ValidPath((project_id, scope_id)): ValidPath<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    tracing::info!(
        request_id = ?headers.request_id(),
        project_id = %project_id,
        scope_id = %scope_id,
        "Analyzing estimate"
    );

    let scope = estimates::analyze(&state.store, &state.ai_client, &project_id, &scope_id).await?;
    Ok(DataResponse::new(scope))
}
