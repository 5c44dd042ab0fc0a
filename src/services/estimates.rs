//! Estimate pipeline: takeoff ingestion, price edits and cost analysis.

use tracing::{info, instrument};

use super::ai_client::AiClient;
use super::documents::{self, UploadedFile};
use super::store::ProjectStore;
use crate::domain::ai::AiAnalysisResult;
use crate::domain::{normalize_takeoff, EstimateLineItem, Scope, Table};
use crate::error::{ApiError, ApiResult};

/// Parse an uploaded takeoff file and load it into the scope.
pub async fn load_estimate_file(
    store: &ProjectStore,
    project_id: &str,
    scope_id: &str,
    upload: &UploadedFile,
) -> ApiResult<Scope> {
    // Lookup errors take precedence over a bad upload
    store.find_scope(project_id, scope_id)?;

    let table = documents::load_table(upload)
        .await
        .map_err(|e| ApiError::validation(e.to_string()))?;
    load_estimate(store, project_id, scope_id, &table)
}

/// Replace the scope's line items with the normalized table rows.
#[instrument(skip(store, table), fields(rows = table.rows.len()))]
pub fn load_estimate(
    store: &ProjectStore,
    project_id: &str,
    scope_id: &str,
    table: &Table,
) -> ApiResult<Scope> {
    let items = normalize_takeoff(table).map_err(ApiError::Validation)?;
    let count = items.len();

    let scope = store.update_scope(project_id, scope_id, move |scope| {
        scope.estimate_data = items;
        Ok(scope.clone())
    })?;

    info!(project_id = %project_id, scope_id = %scope_id, items = count, "Estimate loaded");
    Ok(scope)
}

/// Set one item's unit price and recompute its total.
#[instrument(skip(store))]
pub fn update_price(
    store: &ProjectStore,
    project_id: &str,
    scope_id: &str,
    item_index: i64,
    unit_price: f64,
) -> ApiResult<EstimateLineItem> {
    if !unit_price.is_finite() || unit_price < 0.0 {
        return Err(ApiError::validation(
            "unit_price must be a non-negative number",
        ));
    }

    store.update_scope(project_id, scope_id, |scope| {
        let len = scope.estimate_data.len();
        let item = usize::try_from(item_index)
            .ok()
            .and_then(|idx| scope.estimate_data.get_mut(idx))
            .ok_or(ApiError::IndexOutOfRange {
                index: item_index,
                len,
            })?;

        // A non-finite total would not survive the snapshot
        if !(item.quantity * unit_price).is_finite() {
            return Err(ApiError::validation(format!(
                "Total for quantity {} at unit price {} is out of range",
                item.quantity, unit_price
            )));
        }

        item.set_unit_price(unit_price);
        Ok(item.clone())
    })
}

/// Run AI cost analysis over the scope's priced items.
///
/// The previous analysis is only replaced once a new result is in hand, and
/// the store lock is released while the AI service is called.
#[instrument(skip(store, ai))]
pub async fn analyze(
    store: &ProjectStore,
    ai: &AiClient,
    project_id: &str,
    scope_id: &str,
) -> ApiResult<Scope> {
    let priced: Vec<EstimateLineItem> = store
        .find_scope(project_id, scope_id)?
        .estimate_data
        .into_iter()
        .filter(EstimateLineItem::is_priced)
        .collect();

    if priced.is_empty() {
        return Err(ApiError::validation(
            "No priced line items to analyze; set unit prices on items with a quantity first",
        ));
    }

    let analysis = ai.analyze_estimate(&priced).await;

    let scope = store.update_scope(project_id, scope_id, move |scope| {
        scope.estimate_analysis = Some(analysis);
        Ok(scope.clone())
    })?;

    info!(
        project_id = %project_id,
        scope_id = %scope_id,
        items = priced.len(),
        succeeded = scope
            .estimate_analysis
            .as_ref()
            .is_some_and(AiAnalysisResult::is_success),
        "Estimate analyzed"
    );
    Ok(scope)
}
