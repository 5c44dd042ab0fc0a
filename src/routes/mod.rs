pub mod estimates;
pub mod health;
pub mod projects;
pub mod scopes;
mod upload;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        // Projects
        .route(
            "/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/projects/:project_id",
            get(projects::get_project).delete(projects::delete_project),
        )
        // Scopes (nested under projects)
        .route("/projects/:project_id/scopes", post(scopes::add_scope))
        .route(
            "/projects/:project_id/scopes/:scope_id",
            get(scopes::get_scope),
        )
        // Estimates (nested under scopes)
        .route(
            "/projects/:project_id/scopes/:scope_id/estimate",
            post(estimates::upload_estimate),
        )
        .route(
            "/projects/:project_id/scopes/:scope_id/estimate/items/:item_index",
            put(estimates::update_item_price),
        )
        .route(
            "/projects/:project_id/scopes/:scope_id/analysis",
            post(estimates::analyze_estimate),
        )
}
