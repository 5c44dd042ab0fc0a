//! Domain types and DTOs
//!
//! Projects own scopes; scopes own their extraction result, takeoff line items
//! and cost analysis.

pub mod ai;
pub mod estimate;
pub mod projects;

// Re-export commonly used types
pub use estimate::*;
pub use projects::*;

// AI types are accessed via crate::domain::ai:: to avoid namespace pollution
