use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ai::{AiAnalysisResult, AiExtractionResult};
use super::estimate::EstimateLineItem;

/// Project entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub project_name: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub scopes: Vec<Scope>,
}

impl Project {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_name: project_name.into(),
            created_at: Utc::now(),
            scopes: Vec::new(),
        }
    }

    pub fn scope(&self, scope_id: &str) -> Option<&Scope> {
        self.scopes.iter().find(|s| s.scope_id == scope_id)
    }

    pub fn scope_mut(&mut self, scope_id: &str) -> Option<&mut Scope> {
        self.scopes.iter_mut().find(|s| s.scope_id == scope_id)
    }

    pub fn summary(&self) -> ProjectSummary {
        ProjectSummary {
            id: self.id.clone(),
            project_name: self.project_name.clone(),
        }
    }
}

/// A unit of work within a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub scope_id: String,
    pub scope_of_work: String,
    #[serde(default)]
    pub spec_filename: Option<String>,
    #[serde(default)]
    pub ai_summary: Option<AiExtractionResult>,
    #[serde(default)]
    pub estimate_data: Vec<EstimateLineItem>,
    #[serde(default)]
    pub estimate_analysis: Option<AiAnalysisResult>,
}

impl Scope {
    pub fn new(
        scope_of_work: impl Into<String>,
        spec_filename: Option<String>,
        ai_summary: AiExtractionResult,
    ) -> Self {
        Self {
            scope_id: Uuid::new_v4().to_string(),
            scope_of_work: scope_of_work.into(),
            spec_filename,
            ai_summary: Some(ai_summary),
            estimate_data: Vec::new(),
            estimate_analysis: None,
        }
    }
}

/// Listing projection: never carries scopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: String,
    pub project_name: String,
}

/// Request DTO for creating a project
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectRequest {
    pub project_name: String,
}

/// Request DTO for updating a line item's unit price
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePriceRequest {
    pub unit_price: f64,
}
