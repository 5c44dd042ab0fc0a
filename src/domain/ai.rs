//! AI result models.
//!
//! Both results are tagged: either the structured payload the model returned,
//! or a failure marker carrying a reason. They serialize untagged so a stored
//! failure reads as `{"error": "..."}` and a success reads as the payload itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute name to value, as extracted for one material system.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A single attribute value. Values may nest arbitrarily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
    List(Vec<AttributeValue>),
    Nested(Attributes),
    Null,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialSystem {
    pub system_name: String,
    #[serde(default)]
    pub attributes: Attributes,
}

/// Structured data extracted from a specification document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addendum: Option<String>,
    pub material_systems: Vec<MaterialSystem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AiExtractionResult {
    Failure { error: String },
    Success(SpecData),
}

impl AiExtractionResult {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            error: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// One category in a cost rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostCategory {
    pub category: String,
    pub total_cost: f64,
}

/// Cost rollup and risk commentary over priced line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateAnalysis {
    pub summary: String,
    pub cost_breakdown: Vec<CostCategory>,
    pub grand_total: f64,
    #[serde(default)]
    pub risks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AiAnalysisResult {
    Failure { error: String },
    Success(EstimateAnalysis),
}

impl AiAnalysisResult {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            error: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}
