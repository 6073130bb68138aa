//! Response schemas for the action dispatch surface.
//!
//! These types are the truthful boundary with the host's front end:
//! every response carries at least an `errors` array, and the shapes
//! here are serialized verbatim as the JSON bodies the dashboards
//! consume.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::fields::{FieldMetadata, FieldUiConfig, GeneralSettings, ValidationTypes};
use crate::core::matcher::MatchType;
use crate::core::parse::ParsedName;
use crate::core::ProjectId;

/// One record's fields as the front end sees them.
pub type RecordView = IndexMap<String, String>;

// =============================================================================
// Config dashboard
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub project_id: ProjectId,
    pub app_title: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkedProjects {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specimen: Option<ProjectInfo>,
    #[serde(rename = "box", skip_serializing_if = "Option::is_none")]
    pub box_project: Option<ProjectInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment: Option<ProjectInfo>,
}

/// Per-project maps in box/specimen/shipment order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerProject<T> {
    #[serde(rename = "box")]
    pub box_project: T,
    pub specimen: T,
    pub shipment: T,
}

pub type ModuleMetadata = PerProject<IndexMap<String, FieldMetadata>>;
pub type ModuleFieldState = PerProject<IndexMap<String, FieldUiConfig>>;

/// The module config as served to dashboards: general settings plus the
/// merged per-field state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleState {
    pub general: GeneralSettings,
    pub fields: ModuleFieldState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigDashboard {
    pub projects: LinkedProjects,
    pub state: ModuleState,
    pub metadata: ModuleMetadata,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveModuleConfig {
    pub errors: Vec<String>,
}

// =============================================================================
// Box dashboard / lists
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoxDashboardConfig {
    pub general: GeneralSettings,
    #[serde(rename = "save-state")]
    pub save_state: ModuleFieldState,
    pub fields: ModuleMetadata,
    pub validation: ValidationTypes,
    pub alphabet: Vec<char>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoxDashboard {
    pub config: BoxDashboardConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plate: Option<RecordView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specimens: Option<Vec<RecordView>>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoxDetail {
    #[serde(rename = "box", skip_serializing_if = "Option::is_none")]
    pub box_record: Option<RecordView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specimens: Option<Vec<RecordView>>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoxList {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    pub boxes: Vec<RecordView>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlateSearch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plate: Option<RecordView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specimens: Option<Vec<RecordView>>,
    pub errors: Vec<String>,
}

// =============================================================================
// Specimens
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecimenDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specimen: Option<RecordView>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecimenSearch {
    pub search_value: String,
    pub parsed_value: ParsedName,
    pub match_type: MatchType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specimen: Option<RecordView>,
    #[serde(rename = "box", skip_serializing_if = "Option::is_none")]
    pub box_record: Option<RecordView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_visit: Option<u32>,
    /// Temporary boxes the specimen could be relocated to.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub alternate_boxes: Vec<RecordView>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecimenSave {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specimen: Option<RecordView>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecimenDelete {
    pub deleted: bool,
    pub errors: Vec<String>,
}

// =============================================================================
// Shipments
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShipmentDashboardConfig {
    pub box_name_regex: String,
    pub shipment_fields: IndexMap<String, String>,
    pub box_fields: IndexMap<String, String>,
}

/// A shipment's box with display values plus its parsed name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShipmentBox {
    #[serde(flatten)]
    pub fields: RecordView,
    pub name_parsed: ParsedName,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShipmentDashboard {
    pub config: ShipmentDashboardConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment: Option<RecordView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment_details: Option<IndexMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boxes: Option<Vec<ShipmentBox>>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShipmentListConfig {
    pub shipment_fields: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShipmentList {
    pub config: ShipmentListConfig,
    pub shipments: Vec<RecordView>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Success-flag responses for the shipment mutations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveConfirmation {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub errors: Vec<String>,
}

impl SaveConfirmation {
    pub fn saved() -> Self {
        Self {
            success: true,
            message: Some("Save successful".to_string()),
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            success: false,
            message: None,
            errors,
        }
    }
}

// =============================================================================
// Reports
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub study_name: Option<String>,
    pub datetime: String,
    pub timestamp: String,
}

pub type ReportFields = PerProject<IndexMap<String, String>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub config: ReportConfig,
    pub fields: ReportFields,
    pub data: Vec<RecordView>,
    pub errors: Vec<String>,
}

// =============================================================================
// Manifest export
// =============================================================================

/// A rendered manifest download.
#[derive(Debug, Clone)]
pub struct ManifestExport {
    pub filename: String,
    pub content: Vec<u8>,
}
