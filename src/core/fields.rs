//! Dictionary-driven field metadata and per-surface UI configuration.
//!
//! The host owns each project's field dictionary; this module derives two
//! request-scoped views from it. `FieldMetadata` is the read-only shape
//! (label, semantic type, choices, validation rule) and `FieldUiConfig`
//! is the per-surface visibility/requiredness table, produced by merging
//! persisted overrides over computed project-type defaults.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::config::ProjectRole;

/// Fields the module manages itself; they never appear on entry surfaces.
pub const INFRASTRUCTURE_FIELDS: [&str; 3] = ["record_id", "box_record_id", "box_position"];

/// Element types with no sensible UI surface in this module.
const EXCLUDED_ELEMENT_TYPES: [&str; 5] = ["calc", "file", "slider", "descriptive", "sql"];

/// The specimen identity-name field; gets the match/prefill extra.
pub const SPECIMEN_NAME_FIELD: &str = "specimen_name";

// =============================================================================
// Dictionary (host-owned, read-only)
// =============================================================================

/// One field as defined in the host's data dictionary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DictionaryField {
    pub field_name: String,
    pub form: String,
    pub element_type: String,
    pub label: String,
    #[serde(default)]
    pub validation: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// Raw pipe-delimited choice list ("1, Yes | 0, No").
    #[serde(default)]
    pub choices: Option<String>,
}

/// A project's field dictionary, in dictionary order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dictionary {
    fields: IndexMap<String, DictionaryField>,
}

impl Dictionary {
    pub fn new(fields: Vec<DictionaryField>) -> Self {
        Self {
            fields: fields
                .into_iter()
                .map(|f| (f.field_name.clone(), f))
                .collect(),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &DictionaryField> {
        self.fields.values()
    }

    pub fn get(&self, field_name: &str) -> Option<&DictionaryField> {
        self.fields.get(field_name)
    }

    pub fn contains(&self, field_name: &str) -> bool {
        self.fields.contains_key(field_name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// First form in dictionary order; its `<form>_complete` pseudo-field
    /// is written on every save.
    pub fn first_form(&self) -> Option<&str> {
        self.fields.values().next().map(|f| f.form.as_str())
    }

    /// Form-status pseudo-fields (`<form>_complete`) are host-managed.
    pub fn is_form_status(&self, field_name: &str) -> bool {
        field_name
            .strip_suffix("_complete")
            .is_some_and(|form| self.fields.values().any(|f| f.form == form))
    }
}

// =============================================================================
// Field metadata
// =============================================================================

/// Resolved semantic field type.
///
/// The host dictionary stores a raw element type plus a validation
/// subtype; `text` fields with date/datetime/number validation are
/// promoted to the corresponding semantic type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Notes,
    Select,
    Radio,
    Checkbox,
    Yesno,
    Truefalse,
    Date,
    Datetime,
    Integer,
    Number,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Notes => "notes",
            Self::Select => "select",
            Self::Radio => "radio",
            Self::Checkbox => "checkbox",
            Self::Yesno => "yesno",
            Self::Truefalse => "truefalse",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::Integer => "integer",
            Self::Number => "number",
        }
    }

    fn resolve(element_type: &str, validation: Option<&str>) -> Self {
        match element_type {
            "textarea" => Self::Notes,
            "select" => Self::Select,
            "radio" => Self::Radio,
            "checkbox" => Self::Checkbox,
            "yesno" => Self::Yesno,
            "truefalse" => Self::Truefalse,
            _ => match validation.unwrap_or("") {
                v if v.starts_with("datetime") => Self::Datetime,
                v if v.starts_with("date") => Self::Date,
                "int" | "integer" => Self::Integer,
                "float" | "number" => Self::Number,
                _ => Self::Text,
            },
        }
    }
}

/// An entry in the host's validation-type registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationType {
    pub label: String,
    pub regex: String,
}

/// Registry of validation types, keyed by validation name.
pub type ValidationTypes = IndexMap<String, ValidationType>;

/// A field's resolved validation rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(rename = "type")]
    pub rule_type: String,
    pub label: String,
    pub regex: String,
}

/// Read-only, per-request view of one dictionary field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMetadata {
    pub field_name: String,
    pub form: String,
    pub label: String,
    pub field_type: FieldType,
    pub element_type: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<IndexMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRule>,
    /// Computed per-surface defaults, keyed by surface key; the config
    /// dashboard renders these as the baseline selections.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub config: IndexMap<String, SurfaceDefault>,
}

impl FieldMetadata {
    pub fn resolve(field: &DictionaryField, validation_types: &ValidationTypes) -> Self {
        let validation = field.validation.as_deref().and_then(|name| {
            validation_types.get(name).map(|vt| ValidationRule {
                rule_type: name.to_string(),
                label: vt.label.clone(),
                regex: vt.regex.clone(),
            })
        });
        Self {
            field_name: field.field_name.clone(),
            form: field.form.clone(),
            label: field.label.clone(),
            field_type: FieldType::resolve(&field.element_type, field.validation.as_deref()),
            element_type: field.element_type.clone(),
            required: field.required,
            choices: field.choices.as_deref().map(flatten_choices),
            validation,
            config: IndexMap::new(),
        }
    }
}

/// Flatten a raw pipe-delimited choice list into an ordered code -> label
/// map. Labels may themselves contain commas; only the first ", " splits.
pub fn flatten_choices(raw: &str) -> IndexMap<String, String> {
    raw.split('|')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            match entry.split_once(", ") {
                Some((code, label)) => Some((code.to_string(), label.to_string())),
                None => Some((entry.to_string(), String::new())),
            }
        })
        .collect()
}

// =============================================================================
// UI surfaces
// =============================================================================

/// The UI surfaces a field can appear on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Surface {
    SpecimenDashboard,
    SpecimenEntryForm,
    BatchMode,
    SpecimenList,
    ReportingTable,
    ShipmentList,
    ShipmentBoxList,
    ShipmentManifest,
}

impl Surface {
    pub const ALL: [Surface; 8] = [
        Surface::SpecimenDashboard,
        Surface::SpecimenEntryForm,
        Surface::BatchMode,
        Surface::SpecimenList,
        Surface::ReportingTable,
        Surface::ShipmentList,
        Surface::ShipmentBoxList,
        Surface::ShipmentManifest,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::SpecimenDashboard => "specimen-dashboard",
            Self::SpecimenEntryForm => "specimen-entry-form",
            Self::BatchMode => "batch-mode",
            Self::SpecimenList => "specimen-list",
            Self::ReportingTable => "reporting-table",
            Self::ShipmentList => "shipment-list",
            Self::ShipmentBoxList => "shipment-box-list",
            Self::ShipmentManifest => "shipment-manifest",
        }
    }
}

/// Computed default for one (field, surface) pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceDefault {
    pub enabled: bool,
    pub required: bool,
}

/// Fixed business rules: which surfaces a field defaults onto, per
/// project role and field name.
pub fn default_surface_config(
    role: ProjectRole,
    field_name: &str,
) -> BTreeMap<Surface, SurfaceDefault> {
    let mut config: BTreeMap<Surface, SurfaceDefault> = Surface::ALL
        .into_iter()
        .map(|s| (s, SurfaceDefault::default()))
        .collect();
    let mut enable = |surface: Surface| {
        config.entry(surface).or_default().enabled = true;
    };
    match role {
        ProjectRole::Box => {
            enable(Surface::SpecimenDashboard);
            enable(Surface::ReportingTable);
            enable(Surface::ShipmentBoxList);
            enable(Surface::ShipmentManifest);
        }
        ProjectRole::Specimen => {
            let infrastructure = INFRASTRUCTURE_FIELDS.contains(&field_name);
            if !infrastructure {
                enable(Surface::SpecimenEntryForm);
                if field_name != SPECIMEN_NAME_FIELD {
                    enable(Surface::BatchMode);
                }
            }
            enable(Surface::SpecimenList);
            enable(Surface::ReportingTable);
            enable(Surface::ShipmentManifest);
        }
        ProjectRole::Shipment => {
            enable(Surface::ReportingTable);
            enable(Surface::ShipmentList);
            enable(Surface::ShipmentManifest);
        }
    }
    match (role, field_name) {
        (ProjectRole::Specimen, SPECIMEN_NAME_FIELD) => {
            config.entry(Surface::SpecimenEntryForm).or_default().required = true;
            config.entry(Surface::SpecimenList).or_default().required = true;
        }
        (ProjectRole::Specimen, "box_position") => {
            config.entry(Surface::SpecimenList).or_default().required = true;
        }
        _ => {}
    }
    config
}

// =============================================================================
// Extras
// =============================================================================

/// Nomenclature-based match & prefill settings for the identity-name
/// field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchPrefillExtra {
    pub enabled: bool,
    pub groups: Vec<String>,
    pub fields: Vec<String>,
}

impl MatchPrefillExtra {
    /// Usable only when enabled with both groups and fields selected.
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.groups.is_empty() && !self.fields.is_empty()
    }
}

/// Confirmation-required flag for free-text fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmExtra {
    pub enabled: bool,
}

/// "No future dates" rule for datetime fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoFutureExtra {
    pub enabled: bool,
}

/// "Must fall after another date field" rule for datetime fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AfterDateExtra {
    pub enabled: bool,
    pub target: String,
    pub minimum: String,
    pub maximum: String,
    #[serde(rename = "warningOnly")]
    pub warning_only: bool,
}

/// Per-field extras; which entries are present depends on the field's
/// project and type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldExtras {
    #[serde(rename = "matchPrefill", skip_serializing_if = "Option::is_none")]
    pub match_prefill: Option<MatchPrefillExtra>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm: Option<ConfirmExtra>,
    #[serde(rename = "noFuture", skip_serializing_if = "Option::is_none")]
    pub no_future: Option<NoFutureExtra>,
    #[serde(rename = "afterDate", skip_serializing_if = "Option::is_none")]
    pub after_date: Option<AfterDateExtra>,
}

// =============================================================================
// Persisted overrides (the module-config blob)
// =============================================================================

/// Persisted per-field override flags, as saved from the config
/// dashboard. Everything is optional: absent means "use the default".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldOverride {
    #[serde(rename = "specimen-dashboard")]
    pub specimen_dashboard: Option<bool>,
    #[serde(rename = "specimen-entry-form")]
    pub specimen_entry_form: Option<bool>,
    #[serde(rename = "batch-mode")]
    pub batch_mode: Option<bool>,
    #[serde(rename = "specimen-list")]
    pub specimen_list: Option<bool>,
    #[serde(rename = "reporting-table")]
    pub reporting_table: Option<bool>,
    #[serde(rename = "shipment-list")]
    pub shipment_list: Option<bool>,
    #[serde(rename = "shipment-box-list")]
    pub shipment_box_list: Option<bool>,
    #[serde(rename = "shipment-manifest")]
    pub shipment_manifest: Option<bool>,
    #[serde(rename = "field-default")]
    pub field_default: Option<String>,
    #[serde(rename = "field-units")]
    pub field_units: Option<String>,
    pub extras: FieldExtras,
}

impl FieldOverride {
    fn surface_flag(&self, surface: Surface) -> Option<bool> {
        match surface {
            Surface::SpecimenDashboard => self.specimen_dashboard,
            Surface::SpecimenEntryForm => self.specimen_entry_form,
            Surface::BatchMode => self.batch_mode,
            Surface::SpecimenList => self.specimen_list,
            Surface::ReportingTable => self.reporting_table,
            Surface::ShipmentList => self.shipment_list,
            Surface::ShipmentBoxList => self.shipment_box_list,
            Surface::ShipmentManifest => self.shipment_manifest,
        }
    }
}

/// The `general` section of the persisted module config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub study_name: Option<String>,
    pub box_name_regex: Option<String>,
    pub specimen_name_regex: Option<String>,
    pub warning_ack_field: String,
}

/// Per-project persisted field overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectOverrides {
    #[serde(rename = "box")]
    pub box_fields: BTreeMap<String, FieldOverride>,
    #[serde(rename = "specimen")]
    pub specimen_fields: BTreeMap<String, FieldOverride>,
    #[serde(rename = "shipment")]
    pub shipment_fields: BTreeMap<String, FieldOverride>,
}

impl ProjectOverrides {
    pub fn for_role(&self, role: ProjectRole) -> &BTreeMap<String, FieldOverride> {
        match role {
            ProjectRole::Box => &self.box_fields,
            ProjectRole::Specimen => &self.specimen_fields,
            ProjectRole::Shipment => &self.shipment_fields,
        }
    }
}

/// The whole persisted module-config blob. Saved wholesale under the box
/// project's `module-config` setting; never partially patched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    pub general: GeneralSettings,
    pub fields: ProjectOverrides,
}

// =============================================================================
// Built UI configuration
// =============================================================================

/// Final per-field, per-surface configuration after merging persisted
/// overrides with computed defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldUiConfig {
    #[serde(rename = "specimen-dashboard")]
    pub specimen_dashboard: bool,
    #[serde(rename = "specimen-entry-form")]
    pub specimen_entry_form: bool,
    #[serde(rename = "batch-mode")]
    pub batch_mode: bool,
    #[serde(rename = "specimen-list")]
    pub specimen_list: bool,
    #[serde(rename = "reporting-table")]
    pub reporting_table: bool,
    #[serde(rename = "shipment-list")]
    pub shipment_list: bool,
    #[serde(rename = "shipment-box-list")]
    pub shipment_box_list: bool,
    #[serde(rename = "shipment-manifest")]
    pub shipment_manifest: bool,
    #[serde(rename = "field-default", skip_serializing_if = "Option::is_none")]
    pub field_default: Option<String>,
    #[serde(rename = "field-units", skip_serializing_if = "Option::is_none")]
    pub field_units: Option<String>,
    pub extras: FieldExtras,
}

impl FieldUiConfig {
    pub fn surface(&self, surface: Surface) -> bool {
        match surface {
            Surface::SpecimenDashboard => self.specimen_dashboard,
            Surface::SpecimenEntryForm => self.specimen_entry_form,
            Surface::BatchMode => self.batch_mode,
            Surface::SpecimenList => self.specimen_list,
            Surface::ReportingTable => self.reporting_table,
            Surface::ShipmentList => self.shipment_list,
            Surface::ShipmentBoxList => self.shipment_box_list,
            Surface::ShipmentManifest => self.shipment_manifest,
        }
    }

    fn set_surface(&mut self, surface: Surface, value: bool) {
        match surface {
            Surface::SpecimenDashboard => self.specimen_dashboard = value,
            Surface::SpecimenEntryForm => self.specimen_entry_form = value,
            Surface::BatchMode => self.batch_mode = value,
            Surface::SpecimenList => self.specimen_list = value,
            Surface::ReportingTable => self.reporting_table = value,
            Surface::ShipmentList => self.shipment_list = value,
            Surface::ShipmentBoxList => self.shipment_box_list = value,
            Surface::ShipmentManifest => self.shipment_manifest = value,
        }
    }
}

/// Metadata + UI config for every retained field of one project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldConfigBundle {
    pub metadata: IndexMap<String, FieldMetadata>,
    pub config: IndexMap<String, FieldUiConfig>,
}

/// Build the field configuration for one project.
///
/// Iterates the dictionary in order, skipping form-status pseudo-fields
/// and excluded element types. Merge order per field/surface: computed
/// default, then persisted flag, then force-on when the default is both
/// enabled and required (a persisted `false` cannot disable those).
pub fn build_field_config(
    role: ProjectRole,
    dictionary: &Dictionary,
    overrides: &BTreeMap<String, FieldOverride>,
    validation_types: &ValidationTypes,
) -> FieldConfigBundle {
    let mut bundle = FieldConfigBundle::default();

    for field in dictionary.fields() {
        let field_name = field.field_name.as_str();
        if dictionary.is_form_status(field_name)
            || EXCLUDED_ELEMENT_TYPES.contains(&field.element_type.as_str())
        {
            continue;
        }

        let mut metadata = FieldMetadata::resolve(field, validation_types);
        let defaults = default_surface_config(role, field_name);
        metadata.config = defaults
            .iter()
            .map(|(surface, default)| (surface.key().to_string(), *default))
            .collect();
        let persisted = overrides.get(field_name);

        let mut config = FieldUiConfig {
            field_default: persisted.and_then(|p| p.field_default.clone()),
            field_units: persisted.and_then(|p| p.field_units.clone()),
            ..FieldUiConfig::default()
        };
        for surface in Surface::ALL {
            let flag = persisted
                .and_then(|p| p.surface_flag(surface))
                .unwrap_or(false);
            config.set_surface(surface, flag);
        }
        for (surface, default) in &defaults {
            if default.enabled && default.required {
                config.set_surface(*surface, true);
            }
        }

        if role == ProjectRole::Specimen && !INFRASTRUCTURE_FIELDS.contains(&field_name) {
            let persisted_extras = persisted.map(|p| &p.extras);
            if metadata.field_type == FieldType::Text {
                if field_name == SPECIMEN_NAME_FIELD {
                    config.extras.match_prefill = Some(
                        persisted_extras
                            .and_then(|e| e.match_prefill.clone())
                            .unwrap_or_default(),
                    );
                } else {
                    config.extras.confirm = Some(
                        persisted_extras
                            .and_then(|e| e.confirm.clone())
                            .unwrap_or_default(),
                    );
                }
            }
            if metadata.field_type == FieldType::Datetime {
                config.extras.no_future = Some(
                    persisted_extras
                        .and_then(|e| e.no_future.clone())
                        .unwrap_or_default(),
                );
                config.extras.after_date = Some(
                    persisted_extras
                        .and_then(|e| e.after_date.clone())
                        .unwrap_or_default(),
                );
            }
        }

        bundle.metadata.insert(field_name.to_string(), metadata);
        bundle.config.insert(field_name.to_string(), config);
    }

    bundle
}
