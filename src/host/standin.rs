//! In-memory stand-in for the host platform's metadata APIs.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;

use crate::core::config::RawSystemSettings;
use crate::core::fields::{Dictionary, ValidationType, ValidationTypes};
use crate::core::identity::ProjectId;

use super::HostMeta;

#[derive(Debug, Clone)]
struct ProjectDefinition {
    app_title: String,
    dictionary: Dictionary,
}

/// Stand-in host: project registry, settings, and dictionaries held in
/// memory. Request processing is single-threaded, so plain interior
/// mutability covers the one mutable surface (project settings).
#[derive(Debug, Default)]
pub struct StandInHost {
    settings: RawSystemSettings,
    enabled: BTreeSet<ProjectId>,
    projects: BTreeMap<ProjectId, ProjectDefinition>,
    project_settings: RefCell<BTreeMap<(ProjectId, String), String>>,
    validation_types: ValidationTypes,
    sample_type_units: IndexMap<String, String>,
}

impl StandInHost {
    pub fn new() -> Self {
        Self {
            validation_types: default_validation_types(),
            ..Self::default()
        }
    }

    pub fn with_system_settings(mut self, settings: RawSystemSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_project(
        mut self,
        project_id: ProjectId,
        app_title: impl Into<String>,
        dictionary: Dictionary,
    ) -> Self {
        self.projects.insert(
            project_id,
            ProjectDefinition {
                app_title: app_title.into(),
                dictionary,
            },
        );
        self
    }

    pub fn with_module_enabled(mut self, project_id: ProjectId) -> Self {
        self.enabled.insert(project_id);
        self
    }

    pub fn with_sample_type_unit(
        mut self,
        sample_type: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        self.sample_type_units
            .insert(sample_type.into(), unit.into());
        self
    }
}

impl HostMeta for StandInHost {
    fn system_settings(&self) -> RawSystemSettings {
        self.settings.clone()
    }

    fn projects_with_module_enabled(&self) -> BTreeSet<ProjectId> {
        self.enabled.clone()
    }

    fn app_title(&self, project_id: ProjectId) -> Option<String> {
        self.projects.get(&project_id).map(|p| p.app_title.clone())
    }

    fn data_dictionary(&self, project_id: ProjectId) -> Option<Dictionary> {
        self.projects.get(&project_id).map(|p| p.dictionary.clone())
    }

    fn validation_types(&self) -> ValidationTypes {
        self.validation_types.clone()
    }

    fn project_setting(&self, project_id: ProjectId, key: &str) -> Option<String> {
        self.project_settings
            .borrow()
            .get(&(project_id, key.to_string()))
            .cloned()
    }

    fn set_project_setting(&self, project_id: ProjectId, key: &str, value: String) {
        self.project_settings
            .borrow_mut()
            .insert((project_id, key.to_string()), value);
    }

    fn sample_type_units(&self) -> IndexMap<String, String> {
        self.sample_type_units.clone()
    }
}

/// The host's built-in validation types, reduced to the entries this
/// module's field configuration actually resolves against.
pub fn default_validation_types() -> ValidationTypes {
    let mut types = ValidationTypes::new();
    let entries = [
        ("date_mdy", "Date (M/D/Y)", r"^\d{4}-\d{2}-\d{2}$"),
        (
            "datetime_mdy",
            "Datetime (M/D/Y H:M)",
            r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}$",
        ),
        (
            "datetime_seconds_mdy",
            "Datetime w/ seconds (M/D/Y H:M:S)",
            r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$",
        ),
        ("int", "Integer", r"^[-+]?\d+$"),
        ("number", "Number", r"^[-+]?\d*\.?\d+$"),
        ("alpha_only", "Letters only", r"^[a-zA-Z]+$"),
    ];
    for (name, label, regex) in entries {
        types.insert(
            name.to_string(),
            ValidationType {
                label: label.to_string(),
                regex: regex.to_string(),
            },
        );
    }
    types
}
