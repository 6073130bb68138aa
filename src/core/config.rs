//! System configuration discovery and resolution.
//!
//! A configuration links three host projects (box, specimen, shipment)
//! with shared settings. Raw settings live in host storage as arrays
//! indexed by configuration index; discovery rebuilds the full set once
//! per request and validates it, accumulating human-readable errors
//! instead of failing fast. A configuration with any error is inert: it
//! can be inspected but never activated.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::identity::ProjectId;

/// Raw module settings as stored by the host, one array entry per
/// configuration index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSystemSettings {
    /// Parent setting; its length defines how many configurations exist.
    pub project_configs: Vec<bool>,
    pub study_name: Vec<Option<String>>,
    pub box_project_id: Vec<Option<u64>>,
    pub specimen_project_id: Vec<Option<u64>>,
    pub shipment_project_id: Vec<Option<u64>>,
    pub plate_size: Vec<Option<String>>,
    pub use_temp_box_type: Vec<bool>,
    pub num_visits: Vec<Option<u64>>,
    pub num_specimens: Vec<Option<u64>>,
    pub default_volume: Vec<Option<String>>,
    pub datetime_format: Vec<Option<String>>,
    pub box_name_regex: Vec<Option<String>>,
    pub specimen_name_regex: Vec<Option<String>>,
    pub collected_to_processed_minutes_max: Vec<Option<String>>,
}

impl RawSystemSettings {
    fn text(list: &[Option<String>], k: usize) -> Option<String> {
        list.get(k).cloned().flatten().filter(|s| !s.is_empty())
    }

    fn number(list: &[Option<u64>], k: usize) -> Option<u64> {
        list.get(k).copied().flatten()
    }

    fn flag(list: &[bool], k: usize) -> bool {
        list.get(k).copied().unwrap_or(false)
    }
}

/// Which slot a project occupies within a configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectRole {
    Box,
    Specimen,
    Shipment,
}

impl ProjectRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Box => "box",
            Self::Specimen => "specimen",
            Self::Shipment => "shipment",
        }
    }
}

/// One resolved configuration: a project triplet plus shared settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Configuration {
    pub study_name: Option<String>,
    pub box_project_id: Option<ProjectId>,
    pub specimen_project_id: Option<ProjectId>,
    pub shipment_project_id: Option<ProjectId>,
    pub box_project_enabled: bool,
    pub specimen_project_enabled: bool,
    pub shipment_project_enabled: bool,
    pub plate_size: Option<String>,
    pub default_volume: Option<String>,
    pub datetime_format: Option<String>,
    pub box_name_regex: Option<String>,
    pub specimen_name_regex: Option<String>,
    pub use_temp_box_type: bool,
    pub num_visits: Option<u64>,
    pub num_specimens: Option<u64>,
    pub collected_to_processed_minutes_max: Option<String>,
    pub errors: Vec<String>,
}

impl Configuration {
    /// A configuration is activatable only when error-free and all three
    /// projects have the module enabled.
    pub fn is_activatable(&self) -> bool {
        self.errors.is_empty()
            && self.box_project_enabled
            && self.specimen_project_enabled
            && self.shipment_project_enabled
    }

    pub fn box_name_regex(&self) -> &str {
        self.box_name_regex.as_deref().unwrap_or("")
    }

    pub fn specimen_name_regex(&self) -> &str {
        self.specimen_name_regex.as_deref().unwrap_or("")
    }
}

/// All configurations discovered from settings, plus the reverse
/// project-id lookup used by `configuration_for`.
#[derive(Debug, Clone)]
pub struct ConfigurationSet {
    configurations: Vec<Configuration>,
    // project id -> config index -> role (one entry per config even when a
    // project fills several slots of the same configuration)
    project_map: BTreeMap<ProjectId, BTreeMap<usize, ProjectRole>>,
}

impl ConfigurationSet {
    /// Discover and validate all configurations from raw settings.
    ///
    /// Fails only when no configurations exist at all; every other
    /// violation is accumulated in the owning configuration's error list.
    pub fn resolve(
        settings: &RawSystemSettings,
        enabled_projects: &BTreeSet<ProjectId>,
    ) -> Result<Self, ConfigError> {
        if settings.project_configs.is_empty() {
            return Err(ConfigError::NoConfigurations);
        }

        let mut configurations = Vec::with_capacity(settings.project_configs.len());
        let mut project_map: BTreeMap<ProjectId, BTreeMap<usize, ProjectRole>> = BTreeMap::new();

        for k in 0..settings.project_configs.len() {
            let box_project_id = RawSystemSettings::number(&settings.box_project_id, k);
            let specimen_project_id = RawSystemSettings::number(&settings.specimen_project_id, k);
            let shipment_project_id = RawSystemSettings::number(&settings.shipment_project_id, k);
            let use_temp_box_type = RawSystemSettings::flag(&settings.use_temp_box_type, k);

            let mut config = Configuration {
                study_name: RawSystemSettings::text(&settings.study_name, k),
                box_project_id: box_project_id.map(ProjectId::new),
                specimen_project_id: specimen_project_id.map(ProjectId::new),
                shipment_project_id: shipment_project_id.map(ProjectId::new),
                box_project_enabled: box_project_id
                    .is_some_and(|id| enabled_projects.contains(&ProjectId::new(id))),
                specimen_project_enabled: specimen_project_id
                    .is_some_and(|id| enabled_projects.contains(&ProjectId::new(id))),
                shipment_project_enabled: shipment_project_id
                    .is_some_and(|id| enabled_projects.contains(&ProjectId::new(id))),
                plate_size: RawSystemSettings::text(&settings.plate_size, k),
                default_volume: RawSystemSettings::text(&settings.default_volume, k),
                datetime_format: RawSystemSettings::text(&settings.datetime_format, k),
                box_name_regex: RawSystemSettings::text(&settings.box_name_regex, k),
                specimen_name_regex: RawSystemSettings::text(&settings.specimen_name_regex, k),
                use_temp_box_type,
                num_visits: if use_temp_box_type {
                    RawSystemSettings::number(&settings.num_visits, k)
                } else {
                    None
                },
                num_specimens: if use_temp_box_type {
                    RawSystemSettings::number(&settings.num_specimens, k)
                } else {
                    None
                },
                collected_to_processed_minutes_max: RawSystemSettings::text(
                    &settings.collected_to_processed_minutes_max,
                    k,
                ),
                errors: Vec::new(),
            };

            validate_configuration(&mut config);

            for (id, role) in [
                (config.box_project_id, ProjectRole::Box),
                (config.specimen_project_id, ProjectRole::Specimen),
                (config.shipment_project_id, ProjectRole::Shipment),
            ] {
                if let Some(id) = id {
                    project_map.entry(id).or_default().insert(k, role);
                }
            }

            configurations.push(config);
        }

        // cross-configuration pass: a project may appear in at most one
        // configuration system-wide
        for k in 0..configurations.len() {
            let ids = [
                configurations[k].box_project_id,
                configurations[k].specimen_project_id,
                configurations[k].shipment_project_id,
            ];
            for id in ids.into_iter().flatten() {
                if project_map.get(&id).map(|m| m.len()).unwrap_or(0) > 1 {
                    configurations[k]
                        .errors
                        .push(format!("The Project (id={id}) is referenced in too many configurations."));
                }
            }
        }

        Ok(Self {
            configurations,
            project_map,
        })
    }

    pub fn configurations(&self) -> &[Configuration] {
        &self.configurations
    }

    /// Resolve the configuration a project belongs to.
    ///
    /// A single reference returns the configuration even when it carries
    /// internal errors; callers inspect `errors` before activating it.
    /// Ambiguous references deliberately do not reveal which
    /// configurations are involved.
    pub fn configuration_for(&self, project_id: ProjectId) -> Result<&Configuration, ConfigError> {
        let maps = self.project_map.get(&project_id);
        match maps.map(|m| m.len()).unwrap_or(0) {
            0 => Err(ConfigError::NotReferenced { project_id }),
            1 => {
                let (&k, _) = maps.and_then(|m| m.iter().next()).expect("len checked");
                Ok(&self.configurations[k])
            }
            _ => Err(ConfigError::AmbiguousReference { project_id }),
        }
    }
}

fn validate_configuration(config: &mut Configuration) {
    let projects: Vec<ProjectId> = [
        config.box_project_id,
        config.specimen_project_id,
        config.shipment_project_id,
    ]
    .into_iter()
    .flatten()
    .collect();
    let distinct: BTreeSet<ProjectId> = projects.iter().copied().collect();
    if projects.len() != distinct.len() {
        config
            .errors
            .push("A project is used more than once within this configuration!".to_string());
    }

    if config.study_name.is_none() {
        config
            .errors
            .push("Configuration value missing: Study Name".to_string());
    }

    // projects must be selected and have the module enabled
    for (id, enabled, label) in [
        (config.box_project_id, config.box_project_enabled, "Box"),
        (
            config.specimen_project_id,
            config.specimen_project_enabled,
            "Specimen",
        ),
        (
            config.shipment_project_id,
            config.shipment_project_enabled,
            "Shipment",
        ),
    ] {
        match id {
            None => config
                .errors
                .push(format!("The {label} Project configuration is missing!")),
            Some(id) if !enabled => config.errors.push(format!(
                "The module has not been enabled on the [{id}] {label} Project."
            )),
            Some(_) => {}
        }
    }

    if config.plate_size.is_none() {
        config
            .errors
            .push("Configuration value missing: Box Size".to_string());
    }

    if let Some(raw) = &config.collected_to_processed_minutes_max {
        let valid = raw.parse::<f64>().map(|v| v > 0.0).unwrap_or(false);
        if !valid {
            config.errors.push(
                "Configuration value [collected_to_processed_minutes_max] invalid. Must be numeric and greater than zero!"
                    .to_string(),
            );
        }
    }

    if config.use_temp_box_type {
        if config.num_visits.is_none() {
            config
                .errors
                .push("Configuration value missing: Total Visits".to_string());
        }
        if config.num_specimens.is_none() {
            config
                .errors
                .push("Configuration value missing: Specimens Per Visit".to_string());
        }
    }

    for (value, label) in [
        (&config.box_name_regex, "Box"),
        (&config.specimen_name_regex, "Specimen"),
    ] {
        match value {
            None => config
                .errors
                .push(format!("Configuration value missing: {label} Name RegEx")),
            Some(pattern) if Regex::new(pattern).is_err() => config.errors.push(format!(
                "Configuration value invalid: {label} Name RegEx is not a valid regular expression"
            )),
            Some(_) => {}
        }
    }
}
