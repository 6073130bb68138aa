//! Host platform metadata access.
//!
//! The host owns project definitions, field dictionaries, module
//! settings, and the validation-type registry. The core reaches them
//! only through this trait; `StandInHost` supplies the assumed stand-in
//! implementation.

pub mod standin;

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::core::config::RawSystemSettings;
use crate::core::fields::{Dictionary, ValidationTypes};
use crate::core::identity::ProjectId;

pub use standin::StandInHost;

/// Read/write access to host-owned metadata and settings.
pub trait HostMeta {
    /// Raw module settings (arrays indexed by configuration index).
    fn system_settings(&self) -> RawSystemSettings;

    /// Projects that have this module enabled.
    fn projects_with_module_enabled(&self) -> BTreeSet<ProjectId>;

    /// A project's display title.
    fn app_title(&self, project_id: ProjectId) -> Option<String>;

    /// A project's field dictionary.
    fn data_dictionary(&self, project_id: ProjectId) -> Option<Dictionary>;

    /// The host's validation-type registry.
    fn validation_types(&self) -> ValidationTypes;

    /// Per-project setting blob (e.g. the persisted module config).
    fn project_setting(&self, project_id: ProjectId, key: &str) -> Option<String>;

    /// Persist a per-project setting wholesale.
    fn set_project_setting(&self, project_id: ProjectId, key: &str, value: String);

    /// Unit labels per sample type, for manifest volume headers.
    fn sample_type_units(&self) -> IndexMap<String, String>;
}
