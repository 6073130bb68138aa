//! Core domain logic.
//!
//! Module order follows dependency order:
//! - identity: ProjectId, RecordId
//! - error: core error taxonomy
//! - parse: identifier parsing + derived filter patterns
//! - config: configuration discovery/resolution
//! - context: request-scoped active context
//! - fields: dictionary metadata + per-surface UI configuration
//! - display: raw-to-display value mapping
//! - matcher: specimen search with hierarchical fallback
//! - validate: CSID/CUID cross-record validators

pub mod config;
pub mod context;
pub mod display;
pub mod error;
pub mod fields;
pub mod identity;
pub mod matcher;
pub mod parse;
pub mod validate;

pub use config::{Configuration, ConfigurationSet, ProjectRole, RawSystemSettings};
pub use context::{ActiveContext, ContextSlot, ProjectHandle};
pub use display::display_value;
pub use error::{ConfigError, ContextError, CoreError, InvalidId};
pub use fields::{
    build_field_config, default_surface_config, flatten_choices, AfterDateExtra, ConfirmExtra,
    Dictionary, DictionaryField, FieldConfigBundle, FieldExtras, FieldMetadata, FieldOverride,
    FieldType, FieldUiConfig, GeneralSettings, MatchPrefillExtra, ModuleConfig, NoFutureExtra,
    ProjectOverrides, Surface, SurfaceDefault, ValidationRule, ValidationType, ValidationTypes,
};
pub use identity::{ProjectId, RecordId};
pub use matcher::{MatchOutcome, MatchType};
pub use parse::{derive_filter_pattern, parse_name, ParsedName};
pub use validate::{validate_csid, validate_cuid, Validation};
