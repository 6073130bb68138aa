#![forbid(unsafe_code)]

//! Specimen/box/shipment tracking core for a host-managed clinical
//! data-capture platform.
//!
//! The host owns record storage, dictionaries, and settings; this crate
//! supplies the configuration-resolution and cross-project query engine
//! layered on top: identifier parsing, specimen matching with
//! hierarchical fallback, field-visibility configuration, cross-record
//! validation, and the JSON action surface the dashboards call.

pub mod api;
pub mod core;
pub mod error;
pub mod handlers;
pub mod host;
pub mod store;
pub mod telemetry;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the main surface at the crate root for convenience
pub use crate::core::{
    parse_name, validate_csid, validate_cuid, Configuration, ConfigurationSet, Dictionary,
    DictionaryField, MatchType, ModuleConfig, ProjectId, ProjectRole, RawSystemSettings, RecordId,
    Validation,
};
pub use crate::handlers::{handle_request, Request, Response};
pub use crate::host::{HostMeta, StandInHost};
pub use crate::store::{EntityStore, SqliteEntityStore};
