//! Core capability errors (identifiers, configuration, context).
//!
//! These are bounded and stable: core errors represent domain/refusal
//! states, not library implementation details. Business-rule violations
//! (duplicate CSID, missing settings) are *values* accumulated in error
//! lists, not variants here.

use thiserror::Error;

use super::identity::ProjectId;

/// Invalid identifier.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("record id `{raw}` is invalid: {reason}")]
    Record { raw: String, reason: String },
}

/// Configuration discovery/lookup failures.
///
/// Per-configuration validation problems are accumulated inside each
/// `Configuration`'s error list instead; these variants cover the cases
/// where no configuration can be produced at all.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("No configurations exist.")]
    NoConfigurations,
    #[error(
        "This Project [id={project_id}] is not referenced in any configurations for use in this module."
    )]
    NotReferenced { project_id: ProjectId },
    #[error("This Project [id={project_id}] is referenced in more than one configuration.")]
    AmbiguousReference { project_id: ProjectId },
}

/// Active-context guard failures.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum ContextError {
    #[error("Configuration context was already set and cannot be changed.")]
    AlreadySet,
    #[error("Cannot set configuration context using an invalid configuration.")]
    InvalidConfiguration { errors: Vec<String> },
    #[error("{project} project context has not yet been established")]
    NotEstablished { project: &'static str },
}

/// Canonical error enum for the core capability.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Context(#[from] ContextError),
}
