//! Request-scoped active context.
//!
//! A request binds at most one configuration. The one-shot guard exists
//! to catch programming errors (two different configurations mixed into
//! one request), not to arbitrate concurrency; requests are isolated by
//! the host.

use serde::{Deserialize, Serialize};

use super::config::Configuration;
use super::error::ContextError;
use super::fields::Dictionary;
use super::identity::ProjectId;

/// Materialized handle to one of the three linked projects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectHandle {
    pub project_id: ProjectId,
    pub app_title: String,
    pub dictionary: Dictionary,
}

/// The configuration bound to the current request plus its three project
/// handles.
#[derive(Debug, Clone)]
pub struct ActiveContext {
    configuration: Configuration,
    box_project: ProjectHandle,
    specimen_project: ProjectHandle,
    shipment_project: ProjectHandle,
}

impl ActiveContext {
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn box_project(&self) -> &ProjectHandle {
        &self.box_project
    }

    pub fn specimen_project(&self) -> &ProjectHandle {
        &self.specimen_project
    }

    pub fn shipment_project(&self) -> &ProjectHandle {
        &self.shipment_project
    }
}

/// One-shot slot holding the request's active context.
#[derive(Debug, Default)]
pub struct ContextSlot {
    inner: Option<ActiveContext>,
}

impl ContextSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the context. Fails on a second call regardless of arguments,
    /// and refuses invalid configurations.
    pub fn set(
        &mut self,
        configuration: Configuration,
        box_project: ProjectHandle,
        specimen_project: ProjectHandle,
        shipment_project: ProjectHandle,
    ) -> Result<(), ContextError> {
        if self.inner.is_some() {
            return Err(ContextError::AlreadySet);
        }
        if !configuration.is_activatable() {
            return Err(ContextError::InvalidConfiguration {
                errors: configuration.errors.clone(),
            });
        }
        self.inner = Some(ActiveContext {
            configuration,
            box_project,
            specimen_project,
            shipment_project,
        });
        Ok(())
    }

    pub fn get(&self) -> Result<&ActiveContext, ContextError> {
        self.inner.as_ref().ok_or(ContextError::NotEstablished {
            project: "module",
        })
    }

    pub fn box_project(&self) -> Result<&ProjectHandle, ContextError> {
        self.inner
            .as_ref()
            .map(ActiveContext::box_project)
            .ok_or(ContextError::NotEstablished { project: "Box" })
    }

    pub fn specimen_project(&self) -> Result<&ProjectHandle, ContextError> {
        self.inner
            .as_ref()
            .map(ActiveContext::specimen_project)
            .ok_or(ContextError::NotEstablished { project: "Specimen" })
    }

    pub fn shipment_project(&self) -> Result<&ProjectHandle, ContextError> {
        self.inner
            .as_ref()
            .map(ActiveContext::shipment_project)
            .ok_or(ContextError::NotEstablished { project: "Shipment" })
    }
}
