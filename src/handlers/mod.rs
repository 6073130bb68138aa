//! Request handling.
//!
//! `RequestContext` is the per-request composition root: it resolves the
//! configuration set once, binds the active project context, and hands
//! the narrow component interfaces (store, host metadata, module config)
//! to the individual action handlers. Nothing here outlives a request.

pub mod boxes;
pub mod config;
pub mod dispatch;
pub mod manifest;
pub mod report;
pub mod shipment;
pub mod specimen;

use std::cell::RefCell;

use serde_json::Value;

use crate::api::{ModuleMetadata, ModuleState};
use crate::core::config::{Configuration, ConfigurationSet};
use crate::core::context::{ContextSlot, ProjectHandle};
use crate::core::error::{ConfigError, ContextError, CoreError};
use crate::core::fields::Dictionary;
use crate::core::identity::ProjectId;
use crate::host::HostMeta;
use crate::store::{EntityStore, StoreError};

pub use dispatch::{handle_request, Request, Response};

/// A request-terminating failure: JSON body (string or array) plus a
/// non-2xx status.
#[derive(Debug, Clone)]
pub struct ActionError {
    pub body: Value,
}

impl ActionError {
    pub fn message(msg: impl Into<String>) -> Self {
        Self {
            body: Value::String(msg.into()),
        }
    }

    pub fn list(errors: Vec<String>) -> Self {
        Self {
            body: Value::Array(errors.into_iter().map(Value::String).collect()),
        }
    }
}

/// Flatten an `ActionError` body into a response-local errors array.
pub(crate) fn push_error(errors: &mut Vec<String>, err: ActionError) {
    match err.body {
        Value::String(msg) => errors.push(msg),
        Value::Array(list) => errors.extend(
            list.into_iter()
                .map(|v| v.as_str().unwrap_or_default().to_string()),
        ),
        other => errors.push(other.to_string()),
    }
}

impl From<StoreError> for ActionError {
    fn from(err: StoreError) -> Self {
        Self::message(err.to_string())
    }
}

impl From<CoreError> for ActionError {
    fn from(err: CoreError) -> Self {
        Self::message(err.to_string())
    }
}

impl From<ContextError> for ActionError {
    fn from(err: ContextError) -> Self {
        Self::message(err.to_string())
    }
}

impl From<ConfigError> for ActionError {
    fn from(err: ConfigError) -> Self {
        Self::message(err.to_string())
    }
}

/// Per-request state shared by every handler.
pub struct RequestContext<'a> {
    host: &'a dyn HostMeta,
    store: &'a dyn EntityStore,
    configurations: ConfigurationSet,
    context: ContextSlot,
    // module config is derived once per request on first use
    module_config: RefCell<Option<(ModuleMetadata, ModuleState)>>,
}

impl<'a> RequestContext<'a> {
    /// Resolve configurations from host settings. Fails only when none
    /// exist; per-configuration problems stay inside the set.
    pub fn new(
        host: &'a dyn HostMeta,
        store: &'a dyn EntityStore,
    ) -> Result<Self, ConfigError> {
        let configurations = ConfigurationSet::resolve(
            &host.system_settings(),
            &host.projects_with_module_enabled(),
        )?;
        Ok(Self {
            host,
            store,
            configurations,
            context: ContextSlot::new(),
            module_config: RefCell::new(None),
        })
    }

    pub fn host(&self) -> &dyn HostMeta {
        self.host
    }

    pub fn store(&self) -> &dyn EntityStore {
        self.store
    }

    pub fn configurations(&self) -> &ConfigurationSet {
        &self.configurations
    }

    /// Bind the request to the configuration referencing `project_id`.
    ///
    /// Returns the error strings for the request-level failure response
    /// when the configuration cannot be activated.
    pub fn bind_project(&mut self, project_id: ProjectId) -> Result<(), Vec<String>> {
        let configuration = match self.configurations.configuration_for(project_id) {
            Ok(configuration) => configuration.clone(),
            Err(err) => return Err(vec![err.to_string()]),
        };
        if !configuration.errors.is_empty() {
            return Err(configuration.errors.clone());
        }
        let box_project = self.handle_for(configuration.box_project_id, "Box")?;
        let specimen_project = self.handle_for(configuration.specimen_project_id, "Specimen")?;
        let shipment_project = self.handle_for(configuration.shipment_project_id, "Shipment")?;
        self.context
            .set(configuration, box_project, specimen_project, shipment_project)
            .map_err(|err| vec![err.to_string()])
    }

    fn handle_for(
        &self,
        project_id: Option<ProjectId>,
        label: &str,
    ) -> Result<ProjectHandle, Vec<String>> {
        let project_id =
            project_id.ok_or_else(|| vec![format!("The {label} Project configuration is missing!")])?;
        let dictionary: Dictionary = self
            .host
            .data_dictionary(project_id)
            .ok_or_else(|| vec![format!("No data dictionary exists for project [{project_id}].")])?;
        Ok(ProjectHandle {
            project_id,
            app_title: self.host.app_title(project_id).unwrap_or_default(),
            dictionary,
        })
    }

    pub fn configuration(&self) -> Result<&Configuration, ContextError> {
        self.context.get().map(|active| active.configuration())
    }

    pub fn box_project(&self) -> Result<&ProjectHandle, ContextError> {
        self.context.box_project()
    }

    pub fn specimen_project(&self) -> Result<&ProjectHandle, ContextError> {
        self.context.specimen_project()
    }

    pub fn shipment_project(&self) -> Result<&ProjectHandle, ContextError> {
        self.context.shipment_project()
    }

    /// The merged module config (metadata + state), derived once per
    /// request.
    pub fn module_config(&self) -> Result<(ModuleMetadata, ModuleState), ActionError> {
        if let Some(cached) = self.module_config.borrow().as_ref() {
            return Ok(cached.clone());
        }
        let built = config::build_module_config(self)?;
        *self.module_config.borrow_mut() = Some(built.clone());
        Ok(built)
    }
}
