//! Module configuration: load, build, save.

use serde_json::Value;
use tracing::warn;

use crate::api::{
    ConfigDashboard, LinkedProjects, ModuleMetadata, ModuleState, ProjectInfo, SaveModuleConfig,
};
use crate::core::config::ProjectRole;
use crate::core::fields::{build_field_config, ModuleConfig};

use super::{push_error, ActionError, RequestContext};

/// Project-scoped setting key holding the persisted config blob.
pub const MODULE_CONFIG_SETTING: &str = "module-config";

/// Load the persisted module config from the box project's setting.
/// Absent or unreadable blobs fall back to defaults; the configuration
/// dashboard then shows the computed baseline.
pub fn load_module_config(ctx: &RequestContext) -> Result<ModuleConfig, ActionError> {
    let box_project = ctx.box_project()?;
    let raw = ctx
        .host()
        .project_setting(box_project.project_id, MODULE_CONFIG_SETTING);
    let Some(raw) = raw else {
        return Ok(ModuleConfig::default());
    };
    match serde_json::from_str(&raw) {
        Ok(config) => Ok(config),
        Err(err) => {
            warn!(project_id = %box_project.project_id, %err, "stored module config unreadable, using defaults");
            Ok(ModuleConfig::default())
        }
    }
}

/// Build the merged module config for all three projects.
pub fn build_module_config(
    ctx: &RequestContext,
) -> Result<(ModuleMetadata, ModuleState), ActionError> {
    let module_config = load_module_config(ctx)?;
    let validation_types = ctx.host().validation_types();

    let mut metadata = ModuleMetadata::default();
    let mut state = ModuleState {
        general: module_config.general.clone(),
        ..ModuleState::default()
    };

    for role in [ProjectRole::Specimen, ProjectRole::Box, ProjectRole::Shipment] {
        let handle = match role {
            ProjectRole::Box => ctx.box_project()?,
            ProjectRole::Specimen => ctx.specimen_project()?,
            ProjectRole::Shipment => ctx.shipment_project()?,
        };
        let bundle = build_field_config(
            role,
            &handle.dictionary,
            module_config.fields.for_role(role),
            &validation_types,
        );
        match role {
            ProjectRole::Box => {
                metadata.box_project = bundle.metadata;
                state.fields.box_project = bundle.config;
            }
            ProjectRole::Specimen => {
                metadata.specimen = bundle.metadata;
                state.fields.specimen = bundle.config;
            }
            ProjectRole::Shipment => {
                metadata.shipment = bundle.metadata;
                state.fields.shipment = bundle.config;
            }
        }
    }

    Ok((metadata, state))
}

pub fn initialize_config_dashboard(ctx: &RequestContext) -> ConfigDashboard {
    let mut response = ConfigDashboard::default();

    let projects = (|| -> Result<LinkedProjects, ActionError> {
        Ok(LinkedProjects {
            specimen: Some(project_info(ctx.specimen_project()?)),
            box_project: Some(project_info(ctx.box_project()?)),
            shipment: Some(project_info(ctx.shipment_project()?)),
        })
    })();
    match projects {
        Ok(projects) => response.projects = projects,
        Err(err) => push_error(&mut response.errors, err),
    }

    match ctx.module_config() {
        Ok((metadata, state)) => {
            response.metadata = metadata;
            response.state = state;
        }
        Err(err) => push_error(&mut response.errors, err),
    }

    response
}

/// Persist the entire payload as one JSON blob; never partially patched.
pub fn save_module_config(ctx: &RequestContext, payload: &Value) -> SaveModuleConfig {
    let mut response = SaveModuleConfig::default();

    // shape check before persisting anything
    if let Err(err) = serde_json::from_value::<ModuleConfig>(payload.clone()) {
        response
            .errors
            .push(format!("Cannot save module configuration: {err}"));
        return response;
    }

    match ctx.box_project() {
        Ok(box_project) => match serde_json::to_string(payload) {
            Ok(raw) => {
                ctx.host()
                    .set_project_setting(box_project.project_id, MODULE_CONFIG_SETTING, raw);
            }
            Err(err) => response.errors.push(err.to_string()),
        },
        Err(err) => response.errors.push(err.to_string()),
    }

    response
}

fn project_info(handle: &crate::core::context::ProjectHandle) -> ProjectInfo {
    ProjectInfo {
        project_id: handle.project_id,
        app_title: handle.app_title.clone(),
    }
}
