//! Action dispatch: one entry point, `action` selects the behavior.
//!
//! Flow per request: resolve configurations, look up the caller's
//! project, refuse errored configurations, bind the active context, then
//! route. Hard failures return a non-2xx status with a JSON body (string
//! or array); handler-level problems come back inside the response's
//! `errors` array.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::core::identity::ProjectId;
use crate::host::HostMeta;
use crate::store::EntityStore;

use super::{boxes, config, report, shipment, specimen, ActionError, RequestContext};

/// An inbound action request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub action: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn new(action: impl Into<String>, params: Value) -> Self {
        Self {
            action: action.into(),
            params,
        }
    }

    fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    fn flag(&self, key: &str) -> Option<bool> {
        match self.params.get(key) {
            Some(Value::Bool(b)) => Some(*b),
            Some(Value::String(s)) => Some(s == "true"),
            _ => None,
        }
    }
}

/// The outbound JSON response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    fn ok(body: impl Serialize) -> Self {
        Self {
            status: 200,
            body: serde_json::to_value(body).unwrap_or(Value::Null),
        }
    }

    fn error(err: ActionError) -> Self {
        Self {
            status: 400,
            body: err.body,
        }
    }
}

/// Handle one action request in the context of `project_id`.
pub fn handle_request(
    host: &dyn HostMeta,
    store: &dyn EntityStore,
    project_id: ProjectId,
    request: &Request,
) -> Response {
    debug!(action = %request.action, %project_id, "dispatching");

    let mut ctx = match RequestContext::new(host, store) {
        Ok(ctx) => ctx,
        Err(err) => return Response::error(ActionError::message(err.to_string())),
    };
    if let Err(errors) = ctx.bind_project(project_id) {
        return Response::error(ActionError::list(errors));
    }

    route(&ctx, request).unwrap_or_else(Response::error)
}

fn route(ctx: &RequestContext, request: &Request) -> Result<Response, ActionError> {
    let response = match request.action.as_str() {
        "initialize-config-dashboard" => Response::ok(config::initialize_config_dashboard(ctx)),
        "save-module-config" => Response::ok(config::save_module_config(ctx, &request.params)),
        "initialize-box-dashboard" => {
            Response::ok(boxes::initialize_box_dashboard(ctx, request.param("id")))
        }
        "get-box" => Response::ok(boxes::get_box_detail(ctx, request.param("id"))),
        "get-box-list" => Response::ok(boxes::get_box_list(ctx)),
        "search-box-list" => Response::ok(boxes::search_box_list(ctx, request.param("search"))),
        "search-plate" => {
            let include_specimens = request.flag("include_specimens").unwrap_or(true);
            Response::ok(boxes::search_plate(
                ctx,
                request.param("search_value").unwrap_or_default(),
                include_specimens,
            )?)
        }
        "get-specimen" => Response::ok(specimen::get_specimen(
            ctx,
            request.param("specimen_record_id"),
        )),
        "search-specimen" => Response::ok(specimen::search_specimen(
            ctx,
            request.param("search_value").unwrap_or_default(),
        )?),
        "save-specimen" => Response::ok(specimen::save_specimen(
            ctx,
            request.params.get("specimen").unwrap_or(&Value::Null),
        )),
        "delete-specimen" => Response::ok(specimen::delete_specimen(
            ctx,
            request.param("specimen_record_id"),
        )),
        "initialize-shipment-dashboard" => Response::ok(shipment::initialize_shipment_dashboard(
            ctx,
            request.param("id"),
        )),
        "search-shipments" => Response::ok(shipment::search_shipments(ctx)),
        "complete-shipment" => Response::ok(shipment::complete_shipment(
            ctx,
            request.param("shipment_record_id"),
        )?),
        "update-box-shipment" => Response::ok(shipment::update_box_shipment(
            ctx,
            request.param("box_record_id"),
            request.param("shipment_record_id"),
        )?),
        "get-report-data" | "get-specimen-report-data" => {
            Response::ok(report::get_report_data(ctx))
        }
        "validate-csid" => Response::ok(specimen::validate_csid_action(
            ctx,
            request
                .params
                .get("specimen")
                .and_then(|s| s.get("specimen_name"))
                .and_then(Value::as_str)
                .or_else(|| request.param("specimen_name")),
            request.param("csid"),
        )?),
        "validate-cuid" => Response::ok(specimen::validate_cuid_action(
            ctx,
            request.param("cuid"),
        )?),
        _ => Response {
            status: 400,
            body: json!("The action does not exist."),
        },
    };
    Ok(response)
}
