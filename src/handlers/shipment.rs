//! Shipment dashboard, listing, and the two shipment mutations.
//!
//! `complete-shipment` is the one multi-step write in the module. The
//! store offers no multi-record transaction, so the box-status step
//! failing triggers a best-effort compensating revert of the shipment
//! status; the original error is what gets reported.

use indexmap::IndexMap;
use tracing::error;

use crate::api::{
    RecordView, SaveConfirmation, ShipmentBox, ShipmentDashboard, ShipmentDashboardConfig,
    ShipmentList, ShipmentListConfig,
};
use crate::core::display::display_value;
use crate::core::fields::{FieldMetadata, ValidationTypes};
use crate::core::identity::RecordId;
use crate::core::parse::parse_name;
use crate::store::{FieldMap, RecordSelection, RecordSet};

use super::boxes::get_box;
use super::{push_error, ActionError, RequestContext};

/// Shipment fields as (name, label) pairs, excluding host-managed
/// form-status fields.
pub fn shipment_fields(ctx: &RequestContext) -> Result<IndexMap<String, String>, ActionError> {
    let handle = ctx.shipment_project()?;
    Ok(handle
        .dictionary
        .fields()
        .filter(|f| !handle.dictionary.is_form_status(&f.field_name))
        .map(|f| (f.field_name.clone(), f.label.clone()))
        .collect())
}

pub fn get_shipment(
    ctx: &RequestContext,
    shipment_record_id: &RecordId,
) -> Result<Option<RecordView>, ActionError> {
    let project_id = ctx.shipment_project()?.project_id;
    let records = ctx.store().get_records(
        project_id,
        &RecordSelection::record(shipment_record_id.clone()),
    )?;
    Ok(records
        .into_iter()
        .next()
        .map(|(_, fields)| fields.into_iter().collect()))
}

/// All boxes attached to a shipment, with display values and parsed
/// names, ordered by box name.
pub fn boxes_by_shipment(
    ctx: &RequestContext,
    shipment_record_id: &RecordId,
    box_name_regex: &str,
) -> Result<Vec<ShipmentBox>, ActionError> {
    let handle = ctx.box_project()?;
    let project_id = handle.project_id;
    let selection = RecordSelection::filtered("shipment_record_id", shipment_record_id.as_str());
    let records = ctx.store().get_records(project_id, &selection)?;

    let validation_types = ctx.host().validation_types();
    let mut boxes: Vec<ShipmentBox> = records
        .into_values()
        .map(|raw| {
            let fields = display_fields(&handle.dictionary, &validation_types, &raw);
            let name_parsed = parse_name(
                raw.get("box_name").map(String::as_str).unwrap_or(""),
                box_name_regex,
            );
            ShipmentBox {
                fields,
                name_parsed,
            }
        })
        .collect();
    boxes.sort_by(|a, b| {
        a.fields
            .get("box_name")
            .map(String::as_str)
            .unwrap_or("")
            .cmp(b.fields.get("box_name").map(String::as_str).unwrap_or(""))
    });
    Ok(boxes)
}

/// Convert one raw record to display values using its dictionary.
pub(crate) fn display_fields(
    dictionary: &crate::core::fields::Dictionary,
    validation_types: &ValidationTypes,
    raw: &FieldMap,
) -> RecordView {
    raw.iter()
        .map(|(field, value)| {
            let display = dictionary
                .get(field)
                .map(|dict_field| {
                    let metadata = FieldMetadata::resolve(dict_field, validation_types);
                    display_value(&metadata, value)
                })
                .unwrap_or_else(|| value.clone());
            (field.clone(), display)
        })
        .collect()
}

pub fn initialize_shipment_dashboard(ctx: &RequestContext, id: Option<&str>) -> ShipmentDashboard {
    let mut response = ShipmentDashboard::default();

    let result = (|| -> Result<(), ActionError> {
        let configuration = ctx.configuration()?;
        let box_name_regex = configuration.box_name_regex().to_string();
        let box_handle = ctx.box_project()?;
        response.config = ShipmentDashboardConfig {
            box_name_regex: box_name_regex.clone(),
            shipment_fields: shipment_fields(ctx)?,
            box_fields: box_handle
                .dictionary
                .fields()
                .map(|f| (f.field_name.clone(), f.label.clone()))
                .collect(),
        };

        let Some(record_id) = id.and_then(|raw| RecordId::parse(raw).ok()) else {
            return Ok(());
        };
        let Some(shipment) = get_shipment(ctx, &record_id)? else {
            return Ok(());
        };

        let shipment_handle = ctx.shipment_project()?;
        let validation_types = ctx.host().validation_types();
        let mut details = IndexMap::new();
        for field in response.config.shipment_fields.keys() {
            let raw = shipment.get(field).map(String::as_str).unwrap_or("");
            let display = shipment_handle
                .dictionary
                .get(field)
                .map(|dict_field| {
                    let metadata = FieldMetadata::resolve(dict_field, &validation_types);
                    display_value(&metadata, raw)
                })
                .unwrap_or_else(|| raw.to_string());
            details.insert(field.clone(), display);
        }
        response.boxes = Some(boxes_by_shipment(ctx, &record_id, &box_name_regex)?);
        response.shipment_details = Some(details);
        response.shipment = Some(shipment);
        Ok(())
    })();
    if let Err(err) = result {
        push_error(&mut response.errors, err);
    }
    response
}

pub fn search_shipments(ctx: &RequestContext) -> ShipmentList {
    let mut response = ShipmentList::default();
    let result = (|| -> Result<(), ActionError> {
        let handle = ctx.shipment_project()?;
        let project_id = handle.project_id;
        let validation_types = ctx.host().validation_types();
        let records = ctx
            .store()
            .get_records(project_id, &RecordSelection::all())?;
        response.shipments = records
            .values()
            .map(|raw| display_fields(&handle.dictionary, &validation_types, raw))
            .collect();
        response.config = ShipmentListConfig {
            shipment_fields: shipment_fields(ctx)?.into_keys().collect(),
        };
        Ok(())
    })();
    if let Err(err) = result {
        push_error(&mut response.errors, err);
    }
    response
}

/// Set a shipment's status, refusing no-op and missing-record updates.
fn update_shipment_status(
    ctx: &RequestContext,
    shipment_record_id: &RecordId,
    status: &str,
) -> Result<(), ActionError> {
    let project_id = ctx.shipment_project()?.project_id;
    let shipment = get_shipment(ctx, shipment_record_id)?.ok_or_else(|| {
        ActionError::message(format!(
            "Cannot update shipment status.  No shipment exists with [record_id]={shipment_record_id}."
        ))
    })?;
    if shipment.get("shipment_status").map(String::as_str) == Some(status) {
        return Err(ActionError::message(format!(
            "Aborting request.  Shipment status is already '{status}'."
        )));
    }
    let mut fields = FieldMap::new();
    fields.insert("shipment_status".to_string(), status.to_string());
    let mut records = RecordSet::new();
    records.insert(shipment_record_id.clone(), fields);
    let outcome = ctx.store().save_records(project_id, &records)?;
    if !outcome.ok() {
        error!(project_id = %project_id, errors = ?outcome.errors, "shipment status save failed");
        return Err(ActionError::list(outcome.errors));
    }
    Ok(())
}

/// Set the status of every box attached to a shipment (single batch
/// save).
fn update_box_status_by_shipment(
    ctx: &RequestContext,
    shipment_record_id: &RecordId,
    status: &str,
) -> Result<(), ActionError> {
    let project_id = ctx.box_project()?.project_id;
    let boxes = ctx.store().get_records(
        project_id,
        &RecordSelection::filtered("shipment_record_id", shipment_record_id.as_str())
            .with_fields(vec!["record_id".to_string()]),
    )?;
    let mut records = RecordSet::new();
    for record_id in boxes.keys() {
        let mut fields = FieldMap::new();
        fields.insert("box_status".to_string(), status.to_string());
        records.insert(record_id.clone(), fields);
    }
    let outcome = ctx.store().save_records(project_id, &records)?;
    if !outcome.ok() {
        error!(project_id = %project_id, errors = ?outcome.errors, "box status save failed");
        return Err(ActionError::list(outcome.errors));
    }
    Ok(())
}

/// Complete a shipment: mark it complete, then close its boxes. Not
/// atomic; a failed second step reverts the first and reports the
/// original error.
pub fn complete_shipment(
    ctx: &RequestContext,
    shipment_record_id: Option<&str>,
) -> Result<SaveConfirmation, ActionError> {
    let record_id = shipment_record_id
        .and_then(|raw| RecordId::parse(raw).ok())
        .ok_or_else(|| {
            ActionError::message(
                "Cannot complete shipment.  The [shipment_record_id] is invalid or missing.",
            )
        })?;

    update_shipment_status(ctx, &record_id, "complete")?;

    if let Err(box_error) = update_box_status_by_shipment(ctx, &record_id, "closed") {
        // best-effort rollback; the box failure is what gets reported
        if let Err(revert_error) = update_shipment_status(ctx, &record_id, "incomplete") {
            error!(
                shipment = %record_id,
                ?revert_error,
                "compensating shipment-status revert failed"
            );
        }
        return Err(box_error);
    }

    Ok(SaveConfirmation::saved())
}

/// Attach a box to a shipment (or detach with an empty id).
pub fn update_box_shipment(
    ctx: &RequestContext,
    box_record_id: Option<&str>,
    shipment_record_id: Option<&str>,
) -> Result<SaveConfirmation, ActionError> {
    let box_record_id = box_record_id
        .and_then(|raw| RecordId::parse(raw).ok())
        .ok_or_else(|| {
            ActionError::message(
                "Cannot update box/shipment.  The [box_record_id] is invalid or missing.",
            )
        })?;
    let shipment_record_id = shipment_record_id.filter(|s| !s.is_empty());
    let shipment_id = match shipment_record_id {
        Some(raw) => Some(RecordId::parse(raw).map_err(|_| {
            ActionError::message(
                "Cannot update box/shipment.  The [shipment_record_id] must be null or numeric.",
            )
        })?),
        None => None,
    };

    if get_box(ctx, &box_record_id)?.is_none() {
        return Err(ActionError::message(format!(
            "Cannot update box/shipment.  No box exists with [record_id]={box_record_id}."
        )));
    }
    if let Some(shipment_id) = &shipment_id {
        if get_shipment(ctx, shipment_id)?.is_none() {
            return Err(ActionError::message(format!(
                "Cannot update box/shipment.  No shipment exists with [record_id]={shipment_id}."
            )));
        }
    }

    let project_id = ctx.box_project()?.project_id;
    let mut fields = FieldMap::new();
    fields.insert(
        "shipment_record_id".to_string(),
        shipment_id.map(|id| id.to_string()).unwrap_or_default(),
    );
    let mut records = RecordSet::new();
    records.insert(box_record_id, fields);
    let outcome = ctx.store().save_records(project_id, &records)?;
    if !outcome.ok() {
        return Err(ActionError::list(outcome.errors));
    }
    Ok(SaveConfirmation::saved())
}
