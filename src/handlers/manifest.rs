//! Shipment manifest export (CSV download).
//!
//! Column order is fixed: configured shipment manifest fields with the
//! study name injected as the second column, then box fields, then
//! specimen fields. One row per (box, specimen), boxes ordered by name,
//! specimens by box position.

use indexmap::IndexMap;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::api::{ManifestExport, RecordView};
use crate::core::fields::{FieldMetadata, FieldUiConfig, Surface};
use crate::core::identity::RecordId;
use crate::store::{RecordSelection, DATA_TABLE};

use super::shipment::{display_fields, get_shipment};
use super::{ActionError, RequestContext};

/// Whether the extra header preamble (study/shipping summary lines) is
/// included above the column header row.
const INCLUDE_EXTRA_HEADERS: bool = true;

fn manifest_fields(config: &IndexMap<String, FieldUiConfig>) -> Vec<String> {
    config
        .iter()
        .filter(|(_, field_config)| field_config.surface(Surface::ShipmentManifest))
        .map(|(field, _)| field.clone())
        .collect()
}

/// Build the manifest download for one shipment.
pub fn export_manifest(ctx: &RequestContext, id: Option<&str>) -> Result<ManifestExport, ActionError> {
    let shipment_record_id = id
        .and_then(|raw| RecordId::parse(raw).ok())
        .ok_or_else(|| {
            ActionError::message("Cannot export manifest - shipment_id is invalid or missing.")
        })?;
    let shipment = get_shipment(ctx, &shipment_record_id)?.ok_or_else(|| {
        ActionError::message(format!(
            "Cannot export manifest - no shipment exists with [record_id]={shipment_record_id}."
        ))
    })?;

    let (_, state) = ctx.module_config()?;
    let configuration = ctx.configuration()?;
    let study_name = configuration.study_name.clone().unwrap_or_default();

    let shipment_fields = manifest_fields(&state.fields.shipment);
    let box_fields = manifest_fields(&state.fields.box_project);
    let specimen_fields = manifest_fields(&state.fields.specimen);

    let shipment_handle = ctx.shipment_project()?;
    let box_handle = ctx.box_project()?;
    let validation_types = ctx.host().validation_types();

    // boxes on this shipment, ordered by name
    let box_records = ctx.store().get_records(
        box_handle.project_id,
        &RecordSelection::filtered("shipment_record_id", shipment_record_id.as_str()),
    )?;
    let mut boxes: Vec<(RecordId, RecordView)> = box_records
        .into_iter()
        .map(|(record_id, fields)| (record_id, fields.into_iter().collect()))
        .collect();
    boxes.sort_by(|a, b| {
        a.1.get("box_name")
            .map(String::as_str)
            .unwrap_or("")
            .cmp(b.1.get("box_name").map(String::as_str).unwrap_or(""))
    });

    // specimens for those boxes via one set-based query, then full rows
    let specimens_by_box = specimens_by_box(ctx, &boxes)?;

    // shipment columns once, with display values and study name second
    let shipment_display = display_fields(&shipment_handle.dictionary, &validation_types, &shipment);
    let mut shipment_columns: Vec<(String, String)> = Vec::new();
    for field in &shipment_fields {
        shipment_columns.push((
            field.clone(),
            shipment_display.get(field).cloned().unwrap_or_default(),
        ));
    }
    let study_position = shipment_columns.len().min(1);
    shipment_columns.insert(study_position, ("study_name".to_string(), study_name.clone()));

    // volume header carries the sample type and its configured unit
    let sample_type_raw = shipment.get("sample_type").cloned().unwrap_or_default();
    let sample_type_display = shipment_handle
        .dictionary
        .get("sample_type")
        .map(|dict_field| {
            let metadata = FieldMetadata::resolve(dict_field, &validation_types);
            crate::core::display::display_value(&metadata, &sample_type_raw)
        })
        .unwrap_or_else(|| sample_type_raw.clone());
    let sample_unit = ctx
        .host()
        .sample_type_units()
        .get(&sample_type_raw)
        .cloned()
        .unwrap_or_default();

    let header: Vec<String> = shipment_columns
        .iter()
        .map(|(field, _)| field.clone())
        .chain(box_fields.iter().cloned())
        .chain(specimen_fields.iter().cloned())
        .map(|field| {
            if field == "volume" {
                format!("{sample_type_display} ({sample_unit})")
            } else {
                field
            }
        })
        .collect();

    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    if INCLUDE_EXTRA_HEADERS {
        let shipped_to = shipment_display.get("shipment_to").cloned().unwrap_or_default();
        let shipped_date = shipment_display
            .get("shipment_date")
            .cloned()
            .unwrap_or_default();
        for line in [
            format!("Study Name: {study_name}"),
            format!("Shipped To: {shipped_to}"),
            format!("Shipped Date: {shipped_date}"),
            format!("Sample Type: {sample_type_display}"),
            "Shipment Details: ".to_string(),
            String::new(),
        ] {
            writer
                .write_record([line])
                .map_err(|e| ActionError::message(e.to_string()))?;
        }
    }

    writer
        .write_record(&header)
        .map_err(|e| ActionError::message(e.to_string()))?;

    for (box_record_id, box_view) in &boxes {
        let Some(specimens) = specimens_by_box.get(box_record_id.as_str()) else {
            continue;
        };
        for specimen in specimens {
            let mut row: Vec<String> = shipment_columns
                .iter()
                .map(|(_, value)| value.clone())
                .collect();
            for field in &box_fields {
                row.push(box_view.get(field).cloned().unwrap_or_default());
            }
            for field in &specimen_fields {
                row.push(specimen.get(field).cloned().unwrap_or_default());
            }
            writer
                .write_record(&row)
                .map_err(|e| ActionError::message(e.to_string()))?;
        }
    }

    let content = writer
        .into_inner()
        .map_err(|e| ActionError::message(e.to_string()))?;

    let stamp = OffsetDateTime::now_utc()
        .format(format_description!(
            "[year]-[month]-[day]-[hour][minute][second]"
        ))
        .unwrap_or_default();

    Ok(ManifestExport {
        filename: format!("manifest-{stamp}.csv"),
        content,
    })
}

/// One set-based pass over the entity-attribute-value table to find the
/// shipment's specimens, grouped by box and ordered by box position.
fn specimens_by_box(
    ctx: &RequestContext,
    boxes: &[(RecordId, RecordView)],
) -> Result<IndexMap<String, Vec<RecordView>>, ActionError> {
    let mut result: IndexMap<String, Vec<RecordView>> = IndexMap::new();
    if boxes.is_empty() {
        return Ok(result);
    }
    let specimen_project = ctx.specimen_project()?.project_id;
    let project_param = specimen_project.to_string();

    let mut sql = format!(
        "SELECT record, value AS box_record_id FROM {DATA_TABLE} \
         WHERE project_id = ? AND field_name = 'box_record_id' AND value IN ("
    );
    let mut params: Vec<&str> = vec![project_param.as_str()];
    for (i, (record_id, _)) in boxes.iter().enumerate() {
        if i > 0 {
            sql.push(',');
        }
        sql.push('?');
        params.push(record_id.as_str());
    }
    sql.push(')');
    let rows = ctx.store().run_query(&sql, &params)?;

    let specimen_ids: Vec<RecordId> = rows
        .iter()
        .filter_map(|row| row.get("record").and_then(|v| v.clone()))
        .filter_map(|raw| RecordId::parse(raw).ok())
        .collect();
    if specimen_ids.is_empty() {
        return Ok(result);
    }

    let records = ctx
        .store()
        .get_records(specimen_project, &RecordSelection::records(specimen_ids))?;
    for raw in records.values() {
        let box_record_id = raw.get("box_record_id").cloned().unwrap_or_default();
        let view: RecordView = raw.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        result.entry(box_record_id).or_default().push(view);
    }
    for specimens in result.values_mut() {
        specimens.sort_by(|a, b| {
            a.get("box_position")
                .map(String::as_str)
                .unwrap_or("")
                .cmp(b.get("box_position").map(String::as_str).unwrap_or(""))
        });
    }
    Ok(result)
}
