//! Reporting table data: one row per (shipment, box, specimen).

use indexmap::IndexMap;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::api::{RecordView, Report, ReportConfig, ReportFields};
use crate::core::fields::{FieldMetadata, FieldUiConfig};
use crate::core::identity::RecordId;
use crate::store::RecordSelection;

use super::shipment::display_fields;
use super::{push_error, ActionError, RequestContext};

/// Fields flagged for the reporting table, as (name, label) pairs in
/// configured order.
fn reporting_fields(
    config: &IndexMap<String, FieldUiConfig>,
    metadata: &IndexMap<String, FieldMetadata>,
) -> IndexMap<String, String> {
    config
        .iter()
        .filter(|(_, field_config)| field_config.reporting_table)
        .map(|(field, _)| {
            let label = metadata
                .get(field)
                .map(|m| m.label.clone())
                .unwrap_or_else(|| field.clone());
            (field.clone(), label)
        })
        .collect()
}

pub fn get_report_data(ctx: &RequestContext) -> Report {
    let now = OffsetDateTime::now_utc();
    let mut response = Report {
        config: ReportConfig {
            study_name: None,
            datetime: now
                .format(format_description!(
                    "[month]/[day]/[year] [hour]:[minute]:[second]"
                ))
                .unwrap_or_default(),
            timestamp: now
                .format(format_description!(
                    "[year][month][day]_[hour][minute][second]"
                ))
                .unwrap_or_default(),
        },
        ..Report::default()
    };

    let result = (|| -> Result<(), ActionError> {
        let (metadata, state) = ctx.module_config()?;
        response.config.study_name = state.general.study_name.clone();

        let shipment_fields = reporting_fields(&state.fields.shipment, &metadata.shipment);
        let box_fields = reporting_fields(&state.fields.box_project, &metadata.box_project);
        let specimen_fields = reporting_fields(&state.fields.specimen, &metadata.specimen);
        response.fields = ReportFields {
            box_project: box_fields.clone(),
            specimen: specimen_fields.clone(),
            shipment: shipment_fields.clone(),
        };

        let specimen_handle = ctx.specimen_project()?;
        let box_handle = ctx.box_project()?;
        let shipment_handle = ctx.shipment_project()?;
        let validation_types = ctx.host().validation_types();

        // specimens grouped by owning box
        let mut fetch_fields: Vec<String> = specimen_fields.keys().cloned().collect();
        if !fetch_fields.contains(&"box_record_id".to_string()) {
            fetch_fields.push("box_record_id".to_string());
        }
        let specimen_records = ctx.store().get_records(
            specimen_handle.project_id,
            &RecordSelection::all().with_fields(fetch_fields),
        )?;
        let mut box_specimens: IndexMap<String, Vec<RecordView>> = IndexMap::new();
        for raw in specimen_records.values() {
            let display = display_fields(&specimen_handle.dictionary, &validation_types, raw);
            let box_record_id = raw
                .get("box_record_id")
                .cloned()
                .unwrap_or_default();
            box_specimens.entry(box_record_id).or_default().push(display);
        }

        // boxes for those specimens
        let box_ids: Vec<RecordId> = box_specimens
            .keys()
            .filter_map(|raw| RecordId::parse(raw.clone()).ok())
            .collect();
        let box_records = ctx
            .store()
            .get_records(box_handle.project_id, &RecordSelection::records(box_ids))?;
        let mut boxes: IndexMap<String, (RecordView, String)> = IndexMap::new();
        for (record_id, raw) in &box_records {
            let display = display_fields(&box_handle.dictionary, &validation_types, raw);
            let shipment_record_id = raw.get("shipment_record_id").cloned().unwrap_or_default();
            boxes.insert(record_id.to_string(), (display, shipment_record_id));
        }

        // all shipments, keyed by record id
        let shipment_records = ctx
            .store()
            .get_records(shipment_handle.project_id, &RecordSelection::all())?;
        let shipments: IndexMap<String, RecordView> = shipment_records
            .iter()
            .map(|(record_id, raw)| {
                (
                    record_id.to_string(),
                    display_fields(&shipment_handle.dictionary, &validation_types, raw),
                )
            })
            .collect();

        // one output row per specimen: shipment columns, box columns,
        // specimen columns
        for (box_record_id, specimens) in &box_specimens {
            let (box_display, shipment_record_id) = boxes
                .get(box_record_id)
                .cloned()
                .unwrap_or_else(|| (RecordView::new(), String::new()));
            let shipment_display = shipments.get(&shipment_record_id);
            for specimen in specimens {
                let mut row = RecordView::new();
                for field in shipment_fields.keys() {
                    let value = shipment_display
                        .and_then(|s| s.get(field))
                        .cloned()
                        .unwrap_or_default();
                    row.insert(field.clone(), value);
                }
                for field in box_fields.keys() {
                    row.insert(
                        field.clone(),
                        box_display.get(field).cloned().unwrap_or_default(),
                    );
                }
                for field in specimen_fields.keys() {
                    row.insert(
                        field.clone(),
                        specimen.get(field).cloned().unwrap_or_default(),
                    );
                }
                response.data.push(row);
            }
        }
        Ok(())
    })();
    if let Err(err) = result {
        push_error(&mut response.errors, err);
    }
    response
}
