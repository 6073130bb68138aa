//! Box dashboard, box lists, plate search.

use crate::api::{BoxDashboard, BoxDashboardConfig, BoxDetail, BoxList, PlateSearch, RecordView};
use crate::core::identity::RecordId;
use crate::store::{RecordSelection, DATA_TABLE};

use super::{push_error, ActionError, RequestContext};

/// Fetch one box as a field map; absent boxes yield `None`.
pub fn get_box(ctx: &RequestContext, box_record_id: &RecordId) -> Result<Option<RecordView>, ActionError> {
    let project_id = ctx.box_project()?.project_id;
    let records = ctx
        .store()
        .get_records(project_id, &RecordSelection::record(box_record_id.clone()))?;
    Ok(records
        .into_iter()
        .next()
        .map(|(_, fields)| fields.into_iter().collect()))
}

/// Fetch several boxes, keyed order preserved by record id.
pub fn get_boxes(
    ctx: &RequestContext,
    box_record_ids: Vec<RecordId>,
) -> Result<Vec<(RecordId, RecordView)>, ActionError> {
    if box_record_ids.is_empty() {
        return Ok(Vec::new());
    }
    let project_id = ctx.box_project()?.project_id;
    let records = ctx
        .store()
        .get_records(project_id, &RecordSelection::records(box_record_ids))?;
    Ok(records
        .into_iter()
        .map(|(id, fields)| (id, fields.into_iter().collect()))
        .collect())
}

/// All specimens sitting in a box, ordered by box position.
pub fn specimens_for_box(
    ctx: &RequestContext,
    box_record_id: &RecordId,
) -> Result<Vec<RecordView>, ActionError> {
    let project_id = ctx.specimen_project()?.project_id;
    let records = ctx.store().get_records(
        project_id,
        &RecordSelection::filtered("box_record_id", box_record_id.as_str()),
    )?;
    let mut specimens: Vec<RecordView> = records
        .into_values()
        .map(|fields| fields.into_iter().collect())
        .collect();
    specimens.sort_by(|a, b| {
        a.get("box_position")
            .map(String::as_str)
            .unwrap_or("")
            .cmp(b.get("box_position").map(String::as_str).unwrap_or(""))
    });
    Ok(specimens)
}

pub fn initialize_box_dashboard(ctx: &RequestContext, id: Option<&str>) -> BoxDashboard {
    let mut response = BoxDashboard::default();
    match ctx.module_config() {
        Ok((metadata, state)) => {
            response.config = BoxDashboardConfig {
                general: state.general,
                save_state: state.fields,
                fields: metadata,
                validation: ctx.host().validation_types(),
                alphabet: ('A'..='Z').collect(),
            };
        }
        Err(err) => push_error(&mut response.errors, err),
    }
    // plate context rides along when the dashboard opens on a box
    if let Some(record_id) = id.and_then(|raw| RecordId::parse(raw).ok()) {
        let result = (|| -> Result<(), ActionError> {
            if let Some(plate) = get_box(ctx, &record_id)? {
                response.specimens = Some(specimens_for_box(ctx, &record_id)?);
                response.plate = Some(plate);
            }
            Ok(())
        })();
        if let Err(err) = result {
            push_error(&mut response.errors, err);
        }
    }
    response
}

pub fn get_box_detail(ctx: &RequestContext, id: Option<&str>) -> BoxDetail {
    let mut response = BoxDetail::default();
    let Some(record_id) = id.and_then(|raw| RecordId::parse(raw).ok()) else {
        return response;
    };
    let result = (|| -> Result<(), ActionError> {
        if let Some(box_record) = get_box(ctx, &record_id)? {
            response.specimens = Some(specimens_for_box(ctx, &record_id)?);
            response.box_record = Some(box_record);
        }
        Ok(())
    })();
    if let Err(err) = result {
        push_error(&mut response.errors, err);
    }
    response
}

pub fn get_box_list(ctx: &RequestContext) -> BoxList {
    let mut response = BoxList::default();
    match box_list(ctx, true, None) {
        Ok(boxes) => response.boxes = boxes,
        Err(err) => push_error(&mut response.errors, err),
    }
    response
}

pub fn search_box_list(ctx: &RequestContext, search: Option<&str>) -> BoxList {
    let mut response = BoxList {
        search: search.map(str::to_string),
        ..BoxList::default()
    };
    match box_list(ctx, false, search) {
        Ok(boxes) => response.boxes = boxes,
        Err(err) => push_error(&mut response.errors, err),
    }
    response
}

/// Box listing via one raw set-based query; open-only by default, and a
/// search term matches either the box name or any contained specimen's
/// name.
fn box_list(
    ctx: &RequestContext,
    exclude_closed: bool,
    search: Option<&str>,
) -> Result<Vec<RecordView>, ActionError> {
    let box_project = ctx.box_project()?.project_id.to_string();
    let specimen_project = ctx.specimen_project()?.project_id.to_string();
    let search = search.filter(|s| !s.is_empty());

    let mut joins = String::new();
    let mut filters = String::new();
    // params bind in order of appearance: join params before the where
    let mut params: Vec<String> = Vec::new();

    if exclude_closed {
        joins.push_str(&format!(
            " JOIN {DATA_TABLE} d2 ON d1.project_id = d2.project_id AND d1.record = d2.record \
              AND d2.field_name = 'box_status'"
        ));
        filters.push_str(" AND d2.value = 'available'");
    }
    if let Some(search) = search {
        joins.push_str(&format!(
            " LEFT JOIN {table} s1 ON s1.project_id = ? AND s1.field_name = 'box_record_id' \
               AND d1.record = s1.value \
              LEFT JOIN {table} s2 ON s1.project_id = s2.project_id AND s1.record = s2.record \
               AND s2.field_name = 'specimen_name'",
            table = DATA_TABLE,
        ));
        params.push(specimen_project);
        filters.push_str(" AND (d1.value LIKE ? OR s2.value LIKE ?)");
    }

    let sql = format!(
        "SELECT d1.record FROM {DATA_TABLE} d1{joins} \
         WHERE d1.project_id = ? AND d1.field_name = 'box_name'{filters} \
         GROUP BY d1.record ORDER BY d1.value"
    );
    params.push(box_project);
    if let Some(search) = search {
        let like = format!("%{search}%");
        params.push(like.clone());
        params.push(like);
    }

    let param_refs: Vec<&str> = params.iter().map(String::as_str).collect();
    let rows = ctx.store().run_query(&sql, &param_refs)?;

    let record_ids: Vec<RecordId> = rows
        .into_iter()
        .filter_map(|row| row.get("record").and_then(|v| v.clone()))
        .filter_map(|raw| RecordId::parse(raw).ok())
        .collect();
    if record_ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(get_boxes(ctx, record_ids)?
        .into_iter()
        .map(|(_, fields)| fields)
        .collect())
}

/// Exact-name plate lookup used by the scan workflow; optionally loads
/// the plate's specimens.
pub fn search_plate(
    ctx: &RequestContext,
    search_value: &str,
    include_specimens: bool,
) -> Result<PlateSearch, ActionError> {
    if search_value.is_empty() {
        return Err(ActionError::message("No search value provided."));
    }
    let box_project = ctx.box_project()?.project_id.to_string();
    let sql = format!(
        "SELECT record FROM {DATA_TABLE} \
         WHERE project_id = ?1 AND field_name = 'box_name' AND value = ?2"
    );
    let rows = ctx
        .store()
        .run_query(&sql, &[box_project.as_str(), search_value])?;
    let record_id = rows
        .first()
        .and_then(|row| row.get("record").and_then(|v| v.clone()))
        .and_then(|raw| RecordId::parse(raw).ok());
    let Some(record_id) = record_id else {
        return Err(ActionError::message(format!(
            "No box exists with [box_name]={search_value}."
        )));
    };

    let mut response = PlateSearch {
        plate: get_box(ctx, &record_id)?,
        ..PlateSearch::default()
    };
    if include_specimens {
        response.specimens = Some(specimens_for_box(ctx, &record_id)?);
    }
    Ok(response)
}
