//! Specimen retrieval, search, save, delete, and identifier validation.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::api::{RecordView, SpecimenDelete, SpecimenDetail, SpecimenSave, SpecimenSearch};
use crate::core::fields::SPECIMEN_NAME_FIELD;
use crate::core::identity::RecordId;
use crate::core::matcher;
use crate::core::validate::{validate_csid, validate_cuid, Validation};
use crate::store::{FieldMap, RecordSelection, RecordSet};

use super::boxes::{get_box, get_boxes};
use super::{push_error, ActionError, RequestContext};

pub fn get_specimen(ctx: &RequestContext, record_id: Option<&str>) -> SpecimenDetail {
    let mut response = SpecimenDetail::default();
    let Some(record_id) = record_id.and_then(|raw| RecordId::parse(raw).ok()) else {
        response
            .errors
            .push("Missing or invalid record_id specified.".to_string());
        return response;
    };
    match fetch_specimen(ctx, &record_id) {
        Ok(specimen) => response.specimen = specimen,
        Err(err) => push_error(&mut response.errors, err),
    }
    response
}

fn fetch_specimen(
    ctx: &RequestContext,
    record_id: &RecordId,
) -> Result<Option<RecordView>, ActionError> {
    let project_id = ctx.specimen_project()?.project_id;
    let records = ctx
        .store()
        .get_records(project_id, &RecordSelection::record(record_id.clone()))?;
    Ok(records
        .into_iter()
        .next()
        .map(|(_, fields)| fields.into_iter().collect()))
}

pub fn search_specimen(ctx: &RequestContext, search_value: &str) -> Result<SpecimenSearch, ActionError> {
    if search_value.is_empty() {
        return Err(ActionError::message("No search value provided."));
    }
    let (_, state) = ctx.module_config()?;
    let configuration = ctx.configuration()?;
    let specimen_project = ctx.specimen_project()?.project_id;

    // the persisted general settings take precedence; the system-level
    // regex is the fallback for unconfigured modules
    let base_pattern = state
        .general
        .specimen_name_regex
        .clone()
        .unwrap_or_else(|| configuration.specimen_name_regex().to_string());
    let match_prefill = state
        .fields
        .specimen
        .get(SPECIMEN_NAME_FIELD)
        .and_then(|f| f.extras.match_prefill.as_ref());

    let outcome = matcher::search(
        ctx.store(),
        specimen_project,
        &base_pattern,
        match_prefill,
        search_value,
    )?;

    let mut response = SpecimenSearch {
        search_value: outcome.search_value.clone(),
        parsed_value: outcome.parsed_value.clone(),
        match_type: outcome.match_type,
        specimen: None,
        box_record: None,
        max_visit: outcome.max_visit,
        alternate_boxes: Vec::new(),
        warnings: outcome.warnings.clone(),
        errors: Vec::new(),
    };

    if let Some(record_id) = &outcome.specimen_record_id {
        response.specimen = fetch_specimen(ctx, record_id)?;
        let box_record_id = response
            .specimen
            .as_ref()
            .and_then(|s| s.get("box_record_id"))
            .and_then(|raw| RecordId::parse(raw.clone()).ok());
        if let Some(box_record_id) = box_record_id {
            response.box_record = get_box(ctx, &box_record_id)?;
        }
        if configuration.use_temp_box_type {
            response.alternate_boxes = temporary_alternates(ctx, &outcome)?;
        }
    }

    Ok(response)
}

/// Temporary boxes holding the searched sample type elsewhere in the
/// participant family; offered as relocation targets.
fn temporary_alternates(
    ctx: &RequestContext,
    outcome: &matcher::MatchOutcome,
) -> Result<Vec<RecordView>, ActionError> {
    if outcome.family_box_ids.is_empty() {
        return Ok(Vec::new());
    }
    let searched_sample_type = outcome
        .parsed_value
        .get("sample_type")
        .cloned()
        .flatten()
        .unwrap_or_default();
    let boxes = get_boxes(ctx, outcome.family_box_ids.clone())?;
    Ok(boxes
        .into_iter()
        .map(|(_, fields)| fields)
        .filter(|fields| {
            fields.get("box_type").map(String::as_str) == Some("temporary")
                && fields.get("sample_type").map(String::as_str)
                    == Some(searched_sample_type.as_str())
        })
        .collect())
}

/// Save (create or update) a specimen with overwrite semantics.
///
/// CSID/CUID rules gate the write: a changed value that fails validation
/// aborts the save with the validator's errors.
pub fn save_specimen(ctx: &RequestContext, payload: &Value) -> SpecimenSave {
    let mut response = SpecimenSave::default();

    let Some(fields) = payload.as_object().filter(|map| !map.is_empty()) else {
        response
            .errors
            .push("Cannot create/update specimen.  No specimen value provided.".to_string());
        return response;
    };
    let mut specimen: IndexMap<String, String> = fields
        .iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect();

    let result = (|| -> Result<RecordView, ActionError> {
        let handle = ctx.specimen_project()?;
        let project_id = handle.project_id;
        let dictionary = &handle.dictionary;

        let supplied_id = specimen
            .get("record_id")
            .filter(|v| !v.is_empty())
            .cloned();
        let record_id = match supplied_id {
            Some(raw) => {
                RecordId::parse(raw).map_err(|err| ActionError::message(err.to_string()))?
            }
            None => {
                let reserved = ctx.store().reserve_record_id(project_id)?;
                specimen.insert("record_id".to_string(), reserved.to_string());
                reserved
            }
        };

        // identifier rules gate the save; only changed values re-validate
        let existing = fetch_specimen(ctx, &record_id)?;
        let stored = |field: &str| -> Option<&str> {
            existing.as_ref().and_then(|e| e.get(field)).map(String::as_str)
        };
        let mut gate_errors = Vec::new();
        if let Some(csid) = specimen.get("csid").filter(|v| !v.is_empty()) {
            if stored("csid") != Some(csid.as_str()) {
                let name = specimen
                    .get(SPECIMEN_NAME_FIELD)
                    .cloned()
                    .or_else(|| stored(SPECIMEN_NAME_FIELD).map(str::to_string))
                    .unwrap_or_default();
                let base_pattern = specimen_pattern(ctx)?;
                let verdict =
                    validate_csid(ctx.store(), project_id, &base_pattern, &name, csid)?;
                gate_errors.extend(verdict.errors);
            }
        }
        if let Some(cuid) = specimen.get("cuid").filter(|v| !v.is_empty()) {
            if stored("cuid") != Some(cuid.as_str()) {
                let verdict = validate_cuid(ctx.store(), project_id, cuid)?;
                gate_errors.extend(verdict.errors);
            }
        }
        if !gate_errors.is_empty() {
            return Err(ActionError::list(gate_errors));
        }

        // always carry a form-complete value
        let form_complete = dictionary
            .first_form()
            .map(|form| format!("{form}_complete"))
            .unwrap_or_else(|| "form_complete".to_string());
        specimen
            .entry(form_complete.clone())
            .or_insert_with(|| "0".to_string());

        // restrict the write to dictionary fields (plus the form status)
        let mut save_fields = FieldMap::new();
        for (field, value) in &specimen {
            if dictionary.contains(field) || *field == form_complete {
                save_fields.insert(field.clone(), value.clone());
            }
        }
        let mut records = RecordSet::new();
        records.insert(record_id, save_fields);
        let outcome = ctx.store().save_records(project_id, &records)?;
        if !outcome.ok() {
            warn!(project_id = %project_id, errors = ?outcome.errors, "specimen save failed");
            return Err(ActionError::list(outcome.errors));
        }

        Ok(specimen.into_iter().collect())
    })();

    match result {
        Ok(saved) => response.specimen = Some(saved),
        Err(err) => push_error(&mut response.errors, err),
    }
    response
}

pub fn delete_specimen(ctx: &RequestContext, record_id: Option<&str>) -> SpecimenDelete {
    let mut response = SpecimenDelete::default();
    let Some(record_id) = record_id.and_then(|raw| RecordId::parse(raw).ok()) else {
        response
            .errors
            .push("Missing or invalid record_id specified.".to_string());
        return response;
    };
    let result = (|| -> Result<bool, ActionError> {
        let project_id = ctx.specimen_project()?.project_id;
        Ok(ctx.store().delete_record(project_id, &record_id)?)
    })();
    match result {
        Ok(true) => response.deleted = true,
        Ok(false) => response.errors.push(
            "Delete action failed - One or more parameters were invalid or record does not exist!"
                .to_string(),
        ),
        Err(err) => push_error(&mut response.errors, err),
    }
    response
}

pub fn validate_csid_action(
    ctx: &RequestContext,
    specimen_name: Option<&str>,
    csid: Option<&str>,
) -> Result<Validation, ActionError> {
    let base_pattern = specimen_pattern(ctx)?;
    let project_id = ctx.specimen_project()?.project_id;
    Ok(validate_csid(
        ctx.store(),
        project_id,
        &base_pattern,
        specimen_name.unwrap_or_default(),
        csid.unwrap_or_default(),
    )?)
}

pub fn validate_cuid_action(
    ctx: &RequestContext,
    cuid: Option<&str>,
) -> Result<Validation, ActionError> {
    let project_id = ctx.specimen_project()?.project_id;
    Ok(validate_cuid(
        ctx.store(),
        project_id,
        cuid.unwrap_or_default(),
    )?)
}

/// The effective specimen-name pattern: persisted module config first,
/// then the system configuration.
fn specimen_pattern(ctx: &RequestContext) -> Result<String, ActionError> {
    let (_, state) = ctx.module_config()?;
    if let Some(pattern) = state.general.specimen_name_regex {
        return Ok(pattern);
    }
    Ok(ctx.configuration()?.specimen_name_regex().to_string())
}
