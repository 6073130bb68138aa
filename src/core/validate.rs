//! Cross-record identifier validation.
//!
//! CSID: shared consumable identifier; siblings (same parsed parts except
//! `aliquot_number`) must all carry the same value. CUID: globally unique
//! per specimen, no sibling exception.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::store::{EntityStore, StoreError, DATA_TABLE};

use super::identity::ProjectId;
use super::parse::{derive_filter_pattern, parse_name};

/// Parts that identify a specimen's family for CSID purposes.
const IDENTITY_PARTS: [&str; 3] = ["participant_id", "visit", "sample_type"];

/// Validation verdict; validity is the conjunction of all checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Validation {
    #[serde(rename = "isValid")]
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl Validation {
    fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Validate a CSID against the candidate specimen's siblings and every
/// other holder of the same value. An empty CSID is trivially valid.
pub fn validate_csid(
    store: &dyn EntityStore,
    specimen_project: ProjectId,
    base_pattern: &str,
    specimen_name: &str,
    csid: &str,
) -> Result<Validation, StoreError> {
    if csid.is_empty() {
        return Ok(Validation::valid());
    }

    let parsed = parse_name(specimen_name, base_pattern);
    let mut errors = Vec::new();
    let project_param = specimen_project.to_string();

    // siblings: same parsed parts except aliquot_number
    let mut fixed = IndexMap::new();
    for (group, value) in &parsed {
        if group == "aliquot_number" {
            continue;
        }
        if let Some(value) = value {
            fixed.insert(group.clone(), value.clone());
        }
    }
    let sibling_pattern = format!("^(?:{})$", derive_filter_pattern(base_pattern, &fixed));
    let sibling_sql = format!(
        "SELECT d1.value AS specimen_name, d2.value AS csid \
         FROM {table} d1 \
         LEFT JOIN {table} d2 ON d1.project_id = d2.project_id \
             AND d1.record = d2.record AND d2.field_name = 'csid' \
         WHERE d1.project_id = ?1 AND d1.field_name = 'specimen_name' \
             AND d1.value REGEXP ?2 AND d1.value <> ?3 \
         ORDER BY d1.value",
        table = DATA_TABLE,
    );
    let siblings = store.run_query(
        &sibling_sql,
        &[project_param.as_str(), sibling_pattern.as_str(), specimen_name],
    )?;
    for sibling in siblings {
        let name = sibling
            .get("specimen_name")
            .and_then(|v| v.clone())
            .unwrap_or_default();
        let sibling_csid = sibling.get("csid").and_then(|v| v.clone());
        if let Some(sibling_csid) = sibling_csid {
            if !sibling_csid.is_empty() && sibling_csid != csid {
                errors.push(format!(
                    "A different CSID [{sibling_csid}] is used by sibling specimen [{name}]."
                ));
            }
        }
    }

    // every other specimen already holding this exact CSID
    let holder_sql = format!(
        "SELECT d2.value AS specimen_name \
         FROM {table} d1 \
         JOIN {table} d2 ON d1.project_id = d2.project_id \
             AND d1.record = d2.record AND d2.field_name = 'specimen_name' \
         WHERE d1.project_id = ?1 AND d1.field_name = 'csid' AND d1.value = ?2 \
         ORDER BY d2.value",
        table = DATA_TABLE,
    );
    let holders = store.run_query(&holder_sql, &[project_param.as_str(), csid])?;
    for holder in holders {
        let Some(name) = holder.get("specimen_name").and_then(|v| v.clone()) else {
            continue;
        };
        let holder_parsed = parse_name(&name, base_pattern);
        let all_differ = IDENTITY_PARTS.iter().all(|part| {
            let candidate = parsed.get(*part).cloned().flatten();
            let other = holder_parsed.get(*part).cloned().flatten();
            candidate != other
        });
        if all_differ {
            errors.push(format!("CSID [{csid}] already assigned to [{name}]."));
        }
    }

    Ok(Validation::from_errors(errors))
}

/// Validate a CUID: valid iff no existing specimen carries the exact
/// value. An empty CUID is trivially valid.
pub fn validate_cuid(
    store: &dyn EntityStore,
    specimen_project: ProjectId,
    cuid: &str,
) -> Result<Validation, StoreError> {
    if cuid.is_empty() {
        return Ok(Validation::valid());
    }
    let project_param = specimen_project.to_string();
    let sql = format!(
        "SELECT COUNT(*) AS holders FROM {DATA_TABLE} \
         WHERE project_id = ?1 AND field_name = 'cuid' AND value = ?2"
    );
    let rows = store.run_query(&sql, &[project_param.as_str(), cuid])?;
    let holders: u64 = rows
        .first()
        .and_then(|row| row.get("holders").and_then(|v| v.clone()))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut errors = Vec::new();
    if holders > 0 {
        errors.push(format!(
            "The CUID [{cuid}] is already in use by another specimen."
        ));
    }
    Ok(Validation::from_errors(errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::RecordId;
    use crate::store::{FieldMap, RecordSet, SqliteEntityStore};

    const PATTERN: &str = r"(?<year>\d{4})-(?<participant_id>P\d{3})(?:-(?<sample_type>[a-z]{2}))?(?:-(?<visit>\d{2}))?(?:-(?<aliquot_number>\d{2}))?";

    const PROJECT: ProjectId = ProjectId::new(2);

    fn seeded_store(specimens: &[(&str, &str, &str, &str)]) -> SqliteEntityStore {
        let store = SqliteEntityStore::in_memory().unwrap();
        let mut records = RecordSet::new();
        for (record, name, csid, cuid) in specimens {
            let mut fields = FieldMap::new();
            fields.insert("record_id".into(), (*record).into());
            fields.insert("specimen_name".into(), (*name).into());
            if !csid.is_empty() {
                fields.insert("csid".into(), (*csid).into());
            }
            if !cuid.is_empty() {
                fields.insert("cuid".into(), (*cuid).into());
            }
            records.insert(RecordId::parse(*record).unwrap(), fields);
        }
        store.save_records(PROJECT, &records).unwrap();
        store
    }

    #[test]
    fn empty_csid_is_valid() {
        let store = seeded_store(&[]);
        let result =
            validate_csid(&store, PROJECT, PATTERN, "2024-P001-bl-01-01", "").unwrap();
        assert!(result.is_valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn sibling_with_different_csid_invalidates_either_side() {
        let store = seeded_store(&[
            ("1", "2024-P001-bl-01-01", "CS-A", ""),
            ("2", "2024-P001-bl-01-02", "CS-B", ""),
        ]);
        // validating either sibling's value reports the other's mismatch
        let result =
            validate_csid(&store, PROJECT, PATTERN, "2024-P001-bl-01-01", "CS-A").unwrap();
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.contains("CS-B")));

        let result =
            validate_csid(&store, PROJECT, PATTERN, "2024-P001-bl-01-02", "CS-B").unwrap();
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.contains("CS-A")));
    }

    #[test]
    fn sibling_sharing_csid_is_valid() {
        let store = seeded_store(&[("1", "2024-P001-bl-01-01", "CS-A", "")]);
        let result =
            validate_csid(&store, PROJECT, PATTERN, "2024-P001-bl-01-02", "CS-A").unwrap();
        assert!(result.is_valid);
    }

    #[test]
    fn other_sample_type_is_not_a_sibling() {
        let store = seeded_store(&[("1", "2024-P001-sr-01-01", "CS-A", "")]);
        let result =
            validate_csid(&store, PROJECT, PATTERN, "2024-P001-bl-01-01", "CS-B").unwrap();
        assert!(result.is_valid);
    }

    #[test]
    fn reassigned_csid_flags_only_when_all_identity_parts_differ() {
        let store = seeded_store(&[("1", "2024-P001-bl-01-01", "CS-A", "")]);

        // all of participant, visit, sample type differ -> conflict
        let result =
            validate_csid(&store, PROJECT, PATTERN, "2024-P002-sr-02-01", "CS-A").unwrap();
        assert!(!result.is_valid);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("already assigned")));

        // only the participant differs -> no conflict under the
        // all-parts-differ rule
        let result =
            validate_csid(&store, PROJECT, PATTERN, "2024-P002-bl-01-01", "CS-A").unwrap();
        assert!(result.is_valid);
    }

    #[test]
    fn empty_cuid_is_valid() {
        let store = seeded_store(&[]);
        let result = validate_cuid(&store, PROJECT, "").unwrap();
        assert!(result.is_valid);
    }

    #[test]
    fn cuid_uniqueness_is_global() {
        let store = seeded_store(&[("1", "2024-P001-bl-01-01", "", "CU-1")]);
        let result = validate_cuid(&store, PROJECT, "CU-1").unwrap();
        assert!(!result.is_valid);
        // no sibling exception: same family is still a conflict
        let result = validate_cuid(&store, PROJECT, "CU-2").unwrap();
        assert!(result.is_valid);
    }
}
