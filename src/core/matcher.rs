//! Specimen search with hierarchical fallback.
//!
//! Specimen names are assigned hierarchically
//! (year / participant / sample-type / visit / aliquot), and data entry
//! often scans a partial identifier. The matcher still suggests the most
//! specific plausible match: exact name first, then the full 4-level
//! bucket, then participant-level relaxations.

use serde::{Deserialize, Serialize};

use crate::store::{EntityStore, StoreError, DATA_TABLE};

use super::fields::MatchPrefillExtra;
use super::identity::{ProjectId, RecordId};
use super::parse::{derive_filter_pattern, parse_name, ParsedName};

/// Bucket key levels, most significant first.
const BUCKET_LEVELS: [&str; 4] = ["year", "participant_id", "sample_type", "visit"];

/// Placeholder for a level whose group was absent in a parse.
const MISSING: &str = "__none__";

/// How a search resolved, in priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Raw search string equals a stored name verbatim.
    Exact,
    /// Same 4-level bucket as the parsed search string.
    Full,
    /// Participant-level relaxation (3- or 2-level bucket).
    Participant,
    /// No candidates.
    None,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Full => "full",
            Self::Participant => "participant",
            Self::None => "none",
        }
    }
}

/// One candidate row from the fast-path query.
#[derive(Debug, Clone)]
struct Candidate {
    record_id: RecordId,
    name: String,
    box_record_id: Option<RecordId>,
    parts: [String; 4],
}

/// Search result: the best match plus enough context for prefill hints
/// and relocation targets.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub search_value: String,
    pub parsed_value: ParsedName,
    pub match_type: MatchType,
    pub specimen_record_id: Option<RecordId>,
    /// Highest visit number in the matched participant bucket; prefill
    /// hint for participant-level matches only.
    pub max_visit: Option<u32>,
    /// Boxes referenced by the matched specimen's participant family,
    /// excluding its own box. Input to temporary-box relocation.
    pub family_box_ids: Vec<RecordId>,
    pub warnings: Vec<String>,
}

/// Run the search against the specimen project.
pub fn search(
    store: &dyn EntityStore,
    specimen_project: ProjectId,
    base_pattern: &str,
    match_prefill: Option<&MatchPrefillExtra>,
    search_value: &str,
) -> Result<MatchOutcome, StoreError> {
    let parsed_value = parse_name(search_value, base_pattern);
    let mut warnings = Vec::new();

    // fast path: one relational query across the entity-attribute-value
    // table; exact equality unless match-by-nomenclature is configured
    let (condition, query_value) = match match_prefill {
        Some(mp) if mp.enabled => {
            if mp.is_configured() {
                let mut fixed = indexmap::IndexMap::new();
                for group in &mp.groups {
                    if let Some(Some(value)) = parsed_value.get(group) {
                        fixed.insert(group.clone(), value.clone());
                    }
                }
                let derived = derive_filter_pattern(base_pattern, &fixed);
                ("d1.value REGEXP ?2", format!("^(?:{derived})$"))
            } else {
                warnings.push(
                    "Pre-fill by Nomenclature enabled but ignored, due to incomplete configuration."
                        .to_string(),
                );
                ("d1.value = ?2", search_value.to_string())
            }
        }
        _ => ("d1.value = ?2", search_value.to_string()),
    };

    let sql = format!(
        "SELECT d1.record, d1.value AS specimen_name, d2.value AS box_record_id \
         FROM {table} d1 \
         LEFT JOIN {table} d2 ON d1.project_id = d2.project_id \
             AND d1.record = d2.record AND d2.field_name = 'box_record_id' \
         WHERE d1.project_id = ?1 AND d1.field_name = 'specimen_name' AND {condition} \
         ORDER BY d1.value",
        table = DATA_TABLE,
    );
    let project_param = specimen_project.to_string();
    let rows = store.run_query(&sql, &[project_param.as_str(), query_value.as_str()])?;

    let mut candidates = Vec::with_capacity(rows.len());
    for row in rows {
        let record = row
            .get("record")
            .and_then(|v| v.clone())
            .and_then(|r| RecordId::parse(r).ok());
        let name = row.get("specimen_name").and_then(|v| v.clone());
        let (Some(record_id), Some(name)) = (record, name) else {
            continue;
        };
        let box_record_id = row
            .get("box_record_id")
            .and_then(|v| v.clone())
            .and_then(|r| RecordId::parse(r).ok());
        let parts = bucket_parts(&parse_name(&name, base_pattern));
        candidates.push(Candidate {
            record_id,
            name,
            box_record_id,
            parts,
        });
    }

    let search_parts = bucket_parts(&parsed_value);
    let (match_type, matched, max_visit) = best_match(&candidates, search_value, &search_parts);

    let family_box_ids = matched
        .map(|m| family_boxes(&candidates, &search_parts, m))
        .unwrap_or_default();

    Ok(MatchOutcome {
        search_value: search_value.to_string(),
        parsed_value,
        match_type,
        specimen_record_id: matched.map(|m| m.record_id.clone()),
        max_visit,
        family_box_ids,
        warnings,
    })
}

fn bucket_parts(parsed: &ParsedName) -> [String; 4] {
    BUCKET_LEVELS.map(|level| {
        parsed
            .get(level)
            .and_then(|v| v.clone())
            .unwrap_or_else(|| MISSING.to_string())
    })
}

/// Priority: exact, full (4 levels), participant (3 levels, then 2).
/// First success wins; `max_visit` accompanies participant matches.
fn best_match<'a>(
    candidates: &'a [Candidate],
    search_value: &str,
    search_parts: &[String; 4],
) -> (MatchType, Option<&'a Candidate>, Option<u32>) {
    if let Some(exact) = candidates.iter().find(|c| c.name == search_value) {
        return (MatchType::Exact, Some(exact), None);
    }

    if let Some(full) = candidates.iter().find(|c| c.parts == *search_parts) {
        return (MatchType::Full, Some(full), None);
    }

    for depth in [3, 2] {
        let mut bucket = candidates
            .iter()
            .filter(|c| c.parts[..depth] == search_parts[..depth])
            .peekable();
        if bucket.peek().is_some() {
            let bucket: Vec<&Candidate> = bucket.collect();
            let max_visit = bucket.iter().filter_map(|c| visit_number(c)).max();
            return (MatchType::Participant, Some(bucket[0]), max_visit);
        }
    }

    (MatchType::None, None, None)
}

fn visit_number(candidate: &Candidate) -> Option<u32> {
    let visit = &candidate.parts[3];
    if visit == MISSING {
        None
    } else {
        visit.parse().ok()
    }
}

/// Distinct boxes used by the matched specimen's participant family
/// (2-level bucket), excluding the matched specimen's own box.
fn family_boxes(
    candidates: &[Candidate],
    search_parts: &[String; 4],
    matched: &Candidate,
) -> Vec<RecordId> {
    let own_box = matched.box_record_id.as_ref();
    let mut boxes = Vec::new();
    for candidate in candidates {
        if candidate.parts[..2] != search_parts[..2] {
            continue;
        }
        let Some(box_id) = &candidate.box_record_id else {
            continue;
        };
        if Some(box_id) == own_box || boxes.contains(box_id) {
            continue;
        }
        boxes.push(box_id.clone());
    }
    boxes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FieldMap, RecordSet, SqliteEntityStore};

    const PATTERN: &str = r"(?<year>\d{4})-(?<participant_id>P\d{3})(?:-(?<sample_type>[a-z]{2}))?(?:-(?<visit>\d{2}))?(?:-(?<aliquot_number>\d{2}))?";

    const PROJECT: ProjectId = ProjectId::new(2);

    fn seeded_store(specimens: &[(&str, &str, &str)]) -> SqliteEntityStore {
        let store = SqliteEntityStore::in_memory().unwrap();
        let mut records = RecordSet::new();
        for (record, name, box_record) in specimens {
            let mut fields = FieldMap::new();
            fields.insert("record_id".into(), (*record).into());
            fields.insert("specimen_name".into(), (*name).into());
            if !box_record.is_empty() {
                fields.insert("box_record_id".into(), (*box_record).into());
            }
            records.insert(RecordId::parse(*record).unwrap(), fields);
        }
        store.save_records(PROJECT, &records).unwrap();
        store
    }

    fn prefill() -> MatchPrefillExtra {
        MatchPrefillExtra {
            enabled: true,
            groups: vec!["year".into(), "participant_id".into()],
            fields: vec!["sample_type".into(), "visit".into()],
        }
    }

    #[test]
    fn exact_match_wins() {
        let store = seeded_store(&[
            ("1", "2024-P001-bl-01-01", "10"),
            ("2", "2024-P001-bl-01-02", "10"),
        ]);
        let outcome = search(
            &store,
            PROJECT,
            PATTERN,
            Some(&prefill()),
            "2024-P001-bl-01-02",
        )
        .unwrap();
        assert_eq!(outcome.match_type, MatchType::Exact);
        assert_eq!(
            outcome.specimen_record_id,
            Some(RecordId::parse("2").unwrap())
        );
    }

    #[test]
    fn full_match_resolves_to_same_family_not_sibling_type() {
        let store = seeded_store(&[
            ("1", "2024-P001-bl-01-01", "10"),
            ("2", "2024-P001-sr-01-01", "11"),
        ]);
        // nonexistent aliquot: same 4-level bucket as the bl specimen
        let outcome = search(
            &store,
            PROJECT,
            PATTERN,
            Some(&prefill()),
            "2024-P001-bl-01-02",
        )
        .unwrap();
        assert_eq!(outcome.match_type, MatchType::Full);
        assert_eq!(
            outcome.specimen_record_id,
            Some(RecordId::parse("1").unwrap())
        );
    }

    #[test]
    fn participant_match_reports_max_visit() {
        let store = seeded_store(&[
            ("1", "2024-P001-bl-01-01", "10"),
            ("2", "2024-P001-bl-02-01", "10"),
            ("3", "2024-P001-sr-03-01", "11"),
            ("4", "2024-P002-bl-09-01", "12"),
        ]);
        // participant only: no sample_type or visit in the scan
        let outcome = search(&store, PROJECT, PATTERN, Some(&prefill()), "2024-P001").unwrap();
        assert_eq!(outcome.match_type, MatchType::Participant);
        // max visit across every P001 record, not just the matched type
        assert_eq!(outcome.max_visit, Some(3));
        assert!(outcome.specimen_record_id.is_some());
    }

    #[test]
    fn three_level_fallback_prefers_sample_type_bucket() {
        let store = seeded_store(&[
            ("1", "2024-P001-bl-01-01", "10"),
            ("2", "2024-P001-bl-02-01", "10"),
            ("3", "2024-P001-sr-05-01", "11"),
        ]);
        // sample type known, visit nonexistent
        let outcome = search(
            &store,
            PROJECT,
            PATTERN,
            Some(&prefill()),
            "2024-P001-bl-09",
        )
        .unwrap();
        assert_eq!(outcome.match_type, MatchType::Participant);
        assert_eq!(
            outcome.specimen_record_id,
            Some(RecordId::parse("1").unwrap())
        );
        // bucket is year/participant/sample_type: sr visits not counted
        assert_eq!(outcome.max_visit, Some(2));
    }

    #[test]
    fn no_candidates_is_none() {
        let store = seeded_store(&[("1", "2024-P001-bl-01-01", "10")]);
        let outcome = search(&store, PROJECT, PATTERN, Some(&prefill()), "2024-P099").unwrap();
        assert_eq!(outcome.match_type, MatchType::None);
        assert!(outcome.specimen_record_id.is_none());
        assert!(outcome.family_box_ids.is_empty());
    }

    #[test]
    fn disabled_prefill_degrades_to_exact_only() {
        let store = seeded_store(&[("1", "2024-P001-bl-01-01", "10")]);
        let outcome = search(&store, PROJECT, PATTERN, None, "2024-P001").unwrap();
        assert_eq!(outcome.match_type, MatchType::None);

        let outcome = search(&store, PROJECT, PATTERN, None, "2024-P001-bl-01-01").unwrap();
        assert_eq!(outcome.match_type, MatchType::Exact);
    }

    #[test]
    fn incomplete_prefill_config_warns_and_degrades() {
        let store = seeded_store(&[("1", "2024-P001-bl-01-01", "10")]);
        let incomplete = MatchPrefillExtra {
            enabled: true,
            groups: vec!["year".into()],
            fields: vec![],
        };
        let outcome = search(&store, PROJECT, PATTERN, Some(&incomplete), "2024-P001").unwrap();
        assert_eq!(outcome.match_type, MatchType::None);
        assert!(outcome.warnings.iter().any(|w| w.contains("ignored")));
    }

    #[test]
    fn family_boxes_exclude_own_box_and_duplicates() {
        let store = seeded_store(&[
            ("1", "2024-P001-bl-01-01", "10"),
            ("2", "2024-P001-bl-02-01", "11"),
            ("3", "2024-P001-sr-01-01", "11"),
            ("4", "2024-P001-sr-02-01", "12"),
            ("5", "2024-P002-bl-01-01", "13"),
        ]);
        let outcome = search(
            &store,
            PROJECT,
            PATTERN,
            Some(&prefill()),
            "2024-P001-bl-01-01",
        )
        .unwrap();
        assert_eq!(outcome.match_type, MatchType::Exact);
        let boxes: Vec<&str> = outcome
            .family_box_ids
            .iter()
            .map(|b| b.as_str())
            .collect();
        assert_eq!(boxes, ["11", "12"]);
    }
}
