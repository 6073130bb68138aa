//! Entity store adapter.
//!
//! The host platform stores every project record as rows of a generic
//! entity-attribute-value table (one row per project/record/field/value).
//! The core only talks to it through this narrow adapter: typed CRUD with
//! overwrite semantics plus a raw read-only query path that exists purely
//! for fast set-based lookups.

pub mod sqlite;

use std::collections::BTreeMap;

use indexmap::IndexMap;
use thiserror::Error;

use crate::core::identity::{ProjectId, RecordId};

pub use sqlite::SqliteEntityStore;

/// Name of the entity-attribute-value data table, for raw queries.
pub const DATA_TABLE: &str = "record_data";

/// One record's fields, in retrieval order.
pub type FieldMap = IndexMap<String, String>;

/// Records keyed by record id.
pub type RecordSet = BTreeMap<RecordId, FieldMap>;

/// One raw-query result row: column name -> value (null-aware).
pub type Row = IndexMap<String, Option<String>>;

/// Single-field equality filter (the host's filter-logic subset this
/// module actually uses, e.g. `[box_record_id] = 17`).
#[derive(Debug, Clone)]
pub struct FieldFilter {
    pub field: String,
    pub value: String,
}

/// What to fetch from `get_records`.
#[derive(Debug, Clone, Default)]
pub struct RecordSelection {
    pub record_ids: Option<Vec<RecordId>>,
    pub fields: Option<Vec<String>>,
    pub filter: Option<FieldFilter>,
}

impl RecordSelection {
    /// Everything in the project.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn records(record_ids: Vec<RecordId>) -> Self {
        Self {
            record_ids: Some(record_ids),
            ..Self::default()
        }
    }

    pub fn record(record_id: RecordId) -> Self {
        Self::records(vec![record_id])
    }

    pub fn filtered(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            filter: Some(FieldFilter {
                field: field.into(),
                value: value.into(),
            }),
            ..Self::default()
        }
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }
}

/// Result of a save attempt. Host-level validation failures surface
/// here; adapter-level failures are returned as `StoreError` instead.
/// There is never a partial silent write.
#[derive(Debug, Clone, Default)]
pub struct SaveOutcome {
    pub errors: Vec<String>,
}

impl SaveOutcome {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("raw queries must be read-only SELECT statements")]
    ReadOnlyQuery,
}

/// Narrow contract over the host's record storage.
pub trait EntityStore {
    /// Fetch records as field maps. Missing records are simply absent
    /// from the result.
    fn get_records(
        &self,
        project_id: ProjectId,
        selection: &RecordSelection,
    ) -> Result<RecordSet, StoreError>;

    /// Save records with overwrite semantics: every named field of each
    /// record is replaced; an empty value clears the stored one.
    fn save_records(
        &self,
        project_id: ProjectId,
        records: &RecordSet,
    ) -> Result<SaveOutcome, StoreError>;

    /// Delete a record entirely. Returns whether anything existed.
    fn delete_record(&self, project_id: ProjectId, record_id: &RecordId)
        -> Result<bool, StoreError>;

    /// Reserve the next unused record id for a project. Ids are numeric
    /// and never repeat within a store.
    fn reserve_record_id(&self, project_id: ProjectId) -> Result<RecordId, StoreError>;

    /// Raw read-only query against the entity-attribute-value table.
    /// Supports the `REGEXP` operator. Non-SELECT statements are
    /// rejected.
    fn run_query(&self, sql: &str, params: &[&str]) -> Result<Vec<Row>, StoreError>;
}
