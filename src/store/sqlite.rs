//! Sqlite-backed stand-in for the host's entity-attribute-value store.
//!
//! Schema: one row per (project, record, field), single-valued. A
//! `regexp(pattern, value)` scalar function backs the `REGEXP` operator
//! used by the raw-query path.

use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use crate::core::identity::{ProjectId, RecordId};

use super::{
    EntityStore, FieldMap, RecordSelection, RecordSet, Row, SaveOutcome, StoreError,
};

const BUSY_TIMEOUT_MS: u64 = 5_000;

pub struct SqliteEntityStore {
    conn: Connection,
}

impl SqliteEntityStore {
    /// Open an in-memory store (the default for tests and embedding).
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Open or create an on-disk store.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
        add_regexp_function(&conn)?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS record_data (
             project_id INTEGER NOT NULL,
             record     TEXT NOT NULL,
             field_name TEXT NOT NULL,
             value      TEXT NOT NULL,
             PRIMARY KEY (project_id, record, field_name)
         );
         CREATE INDEX IF NOT EXISTS idx_record_data_lookup
             ON record_data (project_id, field_name, value);
         CREATE TABLE IF NOT EXISTS record_id_pool (
             project_id  INTEGER PRIMARY KEY,
             next_record INTEGER NOT NULL
         );",
    )
}

/// `value REGEXP pattern` -> `regexp(pattern, value)`. The compiled
/// pattern is cached per statement via sqlite auxdata.
fn add_regexp_function(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        move |ctx| {
            let regex: Arc<Regex> = ctx.get_or_create_aux(0, |vr| -> Result<_, BoxError> {
                Ok(Regex::new(vr.as_str()?)?)
            })?;
            let value = ctx
                .get_raw(1)
                .as_str()
                .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
            Ok(regex.is_match(value))
        },
    )
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

fn placeholders(n: usize) -> String {
    let mut s = String::with_capacity(n * 2);
    for i in 0..n {
        if i > 0 {
            s.push(',');
        }
        s.push('?');
    }
    s
}

impl EntityStore for SqliteEntityStore {
    fn get_records(
        &self,
        project_id: ProjectId,
        selection: &RecordSelection,
    ) -> Result<RecordSet, StoreError> {
        let mut sql = String::from(
            "SELECT record, field_name, value FROM record_data WHERE project_id = ?",
        );
        let mut params: Vec<String> = vec![project_id.value().to_string()];

        if let Some(record_ids) = &selection.record_ids {
            if record_ids.is_empty() {
                return Ok(RecordSet::new());
            }
            sql.push_str(&format!(" AND record IN ({})", placeholders(record_ids.len())));
            params.extend(record_ids.iter().map(|r| r.as_str().to_string()));
        }
        if let Some(filter) = &selection.filter {
            sql.push_str(
                " AND record IN (SELECT record FROM record_data \
                 WHERE project_id = ? AND field_name = ? AND value = ?)",
            );
            params.push(project_id.value().to_string());
            params.push(filter.field.clone());
            params.push(filter.value.clone());
        }
        if let Some(fields) = &selection.fields {
            if fields.is_empty() {
                return Ok(RecordSet::new());
            }
            sql.push_str(&format!(" AND field_name IN ({})", placeholders(fields.len())));
            params.extend(fields.iter().cloned());
        }
        sql.push_str(" ORDER BY record, field_name");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        let mut result = RecordSet::new();
        while let Some(row) = rows.next()? {
            let record: String = row.get(0)?;
            let field_name: String = row.get(1)?;
            let value: String = row.get(2)?;
            let record_id = match RecordId::parse(record) {
                Ok(id) => id,
                // non-numeric records cannot come from this module; skip
                Err(_) => continue,
            };
            result
                .entry(record_id)
                .or_insert_with(FieldMap::new)
                .insert(field_name, value);
        }
        Ok(result)
    }

    fn save_records(
        &self,
        project_id: ProjectId,
        records: &RecordSet,
    ) -> Result<SaveOutcome, StoreError> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<(), StoreError> {
            for (record_id, fields) in records {
                for (field_name, value) in fields {
                    if value.is_empty() {
                        self.conn.execute(
                            "DELETE FROM record_data \
                             WHERE project_id = ?1 AND record = ?2 AND field_name = ?3",
                            params![project_id.value(), record_id.as_str(), field_name],
                        )?;
                    } else {
                        self.conn.execute(
                            "INSERT INTO record_data (project_id, record, field_name, value) \
                             VALUES (?1, ?2, ?3, ?4) \
                             ON CONFLICT(project_id, record, field_name) \
                             DO UPDATE SET value = excluded.value",
                            params![project_id.value(), record_id.as_str(), field_name, value],
                        )?;
                    }
                }
            }
            Ok(())
        })();
        match result {
            Ok(()) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(SaveOutcome::default())
            }
            Err(err) => {
                // no partial silent writes
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(err)
            }
        }
    }

    fn delete_record(
        &self,
        project_id: ProjectId,
        record_id: &RecordId,
    ) -> Result<bool, StoreError> {
        let deleted = self.conn.execute(
            "DELETE FROM record_data WHERE project_id = ?1 AND record = ?2",
            params![project_id.value(), record_id.as_str()],
        )?;
        Ok(deleted > 0)
    }

    fn reserve_record_id(&self, project_id: ProjectId) -> Result<RecordId, StoreError> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<RecordId, StoreError> {
            let pooled: Option<u64> = self
                .conn
                .query_row(
                    "SELECT next_record FROM record_id_pool WHERE project_id = ?1",
                    params![project_id.value()],
                    |row| row.get(0),
                )
                .optional()?;
            let max_existing: Option<u64> = self.conn.query_row(
                "SELECT MAX(CAST(record AS INTEGER)) FROM record_data WHERE project_id = ?1",
                params![project_id.value()],
                |row| row.get(0),
            )?;
            let next = pooled
                .unwrap_or(1)
                .max(max_existing.map(|m| m + 1).unwrap_or(1));
            self.conn.execute(
                "INSERT INTO record_id_pool (project_id, next_record) VALUES (?1, ?2) \
                 ON CONFLICT(project_id) DO UPDATE SET next_record = excluded.next_record",
                params![project_id.value(), next + 1],
            )?;
            Ok(RecordId::from_number(next))
        })();
        match result {
            Ok(id) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(id)
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(err)
            }
        }
    }

    fn run_query(&self, sql: &str, params: &[&str]) -> Result<Vec<Row>, StoreError> {
        if !sql.trim_start().to_ascii_uppercase().starts_with("SELECT") {
            return Err(StoreError::ReadOnlyQuery);
        }
        let mut stmt = self.conn.prepare(sql)?;
        let column_names: Vec<String> =
            stmt.column_names().iter().map(|s| s.to_string()).collect();
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut out = Row::new();
            for (i, name) in column_names.iter().enumerate() {
                let value: Option<String> = match row.get_ref(i)? {
                    rusqlite::types::ValueRef::Null => None,
                    rusqlite::types::ValueRef::Integer(v) => Some(v.to_string()),
                    rusqlite::types::ValueRef::Real(v) => Some(v.to_string()),
                    rusqlite::types::ValueRef::Text(t) => {
                        Some(String::from_utf8_lossy(t).into_owned())
                    }
                    rusqlite::types::ValueRef::Blob(_) => None,
                };
                out.insert(name.clone(), value);
            }
            result.push(out);
        }
        Ok(result)
    }
}
