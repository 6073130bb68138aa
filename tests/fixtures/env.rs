//! Shared test environment: a stand-in host with three linked projects
//! and a seeded sqlite store.

use serde_json::{json, Value};

use labtrack::core::fields::{Dictionary, DictionaryField};
use labtrack::handlers::{handle_request, Request, Response};
use labtrack::store::{EntityStore, FieldMap, RecordSet, Row, SaveOutcome, StoreError};
use labtrack::store::RecordSelection;
use labtrack::{ProjectId, RawSystemSettings, RecordId, SqliteEntityStore, StandInHost};

pub const BOX_PROJECT: ProjectId = ProjectId::new(101);
pub const SPECIMEN_PROJECT: ProjectId = ProjectId::new(102);
pub const SHIPMENT_PROJECT: ProjectId = ProjectId::new(103);

pub const SPECIMEN_PATTERN: &str = r"(?<year>\d{4})-(?<participant_id>P\d{3})(?:-(?<sample_type>[a-z]{2}))?(?:-(?<visit>\d{2}))?(?:-(?<aliquot_number>\d{2}))?";
pub const BOX_PATTERN: &str = r"BX-(?<box_number>\d{3})";

pub fn field(name: &str, form: &str, element_type: &str, label: &str) -> DictionaryField {
    DictionaryField {
        field_name: name.to_string(),
        form: form.to_string(),
        element_type: element_type.to_string(),
        label: label.to_string(),
        validation: None,
        required: false,
        choices: None,
    }
}

pub fn box_dictionary() -> Dictionary {
    let mut box_status = field("box_status", "box", "select", "Box Status");
    box_status.choices = Some("available, Available | closed, Closed".to_string());
    let mut box_type = field("box_type", "box", "select", "Box Type");
    box_type.choices = Some("standard, Standard | temporary, Temporary".to_string());
    let mut sample_type = field("sample_type", "box", "select", "Sample Type");
    sample_type.choices = Some("bl, Blood | sr, Serum".to_string());
    Dictionary::new(vec![
        field("record_id", "box", "text", "Record ID"),
        field("box_name", "box", "text", "Box Name"),
        box_status,
        box_type,
        sample_type,
        field("shipment_record_id", "box", "text", "Shipment Record ID"),
    ])
}

pub fn specimen_dictionary() -> Dictionary {
    let mut sample_type = field("sample_type", "specimen", "select", "Sample Type");
    sample_type.choices = Some("bl, Blood | sr, Serum".to_string());
    let mut collected = field("collected_datetime", "specimen", "text", "Collected");
    collected.validation = Some("datetime_mdy".to_string());
    Dictionary::new(vec![
        field("record_id", "specimen", "text", "Record ID"),
        field("specimen_name", "specimen", "text", "Specimen Name"),
        field("csid", "specimen", "text", "CSID"),
        field("cuid", "specimen", "text", "CUID"),
        sample_type,
        field("volume", "specimen", "text", "Volume"),
        field("comment", "specimen", "text", "Comment"),
        collected,
        field("box_record_id", "specimen", "text", "Box Record ID"),
        field("box_position", "specimen", "text", "Box Position"),
    ])
}

pub fn shipment_dictionary() -> Dictionary {
    let mut shipment_date = field("shipment_date", "shipment", "text", "Shipment Date");
    shipment_date.validation = Some("date_mdy".to_string());
    let mut sample_type = field("sample_type", "shipment", "select", "Sample Type");
    sample_type.choices = Some("bl, Blood | sr, Serum".to_string());
    let mut status = field("shipment_status", "shipment", "select", "Shipment Status");
    status.choices = Some("incomplete, Incomplete | complete, Complete".to_string());
    Dictionary::new(vec![
        field("record_id", "shipment", "text", "Record ID"),
        field("shipment_name", "shipment", "text", "Shipment Name"),
        shipment_date,
        sample_type,
        field("shipment_to", "shipment", "text", "Shipped To"),
        field("shipment_location", "shipment", "text", "Location"),
        field("shipment_tracking", "shipment", "text", "Tracking"),
        status,
    ])
}

pub fn system_settings() -> RawSystemSettings {
    RawSystemSettings {
        project_configs: vec![true],
        study_name: vec![Some("ATLAS".to_string())],
        box_project_id: vec![Some(BOX_PROJECT.value())],
        specimen_project_id: vec![Some(SPECIMEN_PROJECT.value())],
        shipment_project_id: vec![Some(SHIPMENT_PROJECT.value())],
        plate_size: vec![Some("9x9".to_string())],
        use_temp_box_type: vec![true],
        num_visits: vec![Some(6)],
        num_specimens: vec![Some(12)],
        default_volume: vec![Some("500".to_string())],
        datetime_format: vec![Some("mdy".to_string())],
        box_name_regex: vec![Some(BOX_PATTERN.to_string())],
        specimen_name_regex: vec![Some(SPECIMEN_PATTERN.to_string())],
        collected_to_processed_minutes_max: vec![None],
    }
}

pub fn module_config_json() -> Value {
    json!({
        "general": {
            "study_name": "ATLAS",
            "box_name_regex": BOX_PATTERN,
            "specimen_name_regex": SPECIMEN_PATTERN,
            "warning_ack_field": ""
        },
        "fields": {
            "box": {
                "box_name": { "shipment-manifest": true, "reporting-table": true }
            },
            "specimen": {
                "specimen_name": {
                    "shipment-manifest": true,
                    "reporting-table": true,
                    "extras": {
                        "matchPrefill": {
                            "enabled": true,
                            "groups": ["year", "participant_id"],
                            "fields": ["sample_type", "visit"]
                        }
                    }
                },
                "csid": { "shipment-manifest": true },
                "box_position": { "reporting-table": true }
            },
            "shipment": {
                "shipment_to": { "shipment-manifest": true, "reporting-table": true }
            }
        }
    })
}

pub struct TestEnv {
    pub host: StandInHost,
    pub store: SqliteEntityStore,
}

impl TestEnv {
    pub fn new() -> Self {
        let host = StandInHost::new()
            .with_system_settings(system_settings())
            .with_project(BOX_PROJECT, "ATLAS Boxes", box_dictionary())
            .with_project(SPECIMEN_PROJECT, "ATLAS Specimens", specimen_dictionary())
            .with_project(SHIPMENT_PROJECT, "ATLAS Shipments", shipment_dictionary())
            .with_module_enabled(BOX_PROJECT)
            .with_module_enabled(SPECIMEN_PROJECT)
            .with_module_enabled(SHIPMENT_PROJECT)
            .with_sample_type_unit("bl", "mL")
            .with_sample_type_unit("sr", "mL");
        use labtrack::host::HostMeta;
        host.set_project_setting(
            BOX_PROJECT,
            "module-config",
            module_config_json().to_string(),
        );
        let store = SqliteEntityStore::in_memory().expect("in-memory store");
        Self { host, store }
    }

    pub fn dispatch(&self, project_id: ProjectId, action: &str, params: Value) -> Response {
        handle_request(
            &self.host,
            &self.store,
            project_id,
            &Request::new(action, params),
        )
    }

    pub fn save(&self, project_id: ProjectId, record: &str, fields: &[(&str, &str)]) {
        let mut map = FieldMap::new();
        map.insert("record_id".to_string(), record.to_string());
        for (name, value) in fields {
            map.insert((*name).to_string(), (*value).to_string());
        }
        let mut records = RecordSet::new();
        records.insert(RecordId::parse(record).expect("record id"), map);
        let outcome = self
            .store
            .save_records(project_id, &records)
            .expect("seed save");
        assert!(outcome.ok(), "seed save failed: {:?}", outcome.errors);
    }

    pub fn seed_box(&self, record: &str, name: &str, status: &str, box_type: &str, sample_type: &str) {
        self.save(
            BOX_PROJECT,
            record,
            &[
                ("box_name", name),
                ("box_status", status),
                ("box_type", box_type),
                ("sample_type", sample_type),
            ],
        );
    }

    pub fn seed_specimen(&self, record: &str, name: &str, box_record: &str, position: &str) {
        self.save(
            SPECIMEN_PROJECT,
            record,
            &[
                ("specimen_name", name),
                ("box_record_id", box_record),
                ("box_position", position),
            ],
        );
    }

    pub fn field_value(&self, project_id: ProjectId, record: &str, field: &str) -> Option<String> {
        let records = self
            .store
            .get_records(
                project_id,
                &RecordSelection::record(RecordId::parse(record).expect("record id")),
            )
            .expect("get records");
        records
            .values()
            .next()
            .and_then(|fields| fields.get(field).cloned())
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Store wrapper that rejects saves to one project with a host-style
/// errors array, for exercising the compensating-write path.
pub struct FailingSaves<'a> {
    pub inner: &'a SqliteEntityStore,
    pub fail_project: ProjectId,
}

impl EntityStore for FailingSaves<'_> {
    fn get_records(
        &self,
        project_id: ProjectId,
        selection: &RecordSelection,
    ) -> Result<RecordSet, StoreError> {
        self.inner.get_records(project_id, selection)
    }

    fn save_records(
        &self,
        project_id: ProjectId,
        records: &RecordSet,
    ) -> Result<SaveOutcome, StoreError> {
        if project_id == self.fail_project {
            return Ok(SaveOutcome {
                errors: vec!["Simulated storage rejection".to_string()],
            });
        }
        self.inner.save_records(project_id, records)
    }

    fn delete_record(
        &self,
        project_id: ProjectId,
        record_id: &RecordId,
    ) -> Result<bool, StoreError> {
        self.inner.delete_record(project_id, record_id)
    }

    fn reserve_record_id(&self, project_id: ProjectId) -> Result<RecordId, StoreError> {
        self.inner.reserve_record_id(project_id)
    }

    fn run_query(&self, sql: &str, params: &[&str]) -> Result<Vec<Row>, StoreError> {
        self.inner.run_query(sql, params)
    }
}
