//! Shipment lifecycle: dashboard, completion with compensating write,
//! box attachment, manifest export, and report assembly.

mod fixtures;

use serde_json::json;

use fixtures::env::{FailingSaves, TestEnv, BOX_PROJECT, SHIPMENT_PROJECT, SPECIMEN_PROJECT};
use labtrack::handlers::{manifest, RequestContext};
use labtrack::{handle_request, Request};

fn seed_shipment_world(env: &TestEnv) {
    env.save(
        SHIPMENT_PROJECT,
        "1",
        &[
            ("shipment_name", "SHIP-001"),
            ("shipment_date", "2024-03-07"),
            ("sample_type", "bl"),
            ("shipment_to", "Central Lab"),
            ("shipment_location", "Freezer 2"),
            ("shipment_tracking", "TRK123"),
            ("shipment_status", "incomplete"),
        ],
    );
    env.save(
        BOX_PROJECT,
        "10",
        &[
            ("box_name", "BX-001"),
            ("box_status", "available"),
            ("box_type", "standard"),
            ("sample_type", "bl"),
            ("shipment_record_id", "1"),
        ],
    );
    env.save(
        BOX_PROJECT,
        "11",
        &[
            ("box_name", "BX-002"),
            ("box_status", "available"),
            ("box_type", "standard"),
            ("sample_type", "bl"),
            ("shipment_record_id", "1"),
        ],
    );
    env.seed_specimen("1", "2024-P001-bl-01-01", "10", "A1");
    env.seed_specimen("2", "2024-P001-bl-01-02", "10", "A2");
    env.seed_specimen("3", "2024-P002-bl-01-01", "11", "A1");
    // a box outside the shipment must not leak into it
    env.save(
        BOX_PROJECT,
        "12",
        &[
            ("box_name", "BX-999"),
            ("box_status", "available"),
            ("box_type", "standard"),
            ("sample_type", "sr"),
        ],
    );
}

#[test]
fn shipment_dashboard_includes_boxes_and_display_details() {
    let env = TestEnv::new();
    seed_shipment_world(&env);

    let response = env.dispatch(
        SHIPMENT_PROJECT,
        "initialize-shipment-dashboard",
        json!({ "id": "1" }),
    );
    assert_eq!(response.status, 200);
    assert_eq!(response.body["errors"], json!([]));
    assert_eq!(
        response.body["shipment"]["shipment_name"],
        json!("SHIP-001")
    );
    // display values: select code resolved, date reformatted
    assert_eq!(
        response.body["shipment_details"]["sample_type"],
        json!("Blood")
    );
    assert_eq!(
        response.body["shipment_details"]["shipment_date"],
        json!("3/7/2024")
    );
    let boxes = response.body["boxes"].as_array().expect("boxes");
    assert_eq!(boxes.len(), 2);
    assert_eq!(boxes[0]["box_name"], json!("BX-001"));
    assert_eq!(boxes[0]["name_parsed"]["box_number"], json!("001"));
    assert_eq!(boxes[1]["box_name"], json!("BX-002"));
}

#[test]
fn search_shipments_lists_display_rows() {
    let env = TestEnv::new();
    seed_shipment_world(&env);
    let response = env.dispatch(SHIPMENT_PROJECT, "search-shipments", json!({}));
    assert_eq!(response.status, 200);
    let shipments = response.body["shipments"].as_array().unwrap();
    assert_eq!(shipments.len(), 1);
    assert_eq!(shipments[0]["shipment_status"], json!("Incomplete"));
    let fields = response.body["config"]["shipment_fields"].as_array().unwrap();
    assert!(fields.contains(&json!("shipment_to")));
}

#[test]
fn complete_shipment_closes_boxes() {
    let env = TestEnv::new();
    seed_shipment_world(&env);

    let response = env.dispatch(
        SHIPMENT_PROJECT,
        "complete-shipment",
        json!({ "shipment_record_id": "1" }),
    );
    assert_eq!(response.status, 200);
    assert_eq!(response.body["success"], json!(true));

    assert_eq!(
        env.field_value(SHIPMENT_PROJECT, "1", "shipment_status"),
        Some("complete".to_string())
    );
    assert_eq!(
        env.field_value(BOX_PROJECT, "10", "box_status"),
        Some("closed".to_string())
    );
    assert_eq!(
        env.field_value(BOX_PROJECT, "11", "box_status"),
        Some("closed".to_string())
    );
    // unrelated boxes stay open
    assert_eq!(
        env.field_value(BOX_PROJECT, "12", "box_status"),
        Some("available".to_string())
    );

    // completing again aborts on the status guard
    let response = env.dispatch(
        SHIPMENT_PROJECT,
        "complete-shipment",
        json!({ "shipment_record_id": "1" }),
    );
    assert_eq!(response.status, 400);
    assert!(response.body.as_str().unwrap().contains("already 'complete'"));
}

#[test]
fn failed_box_update_reverts_shipment_status() {
    let env = TestEnv::new();
    seed_shipment_world(&env);
    let failing = FailingSaves {
        inner: &env.store,
        fail_project: BOX_PROJECT,
    };

    let response = handle_request(
        &env.host,
        &failing,
        SHIPMENT_PROJECT,
        &Request::new("complete-shipment", json!({ "shipment_record_id": "1" })),
    );
    // the original box error is reported, not the revert's outcome
    assert_eq!(response.status, 400);
    assert_eq!(response.body, json!(["Simulated storage rejection"]));

    // compensating write restored the shipment status
    assert_eq!(
        env.field_value(SHIPMENT_PROJECT, "1", "shipment_status"),
        Some("incomplete".to_string())
    );
    assert_eq!(
        env.field_value(BOX_PROJECT, "10", "box_status"),
        Some("available".to_string())
    );
}

#[test]
fn update_box_shipment_attaches_and_detaches() {
    let env = TestEnv::new();
    seed_shipment_world(&env);

    let response = env.dispatch(
        SHIPMENT_PROJECT,
        "update-box-shipment",
        json!({ "box_record_id": "12", "shipment_record_id": "1" }),
    );
    assert_eq!(response.status, 200);
    assert_eq!(
        env.field_value(BOX_PROJECT, "12", "shipment_record_id"),
        Some("1".to_string())
    );

    // detach with an absent shipment id
    let response = env.dispatch(
        SHIPMENT_PROJECT,
        "update-box-shipment",
        json!({ "box_record_id": "12" }),
    );
    assert_eq!(response.status, 200);
    assert_eq!(env.field_value(BOX_PROJECT, "12", "shipment_record_id"), None);

    // guards
    let response = env.dispatch(
        SHIPMENT_PROJECT,
        "update-box-shipment",
        json!({ "box_record_id": "999" }),
    );
    assert_eq!(response.status, 400);
    assert!(response.body.as_str().unwrap().contains("No box exists"));

    let response = env.dispatch(
        SHIPMENT_PROJECT,
        "update-box-shipment",
        json!({ "box_record_id": "12", "shipment_record_id": "999" }),
    );
    assert_eq!(response.status, 400);
    assert!(response
        .body
        .as_str()
        .unwrap()
        .contains("No shipment exists"));
}

#[test]
fn manifest_orders_columns_and_rows() {
    let env = TestEnv::new();
    seed_shipment_world(&env);

    let mut ctx = RequestContext::new(&env.host, &env.store).expect("context");
    ctx.bind_project(SHIPMENT_PROJECT).expect("bind");
    let export = manifest::export_manifest(&ctx, Some("1")).expect("manifest");

    assert!(export.filename.starts_with("manifest-"));
    assert!(export.filename.ends_with(".csv"));

    let content = String::from_utf8(export.content).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    // preamble: study/shipping summary then a blank line
    assert_eq!(lines[0], "Study Name: ATLAS");
    assert_eq!(lines[1], "Shipped To: Central Lab");
    assert_eq!(lines[2], "Shipped Date: 3/7/2024");
    assert_eq!(lines[3], "Sample Type: Blood");

    // header: shipment fields with study_name injected second, then box,
    // then specimen fields in configured order
    let header_index = lines
        .iter()
        .position(|l| l.starts_with("shipment_to"))
        .expect("header row");
    assert_eq!(
        lines[header_index],
        "shipment_to,study_name,box_name,specimen_name,csid"
    );

    // one row per (box, specimen), boxes by name, specimens by position
    let rows: Vec<&str> = lines[header_index + 1..]
        .iter()
        .copied()
        .filter(|l| !l.is_empty())
        .collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], "Central Lab,ATLAS,BX-001,2024-P001-bl-01-01,");
    assert_eq!(rows[1], "Central Lab,ATLAS,BX-001,2024-P001-bl-01-02,");
    assert_eq!(rows[2], "Central Lab,ATLAS,BX-002,2024-P002-bl-01-01,");
}

#[test]
fn manifest_requires_a_valid_shipment() {
    let env = TestEnv::new();
    seed_shipment_world(&env);
    let mut ctx = RequestContext::new(&env.host, &env.store).expect("context");
    ctx.bind_project(SHIPMENT_PROJECT).expect("bind");

    let err = manifest::export_manifest(&ctx, None).unwrap_err();
    assert!(err
        .body
        .as_str()
        .unwrap()
        .contains("shipment_id is invalid or missing"));

    let err = manifest::export_manifest(&ctx, Some("404")).unwrap_err();
    assert!(err.body.as_str().unwrap().contains("no shipment exists"));
}

#[test]
fn report_rows_combine_all_three_projects() {
    let env = TestEnv::new();
    seed_shipment_world(&env);

    let response = env.dispatch(SPECIMEN_PROJECT, "get-report-data", json!({}));
    assert_eq!(response.status, 200);
    assert_eq!(response.body["errors"], json!([]));
    assert_eq!(response.body["config"]["study_name"], json!("ATLAS"));

    // fields follow the reporting-table flags from the module config
    assert_eq!(
        response.body["fields"]["shipment"],
        json!({ "shipment_to": "Shipped To" })
    );
    assert_eq!(
        response.body["fields"]["box"],
        json!({ "box_name": "Box Name" })
    );
    let data = response.body["data"].as_array().expect("report rows");
    assert_eq!(data.len(), 3);
    let first = &data[0];
    assert_eq!(first["shipment_to"], json!("Central Lab"));
    assert_eq!(first["box_name"], json!("BX-001"));
    assert_eq!(first["specimen_name"], json!("2024-P001-bl-01-01"));
    assert_eq!(first["box_position"], json!("A1"));
}
