mod common;

use std::{sync::Arc, time::Duration};

use axum::http::StatusCode;
use serde_json::{Value, json};
use smartstate_core::{
    Category, InventoryError, ScanSettings, VmCap,
    inventory::{FakeCategory, FakeVm, InMemoryInventory},
};
use smartstate_server::infra::scan::ScanLifecycleStatus;
use tokio::sync::Notify;

use common::{
    build_test_app, build_test_app_in, build_test_app_with, credentials_body,
    wait_for_status, wait_for_terminal,
};

const NO_RESULTS: &str =
    "No results available yet. The process may not have started or is still in progress.";

fn vm(name: &str) -> FakeVm {
    FakeVm::new(name, Some(format!("[ds1] {name}/{name}.vmx").as_str()))
}

#[tokio::test]
async fn results_are_pending_before_any_scan() {
    let app = build_test_app(InMemoryInventory::default());

    let response = app.server.get("/results").await;

    response.assert_status(StatusCode::ACCEPTED);
    assert_eq!(
        response.json::<Value>(),
        json!({ "status": "unknown", "message": NO_RESULTS })
    );
}

#[tokio::test]
async fn incomplete_credentials_are_rejected_without_starting() {
    let app = build_test_app(InMemoryInventory::new(vec![vm("web")]));

    let response = app
        .server
        .post("/init_scan")
        .json(&json!({ "server": "vc", "password": "pw" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body = response.json::<Value>();
    assert_eq!(body["status"], "error");
    assert!(body["details"].as_str().is_some_and(|d| d.contains("username")));

    let response = app
        .server
        .post("/init_scan")
        .json(&json!({ "server": "vc", "username": "", "password": "pw" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let snapshot = app.state.scan_control().snapshot().await;
    assert_eq!(snapshot.status, ScanLifecycleStatus::Idle);
    assert_eq!(app.inventory.sessions_opened(), 0);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = build_test_app(InMemoryInventory::default());

    let response = app.server.post("/init_scan").text("{not json").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["status"], "error");
    assert_eq!(
        app.state.scan_control().snapshot().await.status,
        ScanLifecycleStatus::Idle
    );
}

#[tokio::test]
async fn positional_array_body_is_rejected() {
    let app = build_test_app(InMemoryInventory::new(vec![vm("web")]));

    let response = app
        .server
        .post("/init_scan")
        .json(&json!(["vcenter.lab", "admin", "secret"]))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["status"], "error");
    assert_eq!(
        app.state.scan_control().snapshot().await.status,
        ScanLifecycleStatus::Idle
    );
    assert_eq!(app.inventory.sessions_opened(), 0);
}

#[tokio::test]
async fn body_is_parsed_regardless_of_content_type() {
    let app = build_test_app(InMemoryInventory::new(vec![vm("web")]));

    let response = app
        .server
        .post("/init_scan")
        .text(credentials_body().to_string())
        .await;

    response.assert_status_ok();
    wait_for_terminal(&app.state).await;
}

#[tokio::test]
async fn wrong_methods_get_json_405() {
    let app = build_test_app(InMemoryInventory::default());

    let response = app.server.get("/init_scan").await;
    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.json::<Value>()["status"], "error");

    let response = app.server.put("/results").await;
    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);

    let response = app.server.delete("/scan/status").await;
    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn unknown_paths_get_json_404() {
    let app = build_test_app(InMemoryInventory::default());

    let response = app.server.get("/nope").await;

    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["status"], "error");
}

#[tokio::test]
async fn full_scan_round_trip() {
    let inventory = InMemoryInventory::new(vec![
        vm("web-01"),
        vm("db-01").with_category(
            Category::Services,
            FakeCategory::Fail("guest filesystem not mounted".into()),
        ),
        vm("legacy").failing_open("vmdk locked"),
    ]);
    let app = build_test_app(inventory);

    let response = app.server.post("/init_scan").json(&credentials_body()).await;
    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>(),
        json!({ "status": "success", "message": "Scan initiated." })
    );

    let snapshot = wait_for_terminal(&app.state).await;
    assert_eq!(snapshot.status, ScanLifecycleStatus::Completed);

    let response = app.server.get("/results").await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    let records = body.as_array().expect("bare array");
    assert_eq!(records.len(), 3);

    assert_eq!(records[0]["vm_name"], "web-01");
    assert_eq!(records[0]["datastore_path"], "[ds1] web-01/web-01.vmx");
    let categories = records[0]["categories"].as_object().expect("categories");
    assert_eq!(
        categories.keys().map(String::as_str).collect::<Vec<_>>(),
        ["accounts", "services", "software", "system", "vmconfig"]
    );
    assert_eq!(
        categories["accounts"],
        json!({ "data": "<accounts vm=\"web-01\"/>" })
    );

    assert_eq!(
        records[1]["categories"]["services"]["error"]["kind"],
        "extraction_error"
    );
    assert!(
        records[1]["categories"]["system"]["data"].is_string(),
        "other categories unaffected"
    );

    assert_eq!(records[2]["vm_name"], "legacy");
    assert!(records[2]["error"].as_str().is_some_and(|e| e.contains("vmdk locked")));
    assert!(records[2].get("categories").is_none());

    let persisted: Value = serde_json::from_str(
        &std::fs::read_to_string(app.results_path()).expect("results file"),
    )
    .expect("results file is json");
    assert_eq!(persisted, body);

    let again = app.server.get("/results").await;
    again.assert_status_ok();
    assert_eq!(again.json::<Value>(), body);

    assert_eq!(app.inventory.sessions_opened(), 1);
    assert_eq!(app.inventory.sessions_closed(), 1);
}

#[tokio::test]
async fn second_request_while_running_conflicts() {
    let gate = Arc::new(Notify::new());
    let app = build_test_app(
        InMemoryInventory::new(vec![vm("web")]).with_enumeration_gate(Arc::clone(&gate)),
    );

    app.server
        .post("/init_scan")
        .json(&credentials_body())
        .await
        .assert_status_ok();
    wait_for_status(&app.state, ScanLifecycleStatus::Running).await;

    let response = app.server.post("/init_scan").json(&credentials_body()).await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["status"], "error");

    app.server
        .get("/results")
        .await
        .assert_status(StatusCode::ACCEPTED);

    gate.notify_one();
    assert_eq!(
        wait_for_terminal(&app.state).await.status,
        ScanLifecycleStatus::Completed
    );
    assert_eq!(app.inventory.sessions_opened(), 1);
}

#[tokio::test]
async fn racing_starts_admit_exactly_one() {
    let gate = Arc::new(Notify::new());
    let app = build_test_app(
        InMemoryInventory::new(vec![vm("web")]).with_enumeration_gate(Arc::clone(&gate)),
    );

    let (first, second) = tokio::join!(
        async { app.server.post("/init_scan").json(&credentials_body()).await },
        async { app.server.post("/init_scan").json(&credentials_body()).await },
    );

    let mut statuses = [first.status_code(), second.status_code()];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::CONFLICT]);

    gate.notify_one();
    wait_for_terminal(&app.state).await;
    assert_eq!(app.inventory.sessions_opened(), 1);
    let body = app.server.get("/results").await.json::<Value>();
    assert_eq!(body.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn slow_category_is_recorded_as_timeout() {
    let inventory = InMemoryInventory::new(vec![vm("web").with_category(
        Category::Software,
        FakeCategory::Delayed(Duration::from_secs(30), json!("<software/>")),
    )]);
    let settings = ScanSettings {
        extraction_timeout: Duration::from_millis(50),
        ..ScanSettings::default()
    };
    let app = build_test_app_with(inventory, settings);

    app.server
        .post("/init_scan")
        .json(&credentials_body())
        .await
        .assert_status_ok();
    wait_for_terminal(&app.state).await;

    let body = app.server.get("/results").await.json::<Value>();
    assert_eq!(body[0]["categories"]["software"]["error"]["kind"], "timeout");
    assert_eq!(
        body[0]["categories"]["software"]["error"]["message"],
        "extraction exceeded time budget"
    );
    assert!(body[0]["categories"]["system"]["data"].is_string());
}

#[tokio::test]
async fn vm_cap_limits_recorded_vms() {
    let inventory = InMemoryInventory::new(vec![
        vm("a"),
        FakeVm::new("template", Some("  ")),
        vm("b"),
        vm("c"),
        vm("d"),
    ]);
    let settings = ScanSettings {
        vm_cap: VmCap::fixed(2),
        ..ScanSettings::default()
    };
    let app = build_test_app_with(inventory, settings);

    app.server
        .post("/init_scan")
        .json(&credentials_body())
        .await
        .assert_status_ok();
    let snapshot = wait_for_terminal(&app.state).await;
    assert_eq!(snapshot.vms_planned, 2);
    assert_eq!(snapshot.vms_scanned, 2);

    let body = app.server.get("/results").await.json::<Value>();
    let names: Vec<_> = body
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|record| record["vm_name"].as_str())
        .collect();
    assert_eq!(names, ["a", "b"]);
}

#[tokio::test]
async fn cap_file_overrides_fixed_cap_on_each_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cap_file = dir.path().join("max_vms_to_scan.txt");
    std::fs::write(&cap_file, "1\n").expect("write cap");

    let settings = ScanSettings {
        vm_cap: VmCap::fixed(3).with_file(&cap_file),
        ..ScanSettings::default()
    };
    let app = build_test_app_in(
        dir,
        InMemoryInventory::new(vec![vm("a"), vm("b"), vm("c"), vm("d")]),
        settings,
    );

    app.server
        .post("/init_scan")
        .json(&credentials_body())
        .await
        .assert_status_ok();
    wait_for_terminal(&app.state).await;
    let body = app.server.get("/results").await.json::<Value>();
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    std::fs::write(&cap_file, "garbage").expect("rewrite cap");
    app.server
        .post("/init_scan")
        .json(&credentials_body())
        .await
        .assert_status_ok();
    wait_for_terminal(&app.state).await;
    let body = app.server.get("/results").await.json::<Value>();
    assert_eq!(body.as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn vms_without_datastore_path_are_excluded() {
    let app = build_test_app(InMemoryInventory::new(vec![
        FakeVm::new("template", None),
        vm("web"),
        FakeVm::new("blank", Some("")),
    ]));

    app.server
        .post("/init_scan")
        .json(&credentials_body())
        .await
        .assert_status_ok();
    wait_for_terminal(&app.state).await;

    let body = app.server.get("/results").await.json::<Value>();
    let records = body.as_array().expect("array");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["vm_name"], "web");
}

#[tokio::test]
async fn connection_failure_keeps_previous_results() {
    let healthy = build_test_app(InMemoryInventory::new(vec![vm("web")]));
    healthy
        .server
        .post("/init_scan")
        .json(&credentials_body())
        .await
        .assert_status_ok();
    wait_for_terminal(&healthy.state).await;
    let before = healthy.server.get("/results").await.json::<Value>();

    let broken = build_test_app_in(
        healthy.dir,
        InMemoryInventory::default()
            .failing_connect(InventoryError::Authentication("bad password".into())),
        ScanSettings::default(),
    );
    broken
        .server
        .post("/init_scan")
        .json(&credentials_body())
        .await
        .assert_status_ok();

    let snapshot = wait_for_terminal(&broken.state).await;
    assert_eq!(snapshot.status, ScanLifecycleStatus::Failed);
    assert!(snapshot.error.as_deref().is_some_and(|e| e.contains("bad password")));
    assert_eq!(broken.inventory.sessions_opened(), 0);

    let after = broken.server.get("/results").await;
    after.assert_status_ok();
    assert_eq!(after.json::<Value>(), before);
}

#[tokio::test]
async fn failed_first_scan_leaves_results_pending() {
    let app = build_test_app(
        InMemoryInventory::new(vec![vm("web")])
            .failing_enumeration(InventoryError::Protocol("inventory view expired".into())),
    );

    app.server
        .post("/init_scan")
        .json(&credentials_body())
        .await
        .assert_status_ok();
    let snapshot = wait_for_terminal(&app.state).await;

    assert_eq!(snapshot.status, ScanLifecycleStatus::Failed);
    assert_eq!(app.inventory.sessions_closed(), 1);
    app.server
        .get("/results")
        .await
        .assert_status(StatusCode::ACCEPTED);

    app.server
        .post("/init_scan")
        .json(&credentials_body())
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn unreadable_store_is_a_server_error() {
    let app = build_test_app(InMemoryInventory::default());
    std::fs::write(app.results_path(), "{ truncated").expect("corrupt store");

    let response = app.server.get("/results").await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.json::<Value>();
    assert_eq!(body["status"], "error");
    assert!(body["details"].is_string());
}

#[tokio::test]
async fn status_endpoint_tracks_the_lifecycle() {
    let gate = Arc::new(Notify::new());
    let app = build_test_app(
        InMemoryInventory::new(vec![vm("a"), vm("b")]).with_enumeration_gate(Arc::clone(&gate)),
    );

    let idle = app.server.get("/scan/status").await.json::<Value>();
    assert_eq!(idle["status"], "idle");
    assert!(idle["scan_id"].is_null());

    app.server
        .post("/init_scan")
        .json(&credentials_body())
        .await
        .assert_status_ok();
    wait_for_status(&app.state, ScanLifecycleStatus::Running).await;
    let running = app.server.get("/scan/status").await.json::<Value>();
    assert_eq!(running["status"], "running");
    assert!(running["scan_id"].is_string());
    assert!(running["finished_at"].is_null());

    gate.notify_one();
    wait_for_terminal(&app.state).await;
    let done = app.server.get("/scan/status").await.json::<Value>();
    assert_eq!(done["status"], "completed");
    assert_eq!(done["scan_id"], running["scan_id"]);
    assert_eq!(done["vms_planned"], 2);
    assert_eq!(done["vms_scanned"], 2);
    assert!(done["finished_at"].is_string());
    assert!(done["error"].is_null());
}

#[tokio::test]
async fn shutdown_refuses_new_scans() {
    let app = build_test_app(InMemoryInventory::new(vec![vm("web")]));
    app.state
        .scan_control()
        .shutdown(Duration::from_secs(1))
        .await;

    let response = app.server.post("/init_scan").json(&credentials_body()).await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json::<Value>()["status"], "error");
}
