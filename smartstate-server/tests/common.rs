#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use axum_test::TestServer;
use serde_json::{Value, json};
use smartstate_core::{ResultStore, ScanSettings, inventory::InMemoryInventory};
use smartstate_server::{
    AppState, create_app,
    infra::scan::{ScanControlPlane, ScanLifecycleStatus, ScanSnapshot},
};
use tempfile::TempDir;

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub inventory: InMemoryInventory,
    pub dir: TempDir,
}

impl TestApp {
    pub fn results_path(&self) -> std::path::PathBuf {
        self.dir.path().join("smart-scan-results.json")
    }
}

pub fn build_test_app(inventory: InMemoryInventory) -> TestApp {
    build_test_app_with(inventory, ScanSettings::default())
}

pub fn build_test_app_with(inventory: InMemoryInventory, settings: ScanSettings) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    build_test_app_in(dir, inventory, settings)
}

/// Builds an app whose result store lives in `dir`, so a second app can
/// share the previous one's persisted results.
pub fn build_test_app_in(
    dir: TempDir,
    inventory: InMemoryInventory,
    settings: ScanSettings,
) -> TestApp {
    let store = ResultStore::new(dir.path().join("smart-scan-results.json"));
    let scan_control = Arc::new(ScanControlPlane::new(
        Arc::new(inventory.clone()),
        store,
        settings,
    ));
    let state = AppState::new(scan_control);
    let server = TestServer::new(create_app(state.clone())).expect("test server");

    TestApp {
        server,
        state,
        inventory,
        dir,
    }
}

pub fn credentials_body() -> Value {
    json!({
        "server": "vcenter.lab.local",
        "username": "administrator@vsphere.local",
        "password": "hunter2"
    })
}

/// Polls the scan slot until the current job reaches a terminal state.
pub async fn wait_for_terminal(state: &AppState) -> ScanSnapshot {
    for _ in 0..500 {
        let snapshot = state.scan_control().snapshot().await;
        if snapshot.status.is_terminal() {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("scan never reached a terminal state");
}

pub async fn wait_for_status(state: &AppState, status: ScanLifecycleStatus) {
    for _ in 0..500 {
        if state.scan_control().snapshot().await.status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("scan never reached {status:?}");
}
