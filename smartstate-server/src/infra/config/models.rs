use std::{path::PathBuf, time::Duration};

use smartstate_core::{ScanSettings, VmCap};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3334;
pub const DEFAULT_EXTRACTION_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;
pub const DEFAULT_MAX_VMS_FILE: &str = "max_vms_to_scan.txt";
pub const DEFAULT_RESULTS_PATH: &str = "/tmp/smart-scan-results.json";
pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:8080";

/// Fully resolved runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub server: ServerConfig,
    pub scan: ScanConfig,
    pub inventory: InventoryConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// How long shutdown waits for a running scan to release its session.
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub extraction_timeout: Duration,
    pub max_vms: Option<usize>,
    pub max_vms_file: PathBuf,
    pub results_path: PathBuf,
}

impl ScanConfig {
    pub fn settings(&self) -> ScanSettings {
        ScanSettings {
            extraction_timeout: self.extraction_timeout,
            vm_cap: VmCap {
                file: Some(self.max_vms_file.clone()),
                fixed: self.max_vms,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryConfig {
    pub gateway_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
