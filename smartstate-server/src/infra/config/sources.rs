use serde::Deserialize;
use std::path::PathBuf;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub scan: FileScanConfig,
    #[serde(default)]
    pub inventory: FileInventoryConfig,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub shutdown_grace_secs: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileScanConfig {
    pub extraction_timeout_secs: Option<u64>,
    pub max_vms: Option<usize>,
    pub max_vms_file: Option<PathBuf>,
    pub results_path: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileInventoryConfig {
    pub gateway_url: Option<String>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub shutdown_grace_secs: Option<u64>,
    pub extraction_timeout_secs: Option<u64>,
    pub max_vms: Option<usize>,
    pub max_vms_file: Option<PathBuf>,
    pub results_path: Option<PathBuf>,
    pub gateway_url: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: non_empty_var("SMART_STATE_CONFIG").map(PathBuf::from),
            server_host: non_empty_var("SMART_STATE_SERVICE_HOST"),
            server_port: parse_var("SMART_STATE_SERVICE_PORT"),
            shutdown_grace_secs: parse_var("SMART_STATE_SHUTDOWN_GRACE_SEC"),
            extraction_timeout_secs: parse_var("SMART_STATE_SERVICE_TIMEOUT_SEC"),
            max_vms: parse_var("MAX_VMS_TO_SCAN"),
            max_vms_file: non_empty_var("SMART_STATE_MAX_VMS_FILE")
                .map(PathBuf::from),
            results_path: non_empty_var("SMART_STATE_RESULTS_PATH")
                .map(PathBuf::from),
            gateway_url: non_empty_var("SMART_STATE_GATEWAY_URL"),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = non_empty_var(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}
