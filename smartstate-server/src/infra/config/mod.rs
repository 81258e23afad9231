pub mod loader;
pub mod models;
pub mod sources;

pub use loader::{
    ConfigLoad, ConfigLoadError, ConfigLoader, ConfigWarning, ConfigWarnings,
};
pub use models::{
    Config, ConfigMetadata, InventoryConfig, ScanConfig, ServerConfig,
};
pub use sources::{EnvConfig, FileConfig};
