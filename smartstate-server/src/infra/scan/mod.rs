pub mod scan_manager;

pub use scan_manager::{
    ScanCommandAccepted, ScanControlError, ScanControlPlane,
    ScanLifecycleStatus, ScanSnapshot,
};
