use std::{fmt, sync::Arc};

use crate::infra::scan::ScanControlPlane;

#[derive(Clone)]
pub struct AppState {
    pub scan_control: Arc<ScanControlPlane>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("scan_control", &self.scan_control)
            .finish()
    }
}

impl AppState {
    pub fn new(scan_control: Arc<ScanControlPlane>) -> Self {
        Self { scan_control }
    }

    pub fn scan_control(&self) -> &ScanControlPlane {
        &self.scan_control
    }
}
