pub mod handle_scan;

pub use handle_scan::{
    StartScanRequest, results_handler, scan_status_handler, start_scan_handler,
};
