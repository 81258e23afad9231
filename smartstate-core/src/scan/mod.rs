//! Per-job scan execution.

pub mod observer;
pub mod runner;
pub mod settings;

pub use observer::{NoopScanObserver, ScanObserver};
pub use runner::ScanRunner;
pub use settings::{ScanSettings, VmCap};
