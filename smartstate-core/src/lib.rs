//! # smartstate-core
//!
//! Building blocks for the smart-state scan service.
//!
//! - [`inventory`]: the capability contract the scanner needs from a VM
//!   introspection backend, plus the gateway adapter used in production.
//! - [`scan`]: the per-job runner that walks every VM and category under a
//!   per-category time budget.
//! - [`store`]: atomic on-disk persistence of the latest [`ScanResult`].
//! - [`types`]: the result document and credential types shared with the
//!   HTTP layer.

pub mod error;
pub mod inventory;
pub mod scan;
pub mod store;
pub mod types;

pub use error::{InventoryError, ScanError, StoreError};
pub use inventory::{InventoryConnector, InventorySession, VmDescriptor, VmHandle};
pub use scan::{NoopScanObserver, ScanObserver, ScanRunner, ScanSettings, VmCap};
pub use store::ResultStore;
pub use types::{
    Category, CategoryFailure, CategoryFailureKind, CategoryResult, Credentials,
    ScanResult, VmOutcome, VmRecord,
};
