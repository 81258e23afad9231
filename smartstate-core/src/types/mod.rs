//! Data carried through a scan: credentials in, per-VM records out.

pub mod credentials;
pub mod scan;

pub use credentials::Credentials;
pub use scan::{
    Category, CategoryFailure, CategoryFailureKind, CategoryResult, ScanResult,
    VmOutcome, VmRecord,
};
