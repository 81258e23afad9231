use crate::types::VmRecord;

/// Hooks invoked by [`ScanRunner`](super::ScanRunner) as a job advances.
///
/// Called inline from the scan task, so implementations must not block.
pub trait ScanObserver: Send + Sync {
    /// Enumeration finished; `planned` already accounts for the VM cap and
    /// unscannable VMs.
    fn vms_planned(&self, _planned: usize) {}

    /// A VM record is final, including VMs that failed to open.
    fn vm_scanned(&self, _record: &VmRecord) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScanObserver;

impl ScanObserver for NoopScanObserver {}
