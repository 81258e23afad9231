use std::{
    any::Any,
    collections::{BTreeMap, HashSet},
    fmt,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::Instant,
};

use futures::FutureExt;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::{NoopScanObserver, ScanObserver, ScanSettings};
use crate::{
    error::{Result, ScanError},
    inventory::{InventoryConnector, InventorySession, VmDescriptor, VmHandle},
    types::{Category, CategoryFailure, CategoryResult, Credentials, ScanResult, VmRecord},
};

/// Runs one scan job from session establishment to the aggregated result.
///
/// Category and VM failures end up in the returned [`ScanResult`]. Only
/// session establishment, enumeration and shutdown abort the job. The
/// session is closed on every path once it has been opened.
pub struct ScanRunner {
    connector: Arc<dyn InventoryConnector>,
    settings: ScanSettings,
    observer: Arc<dyn ScanObserver>,
    shutdown: CancellationToken,
}

impl fmt::Debug for ScanRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanRunner")
            .field("settings", &self.settings)
            .field("shutdown_cancelled", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ScanRunner {
    /// Runner with a no-op observer and a token that is never cancelled.
    pub fn new(connector: Arc<dyn InventoryConnector>, settings: ScanSettings) -> Self {
        Self {
            connector,
            settings,
            observer: Arc::new(NoopScanObserver),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ScanObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Cancelling `shutdown` makes [`run`](Self::run) stop before persisting
    /// and return [`ScanError::Interrupted`].
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Connects, scans every planned VM in enumeration order and returns the
    /// result. Credentials are dropped as soon as the session is open.
    #[instrument(skip_all, fields(server = %credentials.server()))]
    pub async fn run(&self, credentials: Credentials) -> Result<ScanResult> {
        let started = Instant::now();
        let cap = self.settings.vm_cap.resolve().await;

        let session = self
            .connector
            .connect(credentials)
            .await
            .map_err(ScanError::Connection)?;

        let outcome = AssertUnwindSafe(self.scan_session(session.as_ref(), cap))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let reason = panic_message(panic.as_ref());
                error!(%reason, "scan panicked; closing session");
                Err(ScanError::TaskFailed(format!("scan panicked: {reason}")))
            });

        if let Err(err) = session.close().await {
            warn!(error = %err, "failed to close inventory session");
        }

        if let Ok(result) = &outcome {
            info!(
                vms = result.len(),
                elapsed_secs = started.elapsed().as_secs_f64(),
                "scan finished"
            );
        }
        outcome
    }

    async fn scan_session(
        &self,
        session: &dyn InventorySession,
        cap: Option<usize>,
    ) -> Result<ScanResult> {
        let vms = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(ScanError::Interrupted),
            listed = session.list_vms() => listed.map_err(ScanError::Enumeration)?,
        };

        let planned = planned_count(&vms, cap);
        info!(enumerated = vms.len(), planned, cap = ?cap, "virtual machines enumerated");
        self.observer.vms_planned(planned);

        let mut records = Vec::with_capacity(planned);
        let mut seen = HashSet::new();

        for vm in &vms {
            if cap.is_some_and(|cap| records.len() >= cap) {
                debug!(cap = ?cap, "VM cap reached");
                break;
            }
            let Some(path) = vm.scannable_path() else {
                debug!(vm = %vm.name, "skipping VM without datastore path");
                continue;
            };
            if !seen.insert(vm.name.as_str()) {
                warn!(vm = %vm.name, "skipping duplicate VM name");
                continue;
            }

            info!(vm = %vm.name, "scanning VM {} of {}", records.len() + 1, planned);
            let record = self.scan_vm(session, vm, path).await?;
            self.observer.vm_scanned(&record);
            records.push(record);
        }

        Ok(ScanResult::new(records))
    }

    async fn scan_vm(
        &self,
        session: &dyn InventorySession,
        vm: &VmDescriptor,
        path: &str,
    ) -> Result<VmRecord> {
        let opened = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(ScanError::Interrupted),
            opened = session.open_vm(vm) => opened,
        };
        let handle = match opened {
            Ok(handle) => handle,
            Err(err) => {
                warn!(vm = %vm.name, error = %err, "failed to open VM");
                return Ok(VmRecord::failed(&vm.name, path, err.to_string()));
            }
        };

        let mut categories = BTreeMap::new();
        for category in Category::ALL {
            let result = self.extract(handle.as_ref(), &vm.name, category).await?;
            categories.insert(category, result);
        }
        Ok(VmRecord::scanned(&vm.name, path, categories))
    }

    async fn extract(
        &self,
        handle: &dyn VmHandle,
        vm_name: &str,
        category: Category,
    ) -> Result<CategoryResult> {
        let budget = self.settings.extraction_timeout;
        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(ScanError::Interrupted),
            outcome = tokio::time::timeout(budget, handle.extract(category)) => outcome,
        };

        Ok(match outcome {
            Ok(Ok(payload)) => CategoryResult::Data(payload),
            Ok(Err(err)) => {
                warn!(vm = vm_name, %category, error = %err, "extraction failed");
                CategoryResult::Error(CategoryFailure::extraction(err.to_string()))
            }
            Err(_) => {
                warn!(
                    vm = vm_name,
                    %category,
                    budget_secs = budget.as_secs_f64(),
                    "timed out while extracting"
                );
                CategoryResult::Error(CategoryFailure::timeout())
            }
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|msg| (*msg).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn planned_count(vms: &[VmDescriptor], cap: Option<usize>) -> usize {
    let mut names = HashSet::new();
    let eligible = vms
        .iter()
        .filter(|vm| vm.scannable_path().is_some())
        .filter(|vm| names.insert(vm.name.as_str()))
        .count();
    cap.map_or(eligible, |cap| eligible.min(cap))
}
