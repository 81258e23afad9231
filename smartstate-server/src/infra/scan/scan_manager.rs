use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smartstate_core::{
    Credentials, InventoryConnector, ResultStore, ScanError, ScanObserver,
    ScanResult, ScanRunner, ScanSettings, StoreError, VmRecord,
};
use tokio::{
    spawn,
    sync::{Mutex, RwLock},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Command dispatcher + read model for the single scan slot.
///
/// At most one job runs at a time. The job state and the supervisor handle
/// are only swapped while the job write lock is held, so two concurrent
/// start requests can never both win.
#[derive(Clone)]
pub struct ScanControlPlane {
    inner: Arc<ScanControlPlaneInner>,
}

impl fmt::Debug for ScanControlPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.inner.job.try_read().ok().map(|job| job.status);

        f.debug_struct("ScanControlPlane")
            .field("status", &status)
            .field("store", &self.inner.store.path())
            .field("shutting_down", &self.inner.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

struct ScanControlPlaneInner {
    connector: Arc<dyn InventoryConnector>,
    store: ResultStore,
    settings: ScanSettings,
    job: RwLock<ScanJob>,
    progress: Arc<ScanProgress>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanLifecycleStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl ScanLifecycleStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Default)]
struct ScanJob {
    scan_id: Option<Uuid>,
    status: ScanLifecycleStatus,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl ScanJob {
    fn running(scan_id: Uuid) -> Self {
        Self {
            scan_id: Some(scan_id),
            status: ScanLifecycleStatus::Running,
            started_at: Some(Utc::now()),
            finished_at: None,
            error: None,
        }
    }
}

/// Live counters fed by the runner while a job is in flight.
#[derive(Debug, Default)]
struct ScanProgress {
    planned: AtomicUsize,
    scanned: AtomicUsize,
}

impl ScanProgress {
    fn reset(&self) {
        self.planned.store(0, Ordering::Relaxed);
        self.scanned.store(0, Ordering::Relaxed);
    }
}

impl ScanObserver for ScanProgress {
    fn vms_planned(&self, planned: usize) {
        self.planned.store(planned, Ordering::Relaxed);
    }

    fn vm_scanned(&self, _record: &VmRecord) {
        self.scanned.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanCommandAccepted {
    pub scan_id: Uuid,
    pub started_at: DateTime<Utc>,
}

/// Point-in-time view of the scan slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanSnapshot {
    pub scan_id: Option<Uuid>,
    pub status: ScanLifecycleStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub vms_planned: usize,
    pub vms_scanned: usize,
    pub error: Option<String>,
}

impl ScanControlPlane {
    pub fn new(
        connector: Arc<dyn InventoryConnector>,
        store: ResultStore,
        settings: ScanSettings,
    ) -> Self {
        Self {
            inner: Arc::new(ScanControlPlaneInner {
                connector,
                store,
                settings,
                job: RwLock::new(ScanJob::default()),
                progress: Arc::new(ScanProgress::default()),
                supervisor: Mutex::new(None),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Claims the scan slot and launches a job in the background.
    #[instrument(skip_all, fields(server = %credentials.server()))]
    pub async fn start_scan(
        &self,
        credentials: Credentials,
    ) -> Result<ScanCommandAccepted, ScanControlError> {
        let mut job = self.inner.job.write().await;

        if self.inner.shutdown.is_cancelled() {
            return Err(ScanControlError::ShuttingDown);
        }
        if job.status == ScanLifecycleStatus::Running {
            warn!(scan_id = ?job.scan_id, "rejecting scan request; a scan is already running");
            return Err(ScanControlError::AlreadyRunning {
                scan_id: job.scan_id,
            });
        }

        let scan_id = Uuid::now_v7();
        *job = ScanJob::running(scan_id);
        let started_at = job.started_at.unwrap_or_else(Utc::now);
        self.inner.progress.reset();

        let handle = spawn(supervise(
            Arc::clone(&self.inner),
            scan_id,
            credentials,
        ));
        *self.inner.supervisor.lock().await = Some(handle);
        drop(job);

        info!(%scan_id, "scan started");
        Ok(ScanCommandAccepted {
            scan_id,
            started_at,
        })
    }

    pub async fn snapshot(&self) -> ScanSnapshot {
        let job = self.inner.job.read().await;
        let has_run = job.scan_id.is_some();

        ScanSnapshot {
            scan_id: job.scan_id,
            status: job.status,
            started_at: job.started_at,
            finished_at: job.finished_at,
            vms_planned: if has_run {
                self.inner.progress.planned.load(Ordering::Relaxed)
            } else {
                0
            },
            vms_scanned: if has_run {
                self.inner.progress.scanned.load(Ordering::Relaxed)
            } else {
                0
            },
            error: job.error.clone(),
        }
    }

    /// Last persisted result, if any job has ever completed.
    pub async fn latest_result(&self) -> Result<Option<ScanResult>, StoreError> {
        self.inner.store.read().await
    }

    /// Refuses new jobs, interrupts the running one and waits up to `grace`
    /// for it to release its session.
    pub async fn shutdown(&self, grace: Duration) {
        {
            let _job = self.inner.job.write().await;
            self.inner.shutdown.cancel();
        }

        let Some(handle) = self.inner.supervisor.lock().await.take() else {
            return;
        };
        if handle.is_finished() {
            return;
        }

        info!(grace_secs = grace.as_secs(), "waiting for running scan to stop");
        match tokio::time::timeout(grace, handle).await {
            Ok(Ok(())) => info!("scan stopped"),
            Ok(Err(err)) => error!(error = %err, "scan supervisor failed during shutdown"),
            Err(_) => warn!("scan did not stop within the shutdown grace period"),
        }
    }
}

async fn supervise(
    inner: Arc<ScanControlPlaneInner>,
    scan_id: Uuid,
    credentials: Credentials,
) {
    let progress: Arc<dyn ScanObserver> = inner.progress.clone();
    let runner = ScanRunner::new(Arc::clone(&inner.connector), inner.settings.clone())
        .with_observer(progress)
        .with_shutdown(inner.shutdown.clone());

    let worker = spawn(async move { runner.run(credentials).await });
    let outcome = match worker.await {
        Ok(outcome) => outcome,
        Err(err) if err.is_panic() => {
            Err(ScanError::TaskFailed("scan task panicked".to_string()))
        }
        Err(err) => Err(ScanError::TaskFailed(err.to_string())),
    };

    let outcome = match outcome {
        Ok(result) => match inner.store.write(&result).await {
            Ok(()) => Ok(result.len()),
            Err(err) => Err(ScanError::from(err)),
        },
        Err(err) => Err(err),
    };

    let mut job = inner.job.write().await;
    if job.scan_id != Some(scan_id) {
        return;
    }
    job.finished_at = Some(Utc::now());
    match outcome {
        Ok(vms) => {
            job.status = ScanLifecycleStatus::Completed;
            info!(%scan_id, vms, "scan completed; results persisted");
        }
        Err(err) => {
            job.status = ScanLifecycleStatus::Failed;
            job.error = Some(err.to_string());
            error!(%scan_id, error = %err, "scan failed");
        }
    }
}

#[derive(Debug)]
pub enum ScanControlError {
    AlreadyRunning { scan_id: Option<Uuid> },
    ShuttingDown,
}

impl ScanControlError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ScanControlError::AlreadyRunning { .. } => StatusCode::CONFLICT,
            ScanControlError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ScanControlError::AlreadyRunning { .. } => {
                "A scan is already in progress.".into()
            }
            ScanControlError::ShuttingDown => {
                "The service is shutting down.".into()
            }
        }
    }
}

impl fmt::Display for ScanControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ScanControlError {}
