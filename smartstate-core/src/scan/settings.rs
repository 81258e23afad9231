//! Tunables for a single scan job.

use std::{path::PathBuf, time::Duration};

use tracing::warn;

pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(20);

/// Upper bound on the number of VMs processed per scan.
///
/// A readable cap file wins over the fixed value. The file is re-read at the
/// start of every scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmCap {
    pub file: Option<PathBuf>,
    pub fixed: Option<usize>,
}

impl VmCap {
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Cap that applies when no readable cap file overrides it.
    pub fn fixed(cap: usize) -> Self {
        Self {
            file: None,
            fixed: Some(cap),
        }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// The cap in force for the next scan, `None` meaning unlimited.
    pub async fn resolve(&self) -> Option<usize> {
        if let Some(path) = &self.file {
            match tokio::fs::read_to_string(path).await {
                Ok(raw) => match raw.trim().parse::<usize>() {
                    Ok(cap) => return Some(cap),
                    Err(err) => warn!(
                        path = %path.display(),
                        error = %err,
                        "ignoring unparsable VM cap file"
                    ),
                },
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read VM cap file"
                ),
            }
        }
        self.fixed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    /// Budget for a single category extraction.
    pub extraction_timeout: Duration,
    pub vm_cap: VmCap,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            extraction_timeout: DEFAULT_EXTRACTION_TIMEOUT,
            vm_cap: VmCap::unlimited(),
        }
    }
}
