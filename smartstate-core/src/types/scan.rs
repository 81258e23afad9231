use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classes of introspection data pulled from every VM.
///
/// Declaration order is the extraction order and the key order in the
/// persisted document.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Accounts,
    Services,
    Software,
    System,
    Vmconfig,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Accounts,
        Category::Services,
        Category::Software,
        Category::System,
        Category::Vmconfig,
    ];

    /// Key used in the persisted document and gateway paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Accounts => "accounts",
            Category::Services => "services",
            Category::Software => "software",
            Category::System => "system",
            Category::Vmconfig => "vmconfig",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == raw)
            .ok_or_else(|| format!("unknown category: {raw}"))
    }
}

/// Why a category has no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryFailureKind {
    Timeout,
    ExtractionError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFailure {
    pub kind: CategoryFailureKind,
    pub message: String,
}

impl CategoryFailure {
    pub const TIMEOUT_MESSAGE: &'static str = "extraction exceeded time budget";

    pub fn timeout() -> Self {
        Self {
            kind: CategoryFailureKind::Timeout,
            message: Self::TIMEOUT_MESSAGE.to_string(),
        }
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        Self {
            kind: CategoryFailureKind::ExtractionError,
            message: message.into(),
        }
    }
}

/// Outcome of one category for one VM. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryResult {
    Data(Value),
    Error(CategoryFailure),
}

impl CategoryResult {
    pub fn failure(&self) -> Option<&CategoryFailure> {
        match self {
            CategoryResult::Data(_) => None,
            CategoryResult::Error(failure) => Some(failure),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmOutcome {
    Categories(BTreeMap<Category, CategoryResult>),
    /// The per-VM extraction context could not be opened.
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmRecord {
    pub vm_name: String,
    pub datastore_path: String,
    #[serde(flatten)]
    pub outcome: VmOutcome,
}

impl VmRecord {
    /// Record for a VM whose categories were attempted.
    pub fn scanned(
        vm_name: impl Into<String>,
        datastore_path: impl Into<String>,
        categories: BTreeMap<Category, CategoryResult>,
    ) -> Self {
        Self {
            vm_name: vm_name.into(),
            datastore_path: datastore_path.into(),
            outcome: VmOutcome::Categories(categories),
        }
    }

    /// Record for a VM that could not be opened at all.
    pub fn failed(
        vm_name: impl Into<String>,
        datastore_path: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            vm_name: vm_name.into(),
            datastore_path: datastore_path.into(),
            outcome: VmOutcome::Error(error.into()),
        }
    }

    pub fn category(&self, category: Category) -> Option<&CategoryResult> {
        match &self.outcome {
            VmOutcome::Categories(map) => map.get(&category),
            VmOutcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            VmOutcome::Categories(_) => None,
            VmOutcome::Error(message) => Some(message),
        }
    }
}

/// Aggregate of one completed scan, persisted as a bare JSON array of
/// [`VmRecord`] in enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanResult {
    pub vms: Vec<VmRecord>,
}

impl ScanResult {
    pub fn new(vms: Vec<VmRecord>) -> Self {
        Self { vms }
    }

    pub fn len(&self) -> usize {
        self.vms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vms.is_empty()
    }

    /// First record with the given VM name.
    pub fn vm(&self, name: &str) -> Option<&VmRecord> {
        self.vms.iter().find(|record| record.vm_name == name)
    }
}
