//! Capability contract for the VM introspection backend.
//!
//! The scanner never talks to a hypervisor directly. It opens a session
//! through an [`InventoryConnector`], lists VMs, opens each one and asks for
//! one [`Category`] at a time. Extraction futures must be cancel-safe: the
//! runner enforces its time budget by dropping them. A backend that blocks a
//! thread inside `extract` keeps running after the budget expires; only the
//! result is discarded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{error::InventoryError, types::Category, types::Credentials};

pub mod gateway;
#[cfg(any(test, feature = "demo"))]
pub mod memory;

pub use gateway::GatewayConnector;
#[cfg(any(test, feature = "demo"))]
pub use memory::{FakeCategory, FakeVm, InMemoryInventory};

/// A VM as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmDescriptor {
    pub name: String,
    #[serde(default)]
    pub datastore_path: Option<String>,
    /// Backend-specific metadata, passed through untouched.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
}

impl VmDescriptor {
    pub fn new(name: impl Into<String>, datastore_path: Option<&str>) -> Self {
        Self {
            name: name.into(),
            datastore_path: datastore_path.map(str::to_string),
            properties: Map::new(),
        }
    }

    /// Datastore path if the VM can be scanned at all. VMs without one are
    /// skipped, not reported.
    pub fn scannable_path(&self) -> Option<&str> {
        self.datastore_path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
    }
}

/// Entry point to a virtualization backend.
#[async_trait]
pub trait InventoryConnector: Send + Sync {
    /// Open a session. Credentials are consumed and dropped once the backend
    /// has answered.
    async fn connect(
        &self,
        credentials: Credentials,
    ) -> Result<Box<dyn InventorySession>, InventoryError>;
}

/// An authenticated connection. Owned by exactly one scan job.
#[async_trait]
pub trait InventorySession: Send + Sync {
    /// VMs in the backend's enumeration order.
    async fn list_vms(&self) -> Result<Vec<VmDescriptor>, InventoryError>;

    /// Open the per-VM extraction context.
    async fn open_vm(
        &self,
        vm: &VmDescriptor,
    ) -> Result<Box<dyn VmHandle>, InventoryError>;

    /// Release remote resources. Calling it more than once is a no-op.
    async fn close(&self) -> Result<(), InventoryError>;
}

/// An opened VM, valid while its session is open.
#[async_trait]
pub trait VmHandle: Send + Sync {
    /// Raw payload for one category.
    async fn extract(&self, category: Category) -> Result<Value, InventoryError>;
}
