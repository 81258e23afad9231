//! Scriptable in-memory inventory used by tests and demo mode.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Notify;

use super::{InventoryConnector, InventorySession, VmDescriptor, VmHandle};
use crate::{
    error::InventoryError,
    types::{Category, Credentials},
};

/// How a fake VM answers one category.
#[derive(Debug, Clone)]
pub enum FakeCategory {
    Payload(Value),
    Fail(String),
    /// Answer with the payload after sleeping.
    Delayed(Duration, Value),
    /// Panic inside the extraction call.
    Panic(String),
}

/// A VM served by [`InMemoryInventory`]. Categories without an explicit
/// answer return a small XML payload naming the VM.
#[derive(Debug, Clone)]
pub struct FakeVm {
    descriptor: VmDescriptor,
    open_error: Option<String>,
    categories: HashMap<Category, FakeCategory>,
}

impl FakeVm {
    pub fn new(name: &str, datastore_path: Option<&str>) -> Self {
        Self {
            descriptor: VmDescriptor::new(name, datastore_path),
            open_error: None,
            categories: HashMap::new(),
        }
    }

    pub fn with_category(mut self, category: Category, answer: FakeCategory) -> Self {
        self.categories.insert(category, answer);
        self
    }

    /// Make opening this VM fail.
    pub fn failing_open(mut self, message: impl Into<String>) -> Self {
        self.open_error = Some(message.into());
        self
    }

    fn answer(&self, category: Category) -> FakeCategory {
        self.categories.get(&category).cloned().unwrap_or_else(|| {
            FakeCategory::Payload(json!(format!(
                "<{category} vm=\"{}\"/>",
                self.descriptor.name
            )))
        })
    }
}

#[derive(Debug, Default)]
struct SessionCounters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Inventory backend held entirely in memory, with counters for opened and
/// closed sessions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventory {
    vms: Arc<Vec<FakeVm>>,
    connect_error: Option<InventoryError>,
    list_error: Option<InventoryError>,
    enumeration_gate: Option<Arc<Notify>>,
    counters: Arc<SessionCounters>,
}

impl InMemoryInventory {
    pub fn new(vms: Vec<FakeVm>) -> Self {
        Self {
            vms: Arc::new(vms),
            ..Self::default()
        }
    }

    /// A small mixed estate: healthy, partially failing, unscannable and
    /// unopenable VMs.
    pub fn demo() -> Self {
        Self::new(vec![
            FakeVm::new("web-01", Some("[datastore1] web-01/web-01.vmx")),
            FakeVm::new("db-01", Some("[datastore1] db-01/db-01.vmx")).with_category(
                Category::Services,
                FakeCategory::Fail("guest filesystem not mounted".into()),
            ),
            FakeVm::new("template-win2019", None),
            FakeVm::new("legacy-app", Some("[datastore2] legacy-app/legacy-app.vmx"))
                .failing_open("vmdk descriptor locked by another host"),
        ])
    }

    /// Make every `connect` fail with `error`.
    pub fn failing_connect(mut self, error: InventoryError) -> Self {
        self.connect_error = Some(error);
        self
    }

    pub fn failing_enumeration(mut self, error: InventoryError) -> Self {
        self.list_error = Some(error);
        self
    }

    /// Hold every enumeration until the gate is notified.
    pub fn with_enumeration_gate(mut self, gate: Arc<Notify>) -> Self {
        self.enumeration_gate = Some(gate);
        self
    }

    pub fn sessions_opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InventoryConnector for InMemoryInventory {
    async fn connect(
        &self,
        credentials: Credentials,
    ) -> Result<Box<dyn InventorySession>, InventoryError> {
        if let Some(err) = &self.connect_error {
            return Err(err.clone());
        }
        tracing::debug!(server = credentials.server(), "in-memory session opened");
        self.counters.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(InMemorySession {
            inventory: self.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct InMemorySession {
    inventory: InMemoryInventory,
    closed: AtomicBool,
}

#[async_trait]
impl InventorySession for InMemorySession {
    async fn list_vms(&self) -> Result<Vec<VmDescriptor>, InventoryError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(InventoryError::Closed);
        }
        if let Some(gate) = &self.inventory.enumeration_gate {
            gate.notified().await;
        }
        if let Some(err) = &self.inventory.list_error {
            return Err(err.clone());
        }
        Ok(self
            .inventory
            .vms
            .iter()
            .map(|vm| vm.descriptor.clone())
            .collect())
    }

    async fn open_vm(
        &self,
        vm: &VmDescriptor,
    ) -> Result<Box<dyn VmHandle>, InventoryError> {
        let fake = self
            .inventory
            .vms
            .iter()
            .find(|candidate| candidate.descriptor.name == vm.name)
            .ok_or_else(|| InventoryError::VmOpen(format!("unknown VM {}", vm.name)))?;

        if let Some(message) = &fake.open_error {
            return Err(InventoryError::VmOpen(message.clone()));
        }
        Ok(Box::new(InMemoryVm { vm: fake.clone() }))
    }

    async fn close(&self) -> Result<(), InventoryError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.inventory.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct InMemoryVm {
    vm: FakeVm,
}

#[async_trait]
impl VmHandle for InMemoryVm {
    async fn extract(&self, category: Category) -> Result<Value, InventoryError> {
        match self.vm.answer(category) {
            FakeCategory::Payload(value) => Ok(value),
            FakeCategory::Fail(message) => Err(InventoryError::Extraction(message)),
            FakeCategory::Delayed(delay, value) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            FakeCategory::Panic(message) => panic!("{message}"),
        }
    }
}
