//! HTTP adapter for an introspection gateway.
//!
//! The gateway hosts the VM introspection library next to the hypervisor
//! management endpoint and exposes it over a small REST surface:
//!
//! | Call | Request |
//! |---|---|
//! | connect | `POST /sessions` with `{server, username, password}` |
//! | list VMs | `GET /sessions/{id}/vms` |
//! | open VM | `POST /sessions/{id}/vms` with `{name, datastore_path}` |
//! | extract | `GET /sessions/{id}/vms/{handle}/categories/{category}` |
//! | close | `DELETE /sessions/{id}` |

use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::{InventoryConnector, InventorySession, VmDescriptor, VmHandle};
use crate::{
    error::InventoryError,
    types::{Category, Credentials},
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct OpenSessionRequest<'a> {
    server: &'a str,
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct OpenSessionResponse {
    session_id: String,
}

#[derive(Serialize)]
struct OpenVmRequest<'a> {
    name: &'a str,
    datastore_path: Option<&'a str>,
}

#[derive(Deserialize)]
struct OpenVmResponse {
    handle: String,
}

/// [`InventoryConnector`] that talks to an introspection gateway over HTTP.
#[derive(Clone)]
pub struct GatewayConnector {
    client: Client,
    base: Url,
}

impl fmt::Debug for GatewayConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConnector")
            .field("base", &self.base_url())
            .finish_non_exhaustive()
    }
}

impl GatewayConnector {
    /// Builds a connector with its own HTTP client.
    pub fn new(base_url: &str) -> Result<Self, InventoryError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|err| InventoryError::Unreachable(err.to_string()))?;
        Self::with_client(client, base_url)
    }

    /// Builds a connector around an existing HTTP client.
    pub fn with_client(client: Client, base_url: &str) -> Result<Self, InventoryError> {
        let parsed = Url::parse(base_url).map_err(|err| {
            InventoryError::Protocol(format!("invalid gateway url {base_url}: {err}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(InventoryError::Protocol(format!(
                "unsupported gateway scheme: {}",
                parsed.scheme()
            )));
        }

        // Rules out `mailto:`-style urls so segment joins cannot fail later.
        if parsed.cannot_be_a_base() {
            return Err(InventoryError::Protocol(format!(
                "gateway url cannot carry a path: {base_url}"
            )));
        }

        Ok(Self {
            client,
            base: parsed,
        })
    }

    /// Gateway root without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }
}

/// Appends `segments` to `base`, percent-encoding each one so ids handed
/// back by the gateway can never add or climb path levels.
fn join_segments(base: &Url, segments: &[&str]) -> Result<Url, InventoryError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| InventoryError::Protocol(format!("gateway url cannot carry a path: {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[async_trait]
impl InventoryConnector for GatewayConnector {
    async fn connect(
        &self,
        credentials: Credentials,
    ) -> Result<Box<dyn InventorySession>, InventoryError> {
        let response = self
            .client
            .post(join_segments(&self.base, &["sessions"])?)
            .json(&OpenSessionRequest {
                server: credentials.server(),
                username: credentials.username(),
                password: credentials.password(),
            })
            .send()
            .await?;
        drop(credentials);

        let opened: OpenSessionResponse = decode(response).await?;
        debug!(session_id = %opened.session_id, "gateway session opened");

        Ok(Box::new(GatewaySession {
            client: self.client.clone(),
            session_url: join_segments(&self.base, &["sessions", opened.session_id.as_str()])?,
            closed: AtomicBool::new(false),
        }))
    }
}

struct GatewaySession {
    client: Client,
    session_url: Url,
    closed: AtomicBool,
}

impl GatewaySession {
    fn ensure_open(&self) -> Result<(), InventoryError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(InventoryError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl InventorySession for GatewaySession {
    async fn list_vms(&self) -> Result<Vec<VmDescriptor>, InventoryError> {
        self.ensure_open()?;
        let response = self
            .client
            .get(join_segments(&self.session_url, &["vms"])?)
            .send()
            .await?;
        decode(response).await
    }

    async fn open_vm(
        &self,
        vm: &VmDescriptor,
    ) -> Result<Box<dyn VmHandle>, InventoryError> {
        self.ensure_open()?;
        let response = self
            .client
            .post(join_segments(&self.session_url, &["vms"])?)
            .json(&OpenVmRequest {
                name: &vm.name,
                datastore_path: vm.scannable_path(),
            })
            .send()
            .await
            .map_err(|err| InventoryError::VmOpen(err.to_string()))?;

        let opened: OpenVmResponse = decode(response)
            .await
            .map_err(|err| InventoryError::VmOpen(err.to_string()))?;

        Ok(Box::new(GatewayVm {
            client: self.client.clone(),
            vm_url: join_segments(&self.session_url, &["vms", opened.handle.as_str()])?,
        }))
    }

    async fn close(&self) -> Result<(), InventoryError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let response = self.client.delete(self.session_url.clone()).send().await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                warn!(session = %self.session_url, "gateway session already gone");
                Ok(())
            }
            _ => Err(remote_error(response).await),
        }
    }
}

struct GatewayVm {
    client: Client,
    vm_url: Url,
}

#[async_trait]
impl VmHandle for GatewayVm {
    async fn extract(&self, category: Category) -> Result<Value, InventoryError> {
        let response = self
            .client
            .get(join_segments(&self.vm_url, &["categories", category.as_str()])?)
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, InventoryError> {
    if !response.status().is_success() {
        return Err(remote_error(response).await);
    }
    response
        .json::<T>()
        .await
        .map_err(|err| InventoryError::Protocol(err.to_string()))
}

async fn remote_error(response: Response) -> InventoryError {
    let status = response.status();
    let message = response
        .text()
        .await
        .ok()
        .filter(|body| !body.trim().is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            InventoryError::Authentication(message)
        }
        _ => InventoryError::Remote {
            status: status.as_u16(),
            message,
        },
    }
}
