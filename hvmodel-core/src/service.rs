//! Entry point tying the remote invoker to the resource collections.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::collection::{Collection, Scope};
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::invoker::{Params, RemoteInvoker, Reply};
use crate::models::{
    ClusterAttrs, DvdDriveAttrs, HardDriveAttrs, HostAttrs, NetworkAdapterAttrs,
    NetworkAdapterVlanAttrs, ServerAttrs, SwitchAttrs,
};

/// Directory of collections over one remote invoker.
///
/// Cheap to clone; every entity carries a handle to the service it came from
/// and resolves its relationships through it.
#[derive(Clone)]
pub struct Service {
    invoker: Arc<dyn RemoteInvoker>,
    config: Arc<ServiceConfig>,
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Service {
    pub fn new(invoker: Arc<dyn RemoteInvoker>, config: ServiceConfig) -> Self {
        Self {
            invoker,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Issues one remote operation.
    pub async fn invoke(&self, operation: &str, params: Params) -> Result<Reply> {
        debug!(operation, params = %params.describe(), "invoking remote operation");
        let result = self.invoker.invoke(operation, params).await;
        if let Err(e) = &result {
            warn!(operation, error = %e, "remote operation failed");
        }
        result
    }

    fn host_scope(&self) -> Scope {
        Scope::host(self.config.computer_name.clone())
    }

    pub fn servers(&self) -> Collection<ServerAttrs> {
        Collection::scoped(self.clone(), self.host_scope())
    }

    pub fn hosts(&self) -> Collection<HostAttrs> {
        Collection::scoped(self.clone(), self.host_scope())
    }

    pub fn clusters(&self) -> Collection<ClusterAttrs> {
        Collection::scoped(self.clone(), Scope::default())
    }

    pub fn switches(&self) -> Collection<SwitchAttrs> {
        Collection::scoped(self.clone(), self.host_scope())
    }

    pub fn network_adapters(&self) -> Collection<NetworkAdapterAttrs> {
        Collection::scoped(self.clone(), self.host_scope())
    }

    pub fn network_adapter_vlans(&self) -> Collection<NetworkAdapterVlanAttrs> {
        Collection::scoped(self.clone(), self.host_scope())
    }

    pub fn hard_drives(&self) -> Collection<HardDriveAttrs> {
        Collection::scoped(self.clone(), self.host_scope())
    }

    pub fn dvd_drives(&self) -> Collection<DvdDriveAttrs> {
        Collection::scoped(self.clone(), self.host_scope())
    }
}
