//! Device runtime handle
//!
//! Bundles the local registry and the remote network behind one cloneable
//! handle, passed to every process context.

use std::sync::Arc;

use tracing::trace;

use crate::bus::BusConnector;
use crate::error::TransportError;
use crate::registry::LocalRegistry;
use crate::remote::RemoteNetwork;
use crate::resolve::ComponentSource;

#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    address: String,
    registry: LocalRegistry,
    remotes: RemoteNetwork,
}

impl Runtime {
    /// Connect to this device's own broker and start serving requests
    pub fn new(address: &str, connector: Arc<dyn BusConnector>) -> Result<Self, TransportError> {
        let address = address.trim().to_lowercase();
        let bus = connector.connect(&address)?;

        let registry = LocalRegistry::new(bus);
        registry.serve_requests()?;

        Ok(Self {
            inner: Arc::new(RuntimeInner {
                address,
                registry,
                remotes: RemoteNetwork::new(connector),
            }),
        })
    }

    /// This device's bus address (lowercase)
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    pub fn registry(&self) -> &LocalRegistry {
        &self.inner.registry
    }

    pub fn remotes(&self) -> &RemoteNetwork {
        &self.inner.remotes
    }

    /// Source for an address. `None` and this device's own address are local.
    pub fn source(&self, address: Option<&str>) -> Result<Arc<dyn ComponentSource>, TransportError> {
        match address {
            Some(addr) if !addr.eq_ignore_ascii_case(&self.inner.address) => {
                let cache = self.inner.remotes.cache(addr)?;
                Ok(Arc::new(cache))
            }
            _ => Ok(Arc::new(self.inner.registry.clone())),
        }
    }

    /// Apply all pending bus traffic: remote definitions/values and
    /// front-end requests
    pub fn drain(&self) -> usize {
        let handled = self.inner.remotes.drain() + self.inner.registry.drain_requests();
        if handled > 0 {
            trace!(handled, "Drained bus traffic");
        }
        handled
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("address", &self.inner.address)
            .field("components", &self.inner.registry.len())
            .field("remotes", &self.inner.remotes.addresses())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BrokerNetwork;
    use kettle_types::{ComponentConfig, Value};

    #[test]
    fn test_own_address_is_local() {
        let network = Arc::new(BrokerNetwork::new());
        let runtime = Runtime::new("Still-1", network).unwrap();
        runtime
            .registry()
            .create_component(ComponentConfig::number("x"))
            .unwrap();

        let source = runtime.source(Some("STILL-1")).unwrap();
        assert!(source.lookup("x").is_some());
        assert!(runtime.remotes().addresses().is_empty());
    }

    #[test]
    fn test_two_devices_share_state() {
        let network = Arc::new(BrokerNetwork::new());
        let still = Runtime::new("still-1", network.clone()).unwrap();
        let panel = Runtime::new("panel", network).unwrap();

        let head = still
            .registry()
            .create_component(ComponentConfig::number("head_temp"))
            .unwrap();
        let source = panel.source(Some("still-1")).unwrap();
        let _ = source.resolve("head_temp");

        head.set(78.4).unwrap();
        panel.drain();
        assert_eq!(source.lookup("head_temp").unwrap().read(), Value::Number(78.4));
    }
}
