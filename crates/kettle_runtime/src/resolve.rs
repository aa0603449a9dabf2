//! Component references and resolution
//!
//! A reference is either a bare id (local) or a URI naming the device that
//! owns the component. Both the local registry and remote caches implement
//! [`ComponentSource`], so bundles resolve either kind the same way.

use std::collections::HashMap;
use std::fmt;

use tokio::sync::{mpsc, oneshot};
use url::Url;

use crate::component::Component;
use crate::error::RegistryError;

// ─────────────────────────────────────────────────────────────────────────────
// Component URI
// ─────────────────────────────────────────────────────────────────────────────

/// Parsed component reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComponentUri {
    pub id: String,
    /// Owning device, `None` for local references. Always lowercase.
    pub address: Option<String>,
}

impl ComponentUri {
    pub fn local(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: None,
        }
    }

    pub fn remote(id: impl Into<String>, address: &str) -> Self {
        Self {
            id: id.into(),
            address: Some(address.to_lowercase()),
        }
    }

    /// Parse `id`, `/id`, `//host/id` or `scheme://host[:port]/id`
    pub fn parse(reference: &str) -> Result<Self, RegistryError> {
        let reference = reference.trim();
        let invalid = || RegistryError::InvalidReference(reference.to_string());

        if reference.is_empty() {
            return Err(invalid());
        }

        if !reference.contains("//") {
            let id = reference.strip_prefix('/').unwrap_or(reference);
            if id.is_empty() || id.contains('/') {
                return Err(invalid());
            }
            return Ok(Self::local(id));
        }

        let url = if reference.starts_with("//") {
            Url::parse(&format!("kettle:{}", reference))
        } else {
            Url::parse(reference)
        }
        .map_err(|_| invalid())?;

        let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
        let address = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let id = url.path().trim_matches('/');
        if id.is_empty() || id.contains('/') {
            return Err(invalid());
        }

        Ok(Self::remote(id, &address))
    }

    pub fn is_local(&self) -> bool {
        self.address.is_none()
    }

    /// Registry key: `id` locally, `id:address` for mirrors
    pub fn key(&self) -> String {
        match &self.address {
            Some(address) => remote_key(&self.id, address),
            None => self.id.clone(),
        }
    }
}

impl fmt::Display for ComponentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            Some(address) => write!(f, "kettle://{}/{}", address, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Registry key of the local mirror of a remote component
pub fn remote_key(id: &str, address: &str) -> String {
    format!("{}:{}", id, address.to_lowercase())
}

// ─────────────────────────────────────────────────────────────────────────────
// Sources
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of asking a source for a component
pub enum Resolution {
    /// Already known
    Ready(Component),
    /// Fires once, when the component appears
    Pending(oneshot::Receiver<Component>),
}

impl Resolution {
    /// Wait for the component. Returns `None` if the source went away.
    pub async fn wait(self) -> Option<Component> {
        match self {
            Resolution::Ready(component) => Some(component),
            Resolution::Pending(rx) => rx.await.ok(),
        }
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Ready(c) => f.debug_tuple("Ready").field(&c.id()).finish(),
            Resolution::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// Something components can be resolved from: the local registry or the
/// cache of one remote device
pub trait ComponentSource: Send + Sync {
    /// Component by id, if already known
    fn lookup(&self, id: &str) -> Option<Component>;

    /// Component by id, now or once it appears
    fn resolve(&self, id: &str) -> Resolution;

    /// Every component of `class`: those already known first, then new ones
    /// in arrival order
    fn watch_class(&self, class: &str) -> mpsc::UnboundedReceiver<Component>;
}

/// One-shot waiters keyed by id
pub(crate) type Waiters = HashMap<String, Vec<oneshot::Sender<Component>>>;

/// Register a waiter for `id`, first dropping every waiter whose receiver
/// is gone
pub(crate) fn add_waiter(waiters: &mut Waiters, id: &str) -> oneshot::Receiver<Component> {
    waiters.retain(|_, senders| {
        senders.retain(|tx| !tx.is_closed());
        !senders.is_empty()
    });

    let (tx, rx) = oneshot::channel();
    waiters.entry(id.to_string()).or_default().push(tx);
    rx
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
