//! Resolution bundles
//!
//! A [`Bundle`] is one consumer's set of declared requirements (by id or by
//! class, local or remote) together with the components satisfying them.
//! Requirements are never torn down; each id requirement resolves once, each
//! class requirement accumulates matches in arrival order.
//!
//! The scheduler polls a process's bundle before every step, so anything
//! resolved since the last tick is visible through [`Bundle::get`].

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::error::TryRecvError as MpscTryRecvError;
use tokio::sync::oneshot::error::TryRecvError as OneshotTryRecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::component::Component;
use crate::error::RegistryError;
use crate::resolve::{ComponentUri, Resolution};
use crate::runtime::Runtime;

/// Cloneable handle to one consumer's requirements
#[derive(Clone)]
pub struct Bundle {
    runtime: Runtime,
    inner: Arc<Mutex<BundleInner>>,
}

#[derive(Default)]
struct BundleInner {
    /// In declaration order
    entries: Vec<Entry>,
    /// Resolved since the last poll, in resolution order
    fresh: Vec<Component>,
}

impl BundleInner {
    fn entry(&self, key: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.key == key)
    }

    fn entry_mut(&mut self, key: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.key == key)
    }
}

struct Entry {
    key: String,
    pending: Pending,
    resolved: Vec<Component>,
    seen: HashSet<String>,
}

enum Pending {
    Id(oneshot::Receiver<Component>),
    Class(mpsc::UnboundedReceiver<Component>),
    /// Receiver lent to a [`Bundle::wait`] in progress
    Parked,
    Done,
}

impl Entry {
    fn new(key: String, pending: Pending) -> Self {
        Self {
            key,
            pending,
            resolved: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Record a match. Returns false for duplicates.
    fn record(&mut self, component: &Component) -> bool {
        if !self.seen.insert(component.id().to_string()) {
            return false;
        }
        self.resolved.push(component.clone());
        true
    }
}

fn class_key(class: &str, address: Option<&str>) -> String {
    match address {
        Some(address) => format!("class:{}@{}", class, address.to_lowercase()),
        None => format!("class:{}", class),
    }
}

impl Bundle {
    pub fn new(runtime: Runtime) -> Self {
        Self {
            runtime,
            inner: Arc::new(Mutex::new(BundleInner::default())),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Canonical key for a reference, treating this device's own address
    /// as local
    fn canonical(&self, reference: &str) -> Result<ComponentUri, RegistryError> {
        let mut uri = ComponentUri::parse(reference)?;
        if uri.address.as_deref() == Some(self.runtime.address()) {
            uri.address = None;
        }
        Ok(uri)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Declaring
    // ─────────────────────────────────────────────────────────────────────

    /// Declare a dependency on a component by reference. Idempotent.
    pub fn require(&self, reference: &str) -> Result<(), RegistryError> {
        let uri = self.canonical(reference)?;
        let key = uri.key();

        let mut inner = self.inner.lock();
        if inner.entry(&key).is_some() {
            return Ok(());
        }

        let source = self.runtime.source(uri.address.as_deref())?;
        let entry = match source.resolve(&uri.id) {
            Resolution::Ready(component) => {
                let mut entry = Entry::new(key.clone(), Pending::Done);
                entry.record(&component);
                inner.fresh.push(component);
                entry
            }
            Resolution::Pending(rx) => Entry::new(key.clone(), Pending::Id(rx)),
        };

        debug!(requirement = %key, "Declared requirement");
        inner.entries.push(entry);
        Ok(())
    }

    /// Declare a dependency on every component of `class` on a device
    /// (`None` for this one). Idempotent.
    pub fn require_class(&self, class: &str, address: Option<&str>) -> Result<(), RegistryError> {
        let address = address.filter(|a| !a.eq_ignore_ascii_case(self.runtime.address()));
        let key = class_key(class, address);

        let mut inner = self.inner.lock();
        if inner.entry(&key).is_some() {
            return Ok(());
        }

        let source = self.runtime.source(address)?;
        let rx = source.watch_class(class);

        debug!(requirement = %key, "Declared class requirement");
        inner.entries.push(Entry::new(key, Pending::Class(rx)));
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Resolving
    // ─────────────────────────────────────────────────────────────────────

    /// Collect everything resolved since the last poll
    pub fn poll(&self) -> Vec<Component> {
        let mut inner = self.inner.lock();
        let BundleInner { entries, fresh } = &mut *inner;

        for entry in entries.iter_mut() {
            let Entry {
                key,
                pending,
                resolved,
                seen,
            } = entry;
            let mut record = |component: Component| {
                if seen.insert(component.id().to_string()) {
                    resolved.push(component.clone());
                    fresh.push(component);
                }
            };

            match pending {
                Pending::Id(rx) => match rx.try_recv() {
                    Ok(component) => {
                        record(component);
                        *pending = Pending::Done;
                    }
                    Err(OneshotTryRecvError::Empty) => {}
                    Err(OneshotTryRecvError::Closed) => {
                        warn!(requirement = %key, "Resolution source dropped");
                        *pending = Pending::Done;
                    }
                },
                Pending::Class(rx) => loop {
                    match rx.try_recv() {
                        Ok(component) => record(component),
                        Err(MpscTryRecvError::Empty) => break,
                        Err(MpscTryRecvError::Disconnected) => {
                            *pending = Pending::Done;
                            break;
                        }
                    }
                },
                Pending::Parked | Pending::Done => {}
            }
        }

        std::mem::take(fresh)
    }

    /// Component satisfying an id requirement, if resolved
    pub fn get(&self, reference: &str) -> Option<Component> {
        let key = self.canonical(reference).ok()?.key();
        let inner = self.inner.lock();
        inner.entry(&key).and_then(|e| e.resolved.first().cloned())
    }

    /// Components matched by a class requirement so far, in arrival order
    pub fn class(&self, class: &str, address: Option<&str>) -> Vec<Component> {
        let address = address.filter(|a| !a.eq_ignore_ascii_case(self.runtime.address()));
        let key = class_key(class, address);
        let inner = self.inner.lock();
        inner
            .entry(&key)
            .map(|e| e.resolved.clone())
            .unwrap_or_default()
    }

    /// Require `reference` and wait until it resolves.
    ///
    /// Waits on the requirement's own receiver; if the wait is dropped the
    /// receiver goes back to the entry for [`poll`](Self::poll).
    pub async fn wait(&self, reference: &str) -> Result<Component, RegistryError> {
        self.require(reference)?;
        let key = self.canonical(reference)?.key();
        let unresolved = || RegistryError::InvalidReference(reference.to_string());

        let rx = {
            let mut inner = self.inner.lock();
            let entry = inner.entry_mut(&key).ok_or_else(unresolved)?;
            if let Some(component) = entry.resolved.first() {
                return Ok(component.clone());
            }
            match std::mem::replace(&mut entry.pending, Pending::Parked) {
                Pending::Id(rx) => Some(rx),
                Pending::Parked => None,
                other => {
                    entry.pending = other;
                    return Err(unresolved());
                }
            }
        };

        let Some(rx) = rx else {
            // Another wait holds the receiver
            let uri = self.canonical(reference)?;
            let resolution = self.runtime.source(uri.address.as_deref())?.resolve(&uri.id);
            return resolution.wait().await.ok_or_else(unresolved);
        };

        let mut parked = ParkedReceiver {
            bundle: self,
            key: key.clone(),
            rx: Some(rx),
        };
        let outcome = match parked.rx.as_mut() {
            Some(rx) => rx.await.ok(),
            None => None,
        };
        parked.rx = None;

        let mut inner = self.inner.lock();
        let BundleInner { entries, fresh } = &mut *inner;
        let entry = entries
            .iter_mut()
            .find(|e| e.key == key)
            .ok_or_else(unresolved)?;
        entry.pending = Pending::Done;

        let Some(component) = outcome else {
            warn!(requirement = %key, "Resolution source dropped");
            return Err(unresolved());
        };
        if entry.record(&component) {
            fresh.push(component.clone());
        }
        Ok(component)
    }

    /// Number of declared requirements
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

/// Returns a lent receiver to its entry when a wait is abandoned
struct ParkedReceiver<'a> {
    bundle: &'a Bundle,
    key: String,
    rx: Option<oneshot::Receiver<Component>>,
}

impl Drop for ParkedReceiver<'_> {
    fn drop(&mut self) {
        let Some(rx) = self.rx.take() else {
            return;
        };
        let mut inner = self.bundle.inner.lock();
        if let Some(entry) = inner.entry_mut(&self.key) {
            if matches!(entry.pending, Pending::Parked) {
                entry.pending = Pending::Id(rx);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
