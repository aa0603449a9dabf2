//! Publish/Subscribe Bus
//!
//! The runtime only needs three things from a bus transport: publish a payload
//! on a topic (optionally retained), subscribe to a topic pattern, and connect
//! to another device's broker by address. [`Bus`] and [`BusConnector`] are
//! those seams; [`LocalBroker`] / [`BrokerNetwork`] implement them in-process.
//!
//! Subscriptions are pull-based: the scheduler drains them on its own task so
//! component state is only ever touched from one place.

mod broker;
mod topic;

pub use broker::*;
pub use topic::*;

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::error::TransportError;

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// A message delivered by the bus
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: serde_json::Value,
    /// True when delivered from the broker's retained store
    pub retained: bool,
}

impl BusMessage {
    /// Parse the topic into a known shape
    pub fn parsed_topic(&self) -> Option<Topic> {
        Topic::parse(&self.topic)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport Seams
// ─────────────────────────────────────────────────────────────────────────────

/// One connection to one device's broker
pub trait Bus: Send + Sync {
    /// Address of the broker this connection talks to
    fn address(&self) -> &str;

    /// Publish a payload. Retained messages replace any previous retained
    /// payload on the same topic; a retained `null` clears it.
    fn publish(
        &self,
        topic: &str,
        payload: serde_json::Value,
        retain: bool,
    ) -> Result<(), TransportError>;

    /// Subscribe to a topic pattern. Matching retained messages are
    /// delivered first.
    fn subscribe(&self, pattern: &str) -> Result<Subscription, TransportError>;
}

/// Opens bus connections to device addresses
pub trait BusConnector: Send + Sync {
    fn connect(&self, address: &str) -> Result<Arc<dyn Bus>, TransportError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscription
// ─────────────────────────────────────────────────────────────────────────────

/// A live subscription to a topic pattern
pub struct Subscription {
    pattern: String,
    backlog: VecDeque<BusMessage>,
    rx: broadcast::Receiver<BusMessage>,
}

impl Subscription {
    pub fn new(
        pattern: impl Into<String>,
        backlog: Vec<BusMessage>,
        rx: broadcast::Receiver<BusMessage>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            backlog: backlog.into(),
            rx,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Take the next pending message without waiting
    pub fn try_next(&mut self) -> Option<BusMessage> {
        if let Some(msg) = self.backlog.pop_front() {
            return Some(msg);
        }

        loop {
            match self.rx.try_recv() {
                Ok(msg) => return Some(msg),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(pattern = %self.pattern, skipped, "Subscription lagged");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Wait for the next message. Returns `None` once the broker is gone.
    pub async fn next(&mut self) -> Option<BusMessage> {
        if let Some(msg) = self.backlog.pop_front() {
            return Some(msg);
        }

        loop {
            match self.rx.recv().await {
                Ok(msg) => return Some(msg),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(pattern = %self.pattern, skipped, "Subscription lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take every pending message
    pub fn drain(&mut self) -> Vec<BusMessage> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pattern", &self.pattern)
            .field("backlog", &self.backlog.len())
            .finish()
    }
}
