use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::topic::{topic_matches, valid_pattern};
use super::{Bus, BusConnector, BusMessage, Subscription};
use crate::error::TransportError;

/// Buffered messages per subscription pattern before receivers lag
const CHANNEL_CAPACITY: usize = 1024;

// ─────────────────────────────────────────────────────────────────────────────
// Local Broker
// ─────────────────────────────────────────────────────────────────────────────

/// In-process pub-sub broker for one device address
pub struct LocalBroker {
    address: String,

    /// Topic pattern -> broadcast channel
    channels: DashMap<String, broadcast::Sender<BusMessage>>,

    /// Topic -> last retained message
    retained: DashMap<String, BusMessage>,

    /// Statistics
    total_messages_published: AtomicU64,
    total_subscribers: AtomicUsize,
}

impl LocalBroker {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            channels: DashMap::new(),
            retained: DashMap::new(),
            total_messages_published: AtomicU64::new(0),
            total_subscribers: AtomicUsize::new(0),
        }
    }

    /// Retained payload currently stored for `topic`
    pub fn retained(&self, topic: &str) -> Option<serde_json::Value> {
        self.retained.get(topic).map(|m| m.payload.clone())
    }

    pub fn get_stats(&self) -> BrokerStats {
        BrokerStats {
            total_messages: self.total_messages_published.load(Ordering::Relaxed),
            total_subscribers: self.total_subscribers.load(Ordering::Relaxed),
            patterns_count: self.channels.len(),
            retained_count: self.retained.len(),
        }
    }
}

impl Bus for LocalBroker {
    fn address(&self) -> &str {
        &self.address
    }

    fn publish(
        &self,
        topic: &str,
        payload: serde_json::Value,
        retain: bool,
    ) -> Result<(), TransportError> {
        if topic.is_empty() || topic.contains('+') || topic.contains('#') {
            return Err(TransportError::InvalidTopic(topic.to_string()));
        }

        trace!(broker = %self.address, topic, retain, "Publishing");

        if retain {
            if payload.is_null() {
                self.retained.remove(topic);
            } else {
                self.retained.insert(
                    topic.to_string(),
                    BusMessage {
                        topic: topic.to_string(),
                        payload: payload.clone(),
                        retained: true,
                    },
                );
            }
        }

        let message = BusMessage {
            topic: topic.to_string(),
            payload,
            retained: false,
        };

        let mut notified = 0;
        for entry in self.channels.iter() {
            if topic_matches(topic, entry.key()) {
                // No receivers is fine
                if let Ok(n) = entry.value().send(message.clone()) {
                    notified += n;
                }
            }
        }

        self.total_messages_published.fetch_add(1, Ordering::Relaxed);
        trace!(broker = %self.address, topic, notified, "Published");

        Ok(())
    }

    fn subscribe(&self, pattern: &str) -> Result<Subscription, TransportError> {
        if !valid_pattern(pattern) {
            return Err(TransportError::InvalidPattern(pattern.to_string()));
        }

        let rx = self
            .channels
            .entry(pattern.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        let mut backlog: Vec<BusMessage> = self
            .retained
            .iter()
            .filter(|entry| topic_matches(entry.key(), pattern))
            .map(|entry| entry.value().clone())
            .collect();
        backlog.sort_by(|a, b| a.topic.cmp(&b.topic));

        self.total_subscribers.fetch_add(1, Ordering::Relaxed);
        debug!(
            broker = %self.address,
            pattern,
            retained = backlog.len(),
            "New subscription"
        );

        Ok(Subscription::new(pattern, backlog, rx))
    }
}

#[derive(Debug, Clone)]
pub struct BrokerStats {
    pub total_messages: u64,
    pub total_subscribers: usize,
    pub patterns_count: usize,
    pub retained_count: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Broker Network
// ─────────────────────────────────────────────────────────────────────────────

/// In-process set of brokers keyed by (lowercase) device address.
///
/// Connecting to an address that has no broker yet creates one, so devices
/// can be started in any order.
#[derive(Clone, Default)]
pub struct BrokerNetwork {
    brokers: Arc<DashMap<String, Arc<LocalBroker>>>,
}

impl BrokerNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the broker for an address
    pub fn broker(&self, address: &str) -> Arc<LocalBroker> {
        let key = address.trim().to_lowercase();
        self.brokers
            .entry(key.clone())
            .or_insert_with(|| Arc::new(LocalBroker::new(key)))
            .clone()
    }

    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.brokers.iter().map(|e| e.key().clone()).collect();
        addresses.sort();
        addresses
    }
}

impl BusConnector for BrokerNetwork {
    fn connect(&self, address: &str) -> Result<Arc<dyn Bus>, TransportError> {
        if address.trim().is_empty() {
            return Err(TransportError::Connect {
                address: address.to_string(),
                reason: "empty address".to_string(),
            });
        }
        let broker: Arc<dyn Bus> = self.broker(address);
        Ok(broker)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
