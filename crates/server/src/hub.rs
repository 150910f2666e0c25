//! Broadcast hub — fan-out of lifecycle and message events to connected
//! operator consoles, scoped per tenant.
//!
//! Best-effort and at-most-once per connected listener. A console that
//! disconnects (or lags behind the channel buffer) misses events until it
//! reconnects and re-fetches the queue. The hub is never consulted for
//! correctness; the HTTP read path stays authoritative.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use switchboard_protocol::ConsoleEvent;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Default)]
pub struct Hub {
    channels: Arc<DashMap<String, broadcast::Sender<ConsoleEvent>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a console to its tenant's event stream.
    pub fn subscribe(&self, tenant_id: &str) -> broadcast::Receiver<ConsoleEvent> {
        self.channels
            .entry(tenant_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish an event to every console connected for the tenant.
    /// Sends to a tenant with no listeners are dropped silently.
    pub fn publish(&self, tenant_id: &str, event: ConsoleEvent) {
        if let Some(tx) = self.channels.get(tenant_id) {
            let delivered = tx.send(event).unwrap_or(0);
            debug!(
                component = "hub",
                event = "hub.published",
                tenant_id = tenant_id,
                listeners = delivered,
            );
        }
    }
}
