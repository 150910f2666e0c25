//! Application state

use std::sync::Arc;

use dashmap::DashMap;

use crate::hub::Hub;
use crate::lifecycle::Lifecycle;
use crate::responder::Responder;
use crate::store::{OperatorRow, Store};

/// Presence of one operator, maintained by the console WebSocket.
///
/// `load` mirrors the operator's count of active handoffs; it is seeded from
/// the database when the first console connects and adjusted by claim and
/// resolve. It is advisory (capacity signaling only) — assignment itself is
/// guarded by the store's conditional updates.
#[derive(Debug)]
pub struct OperatorPresence {
    pub tenant_id: String,
    pub display_name: String,
    pub max_active: i64,
    pub load: i64,
    pub connections: u32,
}

#[derive(Clone, Default)]
pub struct OperatorRegistry {
    inner: Arc<DashMap<String, OperatorPresence>>,
}

impl OperatorRegistry {
    /// Register a console connection for an operator.
    /// `active_load` is the database count at connect time.
    pub fn register(&self, operator: &OperatorRow, active_load: i64) {
        self.inner
            .entry(operator.id.clone())
            .and_modify(|p| p.connections += 1)
            .or_insert_with(|| OperatorPresence {
                tenant_id: operator.tenant_id.clone(),
                display_name: operator.display_name.clone(),
                max_active: operator.max_active,
                load: active_load,
                connections: 1,
            });
    }

    /// Drop one console connection; the operator leaves the registry when
    /// their last console disconnects.
    pub fn deregister(&self, operator_id: &str) {
        let remove = match self.inner.get_mut(operator_id) {
            Some(mut presence) => {
                presence.connections = presence.connections.saturating_sub(1);
                presence.connections == 0
            }
            None => false,
        };
        if remove {
            self.inner.remove(operator_id);
        }
    }

    /// Does any connected operator for this tenant have a spare slot?
    /// `false` is the after-hours signal at escalation time.
    pub fn has_capacity(&self, tenant_id: &str) -> bool {
        self.inner
            .iter()
            .any(|p| p.tenant_id == tenant_id && p.load < p.max_active)
    }

    pub fn increment_load(&self, operator_id: &str) {
        if let Some(mut presence) = self.inner.get_mut(operator_id) {
            presence.load += 1;
        }
    }

    pub fn decrement_load(&self, operator_id: &str) {
        if let Some(mut presence) = self.inner.get_mut(operator_id) {
            presence.load = (presence.load - 1).max(0);
        }
    }
}

/// Shared application state
pub struct AppState {
    pub store: Store,
    pub hub: Hub,
    pub operators: OperatorRegistry,
    pub lifecycle: Lifecycle,
    pub responder: Responder,
    /// Upper bound on the recent-turns window accepted at escalation
    pub max_context_turns: usize,
}

impl AppState {
    pub fn new(store: Store, responder: Responder, max_context_turns: usize) -> Arc<Self> {
        let hub = Hub::new();
        let operators = OperatorRegistry::default();
        let lifecycle = Lifecycle::new(store.clone(), hub.clone(), operators.clone());

        Arc::new(Self {
            store,
            hub,
            operators,
            lifecycle,
            responder,
            max_context_turns,
        })
    }
}
