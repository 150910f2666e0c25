//! Operator console WebSocket messages

use serde::{Deserialize, Serialize};

use crate::types::*;

/// Events pushed from the server to connected operator consoles.
///
/// Delivery is best-effort and at-most-once per connected listener; a
/// disconnected console misses events and must re-fetch state on reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConsoleEvent {
    /// Snapshot of the tenant's handoff queue (sent on connect and on request)
    HandoffQueue {
        handoffs: Vec<HandoffSummary>,
    },

    // Lifecycle
    HandoffAvailable {
        handoff: HandoffSummary,
    },
    HandoffClaimed {
        handoff_id: String,
        operator_id: String,
        operator_name: String,
    },
    HandoffResolved {
        handoff_id: String,
    },

    // Messages
    MessageAppended {
        handoff_id: String,
        message: LedgerMessage,
    },

    /// The console fell behind the broadcast buffer; it should re-fetch
    Lagged,

    Error {
        code: String,
        message: String,
    },
}

/// Commands sent from an operator console to the server.
///
/// The WebSocket is a notification channel; lifecycle actions (claim, send,
/// resolve) go through the HTTP API so the push path is never authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConsoleCommand {
    /// Re-fetch the handoff queue (used after a `Lagged` notice)
    ListHandoffs {
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<HandoffStatus>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_handoff_claimed() {
        let event = ConsoleEvent::HandoffClaimed {
            handoff_id: "h-1".to_string(),
            operator_id: "op-1".to_string(),
            operator_name: "Dana".to_string(),
        };

        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains("\"type\":\"handoff_claimed\""));

        let reparsed: ConsoleEvent = serde_json::from_str(&json).expect("deserialize");
        match reparsed {
            ConsoleEvent::HandoffClaimed {
                handoff_id,
                operator_name,
                ..
            } => {
                assert_eq!(handoff_id, "h-1");
                assert_eq!(operator_name, "Dana");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn list_handoffs_omits_missing_status() {
        let cmd = ConsoleCommand::ListHandoffs { status: None };
        let json = serde_json::to_string(&cmd).expect("serialize");
        assert_eq!(json, "{\"type\":\"list_handoffs\"}");
    }
}
