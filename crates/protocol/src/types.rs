//! Core types shared across the protocol

use serde::{Deserialize, Serialize};

/// Lifecycle status of a handoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    Pending,
    Active,
    Resolved,
}

/// Who authored a ledger message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderOrigin {
    Customer,
    Operator,
    System,
}

/// Who authored an automated-phase turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    Customer,
    AutomatedAgent,
}

/// Display vocabulary for the assembled transcript.
///
/// Closed set: every sender origin from either store maps onto exactly one
/// of these, so a renderer that matches on it is exhaustive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptRole {
    Customer,
    AutomatedAgent,
    Operator,
    System,
}

/// Outcome of an escalation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationOutcome {
    /// Handoff is queued and an operator has spare capacity
    Pending,
    /// Handoff is queued but no operator is currently available;
    /// the widget should fall back to contact capture
    AfterHours,
}

/// One human-authored or system-authored utterance during a handoff.
///
/// Immutable once created. Ordering within a handoff is by `timestamp`
/// (unix milliseconds), ties broken by `sequence` (insertion order).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerMessage {
    pub id: String,
    pub handoff_id: String,
    pub origin: SenderOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<String>,
    pub body: String,
    pub timestamp: i64,
    pub sequence: i64,
}

/// One customer/automated-agent exchange outside of a handoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomatedTurn {
    pub conversation_id: String,
    pub role: TurnRole,
    pub body: String,
    pub timestamp: i64,
    pub sequence: i64,
}

/// One entry of the assembled transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: TranscriptRole,
    pub body: String,
    pub timestamp: i64,
    /// Present for ledger messages; used by the widget to seed its
    /// duplicate-suppression set on restore
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// A request to escalate one conversation to a human operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handoff {
    pub id: String,
    pub tenant_id: String,
    /// Nullable: a handoff may be requested before any automated turn exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub status: HandoffStatus,
    pub requested_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picked_up_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_message: Option<String>,
    /// Denormalized for queue display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_customer_message: Option<String>,
    /// Free-form context payload captured at request time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

/// Summary of a handoff for the operator queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub status: HandoffStatus,
    pub requested_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_customer_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
}

impl Handoff {
    pub fn summary(&self) -> HandoffSummary {
        HandoffSummary {
            id: self.id.clone(),
            conversation_id: self.conversation_id.clone(),
            status: self.status,
            requested_at: self.requested_at,
            operator_id: self.operator_id.clone(),
            last_customer_message: self.last_customer_message.clone(),
            contact_email: self.contact_email.clone(),
        }
    }
}
