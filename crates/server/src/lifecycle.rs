//! Handoff lifecycle manager.
//!
//! Single writer of handoff status. Transition legality is a pure,
//! synchronous function (no IO, no async, no locking — fully unit-testable);
//! the effectful manager around it persists through the store's conditional
//! updates, keeps the operator load counters current, and publishes hub
//! events.
//!
//! `none → pending → active → resolved`; resolution is terminal. A new
//! escalation after resolution creates a new handoff.

use thiserror::Error;
use tracing::{info, warn};

use switchboard_protocol::{
    new_id, ConsoleEvent, EscalateRequest, EscalationOutcome, Handoff, HandoffStatus,
    LedgerMessage, SenderOrigin,
};

use crate::hub::Hub;
use crate::state::OperatorRegistry;
use crate::store::{now_millis, OperatorRow, Store, StoreError, TenantRow};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("handoff not found")]
    NotFound,

    /// Claim attempted on a handoff that is not (or no longer) `pending`
    #[error("handoff is not available")]
    NotAvailable,

    /// Send or resolve against a handoff not in the required state
    #[error("handoff is not in the expected state")]
    NotActive,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Pure transition legality
// ---------------------------------------------------------------------------

/// An action attempted against a handoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffAction {
    /// Operator claims a pending handoff
    Claim,
    /// Assigned operator resolves their active handoff
    OperatorResolve,
    /// Customer ends the conversation (pending or active)
    CustomerResolve,
    /// Either party sends a ledger message
    Send,
}

/// Decide whether `action` is legal in `status`, and what status results.
///
/// Rejections are never retried here; the caller decides whether to
/// refresh and retry.
pub fn transition(
    status: HandoffStatus,
    action: HandoffAction,
) -> Result<HandoffStatus, LifecycleError> {
    use HandoffAction::*;
    use HandoffStatus::*;

    match (status, action) {
        (Pending, Claim) => Ok(Active),
        (Active | Resolved, Claim) => Err(LifecycleError::NotAvailable),

        (Active, OperatorResolve) => Ok(Resolved),
        (Pending | Resolved, OperatorResolve) => Err(LifecycleError::NotActive),

        (Pending | Active, CustomerResolve) => Ok(Resolved),
        (Resolved, CustomerResolve) => Err(LifecycleError::NotActive),

        (Active, Send) => Ok(Active),
        (Pending | Resolved, Send) => Err(LifecycleError::NotActive),
    }
}

// ---------------------------------------------------------------------------
// Effectful manager
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Lifecycle {
    store: Store,
    hub: Hub,
    operators: OperatorRegistry,
}

impl Lifecycle {
    pub fn new(store: Store, hub: Hub, operators: OperatorRegistry) -> Self {
        Self {
            store,
            hub,
            operators,
        }
    }

    /// Customer escalation: create a `pending` handoff (or return the
    /// conversation's existing open one) and report operator capacity.
    ///
    /// `after_hours` is not a distinct persisted state, only a signal on
    /// this response so the widget can fall back to contact capture.
    pub async fn escalate(
        &self,
        tenant: &TenantRow,
        request: EscalateRequest,
    ) -> Result<(Handoff, EscalationOutcome), LifecycleError> {
        if let Some(conversation_id) = &request.conversation_id {
            match self
                .store
                .conversation_tenant(conversation_id.clone())
                .await?
            {
                Some(owner) if owner == tenant.id => {}
                _ => return Err(LifecycleError::NotFound),
            }
        }

        let context = if request.recent_turns.is_empty() {
            None
        } else {
            serde_json::to_value(&request.recent_turns).ok()
        };

        let handoff = Handoff {
            id: new_id(),
            tenant_id: tenant.id.clone(),
            conversation_id: request.conversation_id.clone(),
            status: HandoffStatus::Pending,
            requested_at: now_millis(),
            picked_up_at: None,
            resolved_at: None,
            operator_id: None,
            contact_email: request.contact_email.clone(),
            contact_message: None,
            last_customer_message: request.last_customer_message.clone(),
            context,
        };

        let (handoff, created) = self.store.create_or_reuse_handoff(handoff).await?;

        if created {
            self.append_system(&handoff.id, "Customer requested a human operator")
                .await;
            self.hub.publish(
                &tenant.id,
                ConsoleEvent::HandoffAvailable {
                    handoff: handoff.summary(),
                },
            );
            info!(
                component = "lifecycle",
                event = "handoff.requested",
                handoff_id = %handoff.id,
                tenant_id = %tenant.id,
                "Handoff requested"
            );
        }

        let outcome = if self.operators.has_capacity(&tenant.id) {
            EscalationOutcome::Pending
        } else {
            EscalationOutcome::AfterHours
        };

        Ok((handoff, outcome))
    }

    /// Operator claim. At most one operator wins for a given handoff: the
    /// store update is conditional on `status = 'pending'`, so a losing
    /// concurrent claim observes the precondition failure and gets
    /// `NotAvailable` instead of overwriting the winner's assignment.
    pub async fn claim(
        &self,
        operator: &OperatorRow,
        handoff_id: &str,
    ) -> Result<Handoff, LifecycleError> {
        let handoff = self.load_for_tenant(handoff_id, &operator.tenant_id).await?;
        transition(handoff.status, HandoffAction::Claim)?;

        let won = self
            .store
            .claim_handoff(handoff.id.clone(), operator.id.clone())
            .await?;
        if !won {
            // Lost the race between our read and the conditional update
            return Err(LifecycleError::NotAvailable);
        }

        self.operators.increment_load(&operator.id);
        self.append_system(
            &handoff.id,
            &format!("{} joined the conversation", operator.display_name),
        )
        .await;
        self.hub.publish(
            &operator.tenant_id,
            ConsoleEvent::HandoffClaimed {
                handoff_id: handoff.id.clone(),
                operator_id: operator.id.clone(),
                operator_name: operator.display_name.clone(),
            },
        );
        info!(
            component = "lifecycle",
            event = "handoff.claimed",
            handoff_id = %handoff.id,
            operator_id = %operator.id,
            "Handoff claimed"
        );

        self.reload(&handoff.id).await
    }

    /// Resolve by the assigned operator.
    pub async fn resolve_by_operator(
        &self,
        operator: &OperatorRow,
        handoff_id: &str,
    ) -> Result<Handoff, LifecycleError> {
        let handoff = self.load_for_tenant(handoff_id, &operator.tenant_id).await?;
        transition(handoff.status, HandoffAction::OperatorResolve)?;
        if handoff.operator_id.as_deref() != Some(operator.id.as_str()) {
            return Err(LifecycleError::Forbidden(
                "only the assigned operator may resolve this handoff",
            ));
        }

        let resolved = self
            .store
            .resolve_handoff(handoff.id.clone(), Some(operator.id.clone()))
            .await?;
        if !resolved {
            return Err(LifecycleError::NotActive);
        }

        self.finish_resolution(&handoff, Some(&operator.id)).await;
        self.reload(&handoff.id).await
    }

    /// Resolve by the conversation's own customer (tenant credential).
    /// Also legal on a still-pending handoff the customer abandons.
    pub async fn resolve_by_customer(
        &self,
        tenant: &TenantRow,
        handoff_id: &str,
    ) -> Result<Handoff, LifecycleError> {
        let handoff = self.load_for_tenant(handoff_id, &tenant.id).await?;
        transition(handoff.status, HandoffAction::CustomerResolve)?;

        let resolved = self.store.resolve_handoff(handoff.id.clone(), None).await?;
        if !resolved {
            return Err(LifecycleError::NotActive);
        }

        self.finish_resolution(&handoff, handoff.operator_id.as_deref())
            .await;
        self.reload(&handoff.id).await
    }

    /// Customer send; only valid while the handoff is `active`.
    pub async fn send_customer(
        &self,
        tenant: &TenantRow,
        handoff_id: &str,
        body: String,
    ) -> Result<LedgerMessage, LifecycleError> {
        let handoff = self.load_for_tenant(handoff_id, &tenant.id).await?;
        transition(handoff.status, HandoffAction::Send)?;

        let message = self
            .store
            .append_message(handoff.id.clone(), SenderOrigin::Customer, None, body)
            .await?;
        self.hub.publish(
            &tenant.id,
            ConsoleEvent::MessageAppended {
                handoff_id: handoff.id,
                message: message.clone(),
            },
        );
        Ok(message)
    }

    /// Operator send; only the assigned operator may send.
    pub async fn send_operator(
        &self,
        operator: &OperatorRow,
        handoff_id: &str,
        body: String,
    ) -> Result<LedgerMessage, LifecycleError> {
        let handoff = self.load_for_tenant(handoff_id, &operator.tenant_id).await?;
        transition(handoff.status, HandoffAction::Send)?;
        if handoff.operator_id.as_deref() != Some(operator.id.as_str()) {
            return Err(LifecycleError::Forbidden(
                "only the assigned operator may send on this handoff",
            ));
        }

        let message = self
            .store
            .append_message(
                handoff.id.clone(),
                SenderOrigin::Operator,
                Some(operator.id.clone()),
                body,
            )
            .await?;
        self.hub.publish(
            &operator.tenant_id,
            ConsoleEvent::MessageAppended {
                handoff_id: handoff.id,
                message: message.clone(),
            },
        );
        Ok(message)
    }

    /// Offline contact capture after an `after_hours` escalation outcome.
    /// The handoff stays `pending` — no live operator is required.
    pub async fn capture_contact(
        &self,
        tenant: &TenantRow,
        handoff_id: &str,
        email: String,
        message: Option<String>,
    ) -> Result<Handoff, LifecycleError> {
        let handoff = self.load_for_tenant(handoff_id, &tenant.id).await?;
        if handoff.status == HandoffStatus::Resolved {
            return Err(LifecycleError::NotActive);
        }

        let updated = self
            .store
            .set_contact(handoff.id.clone(), email, message)
            .await?;
        if !updated {
            return Err(LifecycleError::NotActive);
        }

        self.append_system(&handoff.id, "Customer left contact details")
            .await;
        self.reload(&handoff.id).await
    }

    // -- Internals -----------------------------------------------------------

    async fn load_for_tenant(
        &self,
        handoff_id: &str,
        tenant_id: &str,
    ) -> Result<Handoff, LifecycleError> {
        let handoff = self
            .store
            .handoff_by_id(handoff_id.to_string())
            .await?
            .ok_or(LifecycleError::NotFound)?;
        // Cross-tenant probes look identical to missing rows
        if handoff.tenant_id != tenant_id {
            return Err(LifecycleError::NotFound);
        }
        Ok(handoff)
    }

    async fn reload(&self, handoff_id: &str) -> Result<Handoff, LifecycleError> {
        self.store
            .handoff_by_id(handoff_id.to_string())
            .await?
            .ok_or(LifecycleError::NotFound)
    }

    async fn finish_resolution(&self, handoff: &Handoff, operator_id: Option<&str>) {
        if let Some(operator_id) = operator_id {
            self.operators.decrement_load(operator_id);
        }
        self.append_system(&handoff.id, "Conversation resolved").await;
        self.hub.publish(
            &handoff.tenant_id,
            ConsoleEvent::HandoffResolved {
                handoff_id: handoff.id.clone(),
            },
        );
        info!(
            component = "lifecycle",
            event = "handoff.resolved",
            handoff_id = %handoff.id,
            "Handoff resolved"
        );
    }

    /// System notices share the ledger; a failure to record one never
    /// fails the operation that produced it.
    async fn append_system(&self, handoff_id: &str, body: &str) {
        if let Err(e) = self
            .store
            .append_message(
                handoff_id.to_string(),
                SenderOrigin::System,
                None,
                body.to_string(),
            )
            .await
        {
            warn!(
                component = "lifecycle",
                event = "handoff.system_message_failed",
                handoff_id = handoff_id,
                error = %e,
                "Failed to append system message"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
