//! SQLite access layer.
//!
//! All state lives here; there is no long-lived per-conversation process.
//! Every entry point opens its own connection (WAL + busy_timeout) inside
//! `spawn_blocking`, so concurrent requests for the same handoff serialize
//! through SQLite's own atomicity rather than in-process locks.
//!
//! Turns and ledger messages are append-only: no update or delete exists
//! anywhere in this API. Corrections are modeled as new system messages.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::debug;

use switchboard_protocol::{
    new_id, AutomatedTurn, Handoff, HandoffStatus, HandoffSummary, LedgerMessage, SenderOrigin,
    TurnRole,
};

use crate::migrations::run_migrations;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A provisioned tenant (rows are created outside this subsystem)
#[derive(Debug, Clone)]
pub struct TenantRow {
    pub id: String,
    pub name: String,
}

/// A provisioned operator
#[derive(Debug, Clone)]
pub struct OperatorRow {
    pub id: String,
    pub tenant_id: String,
    pub display_name: String,
    pub max_active: i64,
}

/// Handle to the database. Cheap to clone; each call opens its own connection.
#[derive(Clone)]
pub struct Store {
    db_path: Arc<PathBuf>,
}

impl Store {
    /// Open the database, running any pending migrations.
    pub async fn open(db_path: PathBuf) -> anyhow::Result<Self> {
        let path = db_path.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut conn = Connection::open(&path)?;
            run_migrations(&mut conn)?;
            Ok(())
        })
        .await??;

        debug!(
            component = "store",
            event = "store.opened",
            db_path = %db_path.display(),
            "Store ready"
        );

        Ok(Self {
            db_path: Arc::new(db_path),
        })
    }

    fn connect(path: &Path) -> rusqlite::Result<Connection> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(conn)
    }

    /// Run a closure against a fresh connection on the blocking pool.
    async fn call<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = Self::connect(&path)?;
            f(&mut conn)
        })
        .await?
    }

    // -- Tenants & operators ------------------------------------------------

    pub async fn tenant_by_api_key(&self, api_key: String) -> Result<Option<TenantRow>, StoreError> {
        self.call(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, name FROM tenants WHERE api_key = ?1",
                    params![api_key],
                    |row| {
                        Ok(TenantRow {
                            id: row.get(0)?,
                            name: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
        .await
    }

    pub async fn operator_by_token(
        &self,
        token: String,
    ) -> Result<Option<OperatorRow>, StoreError> {
        self.call(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, tenant_id, display_name, max_active FROM operators WHERE token = ?1",
                    params![token],
                    operator_from_row,
                )
                .optional()?;
            Ok(row)
        })
        .await
    }

    pub async fn operator_by_id(&self, id: String) -> Result<Option<OperatorRow>, StoreError> {
        self.call(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, tenant_id, display_name, max_active FROM operators WHERE id = ?1",
                    params![id],
                    operator_from_row,
                )
                .optional()?;
            Ok(row)
        })
        .await
    }

    /// Count of active handoffs currently assigned to an operator.
    /// Used to seed the in-memory load counter when a console connects.
    pub async fn active_load(&self, operator_id: String) -> Result<i64, StoreError> {
        self.call(move |conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM handoffs WHERE operator_id = ?1 AND status = 'active'",
                params![operator_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
        .await
    }

    // -- Conversations & automated turns ------------------------------------

    /// Create a conversation lazily (first customer message).
    pub async fn create_conversation(&self, tenant_id: String) -> Result<String, StoreError> {
        self.call(move |conn| {
            let id = new_id();
            conn.execute(
                "INSERT INTO conversations (id, tenant_id, created_at) VALUES (?1, ?2, ?3)",
                params![id, tenant_id, now_millis()],
            )?;
            Ok(id)
        })
        .await
    }

    pub async fn conversation_tenant(
        &self,
        conversation_id: String,
    ) -> Result<Option<String>, StoreError> {
        self.call(move |conn| {
            let tenant = conn
                .query_row(
                    "SELECT tenant_id FROM conversations WHERE id = ?1",
                    params![conversation_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(tenant)
        })
        .await
    }

    /// Append one automated-phase turn. The server assigns the timestamp,
    /// clamped so it never decreases within a conversation.
    pub async fn append_turn(
        &self,
        conversation_id: String,
        role: TurnRole,
        body: String,
    ) -> Result<AutomatedTurn, StoreError> {
        self.call(move |conn| {
            let (seq, last_ts): (i64, i64) = conn.query_row(
                "SELECT COALESCE(MAX(sequence), -1) + 1, COALESCE(MAX(timestamp), 0)
                 FROM automated_turns WHERE conversation_id = ?1",
                params![&conversation_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let timestamp = now_millis().max(last_ts);

            conn.execute(
                "INSERT INTO automated_turns (conversation_id, role, body, timestamp, sequence)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![&conversation_id, turn_role_str(role), &body, timestamp, seq],
            )?;

            Ok(AutomatedTurn {
                conversation_id,
                role,
                body,
                timestamp,
                sequence: seq,
            })
        })
        .await
    }

    pub async fn turns_for_conversation(
        &self,
        conversation_id: String,
    ) -> Result<Vec<AutomatedTurn>, StoreError> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT role, body, timestamp, sequence
                 FROM automated_turns WHERE conversation_id = ?1
                 ORDER BY sequence",
            )?;
            let turns = stmt
                .query_map(params![&conversation_id], |row| {
                    let role_str: String = row.get(0)?;
                    Ok(AutomatedTurn {
                        conversation_id: conversation_id.clone(),
                        role: parse_turn_role(&role_str),
                        body: row.get(1)?,
                        timestamp: row.get(2)?,
                        sequence: row.get(3)?,
                    })
                })?
                .filter_map(|r| r.ok())
                .collect();
            Ok(turns)
        })
        .await
    }

    // -- Handoffs ------------------------------------------------------------

    /// Insert a `pending` handoff, or return the conversation's existing
    /// non-resolved one. One transaction, so concurrent escalations of the
    /// same conversation cannot create two open handoffs.
    ///
    /// Returns `(handoff, created)`.
    pub async fn create_or_reuse_handoff(
        &self,
        handoff: Handoff,
    ) -> Result<(Handoff, bool), StoreError> {
        self.call(move |conn| {
            let tx = conn.transaction()?;

            if let Some(conversation_id) = &handoff.conversation_id {
                let existing = tx
                    .query_row(
                        &format!("{HANDOFF_SELECT} WHERE conversation_id = ?1 AND status != 'resolved'"),
                        params![conversation_id],
                        handoff_from_row,
                    )
                    .optional()?;
                if let Some(existing) = existing {
                    tx.commit()?;
                    return Ok((existing, false));
                }
            }

            tx.execute(
                "INSERT INTO handoffs (id, tenant_id, conversation_id, status, requested_at,
                                       contact_email, last_customer_message, context_json)
                 VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?6, ?7)",
                params![
                    handoff.id,
                    handoff.tenant_id,
                    handoff.conversation_id,
                    handoff.requested_at,
                    handoff.contact_email,
                    handoff.last_customer_message,
                    handoff.context.as_ref().map(|v| v.to_string()),
                ],
            )?;
            tx.commit()?;

            Ok((handoff, true))
        })
        .await
    }

    pub async fn handoff_by_id(&self, id: String) -> Result<Option<Handoff>, StoreError> {
        self.call(move |conn| {
            let row = conn
                .query_row(
                    &format!("{HANDOFF_SELECT} WHERE id = ?1"),
                    params![id],
                    handoff_from_row,
                )
                .optional()?;
            Ok(row)
        })
        .await
    }

    /// Conditional claim: succeeds only if the handoff is still `pending`.
    /// Under concurrent claims exactly one caller observes `true`; the
    /// losers must not overwrite the winner's assignment.
    pub async fn claim_handoff(
        &self,
        id: String,
        operator_id: String,
    ) -> Result<bool, StoreError> {
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE handoffs
                 SET status = 'active', operator_id = ?2, picked_up_at = ?3
                 WHERE id = ?1 AND status = 'pending'",
                params![id, operator_id, now_millis()],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    /// Conditional resolve. `require_assigned` restricts the update to the
    /// given operator's own active handoff (operator path); without it the
    /// customer path may also resolve a still-pending handoff.
    pub async fn resolve_handoff(
        &self,
        id: String,
        require_assigned: Option<String>,
    ) -> Result<bool, StoreError> {
        self.call(move |conn| {
            let now = now_millis();
            let changed = match &require_assigned {
                Some(operator_id) => conn.execute(
                    "UPDATE handoffs SET status = 'resolved', resolved_at = ?3
                     WHERE id = ?1 AND status = 'active' AND operator_id = ?2",
                    params![id, operator_id, now],
                )?,
                None => conn.execute(
                    "UPDATE handoffs SET status = 'resolved', resolved_at = ?2
                     WHERE id = ?1 AND status != 'resolved'",
                    params![id, now],
                )?,
            };
            Ok(changed == 1)
        })
        .await
    }

    /// Store offline contact details on a not-yet-resolved handoff.
    pub async fn set_contact(
        &self,
        id: String,
        email: String,
        message: Option<String>,
    ) -> Result<bool, StoreError> {
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE handoffs SET contact_email = ?2, contact_message = ?3
                 WHERE id = ?1 AND status != 'resolved'",
                params![id, email, message],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    /// Handoff queue for a tenant: pending first, oldest request first.
    pub async fn handoffs_for_tenant(
        &self,
        tenant_id: String,
        status: Option<HandoffStatus>,
    ) -> Result<Vec<HandoffSummary>, StoreError> {
        self.call(move |conn| {
            let mut sql = format!("{HANDOFF_SELECT} WHERE tenant_id = ?1");
            if status.is_some() {
                sql.push_str(" AND status = ?2");
            }
            sql.push_str(
                " ORDER BY CASE status WHEN 'pending' THEN 0 WHEN 'active' THEN 1 ELSE 2 END,
                  requested_at",
            );

            let mut stmt = conn.prepare(&sql)?;
            let map = |row: &rusqlite::Row<'_>| handoff_from_row(row).map(|h| h.summary());
            let handoffs: Vec<HandoffSummary> = match status {
                Some(s) => stmt
                    .query_map(params![tenant_id, status_str(s)], map)?
                    .filter_map(|r| r.ok())
                    .collect(),
                None => stmt
                    .query_map(params![tenant_id], map)?
                    .filter_map(|r| r.ok())
                    .collect(),
            };
            Ok(handoffs)
        })
        .await
    }

    // -- Ledger messages -----------------------------------------------------

    /// Append one ledger message. The server assigns the timestamp
    /// (monotonically non-decreasing per handoff) and the sequence number.
    pub async fn append_message(
        &self,
        handoff_id: String,
        origin: SenderOrigin,
        operator_id: Option<String>,
        body: String,
    ) -> Result<LedgerMessage, StoreError> {
        self.call(move |conn| {
            let (seq, last_ts): (i64, i64) = conn.query_row(
                "SELECT COALESCE(MAX(sequence), -1) + 1, COALESCE(MAX(timestamp), 0)
                 FROM ledger_messages WHERE handoff_id = ?1",
                params![&handoff_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let timestamp = now_millis().max(last_ts);
            let id = new_id();

            conn.execute(
                "INSERT INTO ledger_messages (id, handoff_id, origin, operator_id, body, timestamp, sequence)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    &handoff_id,
                    origin_str(origin),
                    operator_id,
                    &body,
                    timestamp,
                    seq
                ],
            )?;

            Ok(LedgerMessage {
                id,
                handoff_id,
                origin,
                operator_id,
                body,
                timestamp,
                sequence: seq,
            })
        })
        .await
    }

    pub async fn messages_for_handoff(
        &self,
        handoff_id: String,
    ) -> Result<Vec<LedgerMessage>, StoreError> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, origin, operator_id, body, timestamp, sequence
                 FROM ledger_messages WHERE handoff_id = ?1
                 ORDER BY timestamp, sequence",
            )?;
            let messages = stmt
                .query_map(params![&handoff_id], |row| {
                    message_from_row(row, handoff_id.clone())
                })?
                .filter_map(|r| r.ok())
                .collect();
            Ok(messages)
        })
        .await
    }

    /// Operator-origin messages strictly after `since` (the poll watermark).
    /// With no watermark, all operator messages in order.
    pub async fn operator_messages_since(
        &self,
        handoff_id: String,
        since: Option<i64>,
    ) -> Result<Vec<LedgerMessage>, StoreError> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, origin, operator_id, body, timestamp, sequence
                 FROM ledger_messages
                 WHERE handoff_id = ?1 AND origin = 'operator' AND timestamp > ?2
                 ORDER BY timestamp, sequence",
            )?;
            let messages = stmt
                .query_map(params![&handoff_id, since.unwrap_or(i64::MIN)], |row| {
                    message_from_row(row, handoff_id.clone())
                })?
                .filter_map(|r| r.ok())
                .collect();
            Ok(messages)
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const HANDOFF_SELECT: &str = "SELECT id, tenant_id, conversation_id, status, requested_at,
        picked_up_at, resolved_at, operator_id, contact_email, contact_message,
        last_customer_message, context_json
 FROM handoffs";

fn handoff_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Handoff> {
    let status_str: String = row.get(3)?;
    let context_json: Option<String> = row.get(11)?;

    Ok(Handoff {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        conversation_id: row.get(2)?,
        status: parse_status(&status_str),
        requested_at: row.get(4)?,
        picked_up_at: row.get(5)?,
        resolved_at: row.get(6)?,
        operator_id: row.get(7)?,
        contact_email: row.get(8)?,
        contact_message: row.get(9)?,
        last_customer_message: row.get(10)?,
        context: context_json.and_then(|raw| serde_json::from_str(&raw).ok()),
    })
}

fn message_from_row(
    row: &rusqlite::Row<'_>,
    handoff_id: String,
) -> rusqlite::Result<LedgerMessage> {
    let origin_str: String = row.get(1)?;
    Ok(LedgerMessage {
        id: row.get(0)?,
        handoff_id,
        origin: parse_origin(&origin_str),
        operator_id: row.get(2)?,
        body: row.get(3)?,
        timestamp: row.get(4)?,
        sequence: row.get(5)?,
    })
}

fn operator_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OperatorRow> {
    Ok(OperatorRow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        display_name: row.get(2)?,
        max_active: row.get(3)?,
    })
}

fn status_str(status: HandoffStatus) -> &'static str {
    match status {
        HandoffStatus::Pending => "pending",
        HandoffStatus::Active => "active",
        HandoffStatus::Resolved => "resolved",
    }
}

fn parse_status(raw: &str) -> HandoffStatus {
    match raw {
        "pending" => HandoffStatus::Pending,
        "active" => HandoffStatus::Active,
        _ => HandoffStatus::Resolved,
    }
}

fn origin_str(origin: SenderOrigin) -> &'static str {
    match origin {
        SenderOrigin::Customer => "customer",
        SenderOrigin::Operator => "operator",
        SenderOrigin::System => "system",
    }
}

fn parse_origin(raw: &str) -> SenderOrigin {
    match raw {
        "customer" => SenderOrigin::Customer,
        "operator" => SenderOrigin::Operator,
        _ => SenderOrigin::System,
    }
}

fn turn_role_str(role: TurnRole) -> &'static str {
    match role {
        TurnRole::Customer => "customer",
        TurnRole::AutomatedAgent => "automated_agent",
    }
}

fn parse_turn_role(raw: &str) -> TurnRole {
    match raw {
        "customer" => TurnRole::Customer,
        _ => TurnRole::AutomatedAgent,
    }
}

/// Current time as unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Open a throwaway store with one tenant and two operators seeded.
    pub(crate) async fn test_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).await.unwrap();

        store
            .call(|conn| {
                conn.execute_batch(
                    "INSERT INTO tenants (id, name, api_key, created_at)
                     VALUES ('t1', 'Acme', 'tenant-key-1', 0);
                     INSERT INTO tenants (id, name, api_key, created_at)
                     VALUES ('t2', 'Globex', 'tenant-key-2', 0);
                     INSERT INTO operators (id, tenant_id, display_name, token, max_active, created_at)
                     VALUES ('op1', 't1', 'Dana', 'op-token-1', 3, 0);
                     INSERT INTO operators (id, tenant_id, display_name, token, max_active, created_at)
                     VALUES ('op2', 't1', 'Kim', 'op-token-2', 3, 0);",
                )?;
                Ok(())
            })
            .await
            .unwrap();

        (store, dir)
    }

    pub(crate) fn pending_handoff(conversation_id: Option<&str>) -> Handoff {
        Handoff {
            id: new_id(),
            tenant_id: "t1".to_string(),
            conversation_id: conversation_id.map(str::to_string),
            status: HandoffStatus::Pending,
            requested_at: now_millis(),
            picked_up_at: None,
            resolved_at: None,
            operator_id: None,
            contact_email: None,
            contact_message: None,
            last_customer_message: Some("need help".to_string()),
            context: None,
        }
    }

    #[tokio::test]
    async fn auth_lookups() {
        let (store, _dir) = test_store().await;

        let tenant = store
            .tenant_by_api_key("tenant-key-1".to_string())
            .await
            .unwrap()
            .expect("tenant");
        assert_eq!(tenant.id, "t1");

        let operator = store
            .operator_by_token("op-token-2".to_string())
            .await
            .unwrap()
            .expect("operator");
        assert_eq!(operator.display_name, "Kim");

        assert!(store
            .tenant_by_api_key("bogus".to_string())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn turns_are_ordered_and_monotonic() {
        let (store, _dir) = test_store().await;
        let conversation = store.create_conversation("t1".to_string()).await.unwrap();

        let first = store
            .append_turn(conversation.clone(), TurnRole::Customer, "hi".to_string())
            .await
            .unwrap();
        let second = store
            .append_turn(
                conversation.clone(),
                TurnRole::AutomatedAgent,
                "hello".to_string(),
            )
            .await
            .unwrap();

        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert!(second.timestamp >= first.timestamp);

        let turns = store.turns_for_conversation(conversation).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, TurnRole::Customer);
    }

    #[tokio::test]
    async fn concurrent_claims_one_winner() {
        let (store, _dir) = test_store().await;
        let (handoff, _) = store
            .create_or_reuse_handoff(pending_handoff(None))
            .await
            .unwrap();

        // Two operators race on the same pending handoff
        let a = store.claim_handoff(handoff.id.clone(), "op1".to_string());
        let b = store.claim_handoff(handoff.id.clone(), "op2".to_string());
        let (won_a, won_b) = tokio::join!(a, b);

        let won_a = won_a.unwrap();
        let won_b = won_b.unwrap();
        assert!(won_a ^ won_b, "exactly one claim must win");

        let stored = store
            .handoff_by_id(handoff.id)
            .await
            .unwrap()
            .expect("handoff");
        assert_eq!(stored.status, HandoffStatus::Active);
        assert!(stored.picked_up_at.is_some());
        let winner = if won_a { "op1" } else { "op2" };
        assert_eq!(stored.operator_id.as_deref(), Some(winner));
    }

    #[tokio::test]
    async fn escalation_reuses_open_handoff() {
        let (store, _dir) = test_store().await;
        let conversation = store.create_conversation("t1".to_string()).await.unwrap();

        let (first, created_first) = store
            .create_or_reuse_handoff(pending_handoff(Some(&conversation)))
            .await
            .unwrap();
        let (second, created_second) = store
            .create_or_reuse_handoff(pending_handoff(Some(&conversation)))
            .await
            .unwrap();

        assert!(created_first);
        assert!(!created_second);
        assert_eq!(first.id, second.id);

        // Once resolved, a new escalation creates a fresh handoff
        assert!(store
            .resolve_handoff(first.id.clone(), None)
            .await
            .unwrap());
        let (third, created_third) = store
            .create_or_reuse_handoff(pending_handoff(Some(&conversation)))
            .await
            .unwrap();
        assert!(created_third);
        assert_ne!(third.id, first.id);
    }

    #[tokio::test]
    async fn resolve_is_terminal_and_stamped_once() {
        let (store, _dir) = test_store().await;
        let (handoff, _) = store
            .create_or_reuse_handoff(pending_handoff(None))
            .await
            .unwrap();
        assert!(store
            .claim_handoff(handoff.id.clone(), "op1".to_string())
            .await
            .unwrap());

        assert!(store
            .resolve_handoff(handoff.id.clone(), Some("op1".to_string()))
            .await
            .unwrap());
        let resolved_at = store
            .handoff_by_id(handoff.id.clone())
            .await
            .unwrap()
            .unwrap()
            .resolved_at
            .expect("resolved_at");

        // A second resolve does not match and does not restamp
        assert!(!store
            .resolve_handoff(handoff.id.clone(), None)
            .await
            .unwrap());
        let after = store
            .handoff_by_id(handoff.id)
            .await
            .unwrap()
            .unwrap()
            .resolved_at
            .unwrap();
        assert_eq!(after, resolved_at);
    }

    #[tokio::test]
    async fn operator_resolve_requires_assignment() {
        let (store, _dir) = test_store().await;
        let (handoff, _) = store
            .create_or_reuse_handoff(pending_handoff(None))
            .await
            .unwrap();
        assert!(store
            .claim_handoff(handoff.id.clone(), "op1".to_string())
            .await
            .unwrap());

        // A different operator's resolve must not match
        assert!(!store
            .resolve_handoff(handoff.id.clone(), Some("op2".to_string()))
            .await
            .unwrap());
        assert!(store
            .resolve_handoff(handoff.id, Some("op1".to_string()))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn poll_window_narrows_with_watermark() {
        let (store, _dir) = test_store().await;
        let (handoff, _) = store
            .create_or_reuse_handoff(pending_handoff(None))
            .await
            .unwrap();

        for body in ["one", "two", "three"] {
            store
                .append_message(
                    handoff.id.clone(),
                    SenderOrigin::Operator,
                    Some("op1".to_string()),
                    body.to_string(),
                )
                .await
                .unwrap();
        }
        // Customer messages never show up in the operator poll
        store
            .append_message(
                handoff.id.clone(),
                SenderOrigin::Customer,
                None,
                "thanks".to_string(),
            )
            .await
            .unwrap();

        let all = store
            .operator_messages_since(handoff.id.clone(), None)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].body, "one");
        assert_eq!(all[2].body, "three");

        let last_ts = all.last().unwrap().timestamp;
        let after = store
            .operator_messages_since(handoff.id, Some(last_ts))
            .await
            .unwrap();
        assert!(after.is_empty());
    }

    #[tokio::test]
    async fn contact_capture_updates_pending_handoff() {
        let (store, _dir) = test_store().await;
        let (handoff, _) = store
            .create_or_reuse_handoff(pending_handoff(None))
            .await
            .unwrap();

        assert!(store
            .set_contact(
                handoff.id.clone(),
                "sam@example.com".to_string(),
                Some("call me back".to_string()),
            )
            .await
            .unwrap());

        let stored = store.handoff_by_id(handoff.id).await.unwrap().unwrap();
        assert_eq!(stored.status, HandoffStatus::Pending);
        assert_eq!(stored.contact_email.as_deref(), Some("sam@example.com"));
    }
}
