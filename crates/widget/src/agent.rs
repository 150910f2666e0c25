//! The synchronization agent.
//!
//! Drives the widget's view of one conversation: the automated phase, the
//! escalation, and — while a handoff is live — two independent timers. The
//! status loop runs while the handoff is `pending` or `active`; the message
//! loop only while `active`. Ticks never block each other, and a failed
//! tick is logged and retried on the next one (the interval itself is the
//! backoff).
//!
//! The watermark advances for every polled message, rendered or not. That
//! is what prevents the last operator message from repeating after a
//! refresh: the next poll window always narrows, and the seen-set catches
//! the overlap in the meantime.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, info, warn};

use switchboard_protocol::{
    ContactCaptureRequest, ConversationMessageRequest, EscalateRequest, EscalationOutcome,
    HandoffStatus, LedgerMessage, RecentTurn, SenderOrigin, TranscriptEntry, TranscriptRole,
    TurnRole,
};

use crate::seen::SeenMessages;
use crate::session::{SessionRecord, SessionStore};
use crate::transport::{Transport, TransportError};

/// Where rendered transcript entries go (the embedding UI)
pub trait Renderer {
    fn render(&mut self, entry: &TranscriptEntry);
}

impl Renderer for Vec<TranscriptEntry> {
    fn render(&mut self, entry: &TranscriptEntry) {
        self.push(entry.clone());
    }
}

#[derive(Debug, Clone)]
pub struct WidgetConfig {
    pub poll_interval: Duration,
    pub status_interval: Duration,
    /// Bounded window of recent turns sent with an escalation
    pub recent_window: usize,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            status_interval: Duration::from_secs(5),
            recent_window: 10,
        }
    }
}

pub struct SyncAgent<T: Transport, S: SessionStore, R: Renderer> {
    transport: T,
    store: S,
    renderer: R,
    config: WidgetConfig,
    session: SessionRecord,
    seen: SeenMessages,
    /// Timestamp of the most recently observed operator message
    watermark: Option<i64>,
    recent: VecDeque<RecentTurn>,
}

impl<T: Transport, S: SessionStore, R: Renderer> SyncAgent<T, S, R> {
    pub fn new(transport: T, store: S, renderer: R, config: WidgetConfig) -> Self {
        let session = store.load().unwrap_or_default();
        Self {
            transport,
            store,
            renderer,
            config,
            session,
            seen: SeenMessages::new(),
            watermark: None,
            recent: VecDeque::new(),
        }
    }

    pub fn session(&self) -> &SessionRecord {
        &self.session
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    fn persist_session(&mut self) {
        self.store.save(&self.session);
    }

    fn remember_turn(&mut self, role: TurnRole, body: &str) {
        self.recent.push_back(RecentTurn {
            role,
            body: body.to_string(),
        });
        while self.recent.len() > self.config.recent_window {
            self.recent.pop_front();
        }
    }

    // -- Sending -------------------------------------------------------------

    /// Send a customer message. During the automated phase this goes to the
    /// conversation endpoint (created lazily on the first message); during
    /// an active handoff it goes to the ledger.
    pub async fn send_message(&mut self, body: &str) -> Result<(), TransportError> {
        if self.session.status == Some(HandoffStatus::Active) {
            if let Some(handoff_id) = self.session.handoff_id.clone() {
                let message = self.transport.send_message(&handoff_id, body).await?;
                self.seen.insert(&message.id);
                self.renderer.render(&ledger_entry(&message));
                return Ok(());
            }
        }

        let response = self
            .transport
            .conversation_message(&ConversationMessageRequest {
                conversation_id: self.session.conversation_id.clone(),
                body: body.to_string(),
            })
            .await?;

        if self.session.conversation_id.as_deref() != Some(response.conversation_id.as_str()) {
            self.session.conversation_id = Some(response.conversation_id.clone());
            self.persist_session();
        }

        self.remember_turn(TurnRole::Customer, &response.customer_turn.body);
        self.remember_turn(TurnRole::AutomatedAgent, &response.reply.body);
        self.renderer.render(&turn_entry(
            TranscriptRole::Customer,
            &response.customer_turn.body,
            response.customer_turn.timestamp,
        ));
        self.renderer.render(&turn_entry(
            TranscriptRole::AutomatedAgent,
            &response.reply.body,
            response.reply.timestamp,
        ));
        Ok(())
    }

    // -- Escalation ----------------------------------------------------------

    /// Ask for a human operator. On `after_hours` the caller should show
    /// the contact-capture form and call [`capture_contact`].
    ///
    /// [`capture_contact`]: SyncAgent::capture_contact
    pub async fn escalate(
        &mut self,
        contact_email: Option<String>,
    ) -> Result<EscalationOutcome, TransportError> {
        let last_customer_message = self
            .recent
            .iter()
            .rev()
            .find(|turn| turn.role == TurnRole::Customer)
            .map(|turn| turn.body.clone());

        let response = self
            .transport
            .escalate(&EscalateRequest {
                conversation_id: self.session.conversation_id.clone(),
                recent_turns: self.recent.iter().cloned().collect(),
                last_customer_message,
                contact_email,
            })
            .await?;

        self.session.handoff_id = Some(response.handoff_id.clone());
        self.session.status = Some(response.status);
        self.persist_session();

        info!(
            component = "widget",
            event = "widget.escalated",
            handoff_id = %response.handoff_id,
            outcome = ?response.outcome,
            "Escalation requested"
        );
        Ok(response.outcome)
    }

    pub async fn capture_contact(
        &mut self,
        email: String,
        message: Option<String>,
    ) -> Result<(), TransportError> {
        let Some(handoff_id) = self.session.handoff_id.clone() else {
            return Ok(());
        };
        self.transport
            .capture_contact(&handoff_id, &ContactCaptureRequest { email, message })
            .await
    }

    /// Customer ends the conversation. Clears the persisted identifiers so
    /// the next interaction starts fresh.
    pub async fn end_conversation(&mut self) -> Result<(), TransportError> {
        if let Some(handoff_id) = self.session.handoff_id.clone() {
            self.transport.resolve(&handoff_id).await?;
        }
        self.reset();
        Ok(())
    }

    // -- Restore -------------------------------------------------------------

    /// Resume after a reload: rebuild the transcript from the server and
    /// re-seed the duplicate-suppression set from the returned ids before
    /// any live polling starts.
    pub async fn resume(&mut self) -> Result<(), TransportError> {
        self.session = self.store.load().unwrap_or_default();
        if self.session.is_empty() {
            return Ok(());
        }

        self.seen.clear();
        self.watermark = None;
        self.recent.clear();

        if let Some(conversation_id) = self.session.conversation_id.clone() {
            let history = self
                .transport
                .history(&conversation_id, self.session.handoff_id.as_deref())
                .await?;

            let mut ids = Vec::new();
            for entry in &history.entries {
                self.renderer.render(entry);
                if let Some(id) = &entry.message_id {
                    ids.push(id.clone());
                }
                if entry.role == TranscriptRole::Operator {
                    self.watermark = Some(self.watermark.unwrap_or(i64::MIN).max(entry.timestamp));
                }
                match entry.role {
                    TranscriptRole::Customer => {
                        self.remember_turn(TurnRole::Customer, &entry.body)
                    }
                    TranscriptRole::AutomatedAgent => {
                        self.remember_turn(TurnRole::AutomatedAgent, &entry.body)
                    }
                    _ => {}
                }
            }
            self.seen.reseed(ids);
        } else if let Some(handoff_id) = self.session.handoff_id.clone() {
            // Handoff requested before any automated turn existed
            let messages = self.transport.poll_messages(&handoff_id, None).await?;
            let mut ids = Vec::new();
            for message in &messages {
                self.renderer.render(&ledger_entry(message));
                ids.push(message.id.clone());
                self.watermark = Some(
                    self.watermark
                        .unwrap_or(i64::MIN)
                        .max(message.timestamp),
                );
            }
            self.seen.reseed(ids);
        }

        debug!(
            component = "widget",
            event = "widget.resumed",
            seen = self.seen.len(),
            watermark = self.watermark,
            "Session restored"
        );
        Ok(())
    }

    // -- Poll loops ----------------------------------------------------------

    /// One tick of the message poll. Returns how many messages were newly
    /// rendered. No-op unless the handoff is `active`.
    pub async fn poll_messages_tick(&mut self) -> Result<usize, TransportError> {
        if self.session.status != Some(HandoffStatus::Active) {
            return Ok(0);
        }
        let Some(handoff_id) = self.session.handoff_id.clone() else {
            return Ok(0);
        };

        let messages = self
            .transport
            .poll_messages(&handoff_id, self.watermark)
            .await?;

        let mut rendered = 0;
        for message in &messages {
            if self.seen.insert(&message.id) {
                self.renderer.render(&ledger_entry(message));
                rendered += 1;
            }
            // Advance even for already-seen messages so the window narrows
            self.watermark = Some(
                self.watermark
                    .unwrap_or(i64::MIN)
                    .max(message.timestamp),
            );
        }
        Ok(rendered)
    }

    /// One tick of the status poll. No-op unless a handoff is `pending` or
    /// `active`. On `resolved` the persisted identifiers are cleared so the
    /// next interaction starts a fresh conversation.
    pub async fn status_tick(&mut self) -> Result<Option<HandoffStatus>, TransportError> {
        let Some(handoff_id) = self.session.handoff_id.clone() else {
            return Ok(None);
        };
        if self.session.status == Some(HandoffStatus::Resolved) {
            return Ok(Some(HandoffStatus::Resolved));
        }

        let response = self.transport.status(&handoff_id).await?;
        match response.status {
            HandoffStatus::Resolved => {
                info!(
                    component = "widget",
                    event = "widget.handoff_resolved",
                    handoff_id = %handoff_id,
                    "Handoff resolved; clearing session"
                );
                self.reset();
                Ok(Some(HandoffStatus::Resolved))
            }
            status => {
                if self.session.status != Some(status) {
                    self.session.status = Some(status);
                    self.persist_session();
                }
                Ok(Some(status))
            }
        }
    }

    /// Run both loops until the handoff resolves (or none exists). The two
    /// timers are independent: a slow or failing poll never stalls the
    /// status check, and vice versa.
    pub async fn run(&mut self) {
        let mut poll = tokio::time::interval(self.config.poll_interval);
        let mut status = tokio::time::interval(self.config.status_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        status.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if self.session.handoff_id.is_none() {
                break;
            }

            tokio::select! {
                _ = poll.tick() => {
                    if let Err(e) = self.poll_messages_tick().await {
                        warn!(
                            component = "widget",
                            event = "widget.poll_failed",
                            error = %e,
                            "Message poll failed; will retry on next tick"
                        );
                    }
                }
                _ = status.tick() => {
                    match self.status_tick().await {
                        Ok(Some(HandoffStatus::Resolved)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            warn!(
                                component = "widget",
                                event = "widget.status_poll_failed",
                                error = %e,
                                "Status poll failed; will retry on next tick"
                            );
                        }
                    }
                }
            }
        }
    }

    fn reset(&mut self) {
        self.session = SessionRecord::default();
        self.store.clear();
        self.seen.clear();
        self.watermark = None;
        self.recent.clear();
    }
}

fn ledger_entry(message: &LedgerMessage) -> TranscriptEntry {
    TranscriptEntry {
        role: match message.origin {
            SenderOrigin::Customer => TranscriptRole::Customer,
            SenderOrigin::Operator => TranscriptRole::Operator,
            SenderOrigin::System => TranscriptRole::System,
        },
        body: message.body.clone(),
        timestamp: message.timestamp,
        message_id: Some(message.id.clone()),
    }
}

fn turn_entry(role: TranscriptRole, body: &str, timestamp: i64) -> TranscriptEntry {
    TranscriptEntry {
        role,
        body: body.to_string(),
        timestamp,
        message_id: None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque as Queue;
    use std::sync::Mutex;

    use switchboard_protocol::{
        ContactCaptureRequest, ConversationMessageResponse, EscalateResponse, HistoryResponse,
        StatusResponse,
    };

    use crate::session::MemoryStore;

    #[derive(Default)]
    struct MockTransport {
        polls: Mutex<Queue<Vec<LedgerMessage>>>,
        poll_since: Mutex<Vec<Option<i64>>>,
        statuses: Mutex<Queue<StatusResponse>>,
        history: Mutex<Option<HistoryResponse>>,
        escalate: Mutex<Option<EscalateResponse>>,
        conversation: Mutex<Option<ConversationMessageResponse>>,
        captured_contact: Mutex<Option<ContactCaptureRequest>>,
    }

    impl Transport for &MockTransport {
        async fn conversation_message(
            &self,
            _request: &ConversationMessageRequest,
        ) -> Result<ConversationMessageResponse, TransportError> {
            Ok(self
                .conversation
                .lock()
                .unwrap()
                .clone()
                .expect("no scripted conversation response"))
        }

        async fn escalate(
            &self,
            _request: &EscalateRequest,
        ) -> Result<EscalateResponse, TransportError> {
            Ok(self
                .escalate
                .lock()
                .unwrap()
                .clone()
                .expect("no scripted escalate response"))
        }

        async fn capture_contact(
            &self,
            _handoff_id: &str,
            request: &ContactCaptureRequest,
        ) -> Result<(), TransportError> {
            *self.captured_contact.lock().unwrap() = Some(request.clone());
            Ok(())
        }

        async fn send_message(
            &self,
            handoff_id: &str,
            body: &str,
        ) -> Result<LedgerMessage, TransportError> {
            Ok(message(handoff_id, "sent", SenderOrigin::Customer, 99, body))
        }

        async fn resolve(&self, _handoff_id: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn poll_messages(
            &self,
            _handoff_id: &str,
            since: Option<i64>,
        ) -> Result<Vec<LedgerMessage>, TransportError> {
            self.poll_since.lock().unwrap().push(since);
            Ok(self.polls.lock().unwrap().pop_front().unwrap_or_default())
        }

        async fn status(&self, _handoff_id: &str) -> Result<StatusResponse, TransportError> {
            Ok(self
                .statuses
                .lock()
                .unwrap()
                .pop_front()
                .expect("no scripted status response"))
        }

        async fn history(
            &self,
            _conversation_id: &str,
            _handoff_id: Option<&str>,
        ) -> Result<HistoryResponse, TransportError> {
            Ok(self
                .history
                .lock()
                .unwrap()
                .clone()
                .expect("no scripted history response"))
        }
    }

    fn message(
        handoff_id: &str,
        id: &str,
        origin: SenderOrigin,
        timestamp: i64,
        body: &str,
    ) -> LedgerMessage {
        LedgerMessage {
            id: id.to_string(),
            handoff_id: handoff_id.to_string(),
            origin,
            operator_id: None,
            body: body.to_string(),
            timestamp,
            sequence: 0,
        }
    }

    fn active_session() -> MemoryStore {
        let mut store = MemoryStore::default();
        store.save(&SessionRecord {
            conversation_id: Some("c1".to_string()),
            handoff_id: Some("h1".to_string()),
            status: Some(HandoffStatus::Active),
        });
        store
    }

    fn agent<'a>(
        transport: &'a MockTransport,
        store: MemoryStore,
    ) -> SyncAgent<&'a MockTransport, MemoryStore, Vec<TranscriptEntry>> {
        SyncAgent::new(transport, store, Vec::new(), WidgetConfig::default())
    }

    #[tokio::test]
    async fn overlapping_polls_render_each_message_once() {
        let transport = MockTransport::default();
        {
            let mut polls = transport.polls.lock().unwrap();
            // m2 appears in both windows: the first poll's watermark has not
            // advanced past it when the second poll is issued
            polls.push_back(vec![
                message("h1", "m1", SenderOrigin::Operator, 10, "hello"),
                message("h1", "m2", SenderOrigin::Operator, 20, "anything else?"),
            ]);
            polls.push_back(vec![
                message("h1", "m2", SenderOrigin::Operator, 20, "anything else?"),
                message("h1", "m3", SenderOrigin::Operator, 30, "bye"),
            ]);
        }

        let mut agent = agent(&transport, active_session());
        assert_eq!(agent.poll_messages_tick().await.unwrap(), 2);
        assert_eq!(agent.poll_messages_tick().await.unwrap(), 1);

        let bodies: Vec<&str> = agent
            .renderer()
            .iter()
            .map(|e| e.body.as_str())
            .collect();
        assert_eq!(bodies, vec!["hello", "anything else?", "bye"]);

        // The watermark advanced after the first batch even though m2 was
        // re-delivered, so the second request narrowed the window
        let since = transport.poll_since.lock().unwrap().clone();
        assert_eq!(since, vec![None, Some(20)]);
    }

    #[tokio::test]
    async fn poll_is_inert_outside_active_status() {
        let transport = MockTransport::default();
        let mut store = MemoryStore::default();
        store.save(&SessionRecord {
            conversation_id: Some("c1".to_string()),
            handoff_id: Some("h1".to_string()),
            status: Some(HandoffStatus::Pending),
        });

        let mut agent = agent(&transport, store);
        assert_eq!(agent.poll_messages_tick().await.unwrap(), 0);
        assert!(transport.poll_since.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resume_reseeds_seen_set_before_polling() {
        let transport = MockTransport::default();
        *transport.history.lock().unwrap() = Some(HistoryResponse {
            conversation_id: "c1".to_string(),
            handoff_id: Some("h1".to_string()),
            entries: vec![
                turn_entry(TranscriptRole::Customer, "need help", 1),
                turn_entry(TranscriptRole::AutomatedAgent, "sure", 2),
                TranscriptEntry {
                    role: TranscriptRole::Operator,
                    body: "hi, taking over".to_string(),
                    timestamp: 3,
                    message_id: Some("m1".to_string()),
                },
            ],
        });
        // The next poll re-delivers m1 (watermark query overlaps it)
        transport
            .polls
            .lock()
            .unwrap()
            .push_back(vec![message(
                "h1",
                "m1",
                SenderOrigin::Operator,
                3,
                "hi, taking over",
            )]);

        let mut agent = agent(&transport, active_session());
        agent.resume().await.unwrap();
        assert_eq!(agent.renderer().len(), 3);

        // Nothing renders twice after the restore
        assert_eq!(agent.poll_messages_tick().await.unwrap(), 0);
        assert_eq!(agent.renderer().len(), 3);
    }

    #[tokio::test]
    async fn resume_twice_yields_identical_transcript() {
        let transport = MockTransport::default();
        *transport.history.lock().unwrap() = Some(HistoryResponse {
            conversation_id: "c1".to_string(),
            handoff_id: Some("h1".to_string()),
            entries: vec![
                turn_entry(TranscriptRole::Customer, "a", 1),
                turn_entry(TranscriptRole::AutomatedAgent, "b", 2),
            ],
        });

        let mut agent = agent(&transport, active_session());
        agent.resume().await.unwrap();
        agent.resume().await.unwrap();

        let entries = agent.renderer();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].body, entries[2].body);
        assert_eq!(entries[1].body, entries[3].body);
    }

    #[tokio::test]
    async fn status_loop_tracks_pickup_and_resolution() {
        let transport = MockTransport::default();
        {
            let mut statuses = transport.statuses.lock().unwrap();
            statuses.push_back(StatusResponse {
                status: HandoffStatus::Pending,
                operator_name: None,
            });
            statuses.push_back(StatusResponse {
                status: HandoffStatus::Active,
                operator_name: Some("Dana".to_string()),
            });
            statuses.push_back(StatusResponse {
                status: HandoffStatus::Resolved,
                operator_name: Some("Dana".to_string()),
            });
        }

        let mut store = MemoryStore::default();
        store.save(&SessionRecord {
            conversation_id: Some("c1".to_string()),
            handoff_id: Some("h1".to_string()),
            status: Some(HandoffStatus::Pending),
        });
        let mut agent = agent(&transport, store);

        assert_eq!(
            agent.status_tick().await.unwrap(),
            Some(HandoffStatus::Pending)
        );
        assert_eq!(
            agent.status_tick().await.unwrap(),
            Some(HandoffStatus::Active)
        );
        assert_eq!(agent.session().status, Some(HandoffStatus::Active));

        // Resolution clears every persisted identifier
        assert_eq!(
            agent.status_tick().await.unwrap(),
            Some(HandoffStatus::Resolved)
        );
        assert!(agent.session().is_empty());
    }

    #[tokio::test]
    async fn after_hours_escalation_falls_back_to_contact_capture() {
        let transport = MockTransport::default();
        *transport.escalate.lock().unwrap() = Some(EscalateResponse {
            handoff_id: "h1".to_string(),
            outcome: EscalationOutcome::AfterHours,
            status: HandoffStatus::Pending,
        });

        let mut agent = agent(&transport, MemoryStore::default());
        let outcome = agent.escalate(None).await.unwrap();
        assert_eq!(outcome, EscalationOutcome::AfterHours);
        assert_eq!(agent.session().handoff_id.as_deref(), Some("h1"));
        assert_eq!(agent.session().status, Some(HandoffStatus::Pending));

        agent
            .capture_contact("sam@example.com".to_string(), Some("email me".to_string()))
            .await
            .unwrap();
        let captured = transport.captured_contact.lock().unwrap().clone().unwrap();
        assert_eq!(captured.email, "sam@example.com");
    }

    #[tokio::test]
    async fn automated_phase_message_adopts_new_conversation() {
        let transport = MockTransport::default();
        *transport.conversation.lock().unwrap() = Some(ConversationMessageResponse {
            conversation_id: "c-new".to_string(),
            customer_turn: switchboard_protocol::AutomatedTurn {
                conversation_id: "c-new".to_string(),
                role: TurnRole::Customer,
                body: "need help".to_string(),
                timestamp: 1,
                sequence: 0,
            },
            reply: switchboard_protocol::AutomatedTurn {
                conversation_id: "c-new".to_string(),
                role: TurnRole::AutomatedAgent,
                body: "how can I help?".to_string(),
                timestamp: 2,
                sequence: 1,
            },
        });

        let mut agent = agent(&transport, MemoryStore::default());
        agent.send_message("need help").await.unwrap();

        assert_eq!(agent.session().conversation_id.as_deref(), Some("c-new"));
        let bodies: Vec<&str> = agent
            .renderer()
            .iter()
            .map(|e| e.body.as_str())
            .collect();
        assert_eq!(bodies, vec!["need help", "how can I help?"]);
    }
}
