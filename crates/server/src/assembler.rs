//! Transcript assembler.
//!
//! Read-side merge of the automated-turn transcript and the handoff message
//! ledger into one time-ordered view. Writes nothing, keeps no state: the
//! same stores produce the same sequence on every call, which is what makes
//! the widget's full-session restore idempotent.

use switchboard_protocol::{
    AutomatedTurn, LedgerMessage, SenderOrigin, TranscriptEntry, TranscriptRole, TurnRole,
};

use crate::store::{Store, StoreError};

/// Merge both stores into one ordered transcript.
///
/// Ordering: timestamp, then automated turns before ledger messages on an
/// exact tie (the automated phase precedes the handoff in every real flow),
/// then each store's own insertion order.
pub fn merge(turns: &[AutomatedTurn], messages: &[LedgerMessage]) -> Vec<TranscriptEntry> {
    // (timestamp, source rank, per-store sequence)
    let mut keyed: Vec<((i64, u8, i64), TranscriptEntry)> = Vec::with_capacity(turns.len() + messages.len());

    for turn in turns {
        keyed.push((
            (turn.timestamp, 0, turn.sequence),
            TranscriptEntry {
                role: match turn.role {
                    TurnRole::Customer => TranscriptRole::Customer,
                    TurnRole::AutomatedAgent => TranscriptRole::AutomatedAgent,
                },
                body: turn.body.clone(),
                timestamp: turn.timestamp,
                message_id: None,
            },
        ));
    }

    for message in messages {
        keyed.push((
            (message.timestamp, 1, message.sequence),
            TranscriptEntry {
                role: match message.origin {
                    SenderOrigin::Customer => TranscriptRole::Customer,
                    SenderOrigin::Operator => TranscriptRole::Operator,
                    SenderOrigin::System => TranscriptRole::System,
                },
                body: message.body.clone(),
                timestamp: message.timestamp,
                message_id: Some(message.id.clone()),
            },
        ));
    }

    keyed.sort_by_key(|(key, _)| *key);
    keyed.into_iter().map(|(_, entry)| entry).collect()
}

/// Assemble the full transcript for a conversation, optionally including a
/// handoff's ledger. Used for the widget's restore and the operator console
/// open.
pub async fn assemble(
    store: &Store,
    conversation_id: &str,
    handoff_id: Option<&str>,
) -> Result<Vec<TranscriptEntry>, StoreError> {
    let turns = store
        .turns_for_conversation(conversation_id.to_string())
        .await?;
    let messages = match handoff_id {
        Some(handoff_id) => store.messages_for_handoff(handoff_id.to_string()).await?,
        None => Vec::new(),
    };
    Ok(merge(&turns, &messages))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(ts: i64, seq: i64, role: TurnRole, body: &str) -> AutomatedTurn {
        AutomatedTurn {
            conversation_id: "c1".to_string(),
            role,
            body: body.to_string(),
            timestamp: ts,
            sequence: seq,
        }
    }

    fn message(ts: i64, seq: i64, origin: SenderOrigin, body: &str) -> LedgerMessage {
        LedgerMessage {
            id: format!("m-{ts}-{seq}"),
            handoff_id: "h1".to_string(),
            origin,
            operator_id: None,
            body: body.to_string(),
            timestamp: ts,
            sequence: seq,
        }
    }

    #[test]
    fn interleaves_stores_by_timestamp() {
        // Turns at t1 and t3, ledger at t2 and t4: the merged view must be
        // [t1, t2, t3, t4] regardless of which store is scanned first.
        let turns = vec![
            turn(1, 0, TurnRole::Customer, "t1"),
            turn(3, 1, TurnRole::AutomatedAgent, "t3"),
        ];
        let messages = vec![
            message(2, 0, SenderOrigin::System, "t2"),
            message(4, 1, SenderOrigin::Operator, "t4"),
        ];

        let merged = merge(&turns, &messages);
        let bodies: Vec<&str> = merged.iter().map(|e| e.body.as_str()).collect();
        assert_eq!(bodies, vec!["t1", "t2", "t3", "t4"]);
    }

    #[test]
    fn exact_tie_puts_automated_turns_first() {
        let turns = vec![turn(5, 0, TurnRole::AutomatedAgent, "turn")];
        let messages = vec![message(5, 0, SenderOrigin::Operator, "ledger")];

        let merged = merge(&turns, &messages);
        assert_eq!(merged[0].body, "turn");
        assert_eq!(merged[1].body, "ledger");
    }

    #[test]
    fn roles_map_onto_closed_display_vocabulary() {
        let turns = vec![
            turn(1, 0, TurnRole::Customer, "a"),
            turn(2, 1, TurnRole::AutomatedAgent, "b"),
        ];
        let messages = vec![
            message(3, 0, SenderOrigin::Customer, "c"),
            message(4, 1, SenderOrigin::Operator, "d"),
            message(5, 2, SenderOrigin::System, "e"),
        ];

        let roles: Vec<TranscriptRole> = merge(&turns, &messages)
            .into_iter()
            .map(|e| e.role)
            .collect();
        assert_eq!(
            roles,
            vec![
                TranscriptRole::Customer,
                TranscriptRole::AutomatedAgent,
                TranscriptRole::Customer,
                TranscriptRole::Operator,
                TranscriptRole::System,
            ]
        );
    }

    #[test]
    fn ledger_entries_carry_message_ids() {
        let messages = vec![message(1, 0, SenderOrigin::Operator, "hi")];
        let merged = merge(&[], &messages);
        assert_eq!(merged[0].message_id.as_deref(), Some("m-1-0"));

        let turns = vec![turn(1, 0, TurnRole::Customer, "hi")];
        let merged = merge(&turns, &[]);
        assert!(merged[0].message_id.is_none());
    }

    #[tokio::test]
    async fn assemble_is_idempotent() {
        use switchboard_protocol::TurnRole;

        let (store, _dir) = crate::store::tests::test_store().await;
        let conversation = store.create_conversation("t1".to_string()).await.unwrap();
        store
            .append_turn(conversation.clone(), TurnRole::Customer, "hi".to_string())
            .await
            .unwrap();
        store
            .append_turn(
                conversation.clone(),
                TurnRole::AutomatedAgent,
                "hello".to_string(),
            )
            .await
            .unwrap();

        let (handoff, _) = store
            .create_or_reuse_handoff(crate::store::tests::pending_handoff(Some(&conversation)))
            .await
            .unwrap();
        store
            .append_message(
                handoff.id.clone(),
                SenderOrigin::Operator,
                Some("op1".to_string()),
                "taking over".to_string(),
            )
            .await
            .unwrap();

        let first = assemble(&store, &conversation, Some(&handoff.id))
            .await
            .unwrap();
        let second = assemble(&store, &conversation, Some(&handoff.id))
            .await
            .unwrap();

        assert_eq!(first.len(), 3);
        let pairs: Vec<(String, i64)> = first
            .iter()
            .map(|e| (e.body.clone(), e.timestamp))
            .collect();
        let again: Vec<(String, i64)> = second
            .iter()
            .map(|e| (e.body.clone(), e.timestamp))
            .collect();
        assert_eq!(pairs, again);
    }
}
