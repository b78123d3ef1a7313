//! Reconciling optimistic sends with the server-confirmed transcript.
//!
//! A history reload replaces the transcript with what the backend returned.
//! Optimistic entries still in flight would vanish from the view if we stopped
//! there, so each local `pending` entry is matched against the server set:
//!
//! 1. by correlation id, when the backend echoes `client_id`;
//! 2. otherwise by sender and body, with the server timestamp no earlier
//!    than [`CLOCK_SKEW`] before the optimistic one and no later than
//!    [`MATCH_WINDOW`] after it. An identical message the operator sent
//!    earlier must not claim a newer in-flight one.
//!
//! Matched entries are dropped in favour of the server record. Unmatched
//! pending entries are appended after the server set in their original order.
//! Sent and failed local entries are always superseded by the reload.

use chrono::TimeDelta;

use crate::models::Message;

/// How long after the optimistic entry a server record may be stamped and
/// still match by sender and body.
pub const MATCH_WINDOW: TimeDelta = TimeDelta::seconds(120);

/// How far a server clock running behind ours may stamp a record before the
/// optimistic entry.
pub const CLOCK_SKEW: TimeDelta = TimeDelta::seconds(5);

/// Merge a freshly loaded server transcript with the local one.
#[must_use]
pub fn reconcile(server: Vec<Message>, local: &[Message]) -> Vec<Message> {
    let mut claimed = vec![false; server.len()];
    let mut unmatched = Vec::new();

    for pending in local.iter().filter(|m| m.is_pending()) {
        let hit = server
            .iter()
            .enumerate()
            .position(|(i, confirmed)| {
                !claimed.get(i).copied().unwrap_or(true) && matches(pending, confirmed)
            });

        match hit.and_then(|i| claimed.get_mut(i)) {
            Some(slot) => *slot = true,
            None => unmatched.push(pending.clone()),
        }
    }

    let mut transcript = server;
    transcript.extend(unmatched);
    transcript
}

fn matches(pending: &Message, confirmed: &Message) -> bool {
    if let (Some(local), Some(remote)) = (pending.client_id, confirmed.client_id) {
        return local == remote;
    }

    let offset = confirmed.created_at - pending.created_at;
    confirmed.sender_id == pending.sender_id
        && confirmed.content == pending.content
        && offset >= -CLOCK_SKEW
        && offset <= MATCH_WINDOW
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use pizzeria_core::{ClientMessageId, Delivery, MessageId, MessageRole, ParticipantId};

    use super::*;

    fn line(sender: &str, body: &str, at: DateTime<Utc>, delivery: Delivery) -> Message {
        Message {
            id: None,
            client_id: None,
            role: MessageRole::Admin,
            sender_type: None,
            sender_id: ParticipantId::new(sender),
            content: body.to_string(),
            created_at: at,
            delivery,
        }
    }

    fn confirmed(id: &str, sender: &str, body: &str, at: DateTime<Utc>) -> Message {
        Message {
            id: Some(MessageId::new(id)),
            ..line(sender, body, at, Delivery::Sent)
        }
    }

    #[test]
    fn test_server_set_replaces_sent_entries() {
        let now = Utc::now();
        let local = vec![
            line("A1", "stale", now, Delivery::Sent),
            line("A1", "broken", now, Delivery::Failed),
        ];
        let server = vec![confirmed("m1", "U1", "Ciao", now)];

        let merged = reconcile(server.clone(), &local);
        assert_eq!(merged, server);
    }

    #[test]
    fn test_pending_matched_by_body_within_window() {
        let now = Utc::now();
        let local = vec![line("A1", "Hello", now, Delivery::Pending)];
        let server = vec![confirmed("m1", "A1", "Hello", now + TimeDelta::seconds(3))];

        let merged = reconcile(server, &local);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.first().and_then(|m| m.id.clone()), Some(MessageId::new("m1")));
    }

    #[test]
    fn test_pending_outside_window_is_kept() {
        let now = Utc::now();
        let local = vec![line("A1", "Hello", now, Delivery::Pending)];
        let server = vec![confirmed("m1", "A1", "Hello", now - TimeDelta::minutes(10))];

        let merged = reconcile(server, &local);
        assert_eq!(merged.len(), 2);
        assert!(merged.last().is_some_and(Message::is_pending));
    }

    #[test]
    fn test_pending_matched_by_client_id() {
        let now = Utc::now();
        let id = ClientMessageId::generate();
        let local = vec![Message {
            client_id: Some(id),
            ..line("A1", "Hello", now, Delivery::Pending)
        }];
        // The server trimmed differently and is far off in time, but echoes the id.
        let server = vec![Message {
            client_id: Some(id),
            ..confirmed("m1", "A1", "Hello ", now + TimeDelta::hours(1))
        }];

        assert_eq!(reconcile(server, &local).len(), 1);
    }

    #[test]
    fn test_different_client_ids_never_match() {
        let now = Utc::now();
        let local = vec![Message {
            client_id: Some(ClientMessageId::generate()),
            ..line("A1", "ok", now, Delivery::Pending)
        }];
        let server = vec![Message {
            client_id: Some(ClientMessageId::generate()),
            ..confirmed("m1", "A1", "ok", now)
        }];

        assert_eq!(reconcile(server, &local).len(), 2);
    }

    #[test]
    fn test_each_server_record_claims_one_pending_entry() {
        let now = Utc::now();
        let local = vec![
            line("A1", "ok", now, Delivery::Pending),
            line("A1", "ok", now, Delivery::Pending),
        ];
        let server = vec![confirmed("m1", "A1", "ok", now)];

        let merged = reconcile(server, &local);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.iter().filter(|m| m.is_pending()).count(), 1);
    }

    #[test]
    fn test_earlier_identical_message_does_not_claim_pending() {
        let now = Utc::now();
        let local = vec![line("A1", "ok", now, Delivery::Pending)];
        // The operator already said "ok" a minute ago; the new one is in flight.
        let server = vec![confirmed("m1", "A1", "ok", now - TimeDelta::seconds(60))];

        let merged = reconcile(server, &local);
        assert_eq!(merged.len(), 2);
        assert!(merged.last().is_some_and(Message::is_pending));
    }

    #[test]
    fn test_small_clock_skew_still_matches() {
        let now = Utc::now();
        let local = vec![line("A1", "ok", now, Delivery::Pending)];
        let server = vec![confirmed("m1", "A1", "ok", now - TimeDelta::seconds(2))];

        assert_eq!(reconcile(server, &local).len(), 1);
    }
}
