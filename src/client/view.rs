//! Conversation view-model. One entry per correlation id, reconciled
//! across optimistic sends, live acks, live broadcasts and late fallback
//! responses into a single timeline with no duplicates and no stuck sends.

use uuid::Uuid;

use crate::{
    chat::wire::MessageDto,
    transport::event::{AckStatus, ServerEvent},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Sending,
    Sent,
    Failed,
}

#[derive(Debug, Clone)]
pub struct MessageEntry {
    /// Stable identity across the optimistic→confirmed transition.
    pub correlation_id: String,
    /// Server identity, once some delivery path reported one.
    pub server_id: Option<i64>,
    pub sender_id: Option<i64>,
    pub content: String,
    pub state: DeliveryState,
    pub timestamp_ms: i64,
}

#[derive(Debug, Default)]
pub struct Conversation {
    entries: Vec<MessageEntry>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[MessageEntry] {
        &self.entries
    }

    /// Replace the timeline with server history. History rows are persisted
    /// by definition, so every entry lands terminal.
    pub fn load_history(&mut self, history: &[MessageDto]) {
        self.entries = history
            .iter()
            .map(|m| MessageEntry {
                correlation_id: m.correlation_id.clone(),
                server_id: Some(m.id),
                sender_id: Some(m.sender_id),
                content: m.content.clone(),
                state: DeliveryState::Sent,
                timestamp_ms: m.created_at,
            })
            .collect();
    }

    /// Optimistic local insert at send time.
    pub fn begin_send(&mut self, correlation_id: &str, sender_id: i64, content: &str, now_ms: i64) {
        if self.find(correlation_id).is_some() {
            return;
        }
        self.entries.push(MessageEntry {
            correlation_id: correlation_id.to_owned(),
            server_id: None,
            sender_id: Some(sender_id),
            content: content.to_owned(),
            state: DeliveryState::Sending,
            timestamp_ms: now_ms,
        });
    }

    /// Merge an ack from the live channel. Unknown correlation ids carry no
    /// content and are dropped; `sent` never downgrades.
    pub fn apply_ack(&mut self, correlation_id: &str, server_id: Option<i64>, status: AckStatus) {
        let Some(entry) = self.find_mut(correlation_id) else {
            return;
        };
        match status {
            AckStatus::Sent => {
                if entry.server_id.is_none() {
                    entry.server_id = server_id;
                }
                entry.state = DeliveryState::Sent;
            }
            AckStatus::Failed => {
                if entry.state != DeliveryState::Sent {
                    entry.state = DeliveryState::Failed;
                }
            }
        }
    }

    /// Merge an inbound broadcast. Matches the optimistic entry by
    /// correlation id when one exists; otherwise a server id already seen
    /// means a duplicate; otherwise it is a genuinely new inbound message.
    pub fn apply_received(&mut self, message: &MessageDto) {
        if let Some(entry) = self.find_mut(&message.correlation_id) {
            entry.server_id = Some(message.id);
            entry.state = DeliveryState::Sent;
            entry.timestamp_ms = message.created_at;
            return;
        }
        if self.entries.iter().any(|e| e.server_id == Some(message.id)) {
            return;
        }
        self.entries.push(MessageEntry {
            correlation_id: message.correlation_id.clone(),
            server_id: Some(message.id),
            sender_id: Some(message.sender_id),
            content: message.content.clone(),
            state: DeliveryState::Sent,
            timestamp_ms: message.created_at,
        });
    }

    /// Merge a successful fallback response.
    pub fn apply_fallback_sent(&mut self, correlation_id: &str, server_id: i64) {
        if let Some(entry) = self.find_mut(correlation_id) {
            if entry.server_id.is_none() {
                entry.server_id = Some(server_id);
            }
            entry.state = DeliveryState::Sent;
        }
    }

    /// Both delivery paths exhausted.
    pub fn apply_send_failed(&mut self, correlation_id: &str) {
        if let Some(entry) = self.find_mut(correlation_id)
            && entry.state != DeliveryState::Sent
        {
            entry.state = DeliveryState::Failed;
        }
    }

    /// Feed a live-channel event through the merge rule.
    pub fn apply_event(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::MessageReceived { message } => self.apply_received(message),
            ServerEvent::MessageAck { correlation_id, server_id, status } => {
                self.apply_ack(correlation_id, *server_id, *status)
            }
            ServerEvent::ChatHistory { history, .. } | ServerEvent::RoomJoined { history, .. } => {
                self.load_history(history)
            }
            _ => {}
        }
    }

    /// Re-arm a failed entry as a new logical send under a fresh
    /// correlation id. Returns the new id and the content to resend.
    pub fn retry(&mut self, correlation_id: &str) -> Option<(String, String)> {
        let entry = self.find_mut(correlation_id)?;
        if entry.state != DeliveryState::Failed {
            return None;
        }
        let fresh = Uuid::now_v7().to_string();
        entry.correlation_id = fresh.clone();
        entry.state = DeliveryState::Sending;
        Some((fresh, entry.content.clone()))
    }

    fn find(&self, correlation_id: &str) -> Option<&MessageEntry> {
        self.entries.iter().find(|e| e.correlation_id == correlation_id)
    }

    fn find_mut(&mut self, correlation_id: &str) -> Option<&mut MessageEntry> {
        self.entries.iter_mut().find(|e| e.correlation_id == correlation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dto(id: i64, correlation_id: &str, sender_id: i64, content: &str) -> MessageDto {
        MessageDto {
            id,
            room_id: 1,
            correlation_id: correlation_id.to_owned(),
            sender_id,
            receiver_id: Some(7),
            purchase_id: None,
            content: content.to_owned(),
            is_read: false,
            created_at: 1_754_000_000_000,
        }
    }

    fn count(conversation: &Conversation, correlation_id: &str) -> usize {
        conversation
            .entries()
            .iter()
            .filter(|e| e.correlation_id == correlation_id)
            .count()
    }

    #[test]
    fn late_live_ack_after_fallback_success_stays_one_entry() {
        // Send "hello"; the live ack misses the window; the fallback path
        // lands server id 42; the original ack then shows up late.
        let mut conversation = Conversation::new();
        conversation.begin_send("abc", 3, "hello", 1);
        assert_eq!(conversation.entries()[0].state, DeliveryState::Sending);

        conversation.apply_fallback_sent("abc", 42);
        conversation.apply_ack("abc", Some(42), AckStatus::Sent);

        assert_eq!(conversation.entries().len(), 1);
        let entry = &conversation.entries()[0];
        assert_eq!(entry.state, DeliveryState::Sent);
        assert_eq!(entry.server_id, Some(42));
    }

    #[test]
    fn own_broadcast_merges_into_optimistic_entry() {
        let mut conversation = Conversation::new();
        conversation.begin_send("abc", 3, "hello", 1);

        conversation.apply_received(&dto(42, "abc", 3, "hello"));
        conversation.apply_ack("abc", Some(42), AckStatus::Sent);

        assert_eq!(count(&conversation, "abc"), 1);
        assert_eq!(conversation.entries()[0].server_id, Some(42));
    }

    #[test]
    fn duplicate_broadcast_by_server_id_is_discarded() {
        let mut conversation = Conversation::new();
        conversation.apply_received(&dto(42, "abc", 7, "hey"));
        // Same persisted row observed again under another path.
        conversation.apply_received(&dto(42, "abc", 7, "hey"));

        assert_eq!(conversation.entries().len(), 1);
    }

    #[test]
    fn failed_ack_does_not_downgrade_sent() {
        let mut conversation = Conversation::new();
        conversation.begin_send("abc", 3, "hello", 1);
        conversation.apply_fallback_sent("abc", 42);

        conversation.apply_ack("abc", None, AckStatus::Failed);

        assert_eq!(conversation.entries()[0].state, DeliveryState::Sent);
    }

    #[test]
    fn exhausted_paths_mark_failed_and_retry_rearms() {
        let mut conversation = Conversation::new();
        conversation.begin_send("abc", 3, "hello", 1);
        conversation.apply_send_failed("abc");
        assert_eq!(conversation.entries()[0].state, DeliveryState::Failed);

        let (fresh, content) = conversation.retry("abc").expect("failed entries can retry");
        assert_ne!(fresh, "abc");
        assert_eq!(content, "hello");
        assert_eq!(conversation.entries().len(), 1);
        assert_eq!(conversation.entries()[0].state, DeliveryState::Sending);

        // The old correlation id no longer exists; only the new send does.
        assert_eq!(count(&conversation, "abc"), 0);
        assert_eq!(count(&conversation, &fresh), 1);
    }

    #[test]
    fn retry_is_refused_outside_failed() {
        let mut conversation = Conversation::new();
        conversation.begin_send("abc", 3, "hello", 1);
        assert!(conversation.retry("abc").is_none());

        conversation.apply_fallback_sent("abc", 9);
        assert!(conversation.retry("abc").is_none());
    }

    #[test]
    fn inbound_messages_append_in_arrival_order() {
        let mut conversation = Conversation::new();
        conversation.apply_received(&dto(1, "c-1", 7, "first"));
        conversation.apply_received(&dto(2, "c-2", 7, "second"));

        let contents: Vec<_> = conversation.entries().iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[test]
    fn ack_for_unknown_correlation_id_is_dropped() {
        let mut conversation = Conversation::new();
        conversation.apply_ack("ghost", Some(5), AckStatus::Sent);
        assert!(conversation.entries().is_empty());
    }
}
