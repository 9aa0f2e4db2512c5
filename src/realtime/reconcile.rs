//! Consumer-side merge of push and poll deliveries.
//!
//! Delivery across the two paths is at-least-once and unordered relative
//! to each other. The reconciler drops duplicates by message ID and
//! releases messages in the store's order. Its cursor only advances over
//! a gap-free prefix of sequence numbers, so a message pushed early never
//! hides an older one that is still missing from the next poll.

use crate::handoff::{
    domain::{HandoffEvent, HandoffId, HandoffMessage, HandoffMessageId, SequenceNumber},
    ports::MessageCursor,
};
use std::collections::{BTreeMap, HashSet};

/// Per-handoff de-duplication state held by a widget or console.
#[derive(Debug, Clone)]
pub struct DeliveryReconciler {
    handoff_id: HandoffId,
    seen: HashSet<HandoffMessageId>,
    ahead: BTreeMap<SequenceNumber, HandoffMessageId>,
    watermark: Option<(SequenceNumber, HandoffMessageId)>,
}

impl DeliveryReconciler {
    /// Creates an empty reconciler for one handoff.
    #[must_use]
    pub fn new(handoff_id: HandoffId) -> Self {
        Self {
            handoff_id,
            seen: HashSet::new(),
            ahead: BTreeMap::new(),
            watermark: None,
        }
    }

    /// Accepts one message from either path. Returns it when it is new for
    /// this handoff, `None` for duplicates and foreign messages.
    pub fn accept(&mut self, message: HandoffMessage) -> Option<HandoffMessage> {
        if message.handoff_id() != self.handoff_id || !self.seen.insert(message.id()) {
            return None;
        }
        self.ahead.insert(message.sequence(), message.id());
        self.advance();
        Some(message)
    }

    /// Accepts the message carried by a pushed event, if any.
    pub fn accept_event(&mut self, event: &HandoffEvent) -> Option<HandoffMessage> {
        match event {
            HandoffEvent::Message(message) => self.accept(message.clone()),
            _ => None,
        }
    }

    /// Merges a batch (typically a poll result) and returns the new
    /// messages in authoritative order.
    pub fn merge(&mut self, batch: impl IntoIterator<Item = HandoffMessage>) -> Vec<HandoffMessage> {
        let mut fresh: Vec<HandoffMessage> = batch
            .into_iter()
            .filter_map(|message| self.accept(message))
            .collect();
        fresh.sort_by_key(HandoffMessage::ordering_key);
        fresh
    }

    /// Returns the cursor for the next `get_messages_since` call.
    #[must_use]
    pub fn cursor(&self) -> MessageCursor {
        self.watermark
            .map_or(MessageCursor::Start, |(_, id)| MessageCursor::AfterMessage(id))
    }

    /// Returns `true` once `id` has been delivered.
    #[must_use]
    pub fn has_seen(&self, id: HandoffMessageId) -> bool {
        self.seen.contains(&id)
    }

    /// Returns the number of distinct messages delivered.
    #[must_use]
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    fn advance(&mut self) {
        let mut next = self
            .watermark
            .map_or(SequenceNumber::new(1), |(sequence, _)| sequence.next());
        while let Some(id) = self.ahead.remove(&next) {
            self.watermark = Some((next, id));
            next = next.next();
        }
    }
}
