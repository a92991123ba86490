// Ordered message collection for one conversation.
//
// Insertion order is display order. Every mutation that changes something is
// broadcast as a StoreEvent; calls that change nothing stay silent.

use chrono::{DateTime, Utc};
use log::debug;
use tokio::sync::broadcast;

use crate::models::{Message, MessageId};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Appended(MessageId),
    Removed(MessageId),
    Read(Vec<MessageId>),
    ExpiryChanged(MessageId),
    Disappeared(Vec<MessageId>),
}

pub struct MessageStore {
    messages: Vec<Message>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        MessageStore { messages: Vec::new(), events }
    }

    /// Receive every effective mutation from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine; the store does not wait on its readers
        let _ = self.events.send(event);
    }

    /// Add a message at the end. A duplicate id is ignored and returns false.
    pub fn append(&mut self, message: Message) -> bool {
        if self.contains(message.id) {
            debug!("Ignoring duplicate message {}", message.id);
            return false;
        }

        let id = message.id;
        debug!("Appending {:?} message {} ({:?})", message.sender, id, message.kind);
        self.messages.push(message);
        self.publish(StoreEvent::Appended(id));
        true
    }

    /// Remove a message permanently. Authorship is the caller's concern.
    pub fn remove(&mut self, id: MessageId) -> Option<Message> {
        let idx = self.messages.iter().position(|m| m.id == id)?;
        let removed = self.messages.remove(idx);
        debug!("Removed message {}", id);
        self.publish(StoreEvent::Removed(id));
        Some(removed)
    }

    /// Set `is_read` on every unread message matching `predicate`.
    /// Returns the ids that changed.
    pub fn mark_read<P>(&mut self, predicate: P) -> Vec<MessageId>
    where
        P: Fn(&Message) -> bool,
    {
        let changed: Vec<MessageId> = self
            .messages
            .iter_mut()
            .filter(|m| !m.is_read && predicate(m))
            .map(|m| {
                m.is_read = true;
                m.id
            })
            .collect();

        if !changed.is_empty() {
            debug!("Marked {} messages read", changed.len());
            self.publish(StoreEvent::Read(changed.clone()));
        }
        changed
    }

    /// Flip `disappeared` for the listed ids whose deadline is at or before
    /// `now`. Missing ids, messages without a deadline and messages already
    /// gone are skipped. Returns the ids that changed.
    pub fn mark_disappeared(&mut self, ids: &[MessageId], now: DateTime<Utc>) -> Vec<MessageId> {
        let changed: Vec<MessageId> = self
            .messages
            .iter_mut()
            .filter(|m| ids.contains(&m.id) && !m.disappeared)
            .filter(|m| m.expires_at.is_some_and(|at| at <= now))
            .map(|m| {
                m.disappeared = true;
                m.id
            })
            .collect();

        if !changed.is_empty() {
            debug!("Marked {} messages disappeared", changed.len());
            self.publish(StoreEvent::Disappeared(changed.clone()));
        }
        changed
    }

    /// Set the deadline of `id` to `at`, or move an existing deadline earlier.
    /// A deadline never moves later. Used when a view-once message is opened
    /// (sets it) or closed early (pulls it in), so the message also counts
    /// as read.
    pub fn expire_by(&mut self, id: MessageId, at: DateTime<Utc>) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        if message.disappeared || message.expires_at.is_some_and(|current| current <= at) {
            return false;
        }

        message.expires_at = Some(at);
        message.is_read = true;
        debug!("Message {} now expires at {}", id, at);
        self.publish(StoreEvent::ExpiryChanged(id));
        true
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
