use chrono::{DateTime, Duration, Utc};
use std::fmt;
use uuid::Uuid;

/// Identifier of a message within a conversation, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        MessageId(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    Me,   // Authored locally
    Peer, // The simulated remote participant
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Standard, // Never expires
    Timed,    // Expiry fixed at creation
    ViewOnce, // Expiry set by the first view
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum DeliveryStatus {
    Sent,     // Appended locally, peer has not read it yet
    Read,     // Read by the peer
    Received, // Incoming message
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub kind: MessageKind,
    pub is_read: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub disappeared: bool,
}

impl Message {
    /// Build a message authored by `sender` at `now`.
    ///
    /// `ttl` is only consulted for [`MessageKind::Timed`]; view-once messages
    /// start without a deadline and get one when they are first viewed.
    pub fn new(sender: Sender, text: &str, now: DateTime<Utc>, kind: MessageKind, ttl: Duration) -> Self {
        let expires_at = match kind {
            MessageKind::Timed => Some(now + ttl),
            MessageKind::Standard | MessageKind::ViewOnce => None,
        };

        Message {
            id: MessageId::new(),
            sender,
            text: text.to_string(),
            created_at: now,
            kind,
            is_read: false,
            expires_at,
            disappeared: false,
        }
    }

    pub fn outgoing(text: &str, now: DateTime<Utc>) -> Self {
        Self::new(Sender::Me, text, now, MessageKind::Standard, Duration::zero())
    }

    pub fn incoming(text: &str, now: DateTime<Utc>) -> Self {
        Self::new(Sender::Peer, text, now, MessageKind::Standard, Duration::zero())
    }

    pub fn read(mut self) -> Self {
        self.is_read = true;
        self
    }

    pub fn is_mine(&self) -> bool {
        self.sender == Sender::Me
    }

    /// A view-once message that nobody has opened yet. Hosts show a
    /// "tap to view" stub instead of the text.
    pub fn is_sealed(&self) -> bool {
        self.kind == MessageKind::ViewOnce && self.expires_at.is_none() && !self.disappeared
    }

    pub fn delivery_status(&self) -> DeliveryStatus {
        match (self.sender, self.is_read) {
            (Sender::Peer, _) => DeliveryStatus::Received,
            (Sender::Me, true) => DeliveryStatus::Read,
            (Sender::Me, false) => DeliveryStatus::Sent,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub author: Sender,
    pub likes: u32,
    pub liked: bool,
}

impl Note {
    pub fn new(text: &str, author: Sender, now: DateTime<Utc>) -> Self {
        Note {
            id: Uuid::new_v4(),
            text: text.to_string(),
            created_at: now,
            author,
            likes: 0,
            liked: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timed_message_gets_deadline_at_creation() {
        let now = Utc::now();
        let msg = Message::new(Sender::Me, "bye soon", now, MessageKind::Timed, Duration::seconds(20));

        assert_eq!(msg.expires_at, Some(now + Duration::seconds(20)));
        assert!(!msg.disappeared);
        assert!(!msg.is_sealed());
    }

    #[test]
    fn test_view_once_starts_sealed() {
        let now = Utc::now();
        let msg = Message::new(Sender::Peer, "secret", now, MessageKind::ViewOnce, Duration::seconds(20));

        assert_eq!(msg.expires_at, None);
        assert!(msg.is_sealed());
    }

    #[test]
    fn test_delivery_status() {
        let now = Utc::now();
        let mine = Message::outgoing("hello", now);
        assert_eq!(mine.delivery_status(), DeliveryStatus::Sent);
        assert_eq!(mine.read().delivery_status(), DeliveryStatus::Read);

        let theirs = Message::incoming("hi", now);
        assert_eq!(theirs.delivery_status(), DeliveryStatus::Received);
    }

    #[test]
    fn test_ids_are_unique() {
        let now = Utc::now();
        let a = Message::outgoing("same", now);
        let b = Message::outgoing("same", now);
        assert_ne!(a.id, b.id);
    }
}
