//! Ephemeral message lifecycle for a single conversation
//!
//! A [`Conversation`] owns the message store, the expiry scheduler and the
//! simulated peer, all sharing one [`TimerQueue`]. The host calls
//! [`Conversation::pump`] from its loop; dropping the conversation drops
//! every timer it registered.

pub mod expiry;
pub mod responder;
pub mod store;
pub mod visibility;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use tokio::sync::broadcast;

use crate::models::{Message, MessageId, MessageKind, Sender};
use crate::timer::{Clock, TimerQueue};

pub use expiry::ExpiryScheduler;
pub use responder::{accepts, PeerResponder, ResponderConfig, SendEvent, SendState};
pub use store::{MessageStore, StoreEvent};
pub use visibility::{evaluate, Visibility};

pub const TIMED_TTL_SECS: i64 = 20;
pub const VIEW_ONCE_REVEAL_MS: i64 = 2000;

const CHAT_REPLY: &str = "Thanks for your message. I'll look into this and get back to you soon.";
const EPHEMERAL_REPLY: &str = "Got your message! This will self-destruct after viewing.";
const LIVE_REPLIES: [&str; 5] = [
    "I'm really enjoying our conversation!",
    "That's an interesting point. What do you think about...",
    "I was just thinking about that too!",
    "Let's talk more about this later.",
    "I'm glad you brought that up!",
];

#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Period of the expiry tick
    pub tick_period: Duration,
    /// Kind used by [`Conversation::send`]
    pub outgoing_kind: MessageKind,
    /// Lifetime of timed messages, counted from creation
    pub timed_ttl: Duration,
    /// How long an opened view-once message stays readable
    pub view_once_reveal: Duration,
    pub responder: ResponderConfig,
}

impl ConversationConfig {
    fn base(responder: ResponderConfig) -> Self {
        ConversationConfig {
            tick_period: Duration::milliseconds(expiry::DEFAULT_TICK_PERIOD_MS),
            outgoing_kind: MessageKind::Standard,
            timed_ttl: Duration::seconds(TIMED_TTL_SECS),
            view_once_reveal: Duration::milliseconds(VIEW_ONCE_REVEAL_MS),
            responder,
        }
    }

    /// Regular chat with optional timed messages; one canned answer per send.
    pub fn chat() -> Self {
        Self::base(ResponderConfig::fixed(Duration::seconds(3), CHAT_REPLY))
    }

    /// Live chat: random answers after 2-3s, a new send restarts the wait.
    pub fn live() -> Self {
        Self::base(ResponderConfig {
            delay: Duration::seconds(2),
            jitter: Duration::seconds(1),
            replies: LIVE_REPLIES.iter().map(|s| s.to_string()).collect(),
            reply_kind: MessageKind::Standard,
            coalesce: true,
        })
    }

    /// Everything sent or received is view-once.
    pub fn ephemeral() -> Self {
        let mut responder = ResponderConfig::fixed(Duration::seconds(2), EPHEMERAL_REPLY);
        responder.reply_kind = MessageKind::ViewOnce;
        let mut config = Self::base(responder);
        config.outgoing_kind = MessageKind::ViewOnce;
        config
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerEvent {
    ExpiryTick,
    PeerReply,
}

/// What one [`Conversation::pump`] changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PumpReport {
    pub disappeared: Vec<MessageId>,
    pub replies: Vec<MessageId>,
}

impl PumpReport {
    pub fn is_empty(&self) -> bool {
        self.disappeared.is_empty() && self.replies.is_empty()
    }
}

pub struct Conversation<C: Clock> {
    clock: C,
    config: ConversationConfig,
    store: MessageStore,
    timers: TimerQueue<TimerEvent>,
    expiry: ExpiryScheduler,
    responder: PeerResponder,
    state: SendState,
    closed: bool,
}

impl<C: Clock> Conversation<C> {
    /// Open a conversation view over `history`: incoming messages count as
    /// read and the expiry scheduler starts.
    pub fn mount(config: ConversationConfig, clock: C, history: Vec<Message>) -> Self {
        let mut conversation = Conversation {
            expiry: ExpiryScheduler::new(config.tick_period),
            responder: PeerResponder::new(config.responder.clone()),
            clock,
            config,
            store: MessageStore::new(),
            timers: TimerQueue::new(),
            state: SendState::Idle,
            closed: false,
        };

        for message in history {
            conversation.store.append(message);
        }
        conversation
            .store
            .mark_read(|m| m.sender == Sender::Peer && m.kind != MessageKind::ViewOnce);
        conversation.start_expiry();

        info!("Conversation mounted with {} messages", conversation.store.len());
        conversation
    }

    /// Replace the peer's random source with a seeded one.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.responder.cancel_all(&mut self.timers);
        self.responder = PeerResponder::with_seed(self.config.responder.clone(), seed);
        self
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Send with the configured outgoing kind.
    pub fn send(&mut self, text: &str) -> Option<MessageId> {
        self.send_with(text, self.config.outgoing_kind)
    }

    /// Send a message that disappears `timed_ttl` after creation.
    pub fn send_timed(&mut self, text: &str) -> Option<MessageId> {
        self.send_with(text, MessageKind::Timed)
    }

    /// Append a self message and schedule the peer's answer. Blank text,
    /// or a conversation that has been shut down, sends nothing.
    pub fn send_with(&mut self, text: &str, kind: MessageKind) -> Option<MessageId> {
        if self.closed {
            warn!("Ignoring send on a closed conversation");
            return None;
        }
        if !accepts(text) {
            return None;
        }

        let now = self.clock.now();
        let message = Message::new(Sender::Me, text, now, kind, self.config.timed_ttl);
        let id = message.id;
        self.store.append(message);
        self.state = self.state.next(SendEvent::Submitted(id));
        self.responder.schedule(&mut self.timers, now, id, TimerEvent::PeerReply);
        Some(id)
    }

    /// Delete one of our own messages. Peer messages and unknown ids are left alone.
    pub fn delete(&mut self, id: MessageId) -> bool {
        match self.store.get(id) {
            Some(message) if message.is_mine() => self.store.remove(id).is_some(),
            Some(_) => {
                debug!("Refusing to delete peer message {}", id);
                false
            }
            None => false,
        }
    }

    /// Open a sealed view-once message. Its countdown starts now; the
    /// message is returned so the host can show the content.
    pub fn open_view_once(&mut self, id: MessageId) -> Option<&Message> {
        if !self.store.get(id).is_some_and(Message::is_sealed) {
            return None;
        }
        let deadline = self.clock.now() + self.config.view_once_reveal;
        if !self.store.expire_by(id, deadline) {
            return None;
        }
        self.store.get(id)
    }

    /// Close an opened view-once message before its reveal window ends.
    pub fn close_view_once(&mut self, id: MessageId) -> bool {
        let opened = self
            .store
            .get(id)
            .is_some_and(|m| m.kind == MessageKind::ViewOnce && m.expires_at.is_some());
        opened && self.store.expire_by(id, self.clock.now())
    }

    /// Oldest view-once message nobody has opened yet.
    pub fn first_sealed(&self) -> Option<MessageId> {
        self.store.iter().find(|m| m.is_sealed()).map(|m| m.id)
    }

    /// Fire every timer due at the current time, in deadline order.
    pub fn pump(&mut self) -> PumpReport {
        let mut report = PumpReport::default();
        self.state = self.state.next(SendEvent::Settled);

        let now = self.clock.now();
        while let Some((handle, event)) = self.timers.pop_due(now) {
            match event {
                TimerEvent::ExpiryTick => {
                    report.disappeared.extend(self.expiry.tick(&mut self.store, now));
                }
                TimerEvent::PeerReply => {
                    let Some(outgoing) = self.responder.complete(handle) else {
                        continue;
                    };
                    let reply = self.responder.compose(now, self.config.timed_ttl);
                    let reply_id = reply.id;
                    self.store.append(reply);
                    // The peer has now seen what we sent
                    self.store
                        .mark_read(|m| m.is_mine() && m.kind != MessageKind::ViewOnce);
                    self.state = self.state.next(SendEvent::Replied { outgoing, reply: reply_id });
                    report.replies.push(reply_id);
                }
            }
        }

        if !report.is_empty() {
            debug!(
                "Pump: {} disappeared, {} replies",
                report.disappeared.len(),
                report.replies.len()
            );
        }
        report
    }

    /// Every message with how it should be drawn right now.
    pub fn render(&self) -> Vec<(&Message, Visibility)> {
        let now = self.clock.now();
        self.store.iter().map(|m| (m, evaluate(m, now))).collect()
    }

    pub fn visibility(&self, id: MessageId) -> Option<Visibility> {
        self.store.get(id).map(|m| evaluate(m, self.clock.now()))
    }

    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.store.get(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe()
    }

    pub fn send_state(&self) -> SendState {
        self.state
    }

    pub fn is_peer_typing(&self) -> bool {
        self.responder.is_pending()
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.timers.next_due()
    }

    pub fn start_expiry(&mut self) {
        if self.closed {
            return;
        }
        let now = self.clock.now();
        self.expiry.start(&mut self.timers, now, TimerEvent::ExpiryTick);
    }

    pub fn stop_expiry(&mut self) {
        self.expiry.stop(&mut self.timers);
    }

    pub fn is_expiry_running(&self) -> bool {
        self.expiry.is_running(&self.timers)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Tear the view down: no timer registered by this conversation fires
    /// afterwards. Calling it twice is harmless.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.stop_expiry();
        let cancelled = self.responder.cancel_all(&mut self.timers);
        self.timers.clear();
        self.state = self.state.next(SendEvent::Cancelled);
        self.closed = true;
        info!("Conversation closed ({} pending replies cancelled)", cancelled);
    }
}

impl<C: Clock> Drop for Conversation<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualClock;

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_mount_marks_incoming_read_and_starts_expiry() {
        let clock = ManualClock::new(start());
        let history = vec![Message::incoming("hi", start()), Message::outgoing("yo", start())];
        let conversation = Conversation::mount(ConversationConfig::chat(), clock, history);

        assert!(conversation.messages()[0].is_read);
        assert!(!conversation.messages()[1].is_read);
        assert!(conversation.is_expiry_running());
    }

    #[test]
    fn test_delete_only_own_messages() {
        let clock = ManualClock::new(start());
        let theirs = Message::incoming("keep me", start());
        let their_id = theirs.id;
        let mut conversation = Conversation::mount(ConversationConfig::chat(), clock, vec![theirs]);

        let mine = conversation.send("delete me").unwrap();
        assert!(!conversation.delete(their_id));
        assert!(conversation.delete(mine));
        assert!(!conversation.delete(mine));
        assert_eq!(conversation.messages().len(), 1);
    }

    #[test]
    fn test_responded_settles_on_next_pump() {
        let clock = ManualClock::new(start());
        let mut conversation = Conversation::mount(ConversationConfig::chat(), clock.clone(), Vec::new());

        let outgoing = conversation.send("ping").unwrap();
        assert_eq!(conversation.send_state(), SendState::Sent { outgoing });

        clock.advance(Duration::seconds(3));
        let report = conversation.pump();
        assert_eq!(report.replies.len(), 1);
        assert_eq!(
            conversation.send_state(),
            SendState::Responded { outgoing, reply: report.replies[0] }
        );

        conversation.pump();
        assert!(conversation.send_state().is_idle());
    }

    #[test]
    fn test_reply_marks_own_messages_read() {
        let clock = ManualClock::new(start());
        let mut conversation = Conversation::mount(ConversationConfig::chat(), clock.clone(), Vec::new());

        let id = conversation.send("did you get this?").unwrap();
        assert!(!conversation.get(id).unwrap().is_read);

        clock.advance(Duration::seconds(3));
        conversation.pump();
        assert!(conversation.get(id).unwrap().is_read);
    }

    #[test]
    fn test_shutdown_ignores_later_sends() {
        let clock = ManualClock::new(start());
        let mut conversation = Conversation::mount(ConversationConfig::chat(), clock, Vec::new());
        conversation.shutdown();
        conversation.shutdown();

        assert!(conversation.send("anyone?").is_none());
        conversation.start_expiry();
        assert!(!conversation.is_expiry_running());
    }
}
