// Simulated peer: answers each outgoing message after a delay, standing in
// for a remote participant. Also holds the per-send state machine.

use chrono::{DateTime, Duration, Utc};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::models::{Message, MessageId, MessageKind, Sender};
use crate::timer::{TimerHandle, TimerQueue};

const FALLBACK_REPLY: &str = "...";

#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Minimum wait before the reply lands
    pub delay: Duration,
    /// Extra random wait in `[0, jitter]`
    pub jitter: Duration,
    /// Canned replies, one picked at random per answer
    pub replies: Vec<String>,
    pub reply_kind: MessageKind,
    /// A new send replaces the pending reply instead of queueing another
    pub coalesce: bool,
}

impl ResponderConfig {
    pub fn fixed(delay: Duration, reply: &str) -> Self {
        ResponderConfig {
            delay,
            jitter: Duration::zero(),
            replies: vec![reply.to_string()],
            reply_kind: MessageKind::Standard,
            coalesce: false,
        }
    }
}

pub struct PeerResponder {
    config: ResponderConfig,
    pending: Vec<(TimerHandle, MessageId)>,
    rng: StdRng,
}

impl PeerResponder {
    pub fn new(config: ResponderConfig) -> Self {
        PeerResponder { config, pending: Vec::new(), rng: StdRng::from_entropy() }
    }

    /// Deterministic reply delays and texts, for tests.
    pub fn with_seed(config: ResponderConfig, seed: u64) -> Self {
        PeerResponder { config, pending: Vec::new(), rng: StdRng::seed_from_u64(seed) }
    }

    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }

    fn next_delay(&mut self) -> Duration {
        let jitter_ms = self.config.jitter.num_milliseconds();
        if jitter_ms <= 0 {
            return self.config.delay;
        }
        self.config.delay + Duration::milliseconds(self.rng.gen_range(0..=jitter_ms))
    }

    /// Register the reply timer for `outgoing`. With `coalesce` set, any
    /// reply still waiting is cancelled first.
    pub fn schedule<E>(
        &mut self,
        timers: &mut TimerQueue<E>,
        now: DateTime<Utc>,
        outgoing: MessageId,
        event: E,
    ) -> TimerHandle {
        if self.config.coalesce {
            self.cancel_all(timers);
        }

        let delay = self.next_delay();
        let handle = timers.schedule(now, delay, event);
        self.pending.push((handle, outgoing));
        debug!("Peer reply to {} due in {}ms", outgoing, delay.num_milliseconds());
        handle
    }

    /// Forget a fired reply timer, returning the message it answers.
    pub fn complete(&mut self, handle: TimerHandle) -> Option<MessageId> {
        let idx = self.pending.iter().position(|(h, _)| *h == handle)?;
        Some(self.pending.remove(idx).1)
    }

    /// Build the reply message itself.
    pub fn compose(&mut self, now: DateTime<Utc>, ttl: Duration) -> Message {
        let text = self
            .config
            .replies
            .choose(&mut self.rng)
            .map(String::as_str)
            .unwrap_or(FALLBACK_REPLY);
        Message::new(Sender::Peer, text, now, self.config.reply_kind, ttl)
    }

    /// Cancel every reply still waiting. Returns how many were cancelled.
    pub fn cancel_all<E>(&mut self, timers: &mut TimerQueue<E>) -> usize {
        let count = self.pending.len();
        for (handle, _) in self.pending.drain(..) {
            timers.cancel(handle);
        }
        count
    }

    /// The peer is "typing" while a reply is pending.
    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Only a non-blank message is sent; anything else is a silent no-op.
pub fn accepts(text: &str) -> bool {
    !text.trim().is_empty()
}

/// State of one send interaction:
/// `Idle -> Sent -> Responded -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendState {
    #[default]
    Idle,
    Sent { outgoing: MessageId },
    Responded { outgoing: MessageId, reply: MessageId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendEvent {
    Submitted(MessageId),
    Replied { outgoing: MessageId, reply: MessageId },
    Settled,
    Cancelled,
}

impl SendState {
    pub fn next(self, event: SendEvent) -> SendState {
        match (self, event) {
            (_, SendEvent::Submitted(outgoing)) => SendState::Sent { outgoing },
            (SendState::Sent { outgoing }, SendEvent::Replied { outgoing: answered, reply })
                if outgoing == answered =>
            {
                SendState::Responded { outgoing, reply }
            }
            (SendState::Responded { .. }, SendEvent::Settled) => SendState::Idle,
            (_, SendEvent::Cancelled) => SendState::Idle,
            (state, _) => state,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SendState::Idle)
    }
}
