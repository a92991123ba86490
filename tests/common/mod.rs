// Common test utilities for integration tests
// This module contains shared code for all integration tests

#![allow(dead_code)]

use std::sync::Once;

use chrono::{DateTime, Duration, Utc};
use log::LevelFilter;

use whisperbox::conversation::{Conversation, ConversationConfig};
use whisperbox::models::Message;
use whisperbox::timer::{Clock, ManualClock};

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

/// Fixed starting instant so failures are reproducible
pub fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()
}

pub fn manual_clock() -> ManualClock {
    ManualClock::new(epoch())
}

/// Mount a conversation on a manual clock. The returned clock shares its
/// instant with the conversation.
pub fn mount(config: ConversationConfig, history: Vec<Message>) -> (Conversation<ManualClock>, ManualClock) {
    setup_logging();
    let clock = manual_clock();
    let conversation = Conversation::mount(config, clock.clone(), history).with_seed(7);
    (conversation, clock)
}

/// Advance the clock in `step` increments up to `total`, pumping after each
/// step the way a host loop would.
pub fn run_for<C: Clock>(conversation: &mut Conversation<C>, clock: &ManualClock, total: Duration, step: Duration) {
    let mut elapsed = Duration::zero();
    while elapsed < total {
        clock.advance(step);
        conversation.pump();
        elapsed = elapsed + step;
    }
}

pub fn ms(n: i64) -> Duration {
    Duration::milliseconds(n)
}

pub fn secs(n: i64) -> Duration {
    Duration::seconds(n)
}
