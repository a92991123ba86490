// Expiry scheduler: a repeating tick that persists `disappeared` once a
// message deadline has passed. Rendering alone never flips the flag.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

use super::store::MessageStore;
use crate::models::MessageId;
use crate::timer::{TimerHandle, TimerQueue};

pub const DEFAULT_TICK_PERIOD_MS: i64 = 1000;

#[derive(Debug)]
pub struct ExpiryScheduler {
    period: Duration,
    handle: Option<TimerHandle>,
}

impl Default for ExpiryScheduler {
    fn default() -> Self {
        Self::new(Duration::milliseconds(DEFAULT_TICK_PERIOD_MS))
    }
}

impl ExpiryScheduler {
    pub fn new(period: Duration) -> Self {
        ExpiryScheduler { period, handle: None }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Arm the repeating tick. Starting a running scheduler does nothing.
    pub fn start<E>(&mut self, timers: &mut TimerQueue<E>, now: DateTime<Utc>, tick: E) {
        if self.is_running(timers) {
            return;
        }
        self.handle = Some(timers.schedule_repeating(now, self.period, tick));
        info!("Expiry scheduler started ({}ms period)", self.period.num_milliseconds());
    }

    /// Disarm the tick. Stopping a stopped scheduler does nothing.
    pub fn stop<E>(&mut self, timers: &mut TimerQueue<E>) {
        if let Some(handle) = self.handle.take() {
            timers.cancel(handle);
            info!("Expiry scheduler stopped");
        }
    }

    pub fn is_running<E>(&self, timers: &TimerQueue<E>) -> bool {
        self.handle.is_some_and(|h| timers.is_pending(h))
    }

    /// One evaluation pass at a single captured `now`.
    pub fn tick(&self, store: &mut MessageStore, now: DateTime<Utc>) -> Vec<MessageId> {
        let due: Vec<MessageId> = store
            .iter()
            .filter(|m| !m.disappeared)
            .filter(|m| m.expires_at.is_some_and(|at| now >= at))
            .map(|m| m.id)
            .collect();

        if due.is_empty() {
            return due;
        }
        debug!("Expiry tick found {} due messages", due.len());
        store.mark_disappeared(&due, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Message, MessageKind, Sender};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_tick_flips_only_past_deadlines() {
        let mut store = MessageStore::new();
        let timed = Message::new(Sender::Me, "20s", at(0), MessageKind::Timed, Duration::seconds(20));
        let id = timed.id;
        store.append(timed);
        store.append(Message::outgoing("plain", at(0)));

        let scheduler = ExpiryScheduler::default();
        assert!(scheduler.tick(&mut store, at(19)).is_empty());
        assert!(!store.get(id).unwrap().disappeared);
        assert_eq!(scheduler.tick(&mut store, at(21)), vec![id]);
        assert!(store.get(id).unwrap().disappeared);
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let mut timers = TimerQueue::new();
        let mut scheduler = ExpiryScheduler::default();

        scheduler.start(&mut timers, at(0), ());
        scheduler.start(&mut timers, at(0), ());
        assert_eq!(timers.len(), 1);
        assert!(scheduler.is_running(&timers));

        scheduler.stop(&mut timers);
        scheduler.stop(&mut timers);
        assert!(timers.is_empty());
        assert!(!scheduler.is_running(&timers));
    }
}
