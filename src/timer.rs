//! Clocks and cancelable timers
//!
//! Everything that waits in this crate waits on a [`TimerQueue`]: a plain
//! single-threaded queue of typed events keyed by deadline. Nothing fires on
//! its own; the owner pops due entries with the current time from its
//! [`Clock`], which lets tests drive time with a [`ManualClock`].

use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Source of the current instant.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Virtual clock that only moves when told to.
///
/// Clones share the same instant, so a test can keep one handle and give
/// another to the component under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock { now: Rc::new(Cell::new(start)) }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.now.set(at);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

/// Handle returned by [`TimerQueue::schedule`], used to cancel the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

#[derive(Debug)]
struct Entry<E> {
    handle: TimerHandle,
    due: DateTime<Utc>,
    period: Option<Duration>,
    event: E,
}

#[derive(Debug)]
pub struct TimerQueue<E> {
    next_id: u64,
    entries: Vec<Entry<E>>,
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> TimerQueue<E> {
    pub fn new() -> Self {
        TimerQueue { next_id: 0, entries: Vec::new() }
    }

    fn register(&mut self, due: DateTime<Utc>, period: Option<Duration>, event: E) -> TimerHandle {
        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        self.entries.push(Entry { handle, due, period, event });
        handle
    }

    /// One-shot timer firing `delay` after `now`.
    pub fn schedule(&mut self, now: DateTime<Utc>, delay: Duration, event: E) -> TimerHandle {
        let handle = self.register(now + delay, None, event);
        debug!("Scheduled {} in {}ms", handle, delay.num_milliseconds());
        handle
    }

    /// Repeating timer, first firing one `period` after `now`. Periods below
    /// one millisecond are raised to one millisecond.
    pub fn schedule_repeating(&mut self, now: DateTime<Utc>, period: Duration, event: E) -> TimerHandle {
        let period = period.max(Duration::milliseconds(1));
        let handle = self.register(now + period, Some(period), event);
        debug!("Scheduled repeating {} every {}ms", handle, period.num_milliseconds());
        handle
    }

    /// Returns false when the handle already fired (one-shot) or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.entries.iter().position(|e| e.handle == handle) {
            Some(idx) => {
                self.entries.remove(idx);
                debug!("Cancelled {}", handle);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.entries.iter().any(|e| e.handle == handle)
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().map(|e| e.due).min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            debug!("Dropping {} pending timers", self.entries.len());
        }
        self.entries.clear();
    }
}

impl<E: Clone> TimerQueue<E> {
    /// Pop the earliest entry due at or before `now`.
    ///
    /// Ties go to the timer registered first. A repeating timer stays queued
    /// and is re-armed one period later, or one period after `now` if it has
    /// fallen behind, so a long gap fires it once rather than in a burst.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<(TimerHandle, E)> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.due <= now)
            .min_by_key(|(_, e)| (e.due, e.handle.0))
            .map(|(idx, _)| idx)?;

        match self.entries[idx].period {
            Some(period) => {
                let entry = &mut self.entries[idx];
                let mut next = entry.due + period;
                if next <= now {
                    next = now + period;
                }
                entry.due = next;
                Some((entry.handle, entry.event.clone()))
            }
            None => {
                let entry = self.entries.remove(idx);
                Some((entry.handle, entry.event))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_one_shot_fires_once_when_due() {
        let t0 = epoch();
        let mut timers = TimerQueue::new();
        let handle = timers.schedule(t0, Duration::seconds(3), "reply");

        assert_eq!(timers.pop_due(t0 + Duration::seconds(2)), None);
        assert_eq!(timers.pop_due(t0 + Duration::seconds(3)), Some((handle, "reply")));
        assert_eq!(timers.pop_due(t0 + Duration::seconds(10)), None);
        assert!(!timers.is_pending(handle));
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let t0 = epoch();
        let mut timers = TimerQueue::new();
        let handle = timers.schedule(t0, Duration::seconds(1), 1);

        assert!(timers.cancel(handle));
        assert!(!timers.cancel(handle));
        assert_eq!(timers.pop_due(t0 + Duration::seconds(5)), None);
    }

    #[test]
    fn test_due_order_and_ties() {
        let t0 = epoch();
        let mut timers = TimerQueue::new();
        timers.schedule(t0, Duration::seconds(2), "late");
        timers.schedule(t0, Duration::seconds(1), "first");
        timers.schedule(t0, Duration::seconds(1), "second");

        let later = t0 + Duration::seconds(5);
        let order: Vec<_> = std::iter::from_fn(|| timers.pop_due(later)).map(|(_, e)| e).collect();
        assert_eq!(order, vec!["first", "second", "late"]);
    }

    #[test]
    fn test_repeating_rearms_without_burst() {
        let t0 = epoch();
        let mut timers = TimerQueue::new();
        let handle = timers.schedule_repeating(t0, Duration::seconds(1), ());

        assert!(timers.pop_due(t0 + Duration::seconds(1)).is_some());
        assert_eq!(timers.next_due(), Some(t0 + Duration::seconds(2)));

        // Far behind: fires once, then waits a full period from now
        let now = t0 + Duration::seconds(60);
        assert!(timers.pop_due(now).is_some());
        assert!(timers.pop_due(now).is_none());
        assert_eq!(timers.next_due(), Some(now + Duration::seconds(1)));
        assert!(timers.is_pending(handle));
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new(epoch());
        let other = clock.clone();
        clock.advance(Duration::milliseconds(1500));
        assert_eq!(other.now(), epoch() + Duration::milliseconds(1500));
    }
}
