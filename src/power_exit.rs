// Long-press "power exit": hold the designated key for the hold duration and
// the panel asks its host to leave. Releasing early cancels. Once the hold
// completes the exit goes ahead after a short delay, key or no key.
//
// Terminals that never report key release are handled with a repeat gap:
// the key counts as held only while auto-repeat presses keep arriving.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};

use crate::timer::{TimerHandle, TimerQueue};

pub const HOLD_MS: i64 = 800;
pub const EXIT_DELAY_MS: i64 = 500;
/// Longest pause between auto-repeat presses before the key counts as released
pub const REPEAT_GAP_MS: i64 = 150;
/// Longest wait for the first auto-repeat after the initial press
pub const FIRST_REPEAT_MS: i64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitTimer {
    HoldComplete,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPhase {
    Idle,
    Holding { since: DateTime<Utc> },
    Triggered,
    Requested,
}

#[derive(Debug)]
pub struct PowerExit {
    hold: Duration,
    exit_delay: Duration,
    phase: ExitPhase,
    timers: TimerQueue<ExitTimer>,
    hold_timer: Option<TimerHandle>,
    repeat_gap: Option<Duration>,
    last_press: Option<DateTime<Utc>>,
    repeating: bool,
}

impl Default for PowerExit {
    fn default() -> Self {
        Self::new(Duration::milliseconds(HOLD_MS), Duration::milliseconds(EXIT_DELAY_MS))
    }
}

impl PowerExit {
    pub fn new(hold: Duration, exit_delay: Duration) -> Self {
        PowerExit {
            hold,
            exit_delay,
            phase: ExitPhase::Idle,
            timers: TimerQueue::new(),
            hold_timer: None,
            repeat_gap: None,
            last_press: None,
            repeating: false,
        }
    }

    /// For input without release events: a hold ends once presses stop
    /// arriving for `gap` (or [`FIRST_REPEAT_MS`] before the first repeat).
    pub fn with_repeat_gap(mut self, gap: Duration) -> Self {
        self.repeat_gap = Some(gap);
        self
    }

    pub fn phase(&self) -> ExitPhase {
        self.phase
    }

    /// Key pressed. Auto-repeat while holding does not restart the hold.
    pub fn key_down(&mut self, now: DateTime<Utc>) {
        if let ExitPhase::Holding { .. } = self.phase {
            if self.last_press.is_some_and(|last| now > last) {
                self.repeating = true;
            }
            self.last_press = Some(now);
        }
        if self.phase != ExitPhase::Idle {
            return;
        }
        self.phase = ExitPhase::Holding { since: now };
        self.last_press = Some(now);
        self.repeating = false;
        self.hold_timer = Some(self.timers.schedule(now, self.hold, ExitTimer::HoldComplete));
        debug!("Power exit hold started");
    }

    /// Key released. Only cancels a hold that has not completed yet.
    pub fn key_up(&mut self) {
        if let ExitPhase::Holding { .. } = self.phase {
            if let Some(handle) = self.hold_timer.take() {
                self.timers.cancel(handle);
            }
            self.phase = ExitPhase::Idle;
            debug!("Power exit hold released early");
        }
    }

    /// Direct activation. Returns true if this call requested the exit.
    pub fn click(&mut self) -> bool {
        if self.phase == ExitPhase::Requested {
            return false;
        }
        self.timers.clear();
        self.hold_timer = None;
        self.phase = ExitPhase::Requested;
        info!("Power exit requested");
        true
    }

    /// Advance the gesture. Returns true on the call where the exit becomes
    /// requested; the host then leaves the panel.
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        if let Some(released_at) = self.inferred_release() {
            if now > released_at {
                debug!("Power exit key went quiet, treating as released");
                self.key_up();
            }
        }

        let mut requested = false;
        while let Some((_, timer)) = self.timers.pop_due(now) {
            match timer {
                ExitTimer::HoldComplete => {
                    self.hold_timer = None;
                    self.phase = ExitPhase::Triggered;
                    self.timers.schedule(now, self.exit_delay, ExitTimer::Exit);
                    debug!("Power exit triggered");
                }
                ExitTimer::Exit => {
                    self.phase = ExitPhase::Requested;
                    info!("Power exit requested");
                    requested = true;
                }
            }
        }
        requested
    }

    /// When the key stopped being held, if that happened before the hold
    /// could complete. Only known in repeat-gap mode.
    fn inferred_release(&self) -> Option<DateTime<Utc>> {
        let gap = self.repeat_gap?;
        let ExitPhase::Holding { since } = self.phase else {
            return None;
        };
        let allowed = if self.repeating { gap } else { gap.max(Duration::milliseconds(FIRST_REPEAT_MS)) };
        let released_at = self.last_press? + allowed;
        (released_at < since + self.hold).then_some(released_at)
    }

    /// Hold progress in `[0, 1]` for a progress bar.
    pub fn progress(&self, now: DateTime<Utc>) -> f64 {
        match self.phase {
            ExitPhase::Idle => 0.0,
            ExitPhase::Holding { since } => {
                let hold_ms = self.hold.num_milliseconds().max(1) as f64;
                ((now - since).num_milliseconds() as f64 / hold_ms).clamp(0.0, 1.0)
            }
            ExitPhase::Triggered | ExitPhase::Requested => 1.0,
        }
    }

    /// Drop any pending timers and return to idle, e.g. when the panel goes away.
    pub fn cancel(&mut self) {
        self.timers.clear();
        self.hold_timer = None;
        self.last_press = None;
        self.phase = ExitPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::milliseconds(ms)
    }

    #[test]
    fn test_early_release_cancels() {
        let mut exit = PowerExit::default();
        exit.key_down(at(0));
        assert!(!exit.poll(at(500)));
        exit.key_up();

        assert!(!exit.poll(at(5000)));
        assert_eq!(exit.phase(), ExitPhase::Idle);
        assert_eq!(exit.progress(at(5000)), 0.0);
    }

    #[test]
    fn test_full_hold_requests_exit_after_delay() {
        let mut exit = PowerExit::default();
        exit.key_down(at(0));
        exit.key_down(at(100)); // repeat
        assert!((exit.progress(at(400)) - 0.5).abs() < 1e-9);

        assert!(!exit.poll(at(800)));
        assert_eq!(exit.phase(), ExitPhase::Triggered);

        // Releasing after the trigger does not stop the exit
        exit.key_up();
        assert!(!exit.poll(at(1200)));
        assert!(exit.poll(at(1300)));
        assert_eq!(exit.phase(), ExitPhase::Requested);
        assert!(!exit.poll(at(2000)));
    }

    #[test]
    fn test_click_is_immediate_and_once() {
        let mut exit = PowerExit::default();
        exit.key_down(at(0));
        assert!(exit.click());
        assert!(!exit.click());
        assert!(!exit.poll(at(2000)));
    }

    #[test]
    fn test_cancel_drops_pending_exit() {
        let mut exit = PowerExit::default();
        exit.key_down(at(0));
        exit.poll(at(800));
        exit.cancel();
        assert!(!exit.poll(at(2000)));
        assert_eq!(exit.phase(), ExitPhase::Idle);
    }

    fn without_release_events() -> PowerExit {
        PowerExit::default().with_repeat_gap(Duration::milliseconds(REPEAT_GAP_MS))
    }

    #[test]
    fn test_tap_without_release_event_does_not_exit() {
        let mut exit = without_release_events();
        exit.key_down(at(0));

        let fired = (1..=30).map(|i| at(i * 100)).find(|&t| exit.poll(t));
        assert_eq!(fired, None);
        assert_eq!(exit.phase(), ExitPhase::Idle);
    }

    #[test]
    fn test_auto_repeat_keeps_hold_alive_without_release_events() {
        let mut exit = without_release_events();
        exit.key_down(at(0));
        // First repeat after the usual initial delay, then every 50ms
        let mut t = 500;
        while t <= 800 {
            exit.key_down(at(t));
            assert!(!exit.poll(at(t)));
            t += 50;
        }
        assert_eq!(exit.phase(), ExitPhase::Triggered);

        // Key let go; the exit still goes ahead
        assert!(!exit.poll(at(1200)));
        assert!(exit.poll(at(1300)));
    }

    #[test]
    fn test_repeats_stopping_early_release_the_hold() {
        let mut exit = without_release_events();
        exit.key_down(at(0));
        exit.key_down(at(400));
        exit.key_down(at(450));

        assert!(!exit.poll(at(601)));
        assert_eq!(exit.phase(), ExitPhase::Idle);
        assert!(!exit.poll(at(3000)));
    }
}
