use chrono::{DateTime, Duration, Utc};

use crate::models::Message;

/// How a message should be drawn at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    /// Shown, with time left before it disappears
    VisibleWithCountdown { remaining: Duration },
    /// Drawn as a "message disappeared" placeholder
    Hidden,
}

/// Decide the visibility of `message` at `now`.
///
/// Pure: it never flips `disappeared` itself. A message past its deadline is
/// already `Hidden` here even before the expiry scheduler persists the flag.
pub fn evaluate(message: &Message, now: DateTime<Utc>) -> Visibility {
    if message.disappeared {
        return Visibility::Hidden;
    }

    match message.expires_at {
        Some(at) if now >= at => Visibility::Hidden,
        Some(at) => Visibility::VisibleWithCountdown { remaining: at - now },
        None => Visibility::Visible,
    }
}

impl Visibility {
    pub fn is_hidden(&self) -> bool {
        matches!(self, Visibility::Hidden)
    }
}
