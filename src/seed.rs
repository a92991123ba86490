// Demo content each panel is mounted with, timestamped relative to `now`.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::models::{Message, MessageKind, Note, Sender};

fn hours_ago(now: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    now - Duration::hours(hours)
}

fn minutes_ago(now: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    now - Duration::minutes(minutes)
}

fn message(sender: Sender, text: &str, at: DateTime<Utc>, is_read: bool) -> Message {
    let mut message = Message::new(sender, text, at, MessageKind::Standard, Duration::zero());
    message.is_read = is_read;
    message
}

fn view_once(sender: Sender, text: &str, at: DateTime<Utc>) -> Message {
    Message::new(sender, text, at, MessageKind::ViewOnce, Duration::zero())
}

/// Full chat history, ending with one unread message and one view-once.
pub fn chat_history(now: DateTime<Utc>) -> Vec<Message> {
    vec![
        message(Sender::Peer, "Hey, how are you doing with the coding challenge?", hours_ago(now, 24), true),
        message(Sender::Me, "Working on the Two Sum problem. Almost got it!", hours_ago(now, 23), true),
        message(Sender::Peer, "Nice! Remember to check for edge cases.", hours_ago(now, 22), true),
        message(Sender::Me, "Good point. I need to handle empty arrays and duplicates.", hours_ago(now, 21), true),
        message(Sender::Peer, "Exactly! Let me know if you need any help.", hours_ago(now, 20), true),
        message(
            Sender::Peer,
            "Have you looked at the hash map approach? It can reduce the time complexity to O(n).",
            hours_ago(now, 12),
            false,
        ),
        view_once(
            Sender::Peer,
            "This is a one-time view message. It will disappear after you read it!",
            hours_ago(now, 1),
        ),
    ]
}

/// The first five messages of the chat history, for the live panel.
pub fn live_history(now: DateTime<Utc>) -> Vec<Message> {
    chat_history(now).into_iter().take(5).collect()
}

pub fn ephemeral_history(now: DateTime<Utc>) -> Vec<Message> {
    vec![
        view_once(
            Sender::Peer,
            "Here's the solution to the hard problem we discussed. Don't share it with anyone else!",
            hours_ago(now, 2),
        ),
        view_once(
            Sender::Peer,
            "I found a security vulnerability in the platform. Check it out quickly!",
            hours_ago(now, 1),
        ),
        view_once(
            Sender::Me,
            "The password for the test account is 'leetcode123'. Delete this after reading.",
            minutes_ago(now, 30),
        ),
    ]
}

/// Notes with a few random likes, newest first.
pub fn notes(now: DateTime<Utc>, rng: &mut impl Rng) -> Vec<Note> {
    let mut notes = vec![
        Note::new("Remember to check out the new weekly contest", Sender::Me, hours_ago(now, 12)),
        Note::new("Let's work on graph problems tomorrow", Sender::Peer, hours_ago(now, 24)),
        Note::new("Need to review dynamic programming concepts", Sender::Me, hours_ago(now, 48)),
    ];
    for note in &mut notes {
        note.likes = rng.gen_range(0..5);
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_history_is_chronological() {
        let now = Utc::now();
        let history = chat_history(now);
        assert!(history.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        assert_eq!(history.iter().filter(|m| m.is_sealed()).count(), 1);
    }

    #[test]
    fn test_notes_are_newest_first() {
        let mut rng = StdRng::seed_from_u64(1);
        let notes = notes(Utc::now(), &mut rng);
        assert!(notes.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        assert!(notes.iter().all(|n| n.likes < 5));
    }
}
