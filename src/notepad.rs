// Shared notepad: newest-first notes with likes and an author filter.
// Adding a note goes through a short simulated save.

use chrono::Duration;
use log::{debug, info};
use uuid::Uuid;

use crate::models::{Note, Sender};
use crate::timer::{Clock, TimerHandle, TimerQueue};

pub const SAVE_DELAY_MS: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoteFilter {
    #[default]
    All,
    Mine,
    Theirs,
}

impl NoteFilter {
    pub fn matches(&self, note: &Note) -> bool {
        match self {
            NoteFilter::All => true,
            NoteFilter::Mine => note.author == Sender::Me,
            NoteFilter::Theirs => note.author == Sender::Peer,
        }
    }

    /// All -> Mine -> Theirs -> All
    pub fn cycle(self) -> Self {
        match self {
            NoteFilter::All => NoteFilter::Mine,
            NoteFilter::Mine => NoteFilter::Theirs,
            NoteFilter::Theirs => NoteFilter::All,
        }
    }
}

#[derive(Debug, Clone)]
struct Draft {
    handle: TimerHandle,
    text: String,
}

pub struct SharedNotepad<C: Clock> {
    clock: C,
    notes: Vec<Note>,
    filter: NoteFilter,
    save_delay: Duration,
    timers: TimerQueue<()>,
    draft: Option<Draft>,
}

impl<C: Clock> SharedNotepad<C> {
    pub fn new(clock: C, notes: Vec<Note>) -> Self {
        SharedNotepad {
            clock,
            notes,
            filter: NoteFilter::All,
            save_delay: Duration::milliseconds(SAVE_DELAY_MS),
            timers: TimerQueue::new(),
            draft: None,
        }
    }

    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = delay;
        self
    }

    /// Start saving a note. Blank text, or a save already in flight, is ignored.
    pub fn add(&mut self, text: &str) -> bool {
        if text.trim().is_empty() || self.draft.is_some() {
            return false;
        }
        let handle = self.timers.schedule(self.clock.now(), self.save_delay, ());
        self.draft = Some(Draft { handle, text: text.to_string() });
        true
    }

    pub fn is_saving(&self) -> bool {
        self.draft.is_some()
    }

    /// Finish a due save. Returns the id of the note that landed.
    pub fn pump(&mut self) -> Option<Uuid> {
        let now = self.clock.now();
        let (handle, ()) = self.timers.pop_due(now)?;
        let draft = self.draft.take().filter(|d| d.handle == handle)?;

        let note = Note::new(&draft.text, Sender::Me, now);
        let id = note.id;
        self.notes.insert(0, note);
        info!("Saved note {}", id);
        Some(id)
    }

    /// Delete one of our own notes.
    pub fn delete(&mut self, id: Uuid) -> bool {
        match self.notes.iter().position(|n| n.id == id) {
            Some(idx) if self.notes[idx].author == Sender::Me => {
                self.notes.remove(idx);
                debug!("Deleted note {}", id);
                true
            }
            _ => false,
        }
    }

    pub fn toggle_like(&mut self, id: Uuid) -> bool {
        let Some(note) = self.notes.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        if note.liked {
            note.likes = note.likes.saturating_sub(1);
        } else {
            note.likes += 1;
        }
        note.liked = !note.liked;
        true
    }

    /// Toggle the like on the newest note passing the filter.
    pub fn toggle_like_first_visible(&mut self) -> Option<Uuid> {
        let id = self.visible().next()?.id;
        self.toggle_like(id);
        Some(id)
    }

    pub fn filter(&self) -> NoteFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: NoteFilter) {
        self.filter = filter;
    }

    /// Notes passing the current filter, newest first.
    pub fn visible(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(move |n| self.filter.matches(n))
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Abandon an unsaved draft, e.g. when the panel goes away.
    pub fn cancel(&mut self) {
        self.timers.clear();
        self.draft = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualClock;
    use chrono::{DateTime, Utc};

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn notepad(clock: &ManualClock) -> SharedNotepad<ManualClock> {
        let notes = vec![
            Note::new("theirs", Sender::Peer, start()),
            Note::new("mine", Sender::Me, start()),
        ];
        SharedNotepad::new(clock.clone(), notes)
    }

    #[test]
    fn test_add_lands_after_save_delay_at_front() {
        let clock = ManualClock::new(start());
        let mut pad = notepad(&clock);

        assert!(pad.add("graph problems tomorrow"));
        assert!(!pad.add("second while saving"));
        assert!(pad.is_saving());
        assert_eq!(pad.pump(), None);

        clock.advance(Duration::milliseconds(500));
        let id = pad.pump().unwrap();
        assert_eq!(pad.notes()[0].id, id);
        assert_eq!(pad.notes().len(), 3);
        assert!(!pad.is_saving());
    }

    #[test]
    fn test_blank_note_is_ignored() {
        let clock = ManualClock::new(start());
        let mut pad = notepad(&clock);
        assert!(!pad.add("   "));
        assert!(!pad.is_saving());
    }

    #[test]
    fn test_like_toggles() {
        let clock = ManualClock::new(start());
        let mut pad = notepad(&clock);
        let id = pad.notes()[0].id;

        pad.toggle_like(id);
        assert_eq!((pad.notes()[0].likes, pad.notes()[0].liked), (1, true));
        pad.toggle_like(id);
        assert_eq!((pad.notes()[0].likes, pad.notes()[0].liked), (0, false));
    }

    #[test]
    fn test_like_follows_filter() {
        let clock = ManualClock::new(start());
        let mut pad = notepad(&clock);
        let mine = pad.notes()[1].id;

        pad.set_filter(NoteFilter::Mine);
        assert_eq!(pad.toggle_like_first_visible(), Some(mine));
        assert!(pad.notes()[1].liked);
        assert!(!pad.notes()[0].liked);

        let mut empty = SharedNotepad::new(clock.clone(), Vec::new());
        assert_eq!(empty.toggle_like_first_visible(), None);
    }

    #[test]
    fn test_delete_own_only_and_filter() {
        let clock = ManualClock::new(start());
        let mut pad = notepad(&clock);
        let theirs = pad.notes()[0].id;
        let mine = pad.notes()[1].id;

        pad.set_filter(NoteFilter::Theirs);
        assert_eq!(pad.visible().count(), 1);
        pad.set_filter(pad.filter().cycle());
        assert_eq!(pad.filter(), NoteFilter::All);

        assert!(!pad.delete(theirs));
        assert!(pad.delete(mine));
        assert_eq!(pad.notes().len(), 1);
    }

    #[test]
    fn test_cancel_drops_draft() {
        let clock = ManualClock::new(start());
        let mut pad = notepad(&clock);
        pad.add("never saved");
        pad.cancel();
        clock.advance(Duration::seconds(1));
        assert_eq!(pad.pump(), None);
        assert_eq!(pad.notes().len(), 2);
    }
}
