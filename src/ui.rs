use anyhow::Result;
use chrono::{DateTime, Utc};
use crossterm::{
    event::{
        self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
        PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{debug, info};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Frame,
};
use std::{io, time::Duration};
use textwrap::wrap;
use tokio::sync::broadcast;
use tui_input::{backend::crossterm::EventHandler, Input};

use whisperbox::config::Settings;
use whisperbox::conversation::{Conversation, ConversationConfig, StoreEvent, Visibility};
use whisperbox::models::{DeliveryStatus, Message, MessageId, Sender};
use whisperbox::names::ChatNames;
use whisperbox::notepad::{NoteFilter, SharedNotepad};
use whisperbox::power_exit::{ExitPhase, PowerExit, REPEAT_GAP_MS};
use whisperbox::seed;
use whisperbox::timer::{Clock, SystemClock};

use crate::utils::format_age;

pub use ratatui::backend::CrosstermBackend;
pub use ratatui::Terminal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PanelKind {
    Chat,
    Live,
    Ephemeral,
    Notepad,
}

impl PanelKind {
    fn next(self) -> Self {
        match self {
            PanelKind::Chat => PanelKind::Live,
            PanelKind::Live => PanelKind::Ephemeral,
            PanelKind::Ephemeral => PanelKind::Notepad,
            PanelKind::Notepad => PanelKind::Chat,
        }
    }

    fn title(self) -> &'static str {
        match self {
            PanelKind::Chat => "Chat",
            PanelKind::Live => "Live",
            PanelKind::Ephemeral => "View once",
            PanelKind::Notepad => "Notepad",
        }
    }
}

/// Things the UI cannot do on its own and hands back to the main loop
pub enum UiCommand {
    RenameUser(String),
    RenamePartner(String),
    Quit,
}

enum Panel {
    Conversation {
        conversation: Conversation<SystemClock>,
        events: broadcast::Receiver<StoreEvent>,
    },
    Notepad(SharedNotepad<SystemClock>),
}

impl Panel {
    /// Build a fresh panel; each visit starts from seed data
    fn mount(kind: PanelKind, settings: &Settings) -> Self {
        let now = SystemClock.now();
        let (config, history) = match kind {
            PanelKind::Chat => (ConversationConfig::chat(), seed::chat_history(now)),
            PanelKind::Live => (ConversationConfig::live(), seed::live_history(now)),
            PanelKind::Ephemeral => (ConversationConfig::ephemeral(), seed::ephemeral_history(now)),
            PanelKind::Notepad => {
                let notes = seed::notes(now, &mut rand::thread_rng());
                let pad = SharedNotepad::new(SystemClock, notes).with_save_delay(settings.notepad_save_delay());
                return Panel::Notepad(pad);
            }
        };

        let conversation = Conversation::mount(settings.tune(config), SystemClock, history);
        let events = conversation.subscribe();
        Panel::Conversation { conversation, events }
    }

    fn unmount(&mut self) {
        match self {
            Panel::Conversation { conversation, .. } => conversation.shutdown(),
            Panel::Notepad(pad) => pad.cancel(),
        }
    }
}

pub struct ChatUI {
    kind: PanelKind,
    panel: Panel,
    input: Input,
    names: ChatNames,
    signed_in_as: String,
    timed_mode: bool,
    open_message: Option<MessageId>,
    power_exit: PowerExit,
    status: Option<(String, DateTime<Utc>)>,
    settings: Settings,
}

impl ChatUI {
    /// `release_events` says whether the terminal reports key release; without
    /// it the power exit hold is tracked through auto-repeat.
    pub fn new(kind: PanelKind, names: ChatNames, signed_in_as: &str, settings: Settings, release_events: bool) -> Self {
        info!("Mounting {} panel", kind.title());
        let mut power_exit = settings.power_exit();
        if !release_events {
            info!("Terminal has no key release events, power exit follows key repeat");
            power_exit = power_exit.with_repeat_gap(chrono::Duration::milliseconds(REPEAT_GAP_MS));
        }
        ChatUI {
            kind,
            panel: Panel::mount(kind, &settings),
            input: Input::default(),
            names,
            signed_in_as: signed_in_as.to_string(),
            timed_mode: false,
            open_message: None,
            power_exit,
            status: None,
            settings,
        }
    }

    pub fn names_mut(&mut self) -> &mut ChatNames {
        &mut self.names
    }

    pub fn set_status(&mut self, status: &str) {
        self.status = Some((status.to_string(), Utc::now()));
    }

    fn switch_panel(&mut self) {
        self.panel.unmount();
        self.power_exit.cancel();
        self.kind = self.kind.next();
        self.panel = Panel::mount(self.kind, &self.settings);
        self.open_message = None;
        self.timed_mode = false;
        info!("Switched to {} panel", self.kind.title());
    }

    /// Poll the terminal for input. Returns a command for the main loop when
    /// the user asked for something outside the UI's reach.
    pub fn handle_input(&mut self) -> Result<Option<UiCommand>> {
        while event::poll(Duration::from_millis(10))? {
            if let Event::Key(key) = event::read()? {
                if let Some(command) = self.handle_key(key) {
                    return Ok(Some(command));
                }
            }
        }
        Ok(None)
    }

    fn handle_key(&mut self, key: KeyEvent) -> Option<UiCommand> {
        let now = Utc::now();

        // The power exit key is the only one that cares about release
        if key.code == KeyCode::Esc {
            match key.kind {
                KeyEventKind::Press | KeyEventKind::Repeat => self.power_exit.key_down(now),
                KeyEventKind::Release => self.power_exit.key_up(),
            }
            return None;
        }
        if key.kind != KeyEventKind::Press {
            return None;
        }
        // Terminals without release events: any other key ends the hold
        self.power_exit.key_up();

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if ctrl => return Some(UiCommand::Quit),
            KeyCode::Char('q') if ctrl => {
                if self.power_exit.click() {
                    return Some(UiCommand::Quit);
                }
            }
            KeyCode::Char('e') if ctrl => {
                if self.kind == PanelKind::Chat {
                    self.timed_mode = !self.timed_mode;
                }
            }
            KeyCode::Char('d') if ctrl => self.delete_newest_own(),
            KeyCode::Char('v') if ctrl => self.open_next_sealed(),
            KeyCode::Char('x') if ctrl => self.close_open_message(),
            KeyCode::Char('f') if ctrl => {
                if let Panel::Notepad(pad) = &mut self.panel {
                    pad.set_filter(pad.filter().cycle());
                }
            }
            KeyCode::Char('l') if ctrl => {
                if let Panel::Notepad(pad) = &mut self.panel {
                    pad.toggle_like_first_visible();
                }
            }
            KeyCode::Tab => self.switch_panel(),
            KeyCode::Enter => {
                let text = self.input.value().to_string();
                self.input.reset();
                return self.submit(&text);
            }
            _ => {
                self.input.handle_event(&Event::Key(key));
            }
        }
        None
    }

    fn submit(&mut self, text: &str) -> Option<UiCommand> {
        if let Some(name) = text.strip_prefix("/me ") {
            return Some(UiCommand::RenameUser(name.to_string()));
        }
        if let Some(name) = text.strip_prefix("/peer ") {
            return Some(UiCommand::RenamePartner(name.to_string()));
        }

        match &mut self.panel {
            Panel::Conversation { conversation, .. } => {
                let sent = if self.timed_mode {
                    conversation.send_timed(text)
                } else {
                    conversation.send(text)
                };
                if sent.is_some() {
                    self.timed_mode = false;
                }
            }
            Panel::Notepad(pad) => {
                pad.add(text);
            }
        }
        None
    }

    fn delete_newest_own(&mut self) {
        match &mut self.panel {
            Panel::Conversation { conversation, .. } => {
                let newest = conversation.messages().iter().rev().find(|m| m.is_mine()).map(|m| m.id);
                if let Some(id) = newest {
                    conversation.delete(id);
                }
            }
            Panel::Notepad(pad) => {
                let newest = pad.notes().iter().find(|n| n.author == Sender::Me).map(|n| n.id);
                if let Some(id) = newest {
                    pad.delete(id);
                }
            }
        }
    }

    fn open_next_sealed(&mut self) {
        if let Panel::Conversation { conversation, .. } = &mut self.panel {
            if self.open_message.is_some() {
                return;
            }
            if let Some(id) = conversation.first_sealed() {
                if conversation.open_view_once(id).is_some() {
                    self.open_message = Some(id);
                }
            }
        }
    }

    fn close_open_message(&mut self) {
        if let (Some(id), Panel::Conversation { conversation, .. }) = (self.open_message.take(), &mut self.panel) {
            conversation.close_view_once(id);
        }
    }

    /// Run every timer that is due. Returns true once the power exit fired.
    pub fn pump(&mut self) -> bool {
        let now = Utc::now();

        match &mut self.panel {
            Panel::Conversation { conversation, events } => {
                conversation.pump();

                while let Ok(event) = events.try_recv() {
                    if let StoreEvent::Disappeared(ids) = event {
                        debug!("UI: {} messages disappeared", ids.len());
                        let label = if ids.len() == 1 { "A message disappeared".to_string() } else { format!("{} messages disappeared", ids.len()) };
                        self.status = Some((label, now));
                    }
                }

                let still_open = self
                    .open_message
                    .and_then(|id| conversation.visibility(id))
                    .is_some_and(|v| !v.is_hidden());
                if !still_open {
                    self.open_message = None;
                }
            }
            Panel::Notepad(pad) => {
                pad.pump();
            }
        }

        if self.status.as_ref().is_some_and(|(_, at)| (now - *at).num_seconds() > 3) {
            self.status = None;
        }

        self.power_exit.poll(now)
    }

    pub fn shutdown(&mut self) {
        self.panel.unmount();
        self.power_exit.cancel();
    }

    pub fn draw<B: Backend>(&self, frame: &mut Frame<B>) {
        let size = frame.size();
        let now = Utc::now();

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // Panel tabs and names
                Constraint::Min(5),    // Messages or notes
                Constraint::Length(3), // Input box
                Constraint::Length(1), // Help line
            ])
            .split(size);

        draw_header(frame, self, chunks[0], now);

        match &self.panel {
            Panel::Conversation { conversation, .. } => draw_messages(frame, conversation, chunks[1], self, now),
            Panel::Notepad(pad) => draw_notes(frame, pad, chunks[1], self, now),
        }

        let input_title = match (&self.panel, self.timed_mode) {
            (Panel::Notepad(pad), _) if pad.is_saving() => "Note (saving...)".to_string(),
            (Panel::Notepad(_), _) => "Note".to_string(),
            (_, true) => format!("Message (disappears after {}s)", self.settings.timed_ttl_secs),
            (_, false) => "Message".to_string(),
        };
        let input_widget = Paragraph::new(self.input.value())
            .block(Block::default().title(input_title).borders(Borders::ALL).border_style(Style::default().fg(Color::Yellow)));
        frame.render_widget(input_widget, chunks[2]);

        let help = match self.kind {
            PanelKind::Chat => "Hold ESC or Ctrl+Q power exit | TAB panel | Ctrl+E timed | Ctrl+D delete | Ctrl+V view | /me /peer rename",
            PanelKind::Live => "Hold ESC power exit | TAB panel | Ctrl+D delete | /me /peer rename",
            PanelKind::Ephemeral => "Hold ESC power exit | TAB panel | Ctrl+V view | Ctrl+X close | Ctrl+D delete",
            PanelKind::Notepad => "TAB panel | Ctrl+F filter | Ctrl+L like | Ctrl+D delete | Ctrl+C quit",
        };
        frame.render_widget(Paragraph::new(Span::styled(help, Style::default().fg(Color::Gray))), chunks[3]);

        frame.set_cursor(chunks[2].x + self.input.cursor() as u16 + 1, chunks[2].y + 1);

        if let (Some(id), Panel::Conversation { conversation, .. }) = (self.open_message, &self.panel) {
            if let Some(message) = conversation.get(id) {
                draw_view_once(frame, message, conversation.visibility(id), size, self.sender_name(message.sender));
            }
        }
    }

    fn sender_name(&self, sender: Sender) -> &str {
        match sender {
            Sender::Me => self.names.user(),
            Sender::Peer => self.names.partner(),
        }
    }
}

fn draw_header<B: Backend>(f: &mut Frame<B>, ui: &ChatUI, area: Rect, now: DateTime<Utc>) {
    let mut spans = Vec::new();
    let mut kind = PanelKind::Chat;
    for _ in 0..4 {
        let style = if kind == ui.kind {
            Style::default().fg(Color::Black).bg(Color::Yellow)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::styled(format!(" {} ", kind.title()), style));
        kind = kind.next();
    }

    let presence = match &ui.panel {
        Panel::Conversation { conversation, .. } if conversation.is_peer_typing() => "Typing...",
        Panel::Conversation { .. } => "Online",
        Panel::Notepad(_) => "",
    };
    spans.push(Span::raw(format!("  {} ", ui.names.partner())));
    spans.push(Span::styled(presence, Style::default().fg(Color::Green)));
    spans.push(Span::styled(format!("  [{}]", ui.signed_in_as), Style::default().fg(Color::DarkGray)));

    let progress = ui.power_exit.progress(now);
    if progress > 0.0 {
        let filled = (progress * 10.0).round() as usize;
        let bar = format!("  exit [{}{}]", "#".repeat(filled), " ".repeat(10 - filled.min(10)));
        let style = if ui.power_exit.phase() == ExitPhase::Requested || progress >= 1.0 {
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Red)
        };
        spans.push(Span::styled(bar, style));
    }

    if let Some((status, _)) = &ui.status {
        spans.push(Span::styled(format!("  {}", status), Style::default().fg(Color::Magenta)));
    }

    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_messages<B: Backend>(
    f: &mut Frame<B>,
    conversation: &Conversation<SystemClock>,
    area: Rect,
    ui: &ChatUI,
    now: DateTime<Utc>,
) {
    let wrap_width = area.width.saturating_sub(2).max(1) as usize;

    let items: Vec<ListItem> = conversation
        .render()
        .into_iter()
        .flat_map(|(m, visibility)| {
            let prefix = format!("[{}] {}: ", format_age(m.created_at, now), ui.sender_name(m.sender));

            let (body, style) = match visibility {
                Visibility::Hidden => (
                    "Message disappeared".to_string(),
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                ),
                _ if m.is_sealed() => ("[view once] press Ctrl+V to view".to_string(), Style::default().fg(Color::Cyan)),
                Visibility::VisibleWithCountdown { remaining } if ui.open_message == Some(m.id) => {
                    (format!("[opened, {}s]", remaining.num_seconds() + 1), Style::default().fg(Color::Cyan))
                }
                Visibility::VisibleWithCountdown { remaining } => (
                    format!("{} [{}s]", m.text, remaining.num_seconds() + 1),
                    Style::default().fg(Color::Yellow),
                ),
                Visibility::Visible => (m.text.clone(), Style::default()),
            };

            let ticks = match m.delivery_status() {
                DeliveryStatus::Sent => " ✓",
                DeliveryStatus::Read => " ✓✓",
                DeliveryStatus::Received => "",
            };
            let style = if m.is_mine() && visibility == Visibility::Visible { style.fg(Color::Blue) } else { style };

            let full = format!("{}{}{}", prefix, body, ticks);
            wrap(&full, wrap_width)
                .into_iter()
                .map(|l| ListItem::new(Text::from(l.into_owned())).style(style))
                .collect::<Vec<_>>()
        })
        .collect();

    let mut list_state = ListState::default();
    if !items.is_empty() {
        list_state.select(Some(items.len() - 1));
    }

    let title = format!("{} with {}", ui.kind.title(), ui.names.partner());
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default());
    f.render_stateful_widget(list, area, &mut list_state);
}

fn draw_notes<B: Backend>(f: &mut Frame<B>, pad: &SharedNotepad<SystemClock>, area: Rect, ui: &ChatUI, now: DateTime<Utc>) {
    let wrap_width = area.width.saturating_sub(2).max(1) as usize;

    let items: Vec<ListItem> = pad
        .visible()
        .flat_map(|note| {
            let author = ui.sender_name(note.author);
            let heart = if note.liked { "♥" } else { "♡" };
            let full = format!("[{}] {} {} {}: {}", format_age(note.created_at, now), author, heart, note.likes, note.text);
            wrap(&full, wrap_width)
                .into_iter()
                .map(|l| ListItem::new(Text::from(l.into_owned())))
                .collect::<Vec<_>>()
        })
        .collect();

    let filter = match pad.filter() {
        NoteFilter::All => "all",
        NoteFilter::Mine => ui.names.user(),
        NoteFilter::Theirs => ui.names.partner(),
    };
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(format!("Daily Dose Notepad ({})", filter)));
    f.render_widget(list, area);
}

fn draw_view_once<B: Backend>(f: &mut Frame<B>, message: &Message, visibility: Option<Visibility>, area: Rect, sender: &str) {
    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = 10.min(area.height.saturating_sub(4));
    let popup_area = Rect::new(
        (area.width - popup_width) / 2,
        (area.height - popup_height) / 2,
        popup_width,
        popup_height,
    );
    f.render_widget(Clear, popup_area);

    // Last second of the reveal window shows the "viewed" stamp
    let stamped = matches!(visibility, Some(Visibility::VisibleWithCountdown { remaining }) if remaining.num_milliseconds() <= 1000);
    let mut lines: Vec<Line> = wrap(&message.text, popup_width.saturating_sub(4).max(1) as usize)
        .into_iter()
        .map(|l| Line::from(l.into_owned()))
        .collect();
    if stamped {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("VIEWED", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD))));
    }

    let popup = Paragraph::new(lines).block(
        Block::default()
            .title(format!("From {} (Ctrl+X to close)", sender))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(popup, popup_area);
}

/// Returns the terminal and whether it will report key release events.
pub fn setup_terminal() -> Result<(Terminal<CrosstermBackend<io::Stdout>>, bool)> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    // Key release events make the long-press exit work; not every terminal has them
    let release_events = crossterm::terminal::supports_keyboard_enhancement().unwrap_or(false);
    if release_events {
        execute!(stdout, PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES))?;
    }
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok((terminal, release_events))
}

pub fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    if crossterm::terminal::supports_keyboard_enhancement().unwrap_or(false) {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)?;
    }
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
