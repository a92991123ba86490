use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::{env, io};

mod ui;
mod utils;

use crate::ui::{ChatUI, PanelKind, UiCommand};
use whisperbox::config::{self, Settings};
use whisperbox::names::ChatNames;
use whisperbox::session::{self, Credentials, Session};
use whisperbox::storage::{FileStore, KeyValueStore, MemoryStore};

/// Command line arguments for Whisperbox
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Whisperbox: a terminal chat with disappearing and view-once messages.",
    long_about = "Whisperbox is a local, single-user terminal chat with a simulated peer.\n\n\
    Messages can be sent as timed (gone after a fixed interval) or view-once\n\
    (gone shortly after being opened). Names and the signed-in user persist\n\
    in the data directory.\n\n\
    Use -h or --help to see all options."
)]
struct Args {
    /// Directory for settings, saved names and the session
    #[arg(long, value_name = "PATH", help = "Override the data directory (also WHISPERBOX_DATA_DIR)")]
    data_dir: Option<PathBuf>,

    /// Panel to open first
    #[arg(long, value_enum, default_value = "chat")]
    panel: PanelKind,

    /// Log file, defaults to whisperbox.log in the data directory
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Forget the saved session and exit
    #[arg(long)]
    logout: bool,
}

/// Sign-in attempts before giving up on interactive input
const MAX_SIGN_IN_ATTEMPTS: usize = 3;

/// Reads one credential from the environment, or prompts for it
fn credential(var: &str, prompt: &str) -> Result<String> {
    match env::var(var) {
        Ok(value) => Ok(value),
        Err(_) => {
            eprintln!("{}", prompt);
            utils::read_line().context("Sign-in needs input on stdin")
        }
    }
}

fn prompt_credentials() -> Result<Credentials> {
    let email = credential("WHISPERBOX_EMAIL", "Enter email:")?;
    let password = credential("WHISPERBOX_PASSWORD", "Enter password:")?;
    Ok(Credentials::Password { email, password })
}

fn open_store(path: PathBuf) -> Box<dyn KeyValueStore> {
    match FileStore::open(&path) {
        Ok(store) => Box::new(store),
        Err(e) => {
            // Names and session will not survive this run
            warn!("Falling back to in-memory store: {}", e);
            Box::new(MemoryStore::new())
        }
    }
}

fn sign_in(store: &mut dyn KeyValueStore) -> Result<Session> {
    match session::restore(&*store) {
        Ok(Some(session)) => return Ok(session),
        Ok(None) => {}
        Err(e) => warn!("Ignoring saved session: {}", e),
    }

    for attempt in 1..=MAX_SIGN_IN_ATTEMPTS {
        match session::init(store, &prompt_credentials()?) {
            Ok(session) => return Ok(session),
            Err(e @ session::SessionError::MissingField(_)) => {
                warn!("Sign-in attempt {} rejected: {}", attempt, e);
                eprintln!("Sign-in failed: {}, try again.", e);
            }
            Err(e) => return Err(e).context("Failed to sign in"),
        }
    }
    anyhow::bail!("Sign-in failed after {} attempts", MAX_SIGN_IN_ATTEMPTS)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments FIRST
    let args = Args::parse();

    let data_dir = config::data_dir(args.data_dir.as_deref())?;
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        eprintln!("Warning: Failed to create data directory {}: {}", data_dir.display(), e);
    }

    let settings = Settings::load(&data_dir)?;
    let log_file_path = args.log_file.clone().unwrap_or_else(|| data_dir.join("whisperbox.log"));
    utils::setup_logging(Some(&log_file_path), settings.level_filter())?;

    info!("Whisperbox starting up");
    info!("System information: {} {}", std::env::consts::OS, std::env::consts::ARCH);
    info!("Logging to file: {}", log_file_path.display());
    info!("Data directory: {}", data_dir.display());

    let mut store = open_store(data_dir.join(config::STORE_FILE));

    if args.logout {
        match session::restore(&*store)? {
            Some(session) => {
                let name = session.display_name().to_string();
                session::teardown(&mut *store, session)?;
                println!("Signed out {}", name);
            }
            None => println!("No saved session"),
        }
        return Ok(());
    }

    let session = sign_in(&mut *store)?;
    let names = ChatNames::load(&*store)?;

    let (mut terminal, release_events) = ui::setup_terminal()?;
    let mut chat_ui = ChatUI::new(args.panel, names, session.display_name(), settings, release_events);

    let result = run_main_loop(&mut chat_ui, &mut terminal, &mut *store).await;

    chat_ui.shutdown();
    ui::restore_terminal(terminal)?;

    if let Err(e) = &result {
        error!("Main loop failed: {:#}", e);
    }
    info!("Whisperbox exiting");
    result
}

async fn run_main_loop(
    chat_ui: &mut ChatUI,
    terminal: &mut ui::Terminal<ui::CrosstermBackend<io::Stdout>>,
    store: &mut dyn KeyValueStore,
) -> Result<()> {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_millis(100));

    loop {
        // Draw the UI
        terminal.draw(|f| chat_ui.draw(f))?;

        // Handle user input
        match chat_ui.handle_input()? {
            Some(UiCommand::Quit) => {
                info!("Quit requested");
                return Ok(());
            }
            Some(UiCommand::RenameUser(name)) => match chat_ui.names_mut().rename_user(store, &name) {
                Ok(true) => chat_ui.set_status("Name updated"),
                Ok(false) => chat_ui.set_status("Name cannot be blank"),
                Err(e) => {
                    error!("Failed to save user name: {}", e);
                    chat_ui.set_status("Could not save name");
                }
            },
            Some(UiCommand::RenamePartner(name)) => match chat_ui.names_mut().rename_partner(store, &name) {
                Ok(true) => chat_ui.set_status("Partner name updated"),
                Ok(false) => chat_ui.set_status("Name cannot be blank"),
                Err(e) => {
                    error!("Failed to save partner name: {}", e);
                    chat_ui.set_status("Could not save name");
                }
            },
            None => {}
        }

        // Timers: expiry ticks, peer replies, notepad saves, power exit
        if chat_ui.pump() {
            info!("Power exit triggered");
            return Ok(());
        }

        interval.tick().await;
    }
}
