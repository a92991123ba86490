use anyhow::{anyhow, Context, Result};
use chrono::Duration;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::conversation::ConversationConfig;
use crate::power_exit::PowerExit;

pub const DATA_DIR_ENV: &str = "WHISPERBOX_DATA_DIR";
pub const SETTINGS_FILE: &str = "settings.json";
pub const STORE_FILE: &str = "store.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tick_period_ms: i64,
    pub timed_ttl_secs: i64,
    pub view_once_reveal_ms: i64,
    pub power_exit_hold_ms: i64,
    pub power_exit_delay_ms: i64,
    pub notepad_save_delay_ms: i64,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            tick_period_ms: crate::conversation::expiry::DEFAULT_TICK_PERIOD_MS,
            timed_ttl_secs: crate::conversation::TIMED_TTL_SECS,
            view_once_reveal_ms: crate::conversation::VIEW_ONCE_REVEAL_MS,
            power_exit_hold_ms: crate::power_exit::HOLD_MS,
            power_exit_delay_ms: crate::power_exit::EXIT_DELAY_MS,
            notepad_save_delay_ms: crate::notepad::SAVE_DELAY_MS,
            log_level: "debug".to_string(),
        }
    }
}

impl Settings {
    /// Load `settings.json` from `dir`. A missing file means defaults.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(SETTINGS_FILE);
        if !path.exists() {
            return Ok(Settings::default());
        }

        let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        let settings: Settings =
            serde_json::from_reader(file).with_context(|| format!("parsing {}", path.display()))?;
        settings.validate()?;

        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        let positive = [
            ("tick_period_ms", self.tick_period_ms),
            ("view_once_reveal_ms", self.view_once_reveal_ms),
            ("power_exit_hold_ms", self.power_exit_hold_ms),
        ];
        for (name, value) in positive {
            if value <= 0 {
                return Err(anyhow!("{} must be positive, got {}", name, value));
            }
        }
        if self.timed_ttl_secs < 0 || self.power_exit_delay_ms < 0 || self.notepad_save_delay_ms < 0 {
            return Err(anyhow!("durations must not be negative"));
        }
        Ok(())
    }

    /// Apply these timings to a panel preset.
    pub fn tune(&self, mut config: ConversationConfig) -> ConversationConfig {
        config.tick_period = Duration::milliseconds(self.tick_period_ms);
        config.timed_ttl = Duration::seconds(self.timed_ttl_secs);
        config.view_once_reveal = Duration::milliseconds(self.view_once_reveal_ms);
        config
    }

    pub fn power_exit(&self) -> PowerExit {
        PowerExit::new(
            Duration::milliseconds(self.power_exit_hold_ms),
            Duration::milliseconds(self.power_exit_delay_ms),
        )
    }

    pub fn notepad_save_delay(&self) -> Duration {
        Duration::milliseconds(self.notepad_save_delay_ms)
    }

    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Debug)
    }
}

/// Where settings and the key-value store live: an explicit directory, then
/// `WHISPERBOX_DATA_DIR`, then the platform config directory.
pub fn data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join("whisperbox");
    Ok(dir)
}
