use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use log::{LevelFilter, Record};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Mutex;

// Logging and small formatting helpers shared by the terminal front-end.

pub struct SimpleLogger {
    log_file: Option<Mutex<File>>,
}

impl SimpleLogger {
    pub fn new(log_file_path: Option<&Path>) -> Result<Self> {
        let log_file = if let Some(path) = log_file_path {
            Some(Mutex::new(OpenOptions::new().create(true).append(true).open(path)?))
        } else {
            None
        };

        Ok(SimpleLogger { log_file })
    }
}

impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now: DateTime<Local> = Local::now();
            let log_message = format!(
                "[{}] {} [{}:{}] {}\n",
                now.format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            );

            if let Some(file) = &self.log_file {
                if let Ok(mut file) = file.lock() {
                    let _ = file.write_all(log_message.as_bytes());
                }
            } else {
                // The terminal UI owns stdout, so without a file we write to stderr
                eprint!("{}", log_message);
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.log_file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

/// Read a line of input from stdin, trimming whitespace
pub fn read_line() -> Result<String> {
    read_line_from(&mut std::io::stdin().lock())
}

/// Read one trimmed line. End of input is an error, not an empty line.
pub fn read_line_from<R: BufRead>(reader: &mut R) -> Result<String> {
    let mut input = String::new();
    if reader.read_line(&mut input)? == 0 {
        anyhow::bail!("input closed");
    }
    Ok(input.trim().to_string())
}

pub fn setup_logging(log_file: Option<&Path>, level: LevelFilter) -> Result<()> {
    let logger = SimpleLogger::new(log_file)?;
    log::set_boxed_logger(Box::new(logger)).map(|()| log::set_max_level(level))?;

    log::info!("Logging initialized at level: {}", level);
    log::info!("App version: {} ({})", env!("CARGO_PKG_VERSION"), env!("CARGO_PKG_NAME"));

    Ok(())
}

/// "just now", "5 minutes ago", "2 days ago"
pub fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now - at;
    let plural = |n: i64, unit: &str| {
        if n == 1 {
            format!("1 {} ago", unit)
        } else {
            format!("{} {}s ago", n, unit)
        }
    };

    if age.num_seconds() < 45 {
        "just now".to_string()
    } else if age.num_minutes() < 60 {
        plural(age.num_minutes().max(1), "minute")
    } else if age.num_hours() < 24 {
        plural(age.num_hours(), "hour")
    } else {
        plural(age.num_days(), "day")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::io::Cursor;

    #[test]
    fn test_read_line_stops_at_end_of_input() {
        let mut input = Cursor::new("  grace@example.com \n");
        assert_eq!(read_line_from(&mut input).unwrap(), "grace@example.com");
        assert!(read_line_from(&mut input).is_err());

        let mut blank = Cursor::new("\n");
        assert_eq!(read_line_from(&mut blank).unwrap(), "");
    }

    #[test]
    fn test_format_age() {
        let now = Utc::now();
        assert_eq!(format_age(now, now), "just now");
        assert_eq!(format_age(now - Duration::seconds(50), now), "1 minute ago");
        assert_eq!(format_age(now - Duration::minutes(30), now), "30 minutes ago");
        assert_eq!(format_age(now - Duration::hours(1), now), "1 hour ago");
        assert_eq!(format_age(now - Duration::days(3), now), "3 days ago");
    }
}
