//! Minimal `log` backend writing to stderr, so stdout carries only captured events.

use log::{Level, LevelFilter, Log, Metadata, ParseLevelError, Record};
use owo_colors::OwoColorize;

pub struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            Level::Error => format!("{}", "ERROR".red()),
            Level::Warn => format!("{}", "WARN".yellow()),
            Level::Info => format!("{}", "INFO".green()),
            Level::Debug => "DEBUG".to_string(),
            Level::Trace => "TRACE".to_string(),
        };
        eprintln!("[{}][{}] {}", level, record.target(), record.args());
    }

    fn flush(&self) {}
}

/// Level names are case-insensitive; a blank value means `warn`.
pub fn parse_level(s: &str) -> Result<LevelFilter, ParseLevelError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(LevelFilter::Warn);
    }
    s.parse()
}

pub fn init(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    static LOGGER: StderrLogger = StderrLogger;
    log::set_logger(&LOGGER).map(|()| log::set_max_level(level))
}
