//! Console-backed `log` implementation.
//!
//! Each record takes the console lock once, so lines from different harts never interleave.

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Once;

use crate::console::Terminal;

/// The global logger.
static LOGGER: ConsoleLogger = ConsoleLogger::new();

/// Writes `[LEVEL] target: message` lines to a [`Terminal`].
pub struct ConsoleLogger {
    terminal: Once<&'static dyn Terminal>,
}

impl ConsoleLogger {
    pub const fn new() -> Self {
        ConsoleLogger {
            terminal: Once::new(),
        }
    }

    /// Attaches the terminal. Later calls keep the first terminal.
    pub fn attach(&self, terminal: &'static dyn Terminal) {
        self.terminal.call_once(|| terminal);
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level() && self.terminal.is_completed()
    }

    fn log(&self, record: &Record<'_>) {
        if let Some(terminal) = self.terminal.get() {
            terminal.write_fmt(format_args!(
                "[{}] {}: {}\r\n",
                record.level(),
                record.target(),
                record.args()
            ));
        }
    }

    fn flush(&self) {}
}

/// Installs the console logger with the given maximum level.
pub fn init(terminal: &'static dyn Terminal, level: LevelFilter) -> Result<(), SetLoggerError> {
    LOGGER.attach(terminal);
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Console;
    use crate::platform::NoInterrupts;
    use crate::testing::RecordingSink;

    #[test]
    fn records_are_formatted_as_lines() {
        let sink = RecordingSink::new();
        let console: &'static Console<RecordingSink> =
            Box::leak(Box::new(Console::new(sink.clone(), &NoInterrupts)));
        let logger = ConsoleLogger::new();
        logger.attach(console);
        logger.log(
            &Record::builder()
                .level(log::Level::Warn)
                .target("monitor::boot")
                .args(format_args!("hart {} silent", 2))
                .build(),
        );
        assert_eq!(sink.contents(), "[WARN] monitor::boot: hart 2 silent\r\n");
    }

    #[test]
    fn detached_logger_drops_records() {
        let logger = ConsoleLogger::new();
        logger.log(&Record::builder().args(format_args!("lost")).build());
        assert!(!logger.enabled(&Metadata::builder().level(log::Level::Error).build()));
    }
}
