//! # Console Logging Backend
//!
//! A [`log`] implementation that renders records onto whatever console the
//! platform provides. The memory-management crates only ever talk to the
//! `log` facade; the bring-up sequence installs a [`ConsoleLogger`] over the
//! platform's [`ConsoleSink`] once the console driver is up.

#![cfg_attr(not(any(test, doctest)), no_std)]

use core::fmt::Write;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// A non-blocking character sink, typically the VGA/serial console driver.
///
/// Output has no failure mode; whatever cannot be displayed is dropped.
pub trait ConsoleSink: Sync {
    fn puts(&self, s: &str);
}

/// Adapts a [`ConsoleSink`] to `core::fmt::Write` so records can be formatted
/// without allocating.
struct SinkWriter<'a>(&'a dyn ConsoleSink);

impl Write for SinkWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.0.puts(s);
        Ok(())
    }
}

pub struct ConsoleLogger {
    sink: &'static dyn ConsoleSink,
    max_level: LevelFilter,
}

impl ConsoleLogger {
    #[must_use]
    pub const fn new(sink: &'static dyn ConsoleSink, max_level: LevelFilter) -> Self {
        Self { sink, max_level }
    }

    /// Call this once during early init, before the first pool is built.
    #[allow(static_mut_refs, clippy::missing_errors_doc)]
    pub fn init(self) -> Result<(), SetLoggerError> {
        // log::set_logger wants a &'static Log; park the logger in a static.
        static mut LOGGER: Option<ConsoleLogger> = None;

        let max_level = self.max_level;
        unsafe {
            LOGGER = Some(self);
            log::set_logger(LOGGER.as_ref().unwrap() as &'static dyn Log)?;
        }
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Format: "[LEVEL] target: message\n", streamed straight into the
        // sink so no buffer is needed.
        let _ = writeln!(
            SinkWriter(self.sink),
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        // nothing buffered
    }
}
