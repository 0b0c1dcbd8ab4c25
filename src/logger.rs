use colored::{Color, ColoredString, Colorize};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};

/// Process wide logger. Messages logged before the configuration is resolved
/// are held back until [`BuildLogger::print_deferred`], so they can be
/// filtered by the configured level.
pub struct BuildLogger {
    level: Mutex<LevelFilter>,
    output: Mutex<Box<dyn Write + Send>>,
    deferred: Mutex<Option<Vec<(Level, ColoredString)>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn level_color(level: Level) -> Color {
    match level {
        Level::Error => Color::Red,
        Level::Warn => Color::Yellow,
        Level::Info => Color::White,
        Level::Debug => Color::Blue,
        Level::Trace => Color::BrightBlack,
    }
}

fn format_record(record: &Record) -> ColoredString {
    let color = level_color(record.level());
    let level = format!("{:<5}", record.level()).color(color);
    format!("[{}] {}: {}", level, record.target(), record.args()).color(color)
}

impl BuildLogger {
    pub fn new(level: LevelFilter) -> &'static Self {
        Self::with_output(level, Box::new(io::stderr()))
    }

    fn with_output(
        level: LevelFilter,
        output: Box<dyn Write + Send>,
    ) -> &'static Self {
        Box::leak(Box::new(Self {
            level: Mutex::new(level),
            output: Mutex::new(output),
            deferred: Mutex::new(Some(Vec::new())),
        }))
    }

    pub fn init(&'static self) -> Result<&'static Self, log::SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(LevelFilter::Trace);
        Ok(self)
    }

    pub fn set_level(&self, level: LevelFilter) {
        *lock(&self.level) = level;
    }

    /// Write out whatever was held back that passes the current level, and
    /// log directly from now on.
    pub fn print_deferred(&self) {
        let Some(deferred) = lock(&self.deferred).take() else {
            return;
        };
        let level_filter = *lock(&self.level);
        let mut output = lock(&self.output);
        for (level, message) in deferred {
            if level <= level_filter {
                let _ = writeln!(output, "{}", message);
            }
        }
    }
}

impl Log for BuildLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= *lock(&self.level)
    }

    fn log(&self, record: &Record) {
        let line = format_record(record);
        if let Some(deferred) = lock(&self.deferred).as_mut() {
            deferred.push((record.level(), line));
            return;
        }
        if self.enabled(record.metadata()) {
            let _ = writeln!(lock(&self.output), "{}", line);
        }
    }

    fn flush(&self) {
        let _ = lock(&self.output).flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn emit(logger: &BuildLogger, level: Level, message: &str) {
        logger.log(
            &Record::builder()
                .level(level)
                .target("solbuild")
                .args(format_args!("{}", message))
                .build(),
        );
    }

    #[test]
    fn test_deferred_messages_filtered_by_final_level() {
        colored::control::set_override(false);
        let captured = Captured::default();
        let logger = BuildLogger::with_output(
            LevelFilter::Trace,
            Box::new(captured.clone()),
        );

        emit(logger, Level::Debug, "loading config");
        emit(logger, Level::Warn, "odd config");
        assert_eq!(captured.text(), "");

        logger.set_level(LevelFilter::Info);
        logger.print_deferred();
        assert_eq!(captured.text(), "[WARN ] solbuild: odd config\n");

        emit(logger, Level::Info, "building");
        emit(logger, Level::Trace, "noise");
        assert_eq!(
            captured.text(),
            "[WARN ] solbuild: odd config\n[INFO ] solbuild: building\n"
        );
    }
}
