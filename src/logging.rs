//! Server logger construction.
//!
//! The logger is built once at startup and handed to the request handlers as
//! a [`ServerLog`]. The same instance backs the `log` facade so everything in
//! the process writes to one sink.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{LevelFilter, Log, Metadata, Record};

/// Shareable handle to the process logger.
#[derive(Clone)]
pub struct ServerLog {
    inner: Arc<dyn Log>,
}

impl ServerLog {
    pub fn new(logger: impl Log + 'static) -> Self {
        Self {
            inner: Arc::new(logger),
        }
    }

    /// Build the daemon logger: `RUST_LOG` aware, `info` by default, writing
    /// to `log_file` (append) or stderr.
    pub fn build(log_file: Option<&Path>) -> Result<(Self, LevelFilter)> {
        let mut builder = env_logger::Builder::new();
        builder
            .filter_level(LevelFilter::Info)
            .parse_default_env()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{} {} {}:{}] {}",
                    buf.timestamp_millis(),
                    record.level(),
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            });

        if let Some(path) = log_file {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }

        let logger = builder.build();
        let level = logger.filter();
        Ok((Self::new(logger), level))
    }

    /// Route the global `log` macros through this logger as well.
    pub fn install_global(&self, level: LevelFilter) -> Result<()> {
        log::set_boxed_logger(Box::new(self.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to install global logger: {e}"))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for ServerLog {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        self.inner.log(record)
    }

    fn flush(&self) {
        self.inner.flush()
    }
}

impl std::fmt::Debug for ServerLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ServerLog")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Vec<String>>);

    impl Log for Capture {
        fn enabled(&self, _: &Metadata<'_>) -> bool {
            true
        }
        fn log(&self, record: &Record<'_>) {
            self.0.lock().unwrap().push(record.args().to_string());
        }
        fn flush(&self) {}
    }

    #[test]
    fn forwards_records_to_inner_logger() {
        let capture = Arc::new(Capture::default());
        let log = ServerLog {
            inner: capture.clone(),
        };
        log::set_max_level(LevelFilter::Trace);
        log::error!(logger: log, "manifest unreadable: {}", "boom");
        assert_eq!(capture.0.lock().unwrap().as_slice(), ["manifest unreadable: boom"]);
    }

    #[test]
    fn appends_to_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        std::fs::write(&path, "existing\n").unwrap();

        let (log, level) = ServerLog::build(Some(&path)).unwrap();
        assert!(level >= LevelFilter::Error);
        log::set_max_level(LevelFilter::Trace);
        log::error!(logger: log, "written to file");
        log.flush();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("existing\n"));
        assert!(text.contains("ERROR"));
        assert!(text.contains("written to file"));
    }
}
