//! Logging setup and the observability handle passed to components.
//!
//! On startup:
//! 1. Rotates existing logs (chat.log → chat.log.1 → .2 → .3, keeps last 3).
//! 2. Opens a fresh chat.log with a line-flushing writer.
//! 3. Logs a startup banner with the log path.
//!
//! Components get a child of the root span at construction and instrument
//! their async work with it.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;

/// Rotated log files kept beside the current one.
const KEEP_LOGS: u32 = 3;

const DEFAULT_FILTER: &str = "toolchat=info,warn";

/// Handle to the installed subscriber.
///
/// Flush it on shutdown so the last lines reach disk.
pub struct Telemetry {
    log_path: Option<PathBuf>,
    writer: Option<FlushingWriter>,
    root: tracing::Span,
}

impl Telemetry {
    /// Install the global subscriber. Logs go to `{data_dir}/chat.log`, or
    /// to stderr when `to_stderr` is set.
    pub fn init(to_stderr: bool) -> anyhow::Result<Self> {
        use tracing_subscriber::fmt;
        use tracing_subscriber::EnvFilter;

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let (log_path, writer) = if to_stderr {
            fmt::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;
            (None, None)
        } else {
            let log_dir = crate::data_dir();
            std::fs::create_dir_all(&log_dir)
                .with_context(|| format!("failed to create {}", log_dir.display()))?;

            let log_path = log_dir.join("chat.log");
            rotate_log_file(&log_path, KEEP_LOGS);

            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .with_context(|| format!("failed to open {}", log_path.display()))?;
            let writer = FlushingWriter::new(log_file);

            fmt::fmt()
                .with_env_filter(filter)
                .with_writer(writer.clone())
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;
            (Some(log_path), Some(writer))
        };

        let telemetry = Self {
            log_path,
            writer,
            root: tracing::info_span!("toolchat"),
        };

        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            log_file = %telemetry
                .log_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "stderr".into()),
            pid = std::process::id(),
            "=== toolchat starting ==="
        );

        Ok(telemetry)
    }

    /// A handle that records nothing, for tests and embedding.
    pub fn disabled() -> Self {
        Self {
            log_path: None,
            writer: None,
            root: tracing::Span::none(),
        }
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Parent span for sessions.
    pub fn root(&self) -> &tracing::Span {
        &self.root
    }

    pub fn inference_span(&self, base_url: &str) -> tracing::Span {
        tracing::info_span!(parent: &self.root, "inference", endpoint = %base_url)
    }

    pub fn orchestrator_span(&self) -> tracing::Span {
        tracing::info_span!(parent: &self.root, "chat")
    }

    /// Write out anything still buffered.
    pub fn flush(&self) {
        tracing::info!("=== toolchat stopping ===");
        if let Some(writer) = &self.writer {
            let _ = writer.clone().flush();
        }
    }
}

/// Rotate log files: `chat.log` → `chat.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer over `std::fs::File` that flushes after every write, so each log
/// line is on disk even if the process dies.
#[derive(Clone)]
struct FlushingWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = f.write(buf)?;
        f.flush()?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        f.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_log_file_shifts_and_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("chat.log");
        std::fs::write(&base, "current").unwrap();
        std::fs::write(dir.path().join("chat.log.1"), "one").unwrap();
        std::fs::write(dir.path().join("chat.log.3"), "three").unwrap();

        rotate_log_file(&base, 3);

        assert!(!base.exists());
        let read = |name: &str| std::fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(read("chat.log.1"), "current");
        assert_eq!(read("chat.log.2"), "one");
        // The old .3 was deleted, and nothing shifted into it.
        assert!(!dir.path().join("chat.log.3").exists());
    }

    #[test]
    fn test_rotate_without_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        rotate_log_file(&dir.path().join("chat.log"), 3);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_flushing_writer_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = FlushingWriter::new(file);
        writer.write_all(b"line one\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line one\n");
    }

    #[test]
    fn test_disabled_telemetry() {
        let telemetry = Telemetry::disabled();
        assert!(telemetry.log_path().is_none());
        assert!(telemetry.root().is_none());
        telemetry.flush();
    }
}
