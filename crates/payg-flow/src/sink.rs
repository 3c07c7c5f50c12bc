//! Diagnostic sink: the run's append-only, timestamped test log.
//!
//! Each entry becomes one line `[DD/MM/YYYY, HH:MM:SS] [<label>] <message>`.
//! The file handle is held for the sink's lifetime and every line is flushed
//! before `log` returns, so entries survive a crash of the caller. Write
//! failures are downgraded to a `tracing` warning and never reach the
//! scenario.

use chrono::{Local, NaiveDateTime};
use console::Term;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Timestamp format of a log line
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y, %H:%M:%S";

/// Clock used to stamp entries
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// One log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    /// When the entry was emitted
    pub timestamp: NaiveDateTime,
    /// Calling-context label
    pub label: String,
    /// Free text
    pub message: String,
}

impl fmt::Display for DiagnosticEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] [{}] {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.label,
            self.message
        )
    }
}

/// Process-wide append-only log writer
pub struct DiagnosticSink {
    path: Option<PathBuf>,
    file: Option<Mutex<File>>,
    verbosity: u8,
    clock: Clock,
    captured: Option<Mutex<Vec<DiagnosticEntry>>>,
}

impl fmt::Debug for DiagnosticSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticSink")
            .field("path", &self.path)
            .field("writable", &self.file.is_some())
            .field("verbosity", &self.verbosity)
            .field("capturing", &self.captured.is_some())
            .finish()
    }
}

impl DiagnosticSink {
    /// Open (or create) `path` for appending.
    ///
    /// An unwritable path yields a sink that only mirrors to the console;
    /// the failure is reported as a warning.
    #[must_use]
    pub fn open(path: impl AsRef<Path>, verbosity: u8) -> Self {
        let path = path.as_ref().to_path_buf();
        let file = match Self::open_append(&path) {
            Ok(f) => Some(Mutex::new(f)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "diagnostic log is not writable");
                None
            }
        };
        Self {
            path: Some(path),
            file,
            verbosity,
            clock: Arc::new(|| Local::now().naive_local()),
            captured: None,
        }
    }

    /// A sink with no backing file
    #[must_use]
    pub fn disabled(verbosity: u8) -> Self {
        Self {
            path: None,
            file: None,
            verbosity,
            clock: Arc::new(|| Local::now().naive_local()),
            captured: None,
        }
    }

    fn open_append(path: &Path) -> std::io::Result<File> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(path)
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> NaiveDateTime + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Keep a copy of every entry in memory
    #[must_use]
    pub fn with_capture(mut self) -> Self {
        self.captured = Some(Mutex::new(Vec::new()));
        self
    }

    /// Backing file, if any
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether entries reach a file
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.file.is_some()
    }

    /// Console mirroring level
    #[must_use]
    pub const fn verbosity(&self) -> u8 {
        self.verbosity
    }

    /// Append one entry. Never fails.
    pub fn log(&self, label: &str, message: impl Into<String>) {
        let entry = DiagnosticEntry {
            timestamp: (self.clock)(),
            label: label.to_string(),
            message: message.into(),
        };
        let line = entry.to_string();

        tracing::debug!(label = %entry.label, "{}", entry.message);

        if let Some(file) = &self.file {
            if let Err(e) = Self::append_line(file, &line) {
                tracing::warn!(error = %e, "failed to append diagnostic entry");
            }
        }

        if self.verbosity >= 1 {
            let _ = Term::stdout().write_line(&line);
        }

        if let Some(captured) = &self.captured {
            if let Ok(mut entries) = captured.lock() {
                entries.push(entry);
            }
        }
    }

    fn append_line(file: &Mutex<File>, line: &str) -> std::io::Result<()> {
        let mut guard = file
            .lock()
            .map_err(|_| std::io::Error::other("diagnostic log lock poisoned"))?;
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        guard.write_all(buf.as_bytes())?;
        guard.flush()
    }

    /// Entries captured so far (empty unless [`with_capture`](Self::with_capture))
    #[must_use]
    pub fn entries(&self) -> Vec<DiagnosticEntry> {
        self.captured
            .as_ref()
            .and_then(|c| c.lock().ok().map(|e| e.clone()))
            .unwrap_or_default()
    }

    /// Captured entries whose message mentions `needle`
    #[must_use]
    pub fn entries_mentioning(&self, needle: &str) -> Vec<DiagnosticEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.message.contains(needle))
            .collect()
    }
}
