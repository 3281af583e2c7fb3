//! JSON Lines file store for readings.
//!
//! Uses JSON Lines format (.jsonl) for robustness:
//! - Each line is a complete reading document
//! - Partial file corruption only affects individual lines
//! - Files are opened in append mode and rotated daily

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aero_core::Reading;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{PersistenceError, PersistenceResult};
use crate::store::{BoxFuture, ReadingStore};

/// Active writer state for daily file.
struct ActiveWriter {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
    /// File length after the last fully written record.
    committed_len: u64,
}

/// Drop a writer after a failed append without flushing what it buffered.
fn discard_writer(active: ActiveWriter) {
    // into_parts hands back the file without the flush Drop would do.
    let (file, _unflushed) = active.writer.into_parts();
    if let Err(e) = file.set_len(active.committed_len) {
        warn!(
            error = %e,
            date = %active.date,
            "Failed to truncate partial record"
        );
    }
    warn!(date = %active.date, "Append failed, discarded unwritten record");
}

/// Synchronous JSON Lines writer for reading documents.
///
/// Every append is flushed before returning, so a successful append means
/// the line reached the OS.
pub struct JsonLinesWriter {
    /// Base directory for output files.
    base_dir: PathBuf,
    /// Active writer (open until date rotation).
    active_writer: Option<ActiveWriter>,
}

impl JsonLinesWriter {
    /// Create a new JSON Lines writer, creating `base_dir` if needed.
    pub fn new(base_dir: impl AsRef<Path>) -> PersistenceResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;

        Ok(Self {
            base_dir,
            active_writer: None,
        })
    }

    /// Path of the collection file for a given date (`YYYY-MM-DD`).
    pub fn file_path(&self, date: &str) -> PathBuf {
        self.base_dir.join(format!("readings_{date}.jsonl"))
    }

    /// Append one reading and flush.
    ///
    /// On failure nothing of this reading stays behind: buffered bytes are
    /// discarded and the file is truncated back to its last complete line.
    pub fn append(&mut self, reading: &Reading) -> PersistenceResult<()> {
        let today = Utc::now().format("%Y-%m-%d").to_string();

        let needs_rotation = self
            .active_writer
            .as_ref()
            .map(|w| w.date != today)
            .unwrap_or(false);

        if needs_rotation {
            self.close_active_writer();
        }

        let json = serde_json::to_string(reading)?;

        let mut active = match self.active_writer.take() {
            Some(active) => active,
            None => self.open_writer(&today)?,
        };

        let written = writeln!(active.writer, "{json}").and_then(|()| active.writer.flush());
        if let Err(e) = written {
            discard_writer(active);
            return Err(e.into());
        }

        active.committed_len += json.len() as u64 + 1;
        active.records_written += 1;

        debug!(
            date = %active.date,
            records = active.records_written,
            "Appended reading"
        );

        self.active_writer = Some(active);
        Ok(())
    }

    fn open_writer(&self, date: &str) -> PersistenceResult<ActiveWriter> {
        let path = self.file_path(date);
        info!(path = %path.display(), "Opening JSON Lines store (append mode)");

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let committed_len = file.metadata()?.len();

        Ok(ActiveWriter {
            writer: BufWriter::new(file),
            date: date.to_string(),
            records_written: 0,
            committed_len,
        })
    }

    fn close_active_writer(&mut self) {
        if let Some(mut active) = self.active_writer.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush writer on close");
            }
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed JSON Lines store file"
            );
        }
    }

    /// Close the current file, if any.
    pub fn close(&mut self) {
        self.close_active_writer();
    }
}

impl Drop for JsonLinesWriter {
    fn drop(&mut self) {
        self.close_active_writer();
    }
}

/// Async [`ReadingStore`] over a [`JsonLinesWriter`].
///
/// File I/O runs on the blocking pool; saves are serialized by the inner lock.
#[derive(Clone)]
pub struct JsonLinesStore {
    writer: Arc<Mutex<JsonLinesWriter>>,
}

impl JsonLinesStore {
    pub fn open(base_dir: impl AsRef<Path>) -> PersistenceResult<Self> {
        let writer = JsonLinesWriter::new(base_dir)?;
        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
        })
    }
}

impl ReadingStore for JsonLinesStore {
    fn save(&self, reading: Reading) -> BoxFuture<'_, PersistenceResult<()>> {
        let writer = Arc::clone(&self.writer);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || writer.lock().append(&reading))
                .await
                .map_err(|e| PersistenceError::Task(e.to_string()))?
        })
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}
