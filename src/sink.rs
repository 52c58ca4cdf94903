//! Where categorized feedback ends up.
//!
//! [`LogFeedbackSink`] appends one JSON line per record to an optional
//! rotating file and always emits a structured `tracing` event.
//! [`MemorySink`] keeps records in memory for embedding and tests.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::feedback::FeedbackRecord;

#[async_trait::async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn record(&self, record: &FeedbackRecord);
}

/// Size-based rotating writer.  Backups are `<path>.1` .. `<path>.<keep>`,
/// newest first; with compression on each backup is `<path>.<n>.gz`.
pub struct RotatingWriter {
    path: PathBuf,
    file: std::fs::File,
    max_bytes: Option<u64>,
    keep: usize,
    compress: bool,
}

impl RotatingWriter {
    pub fn open(
        path: &str,
        max_bytes: Option<u64>,
        keep: usize,
        compress: bool,
    ) -> std::io::Result<Self> {
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            path: PathBuf::from(path),
            file,
            max_bytes,
            keep,
            compress,
        })
    }

    pub fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        if let Some(limit) = self.max_bytes {
            if self.exceeds_limit(limit) {
                self.rotate_backups();
                self.compress_latest_backup();
                self.reopen_current();
            }
        }
        writeln!(self.file, "{}", line)
    }

    /// `<path>.<idx>`, with `.gz` appended when `gz` is set.
    pub fn backup_path(&self, idx: usize, gz: bool) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{}", idx));
        if gz {
            name.push(".gz");
        }
        PathBuf::from(name)
    }

    fn exceeds_limit(&self, limit: u64) -> bool {
        self.path
            .metadata()
            .map(|meta| meta.len() >= limit)
            .unwrap_or(false)
    }

    fn rotate_backups(&self) {
        if self.keep == 0 {
            return;
        }
        for gz in [false, true] {
            let _ = fs::remove_file(self.backup_path(self.keep, gz));
            for idx in (1..self.keep).rev() {
                let old = self.backup_path(idx, gz);
                if old.exists() {
                    let _ = fs::rename(&old, self.backup_path(idx + 1, gz));
                }
            }
        }
        let _ = fs::rename(&self.path, self.backup_path(1, false));
    }

    fn compress_latest_backup(&self) {
        if !self.compress || self.keep == 0 {
            return;
        }
        let rotated = self.backup_path(1, false);
        if let Ok(data) = fs::read(&rotated) {
            let mut gz = GzEncoder::new(Vec::new(), Compression::default());
            if gz.write_all(&data).is_ok() {
                if let Ok(buf) = gz.finish() {
                    if fs::write(self.backup_path(1, true), buf).is_ok() {
                        let _ = fs::remove_file(&rotated);
                    }
                }
            }
        }
    }

    fn reopen_current(&mut self) {
        if let Ok(newf) = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
        {
            self.file = newf;
        }
    }
}

#[derive(Clone, Default)]
pub struct LogFeedbackSink {
    writer: Option<Arc<Mutex<RotatingWriter>>>,
    write_errors: Arc<AtomicU64>,
}

impl LogFeedbackSink {
    pub fn new(writer: Option<RotatingWriter>) -> Self {
        Self {
            writer: writer.map(|w| Arc::new(Mutex::new(w))),
            write_errors: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn write_errors(&self) -> u64 {
        self.write_errors.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl FeedbackSink for LogFeedbackSink {
    async fn record(&self, record: &FeedbackRecord) {
        tracing::info!(
            target: "feedback",
            feedbackType = ?record.feedback_type,
            feedback = %record.feedback,
            userAgent = ?record.user_agent,
            url = ?record.url,
            responseSent = %record.response_sent,
            timestamp = %record.timestamp,
            "feedback received"
        );
        let Some(writer) = self.writer.clone() else {
            return;
        };
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize feedback record");
                return;
            }
        };
        // File writes and gzip stay off the async workers.
        let write_errors = self.write_errors.clone();
        let written = tokio::task::spawn_blocking(move || {
            if let Ok(mut guard) = writer.lock() {
                if let Err(e) = guard.write_line(&line) {
                    tracing::warn!(error = %e, "failed to write feedback line");
                    write_errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        })
        .await;
        if let Err(e) = written {
            tracing::warn!(error = %e, "feedback writer task failed");
            self.write_errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Collects records in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<FeedbackRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<FeedbackRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl FeedbackSink for MemorySink {
    async fn record(&self, record: &FeedbackRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}
