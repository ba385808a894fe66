//! Run accounting: live counters while harvesting, frozen into a serializable summary.

use crate::error::{FetchError, IndexQueryError, WriteError};
use crate::records::Truncation;
use crate::util::{create_with_backoff, replace_file_atomic_backoff};
use crate::window::QueryWindow;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// One unit of work that did not make it into the output, with enough context to redo it.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    Window { window: QueryWindow, error: String },
    Submission { submission_id: String, attempts: u32, error: String },
    Record { record_id: String, path: String, error: String },
    Truncated { submission_id: String, truncation: Truncation },
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    pub subreddit: String,
    pub windows_planned: u64,
    pub windows_skipped: u64,
    pub refs_seen: u64,
    pub submissions_resolved: u64,
    pub submissions_failed: u64,
    pub submissions_truncated: u64,
    pub comments_written: u64,
    pub comments_dropped: u64,
    pub failures: Vec<Failure>,
}

impl RunSummary {
    /// Ids of submissions that were skipped entirely.
    pub fn failed_submissions(&self) -> Vec<&str> {
        self.failures
            .iter()
            .filter_map(|f| match f {
                Failure::Submission { submission_id, .. } => Some(submission_id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Write as pretty JSON via a temp file promoted atomically.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.inprogress");
        {
            let f = create_with_backoff(&tmp, 16, 50).with_context(|| format!("create {}", tmp.display()))?;
            let mut w = BufWriter::new(f);
            serde_json::to_writer_pretty(&mut w, self)?;
            w.write_all(b"\n")?;
            w.flush()?;
        }
        replace_file_atomic_backoff(&tmp, path)
    }
}

/// Thread-safe counters shared by the fetch sink and the pipeline.
#[derive(Default)]
pub struct Tally {
    windows_planned: AtomicU64,
    windows_skipped: AtomicU64,
    refs_seen: AtomicU64,
    submissions_resolved: AtomicU64,
    submissions_failed: AtomicU64,
    submissions_truncated: AtomicU64,
    comments_written: AtomicU64,
    comments_dropped: AtomicU64,
    failures: Mutex<Vec<Failure>>,
}

impl Tally {
    pub fn window_planned(&self) {
        self.windows_planned.fetch_add(1, Ordering::Relaxed);
    }
    pub fn window_skipped(&self, e: &IndexQueryError) {
        self.windows_skipped.fetch_add(1, Ordering::Relaxed);
        self.failures.lock().push(Failure::Window { window: e.window, error: e.to_string() });
    }
    pub fn ref_seen(&self) {
        self.refs_seen.fetch_add(1, Ordering::Relaxed);
    }
    pub fn submission_resolved(&self) {
        self.submissions_resolved.fetch_add(1, Ordering::Relaxed);
    }
    pub fn submission_failed(&self, e: &FetchError) {
        self.submissions_failed.fetch_add(1, Ordering::Relaxed);
        self.failures.lock().push(Failure::Submission {
            submission_id: e.submission_id.clone(),
            attempts: e.attempts,
            error: e.source.to_string(),
        });
    }
    pub fn submission_truncated(&self, submission_id: &str, t: &Truncation) {
        self.submissions_truncated.fetch_add(1, Ordering::Relaxed);
        self.failures.lock().push(Failure::Truncated { submission_id: submission_id.to_string(), truncation: t.clone() });
    }
    pub fn comment_written(&self) {
        self.comments_written.fetch_add(1, Ordering::Relaxed);
    }
    pub fn comment_dropped(&self, e: &WriteError) {
        self.comments_dropped.fetch_add(1, Ordering::Relaxed);
        self.record_write_failure(e);
    }
    /// A non-comment record (submission metadata) failed; no counter is affected.
    pub fn record_write_failure(&self, e: &WriteError) {
        self.failures.lock().push(Failure::Record {
            record_id: e.record_id.clone(),
            path: e.path.display().to_string(),
            error: e.source.to_string(),
        });
    }

    pub fn summary(&self, subreddit: &str) -> RunSummary {
        RunSummary {
            subreddit: subreddit.to_string(),
            windows_planned: self.windows_planned.load(Ordering::Relaxed),
            windows_skipped: self.windows_skipped.load(Ordering::Relaxed),
            refs_seen: self.refs_seen.load(Ordering::Relaxed),
            submissions_resolved: self.submissions_resolved.load(Ordering::Relaxed),
            submissions_failed: self.submissions_failed.load(Ordering::Relaxed),
            submissions_truncated: self.submissions_truncated.load(Ordering::Relaxed),
            comments_written: self.comments_written.load(Ordering::Relaxed),
            comments_dropped: self.comments_dropped.load(Ordering::Relaxed),
            failures: self.failures.lock().clone(),
        }
    }
}
