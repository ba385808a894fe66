use crate::date::Day;
use crate::error::WriteError;
use crate::records::{Comment, SubmissionInfo};
use crate::util::{append_with_backoff, create_dir_all_with_backoff};
use ahash::AHashSet;
use parking_lot::Mutex;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// On-disk record encoding. Both are one line per record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RecordFormat {
    #[default]
    Ndjson,
    Tsv,
}

impl RecordFormat {
    pub fn extension(self) -> &'static str {
        match self {
            RecordFormat::Ndjson => "ndjson",
            RecordFormat::Tsv => "tsv",
        }
    }
}

impl FromStr for RecordFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ndjson" | "jsonl" => Ok(RecordFormat::Ndjson),
            "tsv" => Ok(RecordFormat::Tsv),
            other => Err(format!("unknown record format '{other}' (expected ndjson|tsv)")),
        }
    }
}

/// Routes records into day partitions under `root`:
///
///   <root>/YYYY/MM/DD/<submission_id>_comments.<ext>   (one line per comment)
///   <root>/YYYY/MM/DD/submissions.<ext>                (one line per submission)
///
/// Writes are append-only. Writing the same record twice appends an identical line.
/// Each record is written with a single `write_all`, so a failure affects only that record.
pub struct PartitionedWriter {
    root: PathBuf,
    format: RecordFormat,
    known: Mutex<AHashSet<Day>>,
}

impl PartitionedWriter {
    pub fn new(root: impl AsRef<Path>, format: RecordFormat) -> Self {
        Self { root: root.as_ref().to_path_buf(), format, known: Mutex::new(AHashSet::new()) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn partition_dir(&self, day: Day) -> PathBuf {
        self.root.join(day.partition_path())
    }

    /// Path a comment lands in.
    pub fn comment_path(&self, comment: &Comment) -> PathBuf {
        let day = Day::from_epoch(comment.created_utc);
        self.partition_dir(day)
            .join(format!("{}_comments.{}", comment.submission_id, self.format.extension()))
    }

    pub fn submission_path(&self, info: &SubmissionInfo) -> PathBuf {
        let day = Day::from_epoch(info.created_utc);
        self.partition_dir(day).join(format!("submissions.{}", self.format.extension()))
    }

    pub fn write(&self, comment: &Comment) -> Result<PathBuf, WriteError> {
        let path = self.comment_path(comment);
        self.encode_comment(comment)
            .and_then(|line| self.append_line(Day::from_epoch(comment.created_utc), &path, &line))
            .map_err(|source| WriteError { record_id: comment.id.clone(), path: path.clone(), source })?;
        Ok(path)
    }

    pub fn write_submission(&self, info: &SubmissionInfo) -> Result<PathBuf, WriteError> {
        let path = self.submission_path(info);
        self.encode_submission(info)
            .and_then(|line| self.append_line(Day::from_epoch(info.created_utc), &path, &line))
            .map_err(|source| WriteError { record_id: info.id.clone(), path: path.clone(), source })?;
        Ok(path)
    }

    /// Partitions created (or found existing) by this writer so far.
    pub fn partitions(&self) -> Vec<Day> {
        let mut v: Vec<Day> = self.known.lock().iter().copied().collect();
        v.sort();
        v
    }

    fn ensure_partition(&self, day: Day) -> io::Result<()> {
        if self.known.lock().contains(&day) {
            return Ok(());
        }
        let dir = self.partition_dir(day);
        create_dir_all_with_backoff(&dir, 8, 50)?;
        if self.known.lock().insert(day) {
            tracing::debug!("created partition {}", dir.display());
        }
        Ok(())
    }

    fn append_line(&self, day: Day, path: &Path, line: &str) -> io::Result<()> {
        self.ensure_partition(day)?;
        let mut f = append_with_backoff(path, 8, 50)?;
        f.write_all(line.as_bytes())
    }

    /// TSV columns: id, submission_id, parent_id, subreddit, subreddit_id, author, author_id,
    /// created_utc, score, total_awards_received, body.
    fn encode_comment(&self, c: &Comment) -> io::Result<String> {
        match self.format {
            RecordFormat::Ndjson => json_line(c),
            RecordFormat::Tsv => Ok(tsv_line(&[
                c.id.clone(),
                c.submission_id.clone(),
                c.parent_id.clone(),
                c.subreddit.clone().unwrap_or_default(),
                c.subreddit_id.clone().unwrap_or_default(),
                c.author.clone().unwrap_or_default(),
                c.author_id.clone().unwrap_or_default(),
                c.created_utc.to_string(),
                c.score.to_string(),
                c.total_awards_received.to_string(),
                c.body.clone().unwrap_or_default(),
            ])),
        }
    }

    /// TSV columns: id, created_utc, author, author_id, score, num_comments, upvote_ratio,
    /// full_link, title, selftext.
    fn encode_submission(&self, s: &SubmissionInfo) -> io::Result<String> {
        match self.format {
            RecordFormat::Ndjson => json_line(s),
            RecordFormat::Tsv => Ok(tsv_line(&[
                s.id.clone(),
                s.created_utc.to_string(),
                s.author.clone().unwrap_or_default(),
                s.author_id.clone().unwrap_or_default(),
                s.score.to_string(),
                s.num_comments.to_string(),
                s.upvote_ratio.map(|r| r.to_string()).unwrap_or_default(),
                s.full_link.clone().unwrap_or_default(),
                s.title.clone(),
                s.selftext.clone().unwrap_or_default(),
            ])),
        }
    }
}

fn json_line<T: serde::Serialize>(v: &T) -> io::Result<String> {
    let mut s = serde_json::to_string(v)?;
    s.push('\n');
    Ok(s)
}

fn tsv_line(fields: &[String]) -> String {
    let mut s = fields
        .iter()
        .map(|f| f.replace(['\t', '\n', '\r'], " "))
        .collect::<Vec<_>>()
        .join("\t");
    s.push('\n');
    s
}
