//! Error taxonomy for a harvest run.
//!
//! Only [`InvalidRangeError`] aborts a run. The other kinds are scoped to one unit of
//! work (a window, a submission, a comment) and carry enough context to reprocess it.

use crate::window::QueryWindow;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Bad run input, detected before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRangeError {
    #[error("start {start} is after end {end}")]
    StartAfterEnd { start: i64, end: i64 },
    #[error("window chunk size must be greater than zero")]
    ZeroChunk,
}

/// Failure reported by either remote collaborator (live API or historical index).
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Not a failure: the remote asked us to wait before issuing more requests.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl ApiError {
    /// Transient failures worth another attempt after backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Status { status, .. } => *status >= 500 || *status == 408,
            ApiError::RateLimited { .. } => true,
            ApiError::Decode(_) | ApiError::NotFound(_) | ApiError::Auth(_) => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::Status { status: status.as_u16(), message: err.to_string() }
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

/// The historical index could not enumerate a window.
#[derive(Debug, Clone, Error)]
#[error("index query for r/{subreddit} in {window} failed after {attempts} attempt(s): {source}")]
pub struct IndexQueryError {
    pub subreddit: String,
    pub window: QueryWindow,
    pub attempts: u32,
    #[source]
    pub source: ApiError,
}

/// One submission could not be resolved from the live API.
#[derive(Debug, Clone, Error)]
#[error("submission {submission_id} failed after {attempts} attempt(s): {source}")]
pub struct FetchError {
    pub submission_id: String,
    pub attempts: u32,
    #[source]
    pub source: ApiError,
}

/// One record could not be persisted.
#[derive(Debug, Error)]
#[error("write of {record_id} to {} failed: {source}", .path.display())]
pub struct WriteError {
    pub record_id: String,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}
