mod config;
mod date;
mod error;
mod records;
mod window;

mod index;
mod fetch;
mod writer;
mod limiter;
mod retry;

mod pipeline;
mod report;
mod progress;
mod concurrency;
mod util;

mod pushshift;
mod reddit;

pub use crate::config::{AppConfig, Credentials, HarvestOptions, IndexConfig, RetrievalMode};
pub use crate::date::Day;
pub use crate::error::{ApiError, FetchError, IndexQueryError, InvalidRangeError, WriteError};
pub use crate::records::{
    clean_author, clean_text, strip_fullname, Comment, CommentNode, MoreComments, Submission, SubmissionInfo,
    SubmissionRef, Truncation,
};
pub use crate::window::{QueryWindow, WindowPlan, Windows};

// Historical index side.
pub use crate::index::{HistoricalIndex, IndexCursor, IndexPage, IndexWalker};
// Live API side.
pub use crate::fetch::{FetchCfg, Fetcher, LiveApi, Resolved, DEFAULT_BATCH_SIZE, DEFAULT_EXPANSION_CAP};

pub use crate::writer::{PartitionedWriter, RecordFormat};
pub use crate::limiter::{Clock, ManualClock, RateLimiter, SystemClock};
pub use crate::retry::{Exhausted, RetryPolicy};

pub use crate::pipeline::{Harvester, REPORT_FILE};
pub use crate::report::{Failure, RunSummary};

pub use crate::util::init_tracing_once;

// HTTP clients for the real services.
pub use crate::pushshift::PushshiftIndex;
pub use crate::reddit::RedditClient;
