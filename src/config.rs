use crate::date::Day;
use crate::fetch::{DEFAULT_BATCH_SIZE, DEFAULT_EXPANSION_CAP};
use crate::retry::RetryPolicy;
use crate::writer::RecordFormat;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Which submissions of a window get resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetrievalMode {
    AllSubmissions,
    /// Only the `n` highest-scoring submissions of each window.
    TopSubmissions { n: usize },
}

impl Default for RetrievalMode {
    fn default() -> Self {
        RetrievalMode::TopSubmissions { n: 5 }
    }
}

impl FromStr for RetrievalMode {
    type Err = String;
    /// `all`, `top` (N = 5) or `top:N`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.split_once(':') {
            None if s == "all" => Ok(RetrievalMode::AllSubmissions),
            None if s == "top" => Ok(RetrievalMode::default()),
            Some(("top", n)) => n
                .parse::<usize>()
                .map(|n| RetrievalMode::TopSubmissions { n })
                .map_err(|_| format!("invalid top-N count '{n}'")),
            _ => Err(format!("unknown retrieval mode '{s}' (expected all|top|top:N)")),
        }
    }
}

/// Run options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct HarvestOptions {
    pub subreddit: Option<String>, // normalized lowercase, no "r/"
    pub start: Option<Day>,        // inclusive
    pub end: Option<Day>,          // exclusive
    pub chunk: Duration,           // query window size
    pub mode: RetrievalMode,
    pub out_dir: PathBuf,
    pub format: RecordFormat,
    pub page_size: usize,          // historical index page size
    pub batch_size: usize,         // live API ids per lookup
    pub expansion_cap: usize,      // placeholder expansions per submission
    pub workers: usize,            // submissions expanded concurrently
    pub retry: RetryPolicy,
    pub live_min_interval: Duration,  // pacing between live API requests
    pub index_min_interval: Duration, // pacing between index requests
    pub write_submissions: bool,   // also persist submission metadata
    pub progress: bool,
    pub progress_label: Option<String>,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            subreddit: None,
            start: None,
            end: None,
            chunk: Duration::from_secs(86_400),
            mode: RetrievalMode::default(),
            out_dir: PathBuf::from("./data/comment_data"),
            format: RecordFormat::Ndjson,
            page_size: 100,
            batch_size: DEFAULT_BATCH_SIZE,
            expansion_cap: DEFAULT_EXPANSION_CAP,
            workers: 1,
            retry: RetryPolicy::default(),
            // 100 requests/minute for OAuth clients.
            live_min_interval: Duration::from_millis(600),
            index_min_interval: Duration::from_secs(1),
            write_submissions: true,
            progress: true,
            progress_label: None,
        }
    }
}

impl HarvestOptions {
    pub fn with_subreddit(mut self, sub: impl AsRef<str>) -> Self {
        self.subreddit = Some(normalize_subreddit(sub.as_ref()));
        self
    }
    pub fn with_date_range(mut self, start: Day, end: Day) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }
    pub fn with_chunk(mut self, chunk: Duration) -> Self {
        self.chunk = chunk;
        self
    }
    pub fn with_mode(mut self, mode: RetrievalMode) -> Self {
        self.mode = mode;
        self
    }
    pub fn with_out_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.out_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_format(mut self, format: RecordFormat) -> Self {
        self.format = format;
        self
    }
    pub fn with_page_size(mut self, n: usize) -> Self {
        self.page_size = n.max(1);
        self
    }
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n.max(1);
        self
    }
    pub fn with_expansion_cap(mut self, n: usize) -> Self {
        self.expansion_cap = n;
        self
    }
    pub fn with_workers(mut self, n: usize) -> Self {
        self.workers = n.max(1);
        self
    }
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
    pub fn with_pacing(mut self, live: Duration, index: Duration) -> Self {
        self.live_min_interval = live;
        self.index_min_interval = index;
        self
    }
    pub fn with_write_submissions(mut self, yes: bool) -> Self {
        self.write_submissions = yes;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_progress_label(mut self, label: impl Into<String>) -> Self {
        self.progress_label = Some(label.into());
        self
    }
}

#[inline]
pub fn normalize_subreddit(s: &str) -> String {
    let s = s.trim().to_lowercase();
    if let Some(rest) = s.strip_prefix("r/") { rest.to_string() } else { s }
}

// ----------------------------- config file ------------------------------------

/// Live API credentials.
#[derive(Clone, Debug, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_user_agent() -> String {
    format!("rharvest/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Clone, Debug, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_url")]
    pub base_url: String,
    #[serde(default)]
    pub page_size: Option<usize>,
}

fn default_index_url() -> String {
    "https://api.pushshift.io".to_string()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { base_url: default_index_url(), page_size: None }
    }
}

/// Contents of the TOML config file:
///
/// ```toml
/// [api_credentials]
/// client_id = "..."
/// client_secret = "..."
/// user_agent = "rharvest/0.1"
///
/// [index]
/// base_url = "https://api.pushshift.io"
/// ```
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub api_credentials: Credentials,
    #[serde(default)]
    pub index: IndexConfig,
}

impl AppConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("parse config")
    }

    /// Load `path`, then apply `RHARVEST_CLIENT_ID`, `RHARVEST_CLIENT_SECRET`,
    /// `RHARVEST_USER_AGENT` overrides from the environment.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
        let mut cfg = Self::parse(&text).with_context(|| format!("in {}", path.display()))?;
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn apply_env(&mut self) {
        let pick = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        if let Some(v) = pick("RHARVEST_CLIENT_ID") {
            self.api_credentials.client_id = v;
        }
        if let Some(v) = pick("RHARVEST_CLIENT_SECRET") {
            self.api_credentials.client_secret = v;
        }
        if let Some(v) = pick("RHARVEST_USER_AGENT") {
            self.api_credentials.user_agent = v;
        }
    }
}
