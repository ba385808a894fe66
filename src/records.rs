//! Record types flowing through the harvest, plus the text cleanup applied to them.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Lightweight handle produced by the historical index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionRef {
    pub id: String,
    pub created_utc: i64,
}

/// Submission metadata as returned by a live-API batch lookup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmissionInfo {
    pub id: String,
    pub title: String,
    /// Self-post body, cleaned like `title`. `None` for link posts and removed bodies.
    pub selftext: Option<String>,
    pub author: Option<String>,
    /// Author account id without the `t2_` prefix.
    pub author_id: Option<String>,
    pub created_utc: i64,
    pub num_comments: i64,
    pub score: i64,
    pub upvote_ratio: Option<f64>,
    pub permalink: Option<String>,
    pub full_link: Option<String>,
}

/// The unit of persistence. `parent_id` is a bare id (comment or submission).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub submission_id: String,
    pub parent_id: String,
    pub subreddit: Option<String>,
    /// Bare subreddit id (`t5_` stripped).
    pub subreddit_id: Option<String>,
    pub author: Option<String>,
    /// Author account id without the `t2_` prefix.
    pub author_id: Option<String>,
    pub body: Option<String>,
    pub created_utc: i64,
    pub score: i64,
    pub total_awards_received: i64,
}

/// Placeholder for a truncated subtree; `children` are the ids still to be loaded.
///
/// An empty `children` list is a depth cutoff ("continue this thread"): the replies of
/// `parent_id` have to be loaded as a thread of their own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoreComments {
    pub parent_id: String,
    pub children: Vec<String>,
}

impl MoreComments {
    pub fn is_continue_thread(&self) -> bool {
        self.children.is_empty()
    }
}

/// One node of a live-API comment forest.
#[derive(Clone, Debug, PartialEq)]
pub enum CommentNode {
    Comment { comment: Comment, replies: Vec<CommentNode> },
    More(MoreComments),
}

impl CommentNode {
    pub fn leaf(comment: Comment) -> Self {
        CommentNode::Comment { comment, replies: Vec::new() }
    }
}

/// Why a submission's comment set is incomplete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Truncation {
    pub expansions: usize,
    pub unexpanded_placeholders: usize,
    pub unexpanded_children: usize,
}

/// A resolved submission and its flattened comment set (each comment once).
#[derive(Clone, Debug)]
pub struct Submission {
    pub info: SubmissionInfo,
    pub comments: Vec<Comment>,
    pub truncation: Option<Truncation>,
}

// ----------------------------- cleanup ------------------------------------

fn is_pseudo(s: &str) -> bool {
    matches!(s.trim(), "[deleted]" | "[removed]")
}

/// Drop `[deleted]`/`[removed]` markers and empty names.
pub fn clean_author(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty() && !is_pseudo(s))
        .map(str::to_string)
}

/// Flatten newlines, collapse space runs and drop `[deleted]`/`[removed]` markers.
pub fn clean_text(raw: Option<&str>) -> Option<String> {
    static SPACES: OnceLock<Regex> = OnceLock::new();
    let re = SPACES.get_or_init(|| Regex::new(r"[ \t\r\n]+").expect("static regex"));
    let raw = raw?;
    if is_pseudo(raw) {
        return None;
    }
    let flat = re.replace_all(raw, " ");
    let s = flat.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

/// `t3_abc` -> `abc`; bare ids pass through.
pub fn strip_fullname(id: &str) -> &str {
    match id.split_once('_') {
        Some((kind, rest)) if kind.len() == 2 && kind.starts_with('t') => rest,
        _ => id,
    }
}
