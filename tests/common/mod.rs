#![allow(dead_code)]

use parking_lot::Mutex;
use rharvest::{
    ApiError, Comment, CommentNode, Day, HistoricalIndex, IndexCursor, IndexPage, LiveApi, MoreComments,
    QueryWindow, SubmissionInfo, SubmissionRef,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub fn day(year: i32, month: u8, d: u8) -> Day {
    Day::new(year, month, d).unwrap()
}

/// Midnight UTC of the given day as a unix timestamp.
pub fn ts(year: i32, month: u8, d: u8) -> i64 {
    day(year, month, d).start_epoch()
}

pub fn sref(id: &str, created_utc: i64) -> SubmissionRef {
    SubmissionRef { id: id.to_string(), created_utc }
}

pub fn info(id: &str, score: i64, created_utc: i64) -> SubmissionInfo {
    SubmissionInfo {
        id: id.to_string(),
        title: format!("title of {id}"),
        selftext: Some(format!("text of {id}")),
        author: Some("bob".to_string()),
        author_id: Some("b0b".to_string()),
        created_utc,
        num_comments: 0,
        score,
        upvote_ratio: Some(0.9),
        permalink: Some(format!("/r/rust/comments/{id}/")),
        full_link: Some(format!("https://www.reddit.com/r/rust/comments/{id}/")),
    }
}

pub fn comment(id: &str, submission_id: &str, parent_id: &str, created_utc: i64) -> Comment {
    Comment {
        id: id.to_string(),
        submission_id: submission_id.to_string(),
        parent_id: parent_id.to_string(),
        subreddit: Some("rust".to_string()),
        subreddit_id: Some("2s7lj".to_string()),
        author: Some("alice".to_string()),
        author_id: Some("a1ice".to_string()),
        body: Some(format!("body of {id}")),
        created_utc,
        score: 1,
        total_awards_received: 0,
    }
}

pub fn more(parent_id: &str, children: &[&str]) -> CommentNode {
    CommentNode::More(MoreComments {
        parent_id: parent_id.to_string(),
        children: children.iter().map(|c| c.to_string()).collect(),
    })
}

/// Read a text file line-by-line into strings (skips empty lines).
pub fn read_lines(path: &Path) -> Vec<String> {
    let f = File::open(path).unwrap();
    BufReader::new(f).lines().map(|l| l.unwrap()).filter(|s| !s.is_empty()).collect()
}

pub fn read_jsonl_values(path: &Path) -> Vec<serde_json::Value> {
    read_lines(path).iter().map(|s| serde_json::from_str(s).unwrap()).collect()
}

// ----------------------------- fake historical index ------------------------------------

/// In-memory index. Pages step forward by `limit - overlap`, so consecutive pages repeat
/// `overlap` refs the way a timestamp-cursored index does at page seams.
#[derive(Default)]
pub struct FakeIndex {
    pub refs: Vec<SubmissionRef>,
    pub overlap: usize,
    pub failing_windows: HashSet<i64>,
    pub calls: Mutex<Vec<(QueryWindow, Option<String>)>>,
}

impl FakeIndex {
    pub fn new(refs: Vec<SubmissionRef>) -> Self {
        Self { refs, ..Default::default() }
    }
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl HistoricalIndex for FakeIndex {
    fn query(
        &self,
        _subreddit: &str,
        window: &QueryWindow,
        after: Option<&IndexCursor>,
        limit: usize,
    ) -> Result<IndexPage, ApiError> {
        self.calls.lock().push((*window, after.map(|c| c.0.clone())));
        if self.failing_windows.contains(&window.start()) {
            return Err(ApiError::Status { status: 502, message: "bad gateway".into() });
        }
        let mut in_window: Vec<SubmissionRef> =
            self.refs.iter().filter(|r| window.contains(r.created_utc)).cloned().collect();
        in_window.sort_by_key(|r| r.created_utc);

        let offset: usize = after.map(|c| c.0.parse().unwrap()).unwrap_or(0);
        let page: Vec<SubmissionRef> = in_window.iter().skip(offset).take(limit).cloned().collect();
        let step = limit.saturating_sub(self.overlap).max(1);
        let next = if offset + page.len() < in_window.len() {
            Some(IndexCursor((offset + step).to_string()))
        } else {
            None
        };
        Ok(IndexPage { refs: page, next })
    }
}

// ----------------------------- fake live API ------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Lookup(Vec<String>),
    Comments(String),
    Expand(String, Vec<String>),
    Thread(String, String),
}

#[derive(Default)]
pub struct FakeLive {
    pub submissions: HashMap<String, SubmissionInfo>,
    pub forests: HashMap<String, Vec<CommentNode>>,
    /// Nodes returned when a placeholder child id is expanded.
    pub children: HashMap<String, Vec<CommentNode>>,
    /// Nodes returned when the thread under a parent id is continued.
    pub threads: HashMap<String, Vec<CommentNode>>,
    /// Scripted errors, consumed one per call, keyed by submission id.
    pub comment_errors: Mutex<HashMap<String, VecDeque<ApiError>>>,
    pub lookup_errors: Mutex<VecDeque<ApiError>>,
    pub calls: Mutex<Vec<Call>>,
}

impl FakeLive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_submission(mut self, info: SubmissionInfo, forest: Vec<CommentNode>) -> Self {
        self.forests.insert(info.id.clone(), forest);
        self.submissions.insert(info.id.clone(), info);
        self
    }

    /// Submission whose tree needs `rounds` sequential placeholder expansions:
    /// root comment `<sid>_c0`, then each expansion yields one comment and the next placeholder.
    pub fn with_chain(mut self, sid: &str, created_utc: i64, rounds: usize) -> Self {
        let root = format!("{sid}_c0");
        let mut forest = vec![CommentNode::leaf(comment(&root, sid, sid, created_utc))];
        if rounds > 0 {
            forest.push(more(&root, &[&format!("{sid}_c1")]));
        }
        for i in 1..=rounds {
            let id = format!("{sid}_c{i}");
            let parent = format!("{sid}_c{}", i - 1);
            let mut nodes = vec![CommentNode::leaf(comment(&id, sid, &parent, created_utc + i as i64))];
            if i < rounds {
                nodes.push(more(&id, &[&format!("{sid}_c{}", i + 1)]));
            }
            self.children.insert(id, nodes);
        }
        self.submissions.insert(sid.to_string(), info(sid, 1, created_utc));
        self.forests.insert(sid.to_string(), forest);
        self
    }

    pub fn fail_comments(&self, sid: &str, errors: Vec<ApiError>) {
        self.comment_errors.lock().insert(sid.to_string(), errors.into());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn comment_fetches(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Comments(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Placeholder expansions plus thread continuations.
    pub fn expansions(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Expand(..) | Call::Thread(..))).count()
    }
}

impl LiveApi for FakeLive {
    fn fetch_submissions_by_ids(&self, ids: &[String]) -> Result<Vec<SubmissionInfo>, ApiError> {
        self.calls.lock().push(Call::Lookup(ids.to_vec()));
        if let Some(e) = self.lookup_errors.lock().pop_front() {
            return Err(e);
        }
        Ok(ids.iter().filter_map(|id| self.submissions.get(id).cloned()).collect())
    }

    fn fetch_comments(&self, submission_id: &str) -> Result<Vec<CommentNode>, ApiError> {
        self.calls.lock().push(Call::Comments(submission_id.to_string()));
        if let Some(q) = self.comment_errors.lock().get_mut(submission_id) {
            if let Some(e) = q.pop_front() {
                return Err(e);
            }
        }
        Ok(self.forests.get(submission_id).cloned().unwrap_or_default())
    }

    fn expand_placeholder(&self, submission_id: &str, more: &MoreComments) -> Result<Vec<CommentNode>, ApiError> {
        self.calls.lock().push(Call::Expand(submission_id.to_string(), more.children.clone()));
        Ok(more
            .children
            .iter()
            .flat_map(|c| self.children.get(c).cloned().unwrap_or_default())
            .collect())
    }

    fn continue_thread(&self, submission_id: &str, parent_id: &str) -> Result<Vec<CommentNode>, ApiError> {
        self.calls.lock().push(Call::Thread(submission_id.to_string(), parent_id.to_string()));
        Ok(self.threads.get(parent_id).cloned().unwrap_or_default())
    }
}
