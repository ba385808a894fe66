//! Live-API resolution: SubmissionRef stream -> full submissions with expanded comments.
//!
//! The fetcher only sees `SubmissionRef`s; it knows nothing about how the index paged.
//! Every live call goes through the shared [`RateLimiter`] via [`RetryPolicy::run`].

use crate::concurrency::for_each_limited;
use crate::config::RetrievalMode;
use crate::error::{ApiError, FetchError};
use crate::limiter::RateLimiter;
use crate::records::{Comment, CommentNode, MoreComments, Submission, SubmissionInfo, SubmissionRef, Truncation};
use crate::retry::{Exhausted, RetryPolicy};
use ahash::{AHashMap, AHashSet};
use std::collections::VecDeque;

/// Placeholder expansions allowed per submission before emitting a partial tree.
pub const DEFAULT_EXPANSION_CAP: usize = 32;
/// Ids per batch lookup (Reddit `api/info` accepts 100).
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// Children per `morechildren` call.
pub const DEFAULT_MORE_CHILDREN_BATCH: usize = 100;

/// The rich-but-unsearchable live API.
pub trait LiveApi: Send + Sync {
    /// Batched lookup; ids that do not resolve are simply absent from the result.
    fn fetch_submissions_by_ids(&self, ids: &[String]) -> Result<Vec<SubmissionInfo>, ApiError>;
    /// Initial comment forest of one submission, possibly containing placeholders.
    fn fetch_comments(&self, submission_id: &str) -> Result<Vec<CommentNode>, ApiError>;
    /// Load the subtree behind one placeholder. The result may hold further placeholders.
    fn expand_placeholder(&self, submission_id: &str, more: &MoreComments) -> Result<Vec<CommentNode>, ApiError>;
    /// Load the thread rooted at `parent_id` after a depth cutoff. The result may repeat
    /// the parent itself and may hold further placeholders.
    fn continue_thread(&self, submission_id: &str, parent_id: &str) -> Result<Vec<CommentNode>, ApiError>;
}

impl<T: LiveApi + ?Sized> LiveApi for &T {
    fn fetch_submissions_by_ids(&self, ids: &[String]) -> Result<Vec<SubmissionInfo>, ApiError> {
        (**self).fetch_submissions_by_ids(ids)
    }
    fn fetch_comments(&self, submission_id: &str) -> Result<Vec<CommentNode>, ApiError> {
        (**self).fetch_comments(submission_id)
    }
    fn expand_placeholder(&self, submission_id: &str, more: &MoreComments) -> Result<Vec<CommentNode>, ApiError> {
        (**self).expand_placeholder(submission_id, more)
    }
    fn continue_thread(&self, submission_id: &str, parent_id: &str) -> Result<Vec<CommentNode>, ApiError> {
        (**self).continue_thread(submission_id, parent_id)
    }
}

#[derive(Clone, Debug)]
pub struct FetchCfg {
    pub batch_size: usize,
    pub expansion_cap: usize,
    pub more_children_batch: usize,
    /// Submissions expanded concurrently within one batch (1 = sequential).
    pub workers: usize,
}

impl Default for FetchCfg {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            expansion_cap: DEFAULT_EXPANSION_CAP,
            more_children_batch: DEFAULT_MORE_CHILDREN_BATCH,
            workers: 1,
        }
    }
}

pub type Resolved = Result<Submission, FetchError>;

/// Expansion state of one submission's tree.
#[derive(Default)]
struct Tree {
    seen: AHashSet<String>,
    /// Parents already queued for a thread continuation.
    threads: AHashSet<String>,
    comments: Vec<Comment>,
    queue: VecDeque<MoreComments>,
}

pub struct Fetcher<'a, L: LiveApi + ?Sized> {
    api: &'a L,
    limiter: RateLimiter,
    retry: RetryPolicy,
    cfg: FetchCfg,
}

impl<'a, L: LiveApi + ?Sized> Fetcher<'a, L> {
    pub fn new(api: &'a L, limiter: RateLimiter, retry: RetryPolicy, cfg: FetchCfg) -> Self {
        let cfg = FetchCfg {
            batch_size: cfg.batch_size.max(1),
            more_children_batch: cfg.more_children_batch.max(1),
            workers: cfg.workers.max(1),
            ..cfg
        };
        Self { api, limiter, retry, cfg }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Resolve `refs` per `mode`, handing every outcome (success or skip) to `sink`.
    /// Refs are pulled lazily, one batch at a time, in `AllSubmissions` mode.
    pub fn resolve<I, F>(&self, refs: I, mode: RetrievalMode, sink: &F)
    where
        I: IntoIterator<Item = SubmissionRef>,
        F: Fn(Resolved) + Sync,
    {
        match mode {
            RetrievalMode::AllSubmissions => self.resolve_all(refs, sink),
            RetrievalMode::TopSubmissions { n } => self.resolve_top(refs, n, sink),
        }
    }

    fn resolve_all<I, F>(&self, refs: I, sink: &F)
    where
        I: IntoIterator<Item = SubmissionRef>,
        F: Fn(Resolved) + Sync,
    {
        let mut refs = refs.into_iter();
        loop {
            let ids: Vec<String> = refs.by_ref().take(self.cfg.batch_size).map(|r| r.id).collect();
            if ids.is_empty() {
                break;
            }
            let infos = self.lookup_batch(&ids, sink);
            for_each_limited(&infos, self.cfg.workers, |info| sink(self.expand(info)));
        }
    }

    fn resolve_top<I, F>(&self, refs: I, n: usize, sink: &F)
    where
        I: IntoIterator<Item = SubmissionRef>,
        F: Fn(Resolved) + Sync,
    {
        let ids: Vec<String> = refs.into_iter().map(|r| r.id).collect();
        let mut scored: Vec<SubmissionInfo> = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.cfg.batch_size) {
            scored.extend(self.lookup_batch(chunk, sink));
        }
        scored.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(n);
        tracing::debug!(
            "top {}: selected {:?} of {} candidates",
            n,
            scored.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
            ids.len()
        );
        for_each_limited(&scored, self.cfg.workers, |info| sink(self.expand(info)));
    }

    /// Batch lookup preserving request order. Failed or missing ids go to `sink` as errors.
    fn lookup_batch<F>(&self, ids: &[String], sink: &F) -> Vec<SubmissionInfo>
    where
        F: Fn(Resolved) + Sync,
    {
        let api = self.api;
        match self.retry.run(&self.limiter, "submission lookup", || api.fetch_submissions_by_ids(ids)) {
            Ok(found) => {
                let mut by_id: AHashMap<String, SubmissionInfo> =
                    found.into_iter().map(|s| (s.id.clone(), s)).collect();
                let mut out = Vec::with_capacity(ids.len());
                for id in ids {
                    match by_id.remove(id) {
                        Some(info) => out.push(info),
                        None => sink(Err(FetchError {
                            submission_id: id.clone(),
                            attempts: 1,
                            source: ApiError::NotFound(format!("submission {id} missing from lookup")),
                        })),
                    }
                }
                out
            }
            Err(Exhausted { attempts, last }) => {
                tracing::error!("batch lookup of {} ids failed after {} attempt(s): {}", ids.len(), attempts, last);
                for id in ids {
                    sink(Err(FetchError { submission_id: id.clone(), attempts, source: last.clone() }));
                }
                Vec::new()
            }
        }
    }

    /// Load the full comment set for one submission using a bounded work-list.
    pub fn expand(&self, info: &SubmissionInfo) -> Resolved {
        let api = self.api;
        let sid = info.id.as_str();
        let fail = |ex: Exhausted| FetchError { submission_id: sid.to_string(), attempts: ex.attempts, source: ex.last };

        let forest = self.retry.run(&self.limiter, "comment fetch", || api.fetch_comments(sid)).map_err(fail)?;

        let mut tree = Tree::default();
        self.absorb(forest, &mut tree);

        let mut expansions = 0usize;
        while let Some(more) = tree.queue.front() {
            if expansions >= self.cfg.expansion_cap {
                let t = Truncation {
                    expansions,
                    unexpanded_placeholders: tree.queue.len(),
                    unexpanded_children: tree.queue.iter().map(|m| m.children.len()).sum(),
                };
                tracing::warn!(
                    "submission {}: expansion cap {} reached, {} placeholder(s) with {} comment(s) left unexpanded",
                    sid, self.cfg.expansion_cap, t.unexpanded_placeholders, t.unexpanded_children
                );
                return Ok(Submission { info: info.clone(), comments: tree.comments, truncation: Some(t) });
            }
            let more = more.clone();
            let nodes = if more.is_continue_thread() {
                self.retry
                    .run(&self.limiter, "thread continuation", || api.continue_thread(sid, &more.parent_id))
                    .map_err(fail)?
            } else {
                self.retry
                    .run(&self.limiter, "placeholder expansion", || api.expand_placeholder(sid, &more))
                    .map_err(fail)?
            };
            tree.queue.pop_front();
            expansions += 1;
            self.absorb(nodes, &mut tree);
        }

        tracing::debug!("submission {}: {} comment(s) after {} expansion(s)", sid, tree.comments.len(), expansions);
        Ok(Submission { info: info.clone(), comments: tree.comments, truncation: None })
    }

    /// Flatten a forest into the tree (first occurrence wins) and queue its placeholders.
    fn absorb(&self, forest: Vec<CommentNode>, tree: &mut Tree) {
        let mut stack: Vec<CommentNode> = forest;
        stack.reverse();
        while let Some(node) = stack.pop() {
            match node {
                CommentNode::Comment { comment, replies } => {
                    if tree.seen.insert(comment.id.clone()) {
                        tree.comments.push(comment);
                    }
                    stack.extend(replies.into_iter().rev());
                }
                CommentNode::More(more) if more.is_continue_thread() => {
                    if tree.threads.insert(more.parent_id.clone()) {
                        tree.queue.push_back(more);
                    }
                }
                CommentNode::More(more) => {
                    let pending: Vec<String> =
                        more.children.into_iter().filter(|c| !tree.seen.contains(c)).collect();
                    // Every child already loaded elsewhere.
                    if pending.is_empty() {
                        continue;
                    }
                    for chunk in pending.chunks(self.cfg.more_children_batch) {
                        tree.queue.push_back(MoreComments { parent_id: more.parent_id.clone(), children: chunk.to_vec() });
                    }
                }
            }
        }
    }
}
