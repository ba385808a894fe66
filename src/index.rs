//! Historical index walker: enumerate submission refs for one window, page by page.

use crate::error::{ApiError, IndexQueryError};
use crate::limiter::RateLimiter;
use crate::records::SubmissionRef;
use crate::retry::RetryPolicy;
use crate::window::QueryWindow;
use ahash::AHashSet;
use std::collections::VecDeque;

/// Opaque continuation token handed back by the index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexCursor(pub String);

/// One page of index results. `next == None` marks the end of results.
#[derive(Clone, Debug, Default)]
pub struct IndexPage {
    pub refs: Vec<SubmissionRef>,
    pub next: Option<IndexCursor>,
}

/// A time-searchable index of past submissions.
pub trait HistoricalIndex: Send + Sync {
    /// One page of refs created inside `window`, continuing from `after`.
    ///
    /// Pages must come back in ascending `created_utc` order, each page starting no
    /// earlier than the previous one ended. The walker only sorts within a page, so
    /// window-wide order depends on this. Pages may overlap at the seam; repeated ids
    /// are dropped.
    fn query(
        &self,
        subreddit: &str,
        window: &QueryWindow,
        after: Option<&IndexCursor>,
        limit: usize,
    ) -> Result<IndexPage, ApiError>;
}

impl<T: HistoricalIndex + ?Sized> HistoricalIndex for &T {
    fn query(
        &self,
        subreddit: &str,
        window: &QueryWindow,
        after: Option<&IndexCursor>,
        limit: usize,
    ) -> Result<IndexPage, ApiError> {
        (**self).query(subreddit, window, after, limit)
    }
}

enum WalkState {
    /// Next request continues from this cursor (`None` = first page).
    More(Option<IndexCursor>),
    Done,
}

/// Lazy stream of unique refs for one window. Yields at most one error, then ends.
pub struct IndexWalker<'a, I: HistoricalIndex + ?Sized> {
    index: &'a I,
    subreddit: &'a str,
    window: QueryWindow,
    page_size: usize,
    limiter: &'a RateLimiter,
    retry: &'a RetryPolicy,
    seen: AHashSet<String>,
    buffered: VecDeque<SubmissionRef>,
    state: WalkState,
    pages: usize,
}

impl<'a, I: HistoricalIndex + ?Sized> IndexWalker<'a, I> {
    pub fn new(
        index: &'a I,
        subreddit: &'a str,
        window: QueryWindow,
        page_size: usize,
        limiter: &'a RateLimiter,
        retry: &'a RetryPolicy,
    ) -> Self {
        Self {
            index,
            subreddit,
            window,
            page_size: page_size.max(1),
            limiter,
            retry,
            seen: AHashSet::new(),
            buffered: VecDeque::new(),
            state: WalkState::More(None),
            pages: 0,
        }
    }

    pub fn window(&self) -> QueryWindow {
        self.window
    }

    /// Pages requested so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    fn fetch_page(&mut self) -> Result<(), IndexQueryError> {
        let cursor = match std::mem::replace(&mut self.state, WalkState::Done) {
            WalkState::More(c) => c,
            WalkState::Done => return Ok(()),
        };
        let (index, sub, window, limit) = (self.index, self.subreddit, self.window, self.page_size);
        let page = self
            .retry
            .run(self.limiter, "index query", || index.query(sub, &window, cursor.as_ref(), limit))
            .map_err(|ex| IndexQueryError {
                subreddit: sub.to_string(),
                window,
                attempts: ex.attempts,
                source: ex.last,
            })?;
        self.pages += 1;

        let returned = page.refs.len();
        let mut fresh: Vec<SubmissionRef> = page
            .refs
            .into_iter()
            .filter(|r| self.seen.insert(r.id.clone()))
            .collect();
        fresh.sort_by(|a, b| a.created_utc.cmp(&b.created_utc).then_with(|| a.id.cmp(&b.id)));

        tracing::debug!(
            "index page {} for r/{} {}: {} returned, {} new",
            self.pages, sub, window, returned, fresh.len()
        );

        // Short page, no cursor, or nothing new (overlap only) all mean exhaustion.
        let exhausted = returned < self.page_size || fresh.is_empty();
        self.state = match page.next {
            Some(next) if !exhausted => WalkState::More(Some(next)),
            _ => WalkState::Done,
        };
        self.buffered.extend(fresh);
        Ok(())
    }
}

impl<'a, I: HistoricalIndex + ?Sized> Iterator for IndexWalker<'a, I> {
    type Item = Result<SubmissionRef, IndexQueryError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(r) = self.buffered.pop_front() {
                return Some(Ok(r));
            }
            if matches!(self.state, WalkState::Done) {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                return Some(Err(e));
            }
        }
    }
}
