use crate::config::{normalize_subreddit, HarvestOptions, RetrievalMode};
use crate::date::Day;
use crate::error::IndexQueryError;
use crate::fetch::{FetchCfg, Fetcher, LiveApi, Resolved};
use crate::index::{HistoricalIndex, IndexWalker};
use crate::limiter::{Clock, RateLimiter, SystemClock};
use crate::progress::ProgressScope;
use crate::records::{Submission, SubmissionRef};
use crate::report::{RunSummary, Tally};
use crate::retry::RetryPolicy;
use crate::util::{create_dir_all_with_backoff, init_tracing_once};
use crate::window::{QueryWindow, WindowPlan};
use crate::writer::{PartitionedWriter, RecordFormat};
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// File name of the run report, written at the output root.
pub const REPORT_FILE: &str = "_harvest_report.json";

/// One bounded harvest: plan windows, walk the index, resolve via the live API, write.
pub struct Harvester<I: HistoricalIndex, L: LiveApi> {
    index: I,
    live: L,
    pub(crate) opts: HarvestOptions,
    clock: Arc<dyn Clock>,
    live_limiter: Option<RateLimiter>,
}

impl<I: HistoricalIndex, L: LiveApi> Harvester<I, L> {
    pub fn new(index: I, live: L) -> Self {
        Self { index, live, opts: HarvestOptions::default(), clock: Arc::new(SystemClock::new()), live_limiter: None }
    }

    // -------- Builder methods --------
    pub fn options(mut self, opts: HarvestOptions) -> Self { self.opts = opts; self }
    pub fn subreddit(mut self, sub: impl AsRef<str>) -> Self { self.opts = self.opts.with_subreddit(sub); self }
    pub fn date_range(mut self, start: Day, end: Day) -> Self { self.opts = self.opts.with_date_range(start, end); self }
    pub fn chunk(mut self, chunk: Duration) -> Self { self.opts = self.opts.with_chunk(chunk); self }
    pub fn mode(mut self, mode: RetrievalMode) -> Self { self.opts = self.opts.with_mode(mode); self }
    pub fn out_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_out_dir(dir); self }
    pub fn format(mut self, format: RecordFormat) -> Self { self.opts = self.opts.with_format(format); self }
    pub fn page_size(mut self, n: usize) -> Self { self.opts = self.opts.with_page_size(n); self }
    pub fn batch_size(mut self, n: usize) -> Self { self.opts = self.opts.with_batch_size(n); self }
    pub fn expansion_cap(mut self, n: usize) -> Self { self.opts = self.opts.with_expansion_cap(n); self }
    pub fn workers(mut self, n: usize) -> Self { self.opts = self.opts.with_workers(n); self }
    pub fn retry(mut self, retry: RetryPolicy) -> Self { self.opts = self.opts.with_retry(retry); self }
    pub fn pacing(mut self, live: Duration, index: Duration) -> Self { self.opts = self.opts.with_pacing(live, index); self }
    pub fn write_submissions(mut self, yes: bool) -> Self { self.opts = self.opts.with_write_submissions(yes); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn progress_label(mut self, label: impl Into<String>) -> Self { self.opts = self.opts.with_progress_label(label); self }
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self { self.clock = clock; self }
    /// Share an existing live-API budget (e.g. one the HTTP client also feeds).
    pub fn live_limiter(mut self, limiter: RateLimiter) -> Self { self.live_limiter = Some(limiter); self }

    /// Plan the run without touching the network or the filesystem.
    pub fn plan(&self) -> Result<WindowPlan> {
        let (start, end) = match (self.opts.start, self.opts.end) {
            (Some(s), Some(e)) => (s, e),
            _ => return Err(anyhow!("date range is required")),
        };
        Ok(WindowPlan::from_days(start, end, self.opts.chunk)?)
    }

    /// Execute the run. Only configuration problems and an invalid date range are fatal
    /// (both detected before any I/O); every other failure is recorded in the summary.
    pub fn run(&self) -> Result<RunSummary> {
        let subreddit = self
            .opts
            .subreddit
            .clone()
            .map(|s| normalize_subreddit(&s))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("subreddit is required"))?;
        let plan = self.plan()?;
        init_tracing_once();

        create_dir_all_with_backoff(&self.opts.out_dir, 8, 50)
            .with_context(|| format!("create output dir {}", self.opts.out_dir.display()))?;

        tracing::info!(
            "harvesting r/{} in {} window(s), mode {:?}, into {}",
            subreddit, plan.len(), self.opts.mode, self.opts.out_dir.display()
        );

        let live_limiter = self
            .live_limiter
            .clone()
            .unwrap_or_else(|| RateLimiter::new("live api", self.opts.live_min_interval, self.clock.clone()));
        let index_limiter = RateLimiter::new("historical index", self.opts.index_min_interval, self.clock.clone());
        let fetcher = Fetcher::new(
            &self.live,
            live_limiter,
            self.opts.retry.clone(),
            FetchCfg {
                batch_size: self.opts.batch_size,
                expansion_cap: self.opts.expansion_cap,
                workers: self.opts.workers,
                ..FetchCfg::default()
            },
        );
        let writer = PartitionedWriter::new(&self.opts.out_dir, self.opts.format);
        let tally = Tally::default();
        let sink = |outcome: Resolved| self.persist(outcome, &writer, &tally);

        let label = self.opts.progress_label.clone().unwrap_or_else(|| format!("r/{subreddit}"));
        let pb = ProgressScope::count(self.opts.progress, &label, plan.len() as u64);

        for window in plan.iter() {
            tally.window_planned();
            let walker = IndexWalker::new(
                &self.index,
                &subreddit,
                window,
                self.opts.page_size,
                &index_limiter,
                &self.opts.retry,
            );
            if let Err(e) = self.run_window(walker, &fetcher, &tally, &sink) {
                tracing::warn!("skipping window {}: {}", window, e);
                tally.window_skipped(&e);
            }
            pb.inc(1);
        }

        let summary = tally.summary(&subreddit);
        pb.finish(format!(
            "r/{}: {} submissions, {} comments",
            subreddit, summary.submissions_resolved, summary.comments_written
        ));

        let report = self.opts.out_dir.join(REPORT_FILE);
        if let Err(e) = summary.write_json(&report) {
            tracing::error!("could not write run report {}: {:#}", report.display(), e);
        }
        tracing::info!(
            "done: {} submission(s) resolved, {} failed, {} comment(s) written, {} dropped, {} window(s) skipped",
            summary.submissions_resolved,
            summary.submissions_failed,
            summary.comments_written,
            summary.comments_dropped,
            summary.windows_skipped
        );
        Ok(summary)
    }

    /// Stream one window's refs into the fetcher.
    ///
    /// In `AllSubmissions` mode refs resolved before an index failure stay written.
    /// In `TopSubmissions` mode the ranking needs the full window, so an index failure
    /// skips the window before anything is resolved.
    fn run_window<F>(
        &self,
        walker: IndexWalker<'_, I>,
        fetcher: &Fetcher<'_, L>,
        tally: &Tally,
        sink: &F,
    ) -> Result<(), IndexQueryError>
    where
        F: Fn(Resolved) + Sync,
    {
        let window: QueryWindow = walker.window();
        match self.opts.mode {
            RetrievalMode::AllSubmissions => {
                let mut failed: Option<IndexQueryError> = None;
                {
                    let refs = walker.map_while(|r| match r {
                        Ok(r) => {
                            tally.ref_seen();
                            Some(r)
                        }
                        Err(e) => {
                            failed = Some(e);
                            None
                        }
                    });
                    fetcher.resolve(refs, self.opts.mode, sink);
                }
                failed.map_or(Ok(()), Err)
            }
            RetrievalMode::TopSubmissions { .. } => {
                let refs: Vec<SubmissionRef> = walker.collect::<Result<_, _>>()?;
                for _ in &refs {
                    tally.ref_seen();
                }
                tracing::debug!("window {}: {} candidate(s)", window, refs.len());
                fetcher.resolve(refs, self.opts.mode, sink);
                Ok(())
            }
        }
    }

    fn persist(&self, outcome: Resolved, writer: &PartitionedWriter, tally: &Tally) {
        let submission: Submission = match outcome {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("{}", e);
                tally.submission_failed(&e);
                return;
            }
        };
        tally.submission_resolved();
        if let Some(t) = &submission.truncation {
            tally.submission_truncated(&submission.info.id, t);
        }
        if self.opts.write_submissions {
            if let Err(e) = writer.write_submission(&submission.info) {
                tracing::warn!("{}", e);
                tally.record_write_failure(&e);
            }
        }
        for comment in &submission.comments {
            match writer.write(comment) {
                Ok(_) => tally.comment_written(),
                Err(e) => {
                    tracing::warn!("dropping comment: {}", e);
                    tally.comment_dropped(&e);
                }
            }
        }
        tracing::debug!(
            "submission {} '{}': {} comment(s)",
            submission.info.id, submission.info.title, submission.comments.len()
        );
    }
}
