#[path = "common/mod.rs"]
mod common;

use common::*;
use rharvest::{
    ApiError, CommentNode, Failure, Harvester, InvalidRangeError, ManualClock, RetrievalMode, RetryPolicy,
    REPORT_FILE,
};
use std::sync::Arc;
use std::time::Duration;

fn quick_retry() -> RetryPolicy {
    RetryPolicy { max_retries: 1, initial_delay: Duration::from_secs(1), ..RetryPolicy::default() }
}

/// Two days of data: s1 (Jan 1) with a reply crossing midnight, s2 (Jan 2).
fn two_day_fixture() -> (FakeIndex, FakeLive) {
    let d1 = ts(2021, 1, 1);
    let d2 = ts(2021, 1, 2);
    let index = FakeIndex::new(vec![sref("s1", d1 + 100), sref("s2", d2 + 100)]);
    let live = FakeLive::new()
        .with_submission(
            info("s1", 10, d1 + 100),
            vec![CommentNode::Comment {
                comment: comment("c1", "s1", "s1", d1 + 200),
                replies: vec![CommentNode::leaf(comment("c2", "s1", "c1", d2 + 50))],
            }],
        )
        .with_submission(info("s2", 5, d2 + 100), vec![CommentNode::leaf(comment("c3", "s2", "s2", d2 + 300))]);
    (index, live)
}

fn harvester<'a>(
    index: &'a FakeIndex,
    live: &'a FakeLive,
    out: &std::path::Path,
) -> Harvester<&'a FakeIndex, &'a FakeLive> {
    Harvester::new(index, live)
        .subreddit("r/Rust")
        .date_range(day(2021, 1, 1), day(2021, 1, 3))
        .out_dir(out)
        .retry(quick_retry())
        .pacing(Duration::ZERO, Duration::ZERO)
        .progress(false)
        .clock(Arc::new(ManualClock::new()))
}

/// End to end: every comment lands in the partition of its own timestamp, and a report is written.
#[test]
fn all_mode_writes_comments_by_comment_day() {
    let dir = tempfile::tempdir().unwrap();
    let (index, live) = two_day_fixture();

    let summary = harvester(&index, &live, dir.path())
        .mode(RetrievalMode::AllSubmissions)
        .run()
        .unwrap();

    assert_eq!(summary.subreddit, "rust");
    assert_eq!(summary.windows_planned, 2);
    assert_eq!(summary.refs_seen, 2);
    assert_eq!(summary.submissions_resolved, 2);
    assert_eq!(summary.comments_written, 3);
    assert!(summary.failures.is_empty());

    let day1 = read_jsonl_values(&dir.path().join("2021/01/01/s1_comments.ndjson"));
    let day2_s1 = read_jsonl_values(&dir.path().join("2021/01/02/s1_comments.ndjson"));
    let day2_s2 = read_jsonl_values(&dir.path().join("2021/01/02/s2_comments.ndjson"));
    assert_eq!(day1.len(), 1);
    assert_eq!(day1[0]["id"], "c1");
    assert_eq!(day2_s1[0]["id"], "c2");
    assert_eq!(day2_s2[0]["id"], "c3");
    assert_eq!(read_lines(&dir.path().join("2021/01/01/submissions.ndjson")).len(), 1);

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join(REPORT_FILE)).unwrap()).unwrap();
    assert_eq!(report["comments_written"], 3);
}

/// An index failure in one window skips that window only.
#[test]
fn failing_window_is_skipped_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let (mut index, live) = two_day_fixture();
    index.failing_windows.insert(ts(2021, 1, 1));

    let summary = harvester(&index, &live, dir.path())
        .mode(RetrievalMode::AllSubmissions)
        .run()
        .unwrap();

    assert_eq!(summary.windows_skipped, 1);
    assert_eq!(summary.submissions_resolved, 1);
    assert_eq!(summary.comments_written, 1);
    assert!(matches!(
        &summary.failures[..],
        [Failure::Window { window, .. }] if window.start() == ts(2021, 1, 1)
    ));
    assert!(!dir.path().join("2021/01/01").exists());
}

/// Top-N is applied per window.
#[test]
fn top_mode_picks_per_window() {
    let dir = tempfile::tempdir().unwrap();
    let d1 = ts(2021, 1, 1);
    let index = FakeIndex::new(vec![sref("lo", d1 + 1), sref("hi", d1 + 2), sref("mid", d1 + 3)]);
    let live = FakeLive::new()
        .with_submission(info("lo", 1, d1 + 1), vec![CommentNode::leaf(comment("a", "lo", "lo", d1 + 10))])
        .with_submission(info("hi", 99, d1 + 2), vec![CommentNode::leaf(comment("b", "hi", "hi", d1 + 10))])
        .with_submission(info("mid", 50, d1 + 3), vec![CommentNode::leaf(comment("c", "mid", "mid", d1 + 10))]);

    let summary = harvester(&index, &live, dir.path())
        .date_range(day(2021, 1, 1), day(2021, 1, 2))
        .mode(RetrievalMode::TopSubmissions { n: 2 })
        .run()
        .unwrap();

    assert_eq!(summary.refs_seen, 3);
    assert_eq!(summary.submissions_resolved, 2);
    assert_eq!(live.comment_fetches(), vec!["hi", "mid"]);
    assert!(!dir.path().join("2021/01/01/lo_comments.ndjson").exists());
}

/// A submission that fails all retries is absent from output and listed in the report.
#[test]
fn failed_submission_is_absent_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let (index, live) = two_day_fixture();
    live.fail_comments("s2", vec![ApiError::Transport("timeout".into()); 5]);

    let summary = harvester(&index, &live, dir.path())
        .mode(RetrievalMode::AllSubmissions)
        .run()
        .unwrap();

    assert_eq!(summary.submissions_failed, 1);
    assert_eq!(summary.failed_submissions(), vec!["s2"]);
    assert!(!dir.path().join("2021/01/02/s2_comments.ndjson").exists());
    assert_eq!(summary.comments_written, 2);
}

/// A truncated tree is written partially and flagged, without failing the run.
#[test]
fn truncated_submission_is_flagged() {
    let dir = tempfile::tempdir().unwrap();
    let d1 = ts(2021, 1, 1);
    let index = FakeIndex::new(vec![sref("deep", d1 + 5)]);
    let live = FakeLive::new().with_chain("deep", d1 + 5, 40);

    let summary = harvester(&index, &live, dir.path())
        .date_range(day(2021, 1, 1), day(2021, 1, 2))
        .mode(RetrievalMode::AllSubmissions)
        .expansion_cap(32)
        .run()
        .unwrap();

    assert_eq!(summary.submissions_resolved, 1);
    assert_eq!(summary.submissions_truncated, 1);
    assert_eq!(summary.comments_written, 33);
    assert_eq!(read_lines(&dir.path().join("2021/01/01/deep_comments.ndjson")).len(), 33);
}

/// A reversed range is fatal and nothing is created on disk.
#[test]
fn invalid_range_aborts_before_io() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let (index, live) = two_day_fixture();

    let err = harvester(&index, &live, &out)
        .date_range(day(2021, 2, 1), day(2021, 1, 1))
        .run()
        .unwrap_err();

    assert!(err.downcast_ref::<InvalidRangeError>().is_some());
    assert!(!out.exists());
    assert_eq!(index.call_count(), 0);
    assert!(live.calls().is_empty());
}
