#[path = "common/mod.rs"]
mod common;

use common::*;
use rharvest::{InvalidRangeError, QueryWindow, WindowPlan};
use std::time::Duration;

const DAY: Duration = Duration::from_secs(86_400);

fn assert_tiles(plan: &WindowPlan, start: i64, end: i64) {
    let windows: Vec<QueryWindow> = plan.iter().collect();
    assert!(!windows.is_empty());
    assert_eq!(windows.first().unwrap().start(), start, "first window starts at range start");
    assert_eq!(windows.last().unwrap().end(), end, "last window ends at range end");
    for pair in windows.windows(2) {
        assert_eq!(pair[0].end(), pair[1].start(), "windows are contiguous and non-overlapping");
        assert!(pair[0].start() < pair[1].start(), "windows are chronological");
    }
    for w in &windows {
        assert!(w.start() < w.end());
    }
    assert_eq!(windows.len(), plan.len());
}

/// Windows tile `[start, end)` exactly for a spread of ranges and chunk sizes,
/// including ranges that are not a multiple of the chunk.
#[test]
fn windows_cover_range_without_gaps_or_overlap() {
    let cases: &[(i64, i64, u64)] = &[
        (ts(2021, 1, 1), ts(2021, 2, 1), 86_400),
        (ts(2021, 1, 1), ts(2021, 1, 2), 86_400),
        (ts(2021, 1, 1), ts(2021, 1, 1) + 100_000, 86_400),
        (ts(2021, 1, 1), ts(2021, 1, 1) + 7, 3),
        (0, 1, 1),
        (1_000, 5_000, 10_000),
    ];
    for &(start, end, chunk) in cases {
        let plan = WindowPlan::new(start, end, Duration::from_secs(chunk)).unwrap();
        assert_tiles(&plan, start, end);
    }
}

/// The partial tail window is clipped to the range end.
#[test]
fn final_window_is_clipped() {
    let plan = WindowPlan::new(0, 10, Duration::from_secs(4)).unwrap();
    let bounds: Vec<(i64, i64)> = plan.iter().map(|w| (w.start(), w.end())).collect();
    assert_eq!(bounds, vec![(0, 4), (4, 8), (8, 10)]);
}

/// A plan can be iterated repeatedly, and a half-consumed iterator can be cloned.
#[test]
fn plan_is_restartable() {
    let plan = WindowPlan::from_days(day(2021, 3, 1), day(2021, 3, 8), DAY).unwrap();
    let first: Vec<QueryWindow> = plan.iter().collect();
    let second: Vec<QueryWindow> = (&plan).into_iter().collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), 7);

    let mut it = plan.iter();
    it.next();
    let fork = it.clone();
    assert_eq!(it.collect::<Vec<_>>(), fork.collect::<Vec<_>>());
}

/// `start == end` yields exactly one window one chunk wide.
#[test]
fn degenerate_range_yields_one_chunk() {
    let d = day(2021, 3, 15);
    let plan = WindowPlan::from_days(d, d, DAY).unwrap();
    let windows: Vec<QueryWindow> = plan.iter().collect();
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].start(), ts(2021, 3, 15));
    assert_eq!(windows[0].end(), ts(2021, 3, 16));
}

#[test]
fn reversed_range_is_rejected() {
    let err = WindowPlan::from_days(day(2021, 2, 1), day(2021, 1, 1), DAY).unwrap_err();
    assert!(matches!(err, InvalidRangeError::StartAfterEnd { .. }));
}

#[test]
fn zero_chunk_is_rejected() {
    let err = WindowPlan::new(0, 10, Duration::ZERO).unwrap_err();
    assert_eq!(err, InvalidRangeError::ZeroChunk);
}
