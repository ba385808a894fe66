//! Time-window planning: split `[start, end)` into contiguous query windows.

use crate::date::{fmt_epoch, Day};
use crate::error::InvalidRangeError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Half-open `[start, end)` range of unix seconds. Always `start < end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct QueryWindow {
    start: i64,
    end: i64,
}

impl QueryWindow {
    pub fn new(start: i64, end: i64) -> Result<Self, InvalidRangeError> {
        if start >= end {
            return Err(InvalidRangeError::StartAfterEnd { start, end });
        }
        Ok(Self { start, end })
    }
    #[inline] pub fn start(&self) -> i64 { self.start }
    #[inline] pub fn end(&self) -> i64 { self.end }
    #[inline] pub fn contains(&self, ts: i64) -> bool { ts >= self.start && ts < self.end }
}

impl fmt::Display for QueryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} .. {})", fmt_epoch(self.start), fmt_epoch(self.end))
    }
}

/// A validated plan. Iterate it as many times as needed; each pass starts over.
///
/// When `start == end` the plan holds a single window `[start, start + chunk)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowPlan {
    start: i64,
    end: i64,
    chunk: i64,
}

impl WindowPlan {
    pub fn new(start: i64, end: i64, chunk: Duration) -> Result<Self, InvalidRangeError> {
        let chunk = i64::try_from(chunk.as_secs()).unwrap_or(i64::MAX);
        if chunk <= 0 {
            return Err(InvalidRangeError::ZeroChunk);
        }
        if start > end {
            return Err(InvalidRangeError::StartAfterEnd { start, end });
        }
        let end = if start == end { start.saturating_add(chunk) } else { end };
        Ok(Self { start, end, chunk })
    }

    /// Plan over whole UTC days: `start` inclusive, `end` exclusive.
    pub fn from_days(start: Day, end: Day, chunk: Duration) -> Result<Self, InvalidRangeError> {
        Self::new(start.start_epoch(), end.start_epoch(), chunk)
    }

    pub fn iter(&self) -> Windows {
        Windows { next: self.start, end: self.end, chunk: self.chunk }
    }

    pub fn len(&self) -> usize {
        let span = self.end - self.start;
        ((span + self.chunk - 1) / self.chunk) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> IntoIterator for &'a WindowPlan {
    type Item = QueryWindow;
    type IntoIter = Windows;
    fn into_iter(self) -> Windows {
        self.iter()
    }
}

/// Lazy chronological window sequence; the last window is clipped to the plan end.
#[derive(Clone, Debug)]
pub struct Windows {
    next: i64,
    end: i64,
    chunk: i64,
}

impl Iterator for Windows {
    type Item = QueryWindow;
    fn next(&mut self) -> Option<QueryWindow> {
        if self.next >= self.end {
            return None;
        }
        let start = self.next;
        let stop = start.saturating_add(self.chunk).min(self.end);
        self.next = stop;
        Some(QueryWindow { start, end: stop })
    }
}
