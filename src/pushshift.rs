//! Blocking client for a Pushshift-compatible submission search endpoint.

use crate::error::ApiError;
use crate::index::{HistoricalIndex, IndexCursor, IndexPage};
use crate::records::SubmissionRef;
use crate::window::QueryWindow;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(10);

pub struct PushshiftIndex {
    http: Client,
    base_url: String,
    search_term: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
    created_utc: f64,
}

impl PushshiftIndex {
    pub fn new(base_url: impl Into<String>, user_agent: &str) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { http, base_url: base_url.into().trim_end_matches('/').to_string(), search_term: None })
    }

    /// Restrict results to submissions whose title matches `term`.
    pub fn with_search_term(mut self, term: Option<String>) -> Self {
        self.search_term = term.filter(|t| !t.trim().is_empty());
        self
    }
}

impl PushshiftIndex {
    /// Query string for one page. Both bounds are exclusive on the server side, so
    /// `after = start - 1` keeps submissions posted exactly at `start`.
    fn search_params(
        &self,
        subreddit: &str,
        window: &QueryWindow,
        after: Option<&IndexCursor>,
        limit: usize,
    ) -> Result<Vec<(&'static str, String)>, ApiError> {
        let after_ts = match after {
            Some(c) => c.0.parse::<i64>().map_err(|_| ApiError::Decode(format!("bad cursor '{}'", c.0)))? - 1,
            None => window.start() - 1,
        };
        let mut query = vec![
            ("subreddit", subreddit.to_string()),
            ("after", after_ts.to_string()),
            ("before", window.end().to_string()),
            ("sort", "asc".to_string()),
            ("sort_type", "created_utc".to_string()),
            ("limit", limit.to_string()),
            ("fields", "id,created_utc".to_string()),
        ];
        if let Some(q) = &self.search_term {
            query.push(("q", q.clone()));
        }
        Ok(query)
    }
}

/// The cursor is the newest timestamp on the page; an empty page has none.
fn page_from_hits(hits: Vec<SearchHit>) -> IndexPage {
    let refs: Vec<SubmissionRef> =
        hits.into_iter().map(|h| SubmissionRef { id: h.id, created_utc: h.created_utc as i64 }).collect();
    let next = refs.iter().map(|r| r.created_utc).max().map(|ts| IndexCursor(ts.to_string()));
    IndexPage { refs, next }
}

impl HistoricalIndex for PushshiftIndex {
    /// Pages ascend by `created_utc`. The cursor is the last timestamp seen; the next page
    /// asks for `after = cursor - 1` so same-second submissions are not lost at the seam.
    /// The resulting overlap is removed by the walker.
    fn query(
        &self,
        subreddit: &str,
        window: &QueryWindow,
        after: Option<&IndexCursor>,
        limit: usize,
    ) -> Result<IndexPage, ApiError> {
        let query = self.search_params(subreddit, window, after, limit)?;
        let url = format!("{}/reddit/search/submission/", self.base_url);
        let resp = self.http.get(&url).query(&query).send()?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RETRY_AFTER);
            return Err(ApiError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let message = status.canonical_reason().unwrap_or("request failed").to_string();
            return Err(ApiError::Status { status: status.as_u16(), message });
        }

        let body: SearchResponse = resp.json()?;
        Ok(page_from_hits(body.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> PushshiftIndex {
        PushshiftIndex::new("https://index.example/", "test-agent").unwrap()
    }

    fn param<'a>(query: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        query.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn first_page_covers_the_window_inclusively() {
        let window = QueryWindow::new(1_000, 2_000).unwrap();
        let q = index().search_params("rust", &window, None, 100).unwrap();
        assert_eq!(param(&q, "subreddit"), Some("rust"));
        assert_eq!(param(&q, "after"), Some("999"));
        assert_eq!(param(&q, "before"), Some("2000"));
        assert_eq!(param(&q, "sort"), Some("asc"));
        assert_eq!(param(&q, "limit"), Some("100"));
        assert_eq!(param(&q, "q"), None);
    }

    #[test]
    fn next_page_restarts_one_second_before_the_cursor() {
        let window = QueryWindow::new(1_000, 2_000).unwrap();
        let cursor = IndexCursor("1500".into());
        let q = index().with_search_term(Some("ama".into())).search_params("rust", &window, Some(&cursor), 50).unwrap();
        assert_eq!(param(&q, "after"), Some("1499"));
        assert_eq!(param(&q, "before"), Some("2000"));
        assert_eq!(param(&q, "q"), Some("ama"));
    }

    #[test]
    fn malformed_cursor_is_a_decode_error() {
        let window = QueryWindow::new(1_000, 2_000).unwrap();
        let cursor = IndexCursor("soon".into());
        let err = index().search_params("rust", &window, Some(&cursor), 50).unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn cursor_is_the_newest_timestamp_of_the_page() {
        let page = page_from_hits(vec![
            SearchHit { id: "a".into(), created_utc: 1_200.0 },
            SearchHit { id: "b".into(), created_utc: 1_500.0 },
            SearchHit { id: "c".into(), created_utc: 1_500.0 },
        ]);
        assert_eq!(page.refs.len(), 3);
        assert_eq!(page.next, Some(IndexCursor("1500".into())));
        assert_eq!(page_from_hits(Vec::new()).next, None);
    }
}
