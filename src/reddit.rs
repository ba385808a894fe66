//! Blocking client for the Reddit OAuth API (application-only auth).

use crate::config::Credentials;
use crate::error::ApiError;
use crate::fetch::LiveApi;
use crate::limiter::RateLimiter;
use crate::records::{clean_author, clean_text, strip_fullname, Comment, CommentNode, MoreComments, SubmissionInfo};
use parking_lot::Mutex;
use reqwest::blocking::{Client, Response};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";
const WEB_BASE: &str = "https://www.reddit.com";
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

struct Token {
    value: String,
    expires_at: Instant,
}

pub struct RedditClient {
    http: Client,
    creds: Credentials,
    api_base: String,
    token: Mutex<Option<Token>>,
    /// Fed with `x-ratelimit-*` headers so the budget tracks the server's view.
    limiter: Option<RateLimiter>,
}

impl RedditClient {
    pub fn new(creds: Credentials) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(creds.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http, creds, api_base: API_BASE.to_string(), token: Mutex::new(None), limiter: None })
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn bearer(&self) -> Result<String, ApiError> {
        let mut guard = self.token.lock();
        if let Some(t) = guard.as_ref() {
            if t.expires_at > Instant::now() {
                return Ok(t.value.clone());
            }
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            #[serde(default)]
            expires_in: u64,
        }

        let resp = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.creds.client_id, Some(&self.creds.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()?;
        if matches!(resp.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(ApiError::Auth(format!("token request returned {}", resp.status())));
        }
        let resp = self.check(resp)?;
        let body: TokenResponse = resp.json()?;
        let ttl = Duration::from_secs(body.expires_in.max(120) - 60);
        tracing::debug!("obtained OAuth token, valid for {:?}", ttl);
        *guard = Some(Token { value: body.access_token.clone(), expires_at: Instant::now() + ttl });
        Ok(body.access_token)
    }

    fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        let token = self.bearer()?;
        let url = format!("{}{}", self.api_base, path);
        let resp = self.http.get(&url).bearer_auth(token).query(query).query(&[("raw_json", "1")]).send()?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            // Token revoked or expired early; next call re-authenticates.
            *self.token.lock() = None;
            return Err(ApiError::Transport(format!("GET {path}: token rejected")));
        }
        let resp = self.check(resp)?;
        Ok(resp.json()?)
    }

    /// Map status codes to errors and forward budget headers to the limiter.
    fn check(&self, resp: Response) -> Result<Response, ApiError> {
        let headers = resp.headers();
        if let (Some(limiter), Some(remaining), Some(reset)) =
            (&self.limiter, header_f64(headers, "x-ratelimit-remaining"), header_f64(headers, "x-ratelimit-reset"))
        {
            limiter.observe(remaining, Duration::from_secs_f64(reset.max(0.0)));
        }
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = header_f64(headers, "retry-after")
                .or_else(|| header_f64(headers, "x-ratelimit-reset"))
                .map(|s| Duration::from_secs_f64(s.max(1.0)))
                .unwrap_or(DEFAULT_RETRY_AFTER);
            return Err(ApiError::RateLimited { retry_after });
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(resp.url().path().to_string()));
        }
        if !status.is_success() {
            let message = status.canonical_reason().unwrap_or("request failed").to_string();
            return Err(ApiError::Status { status: status.as_u16(), message });
        }
        Ok(resp)
    }
}

impl RedditClient {
    /// GET a comments page; the response is `[submission listing, comment listing]`.
    fn comment_listing(&self, path: &str, submission_id: &str) -> Result<Vec<CommentNode>, ApiError> {
        let v = self.get_json(path, &[("limit", "500".to_string()), ("sort", "old".to_string())])?;
        let comments = v.get(1).ok_or_else(|| ApiError::Decode(format!("comments for {submission_id}: missing listing")))?;
        parse_forest(listing_children(comments))
    }
}

fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
    headers.get(name)?.to_str().ok()?.trim().parse::<f64>().ok()
}

// ----------------------------- wire format ------------------------------------

#[derive(Debug, Deserialize)]
struct RawLink {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    selftext: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    author_fullname: Option<String>,
    created_utc: f64,
    #[serde(default)]
    num_comments: i64,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    upvote_ratio: Option<f64>,
    #[serde(default)]
    permalink: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    id: String,
    parent_id: String,
    link_id: String,
    #[serde(default)]
    subreddit: Option<String>,
    #[serde(default)]
    subreddit_id: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    author_fullname: Option<String>,
    #[serde(default)]
    body: Option<String>,
    created_utc: f64,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    total_awards_received: i64,
    /// Either "" or a nested listing.
    #[serde(default)]
    replies: Value,
}

#[derive(Debug, Deserialize)]
struct RawMore {
    parent_id: String,
    #[serde(default)]
    children: Vec<String>,
}

fn listing_children(v: &Value) -> &[Value] {
    v.pointer("/data/children").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

fn bare_id(fullname: Option<String>) -> Option<String> {
    fullname.as_deref().map(strip_fullname).filter(|s| !s.is_empty()).map(str::to_string)
}

fn parse_link(v: &Value) -> Result<SubmissionInfo, ApiError> {
    let raw: RawLink = serde_json::from_value(v.clone())?;
    let full_link = raw.permalink.as_deref().map(|p| format!("{WEB_BASE}{p}"));
    Ok(SubmissionInfo {
        id: raw.id,
        title: clean_text(raw.title.as_deref()).unwrap_or_default(),
        selftext: clean_text(raw.selftext.as_deref()),
        author: clean_author(raw.author.as_deref()),
        author_id: bare_id(raw.author_fullname),
        created_utc: raw.created_utc as i64,
        num_comments: raw.num_comments,
        score: raw.score,
        upvote_ratio: raw.upvote_ratio,
        permalink: raw.permalink,
        full_link,
    })
}

/// Convert one `{kind, data}` thing into a node. Unknown kinds are skipped.
fn parse_thing(thing: &Value) -> Result<Option<CommentNode>, ApiError> {
    let data = thing.get("data").cloned().unwrap_or(Value::Null);
    match thing.get("kind").and_then(Value::as_str) {
        Some("t1") => {
            let raw: RawComment = serde_json::from_value(data)?;
            let replies = parse_forest(listing_children(&raw.replies))?;
            let comment = Comment {
                id: raw.id,
                submission_id: strip_fullname(&raw.link_id).to_string(),
                parent_id: strip_fullname(&raw.parent_id).to_string(),
                subreddit: raw.subreddit,
                subreddit_id: bare_id(raw.subreddit_id),
                author: clean_author(raw.author.as_deref()),
                author_id: bare_id(raw.author_fullname),
                body: clean_text(raw.body.as_deref()),
                created_utc: raw.created_utc as i64,
                score: raw.score,
                total_awards_received: raw.total_awards_received,
            };
            Ok(Some(CommentNode::Comment { comment, replies }))
        }
        Some("more") => {
            let raw: RawMore = serde_json::from_value(data)?;
            Ok(Some(CommentNode::More(MoreComments {
                parent_id: strip_fullname(&raw.parent_id).to_string(),
                children: raw.children,
            })))
        }
        _ => Ok(None),
    }
}

fn parse_forest(things: &[Value]) -> Result<Vec<CommentNode>, ApiError> {
    let mut out = Vec::with_capacity(things.len());
    for t in things {
        if let Some(node) = parse_thing(t)? {
            out.push(node);
        }
    }
    Ok(out)
}

impl LiveApi for RedditClient {
    fn fetch_submissions_by_ids(&self, ids: &[String]) -> Result<Vec<SubmissionInfo>, ApiError> {
        let fullnames = ids.iter().map(|id| format!("t3_{id}")).collect::<Vec<_>>().join(",");
        let v = self.get_json("/api/info", &[("id", fullnames)])?;
        listing_children(&v)
            .iter()
            .filter(|t| t.get("kind").and_then(Value::as_str) == Some("t3"))
            .filter_map(|t| t.get("data"))
            .map(parse_link)
            .collect()
    }

    fn fetch_comments(&self, submission_id: &str) -> Result<Vec<CommentNode>, ApiError> {
        self.comment_listing(&format!("/comments/{submission_id}"), submission_id)
    }

    fn continue_thread(&self, submission_id: &str, parent_id: &str) -> Result<Vec<CommentNode>, ApiError> {
        self.comment_listing(&format!("/comments/{submission_id}/_/{parent_id}"), submission_id)
    }

    fn expand_placeholder(&self, submission_id: &str, more: &MoreComments) -> Result<Vec<CommentNode>, ApiError> {
        let v = self.get_json(
            "/api/morechildren",
            &[
                ("api_type", "json".to_string()),
                ("link_id", format!("t3_{submission_id}")),
                ("children", more.children.join(",")),
            ],
        )?;
        let things = v.pointer("/json/data/things").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[]);
        parse_forest(things)
    }
}
