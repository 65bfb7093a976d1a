// src/api/wire.rs
// =============================================================================
// JSON shapes the platform sends back, and how we classify them.
//
// Every response is one of two envelopes:
//   {"response": {...}}                                  success
//   {"error": {"error_code": 6, "error_msg": "..."}}     failure
//
// The raw structs here mirror the loose JSON (lots of Option), and the
// into_* functions turn them into the strict Post/Comment types. Missing
// engagement counters become 0 right here, not later at display time.
// =============================================================================

use crate::model::{Comment, FetchOutcome, Post};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// "Too many requests per second"
pub const ERROR_TOO_MANY_REQUESTS: i64 = 6;
/// "Rate limit reached" (daily method quota)
pub const ERROR_RATE_LIMIT_REACHED: i64 = 29;
/// "User authorization failed"
pub const ERROR_AUTH_FAILED: i64 = 5;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: Option<T>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub error_code: i64,
    #[serde(default)]
    pub error_msg: String,
}

// {"count": 12} - used for likes, reposts, views and comments
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCounter {
    #[serde(default)]
    pub count: Option<u64>,
}

fn counter(raw: &Option<RawCounter>) -> u64 {
    raw.as_ref().and_then(|c| c.count).unwrap_or(0)
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPost {
    pub id: i64,
    pub owner_id: i64,
    #[serde(default)]
    pub from_id: Option<i64>,
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub likes: Option<RawCounter>,
    #[serde(default)]
    pub reposts: Option<RawCounter>,
    #[serde(default)]
    pub views: Option<RawCounter>,
    #[serde(default)]
    pub comments: Option<RawCounter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSearchResponse {
    #[serde(default)]
    pub items: Vec<RawPost>,
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub next_from: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawComment {
    pub id: i64,
    #[serde(default)]
    pub from_id: Option<i64>,
    pub date: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub likes: Option<RawCounter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCommentsResponse {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub items: Vec<RawComment>,
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}

// Items with an impossible date are dropped rather than guessed at.
pub fn into_post(raw: RawPost) -> Option<Post> {
    Some(Post {
        owner_id: raw.owner_id,
        post_id: raw.id,
        author_id: raw.from_id,
        published_at: timestamp(raw.date)?,
        likes: counter(&raw.likes),
        reposts: counter(&raw.reposts),
        views: counter(&raw.views),
        comment_count: counter(&raw.comments),
        text: raw.text.unwrap_or_default(),
    })
}

pub fn into_comment(raw: RawComment, owner_id: i64, post_id: i64) -> Option<Comment> {
    Some(Comment {
        comment_id: raw.id,
        owner_id,
        post_id,
        author_id: raw.from_id.unwrap_or(0),
        published_at: timestamp(raw.date)?,
        likes: counter(&raw.likes),
        text: raw.text.unwrap_or_default(),
    })
}

/// Maps a platform error code onto an outcome tag
pub fn classify_error<T>(error: ApiErrorBody) -> FetchOutcome<T> {
    match error.error_code {
        ERROR_TOO_MANY_REQUESTS | ERROR_RATE_LIMIT_REACHED => FetchOutcome::RateLimited,
        ERROR_AUTH_FAILED => FetchOutcome::InvalidCredential,
        code => FetchOutcome::FatalError { code, message: error.error_msg },
    }
}

// Decodes a response body into either the payload or a classified failure.
//
// A body that is neither envelope counts as a network problem: something
// between us and the platform mangled it.
pub fn decode<T: DeserializeOwned>(body: &str) -> FetchOutcome<T> {
    let envelope: Envelope<T> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) => return FetchOutcome::NetworkError(format!("undecodable response: {}", e)),
    };

    match (envelope.error, envelope.response) {
        (Some(error), _) => classify_error(error),
        (None, Some(payload)) => FetchOutcome::Success(payload),
        (None, None) => FetchOutcome::NetworkError("response has neither payload nor error".to_string()),
    }
}
