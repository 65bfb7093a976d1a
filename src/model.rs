// src/model.rs
// =============================================================================
// The data types shared by every part of the crawl engine.
//
// - Credential / CredentialState: access tokens and what we know about them
// - TimeWindow: a half-open [start, end) slice of the requested range
// - Query / MatchMode: what we're looking for and how strictly
// - Post / Comment: strictly-typed content parsed from the API
// - FetchOutcome: the classified result of one API call
// - WorkItem: one (query, window) unit handed to a worker
//
// Rust concepts:
// - Generic enums: FetchOutcome<T> works for any payload type
// - Arc<str>: a cheaply clonable, immutable shared string
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// An access token plus its slot in the pool.
//
// Debug and Display are written by hand so a token can never leak into logs:
// both only show the last four characters.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential {
    slot: usize,
    token: Arc<str>,
}

impl Credential {
    pub fn new(slot: usize, token: impl Into<Arc<str>>) -> Self {
        Self { slot, token: token.into() }
    }

    /// Position of this credential in the pool it came from
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// The raw token, only for building requests
    pub fn token(&self) -> &str {
        &self.token
    }

    /// "…abcd" style label that is safe to print
    pub fn masked(&self) -> String {
        let tail: String = {
            let chars: Vec<char> = self.token.chars().collect();
            let skip = chars.len().saturating_sub(4);
            chars[skip..].iter().collect()
        };
        format!("…{}", tail)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("slot", &self.slot)
            .field("token", &self.masked())
            .finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.slot + 1, self.masked())
    }
}

/// What the pool currently knows about a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    /// Never used yet
    Untested,
    /// At least one request succeeded with it
    Valid,
    /// The platform throttled it; usable again after the cool-down
    RateLimited,
    /// Rejected by the platform; never selected again
    Invalid,
}

// A half-open interval [start, end).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} .. {})",
            self.start.format("%Y-%m-%d %H:%M:%S"),
            self.end.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// How strictly a query has to match the text of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Whole phrase, bounded by non-word characters, case-insensitive
    #[default]
    Exact,
    /// Case-insensitive substring
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub mode: MatchMode,
}

impl Query {
    pub fn new(text: impl Into<String>, mode: MatchMode) -> Self {
        Self { text: text.into(), mode }
    }
}

/// (owner_id, post_id) - unique per platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PostKey {
    pub owner_id: i64,
    pub post_id: i64,
}

// A post as we keep it.
// Engagement counters the API left out are already 0 here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub owner_id: i64,
    pub post_id: i64,
    pub author_id: Option<i64>,
    pub text: String,
    pub published_at: DateTime<Utc>,
    pub likes: u64,
    pub reposts: u64,
    pub views: u64,
    pub comment_count: u64,
}

impl Post {
    pub fn key(&self) -> PostKey {
        PostKey { owner_id: self.owner_id, post_id: self.post_id }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub comment_id: i64,
    pub owner_id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub text: String,
    pub published_at: DateTime<Utc>,
    pub likes: u64,
}

impl Comment {
    pub fn parent(&self) -> PostKey {
        PostKey { owner_id: self.owner_id, post_id: self.post_id }
    }
}

/// One page of search results
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchPage {
    pub items: Vec<Post>,
    /// Continuation token; None means this was the last page
    pub next_from: Option<String>,
    /// Server's estimate of the total, when it gives one
    pub total_count: Option<u64>,
}

/// One page of a post's comment thread
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommentPage {
    pub items: Vec<Comment>,
    /// Offset of the next page; None once the thread has been read
    pub next_offset: Option<u64>,
    /// Server's count of comments on the post
    pub total_count: Option<u64>,
}

// The classified result of a single API call.
//
// The API client is the only code that looks at raw platform error codes;
// everything above it matches on these variants instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome<T> {
    Success(T),
    /// Nothing (more) to fetch
    Empty,
    RateLimited,
    InvalidCredential,
    FatalError { code: i64, message: String },
    /// Transport failure or a body we couldn't decode
    NetworkError(String),
}

impl<T> FetchOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchOutcome<U> {
        match self {
            FetchOutcome::Success(value) => FetchOutcome::Success(f(value)),
            FetchOutcome::Empty => FetchOutcome::Empty,
            FetchOutcome::RateLimited => FetchOutcome::RateLimited,
            FetchOutcome::InvalidCredential => FetchOutcome::InvalidCredential,
            FetchOutcome::FatalError { code, message } => FetchOutcome::FatalError { code, message },
            FetchOutcome::NetworkError(message) => FetchOutcome::NetworkError(message),
        }
    }
}

/// One (query, window) unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub index: usize,
    pub query: Query,
    pub window: TimeWindow,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn masked_credential_shows_only_last_four_chars() {
        let cred = Credential::new(0, "secret-token-9f3a");
        assert_eq!(cred.masked(), "…9f3a");
        assert!(!format!("{:?}", cred).contains("secret"));
        assert_eq!(cred.to_string(), "#1 (…9f3a)");
    }

    #[test]
    fn masked_short_token() {
        assert_eq!(Credential::new(2, "ab").masked(), "…ab");
    }

    #[test]
    fn window_is_half_open() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 1, 0, 0).unwrap();
        let window = TimeWindow::new(start, end);

        assert!(window.contains(start));
        assert!(!window.contains(end));
        assert_eq!(window.duration(), chrono::Duration::hours(1));
    }

    #[test]
    fn fetch_outcome_map_keeps_tags() {
        let ok: FetchOutcome<u32> = FetchOutcome::Success(2);
        assert_eq!(ok.map(|n| n * 2), FetchOutcome::Success(4));

        let limited: FetchOutcome<u32> = FetchOutcome::RateLimited;
        assert_eq!(limited.map(|n| n * 2), FetchOutcome::RateLimited);
    }
}
