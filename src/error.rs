// src/error.rs
// =============================================================================
// Typed errors for the crawl engine.
//
// The binary uses anyhow (any error, plus context), but the library hands
// errors back to whoever drives the crawl, so they need to be matchable.
// thiserror generates the Display and Error impls for us.
//
// Taxonomy:
// - RateLimited        transient, retried with rotation and backoff
// - InvalidCredential  permanent for one credential, the pool shrinks
// - PoolExhausted      every credential is unusable, fatal to the run
// - Fatal              platform refused the request, fatal to one work item
// - Network            transport failure, retried once then fatal to the item
// - Truncated          a window hit the page limit, so later pages were never read
// - Cancelled          the caller asked us to stop
// =============================================================================

use thiserror::Error;

/// Everything that can go wrong while crawling.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CrawlError {
    /// Still rate limited after the retry budget ran out
    #[error("rate limited after {attempts} attempt(s)")]
    RateLimited { attempts: u32 },

    /// The platform rejected a credential
    #[error("credential {0} was rejected")]
    InvalidCredential(String),

    /// No usable credential left
    #[error("all credentials are invalid")]
    PoolExhausted,

    /// Platform-reported failure that retrying won't fix
    #[error("API error {code}: {message}")]
    Fatal { code: i64, message: String },

    /// Transport-level failure (connection, timeout, undecodable body)
    #[error("network error: {0}")]
    Network(String),

    /// Paging stopped at the page limit with more results still on offer
    #[error("results truncated after {pages} page(s); use a smaller window step")]
    Truncated { pages: u32 },

    /// The crawl was cancelled before this request ran
    #[error("cancelled")]
    Cancelled,

    /// The crawl configuration doesn't make sense
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CrawlError {
    /// Errors that end the whole run rather than a single work item
    pub fn is_global(&self) -> bool {
        matches!(self, CrawlError::PoolExhausted)
    }
}

/// Errors from building time windows.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("window step must be positive")]
    NonPositiveStep,

    #[error("start {start} is after end {end}")]
    InvertedRange { start: String, end: String },
}

/// Errors from building a match filter.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("could not compile query pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type Result<T, E = CrawlError> = std::result::Result<T, E>;
