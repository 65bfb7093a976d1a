// src/config.rs
// =============================================================================
// Everything a crawl needs to know up front.
//
// Built with CrawlConfig::new(...) and then refined with the with_*
// builder methods; validate() runs before any request goes out.
// =============================================================================

use crate::crawl::{partition, RetryPolicy, Windows};
use crate::error::CrawlError;
use crate::model::{MatchMode, Query, WorkItem};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Duration;

pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_PAUSE: Duration = Duration::from_secs(5);
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_MAX_PAGES: u32 = 50;

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub queries: Vec<String>,
    pub mode: MatchMode,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub tokens: Vec<String>,
    pub step: chrono::Duration,
    pub workers: usize,
    pub pause: Duration,
    /// Divide the pause by the number of credentials
    pub scale_pause: bool,
    /// How long a rate-limited credential sits out; None means "same as the pause"
    pub cooldown: Option<Duration>,
    pub max_rate_limit_retries: u32,
    pub fetch_comments: bool,
    /// Only keep posts from this wall
    pub owner_id: Option<i64>,
    pub page_size: u32,
    /// Upper bound on search pages per work item
    pub max_pages: u32,
}

impl CrawlConfig {
    pub fn new<I, S>(queries: I, start: DateTime<Utc>, end: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queries: queries.into_iter().map(Into::into).collect(),
            mode: MatchMode::Exact,
            start,
            end,
            tokens: Vec::new(),
            step: chrono::Duration::days(1),
            workers: DEFAULT_WORKERS,
            pause: DEFAULT_PAUSE,
            scale_pause: false,
            cooldown: None,
            max_rate_limit_retries: RetryPolicy::default().max_rate_limit_retries,
            fetch_comments: true,
            owner_id: None,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }
    pub fn with_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens = tokens.into_iter().map(Into::into).collect();
        self
    }
    pub fn with_step(mut self, step: chrono::Duration) -> Self {
        self.step = step;
        self
    }
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }
    pub fn with_scaled_pause(mut self, yes: bool) -> Self {
        self.scale_pause = yes;
        self
    }
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = Some(cooldown);
        self
    }
    pub fn with_max_rate_limit_retries(mut self, retries: u32) -> Self {
        self.max_rate_limit_retries = retries;
        self
    }
    pub fn with_comments(mut self, yes: bool) -> Self {
        self.fetch_comments = yes;
        self
    }
    pub fn with_owner(mut self, owner_id: Option<i64>) -> Self {
        self.owner_id = owner_id;
        self
    }
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }
    pub fn with_max_pages(mut self, pages: u32) -> Self {
        self.max_pages = pages;
        self
    }

    pub fn validate(&self) -> Result<(), CrawlError> {
        let invalid = |msg: &str| Err(CrawlError::InvalidConfig(msg.to_string()));

        if self.queries.is_empty() {
            return invalid("at least one query is required");
        }
        if self.queries.iter().any(|q| q.trim().is_empty()) {
            return invalid("queries must not be blank");
        }
        if self.start >= self.end {
            return invalid("start must be before end");
        }
        if self.step < chrono::Duration::seconds(1) {
            return invalid("window step must be at least one second");
        }
        if self.workers == 0 {
            return invalid("need at least one worker");
        }
        if self.page_size == 0 || self.page_size > crate::api::MAX_SEARCH_PAGE {
            return invalid("page size must be between 1 and 200");
        }
        if self.max_pages == 0 {
            return invalid("max pages must be at least 1");
        }
        if self.tokens.iter().all(|t| t.trim().is_empty()) {
            return invalid("at least one access token is required");
        }
        Ok(())
    }

    /// Trimmed queries, each distinct one once, in the order given
    pub fn queries(&self) -> Vec<Query> {
        let mut seen = HashSet::new();
        self.queries
            .iter()
            .map(|q| q.trim())
            .filter(|q| seen.insert(*q))
            .map(|q| Query::new(q, self.mode))
            .collect()
    }

    /// Per-request pause given how many credentials share the load
    pub fn effective_pause(&self, credentials: usize) -> Duration {
        if self.scale_pause && credentials > 1 {
            self.pause / credentials as u32
        } else {
            self.pause
        }
    }

    pub fn retry_policy(&self, credentials: usize) -> RetryPolicy {
        RetryPolicy {
            pause: self.effective_pause(credentials),
            max_rate_limit_retries: self.max_rate_limit_retries,
            ..RetryPolicy::default()
        }
    }

    pub fn windows(&self) -> Result<Windows, CrawlError> {
        partition(self.start, self.end, self.step).map_err(|e| CrawlError::InvalidConfig(e.to_string()))
    }

    pub fn total_work_items(&self) -> Result<usize, CrawlError> {
        Ok(self.windows()?.len() * self.queries().len())
    }

    // Lazily crosses windows with queries: window 1 for every query, then
    // window 2, and so on.
    pub fn work_items(&self) -> Result<impl Iterator<Item = WorkItem>, CrawlError> {
        let queries = self.queries();
        let per_window = queries.len();
        let items = self.windows()?.enumerate().flat_map(move |(w, window)| {
            queries
                .clone()
                .into_iter()
                .enumerate()
                .map(move |(q, query)| WorkItem { index: w * per_window + q, query, window })
        });
        Ok(items)
    }
}
