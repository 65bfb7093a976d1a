// src/crawl/mod.rs
// =============================================================================
// The crawl engine.
//
// Submodules:
// - schedule: splits the date range into windows
// - retry: wraps every API call with rotation, backoff and error handling
// - dispatcher: runs (query, window) work items on a bounded worker pool
// - progress: per-run counters, ETA and the observer trait
//
// A crawl never throws away what it found. Whether it finished, was
// cancelled, or lost every credential, the caller gets a CrawlResult with
// the data gathered so far plus a record of every work item that failed.
// =============================================================================

mod dispatcher;
mod progress;
mod retry;
mod schedule;

pub use dispatcher::Crawler;
pub use progress::{CrawlObserver, CrawlState, ProgressFn, ProgressReport, Silent};
pub use retry::{RetryController, RetryPolicy, RetryStats};
pub use schedule::{partition, Windows};

use crate::aggregate::Datasets;
use crate::error::CrawlError;
use crate::model::{CredentialState, PostKey, TimeWindow};
use serde::{Serialize, Serializer};
use std::time::Duration;

fn as_display<S: Serializer>(error: &CrawlError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(error)
}

/// How a crawl ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum CrawlOutcome {
    /// Every work item ran (some may still have failed)
    Completed,
    /// The caller cancelled; the data is partial
    Cancelled,
    /// A run-wide error stopped dispatch; the data is partial
    Aborted(#[serde(serialize_with = "as_display")] CrawlError),
}

/// Which step of a work item went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Search,
    Comments,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkItemFailure {
    pub query: String,
    pub window: TimeWindow,
    pub stage: Stage,
    /// Set when fetching comments for this post failed
    pub post: Option<PostKey>,
    #[serde(serialize_with = "as_display")]
    pub error: CrawlError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialReport {
    pub credential: String,
    pub state: CredentialState,
}

#[derive(Debug, Clone)]
pub struct CrawlResult {
    pub data: Datasets,
    pub failures: Vec<WorkItemFailure>,
    pub outcome: CrawlOutcome,
    pub credentials: Vec<CredentialReport>,
    pub work_items: usize,
    pub completed_items: usize,
    pub elapsed: Duration,
    pub retry_stats: RetryStats,
}

impl CrawlResult {
    /// True when everything ran and nothing failed
    pub fn is_clean(&self) -> bool {
        self.outcome == CrawlOutcome::Completed && self.failures.is_empty()
    }
}
