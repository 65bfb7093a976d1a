// src/crawl/progress.rs
// =============================================================================
// Progress accounting for one crawl.
//
// CrawlState lives for exactly one run: it is created when the crawl starts,
// bumped every time a work item finishes, and dropped when the crawl ends.
// Each bump produces a ProgressReport that goes to the observer.
//
// ETA is the simple "average time per finished item times items left".
//
// Every run ends with exactly one terminal call on the observer: on_finish
// with the result, or on_error when the crawl could not start.
// =============================================================================

use super::CrawlResult;
use crate::error::CrawlError;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    /// completed / total, in [0, 1], never decreasing during a run
    pub fraction: f64,
    pub completed: usize,
    pub total: usize,
    pub elapsed: Duration,
    pub eta: Option<Duration>,
    pub posts_found: usize,
    pub comments_found: usize,
    pub failed: usize,
}

/// Receives progress while a crawl runs and the result when it ends
pub trait CrawlObserver: Send + Sync {
    fn on_progress(&self, report: &ProgressReport);

    fn on_finish(&self, _result: &CrawlResult) {}

    /// The crawl could not run at all; no on_finish follows
    fn on_error(&self, _error: &CrawlError) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl CrawlObserver for Silent {
    fn on_progress(&self, _report: &ProgressReport) {}
}

/// Wraps a closure as an observer
pub struct ProgressFn<F>(pub F);

impl<F> CrawlObserver for ProgressFn<F>
where
    F: Fn(&ProgressReport) + Send + Sync,
{
    fn on_progress(&self, report: &ProgressReport) {
        (self.0)(report)
    }
}

#[derive(Debug)]
pub struct CrawlState {
    started: Instant,
    total: usize,
    completed: usize,
    failed: usize,
    posts_found: usize,
    comments_found: usize,
}

impl CrawlState {
    pub fn start(total: usize) -> Self {
        Self {
            started: Instant::now(),
            total,
            completed: 0,
            failed: 0,
            posts_found: 0,
            comments_found: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    // Records one finished work item and returns the report for it.
    //
    // `posts_found` / `comments_found` are running totals from the
    // aggregator, so duplicates across windows are not double counted.
    pub fn complete_item(&mut self, failed: bool, posts_found: usize, comments_found: usize) -> ProgressReport {
        self.completed = (self.completed + 1).min(self.total);
        if failed {
            self.failed += 1;
        }
        self.posts_found = posts_found;
        self.comments_found = comments_found;
        self.report()
    }

    pub fn report(&self) -> ProgressReport {
        let elapsed = self.elapsed();
        let fraction = if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        };

        let eta = if self.completed == 0 {
            None
        } else {
            let per_item = elapsed.as_secs_f64() / self.completed as f64;
            let left = self.total.saturating_sub(self.completed) as f64;
            Some(Duration::from_secs_f64(per_item * left))
        };

        ProgressReport {
            fraction,
            completed: self.completed,
            total: self.total,
            elapsed,
            eta,
            posts_found: self.posts_found,
            comments_found: self.comments_found,
            failed: self.failed,
        }
    }
}
