// src/crawl/dispatcher.rs
// =============================================================================
// Runs a whole crawl.
//
// How it works:
// 1. Validate the config, build the credential pool and retry controller
// 2. Lazily produce (query, window) work items
// 3. Run up to `workers` items at a time with buffer_unordered()
// 4. Each item pages through the search results, keeps matching posts and
//    optionally fetches their comments
// 5. As items finish (in any order) their output is folded into the
//    aggregator and a progress report goes to the observer
//
// Only this loop touches the aggregator and the CrawlState, so they need no
// locks. The credential pool is the one thing workers share, and it locks
// internally.
//
// Stopping:
// - The caller's CancellationToken stops dispatch of new items, interrupts
//   pauses and prevents any further API calls
// - PoolExhausted does the same through a child token, without cancelling
//   the caller's token
// =============================================================================

use super::progress::{CrawlObserver, CrawlState};
use super::retry::{RetryController, RetryPolicy};
use super::{CrawlOutcome, CrawlResult, CredentialReport, Stage, WorkItemFailure};
use crate::aggregate::ResultAggregator;
use crate::api::ContentApi;
use crate::config::CrawlConfig;
use crate::credentials::CredentialPool;
use crate::error::CrawlError;
use crate::filter::MatchFilter;
use crate::model::{Comment, Post, PostKey, WorkItem};
use futures::future;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// What one work item hands back to the result loop
#[derive(Debug, Default)]
struct WorkOutput {
    posts: Vec<(Post, String)>,
    comments: Vec<(PostKey, Vec<Comment>)>,
    failures: Vec<WorkItemFailure>,
    // false when cancellation cut the item short
    finished: bool,
}

pub struct Crawler {
    api: Arc<dyn ContentApi>,
    config: CrawlConfig,
    cancel: CancellationToken,
}

impl Crawler {
    pub fn new(api: Arc<dyn ContentApi>, config: CrawlConfig) -> Self {
        Self {
            api,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an existing token, e.g. one a Ctrl-C handler cancels
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops this crawl when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    // Runs the crawl to the end (or until stopped).
    //
    // Err is only returned for a config that can't run at all, and the
    // observer hears about it through on_error. Everything that happens once
    // requests start flowing ends up in the CrawlResult.
    pub async fn run(&self, observer: &dyn CrawlObserver) -> Result<CrawlResult, CrawlError> {
        let config = &self.config;
        let (filters, policy, total) = match self.prepare() {
            Ok(prepared) => prepared,
            Err(error) => return Err(refuse(observer, error)),
        };
        let work_items = match config.work_items() {
            Ok(items) => items,
            Err(error) => return Err(refuse(observer, error)),
        };

        let cooldown = config.cooldown.unwrap_or(policy.pause);
        let pool = Arc::new(CredentialPool::new(&config.tokens, cooldown));

        // Stops dispatch on cancellation *or* on a run-wide error
        let stop = self.cancel.child_token();
        let retry = RetryController::new(Arc::clone(&pool), policy, stop.clone());

        info!(
            work_items = total,
            queries = filters.len(),
            credentials = pool.len(),
            workers = config.workers,
            "crawl started"
        );

        let mut state = CrawlState::start(total);
        let mut aggregator = ResultAggregator::new();
        let mut failures = Vec::new();
        let mut aborted: Option<CrawlError> = None;
        let mut completed_items = 0;

        let dispatch_gate = stop.clone();
        let mut outputs = stream::iter(work_items)
            .take_while(move |_| future::ready(!dispatch_gate.is_cancelled()))
            .map(|item| {
                let filter = &filters[&item.query.text];
                self.process(item, &retry, filter, &stop)
            })
            .buffer_unordered(config.workers);

        while let Some(output) = outputs.next().await {
            for (post, query) in output.posts {
                aggregator.add_post(post, &query);
            }
            for (key, comments) in output.comments {
                aggregator.add_comments(key.owner_id, key.post_id, comments);
            }

            let failed = !output.failures.is_empty();
            for failure in output.failures {
                if failure.error.is_global() && aborted.is_none() {
                    warn!(error = %failure.error, "stopping crawl");
                    aborted = Some(failure.error.clone());
                    stop.cancel();
                }
                failures.push(failure);
            }

            if output.finished {
                completed_items += 1;
                let report = state.complete_item(failed, aggregator.post_count(), aggregator.comment_count());
                observer.on_progress(&report);
            }
        }
        drop(outputs);

        let outcome = match aborted {
            Some(error) => CrawlOutcome::Aborted(error),
            None if self.cancel.is_cancelled() => CrawlOutcome::Cancelled,
            None => CrawlOutcome::Completed,
        };

        let result = CrawlResult {
            data: aggregator.snapshot(),
            failures,
            outcome,
            credentials: pool
                .snapshot()
                .into_iter()
                .map(|(credential, state)| CredentialReport { credential: credential.to_string(), state })
                .collect(),
            work_items: total,
            completed_items,
            elapsed: state.elapsed(),
            retry_stats: retry.stats(),
        };

        info!(
            outcome = ?result.outcome,
            posts = result.data.posts.len(),
            comments = result.data.comments.len(),
            failed = result.failures.len(),
            "crawl finished"
        );
        observer.on_finish(&result);
        Ok(result)
    }

    // Walks one post's comment thread a page at a time.
    //
    // Each page is its own call through the retry controller, so a rate
    // limit on page N retries page N only, and cancellation is honoured
    // between pages. Whatever was read before an error is still returned.
    async fn fetch_comments(
        &self,
        retry: &RetryController,
        owner_id: i64,
        post_id: i64,
    ) -> (Vec<Comment>, Result<(), CrawlError>) {
        let mut comments = Vec::new();
        let mut offset = 0;

        loop {
            let listed = retry
                .run("comments", |credential| {
                    let api = Arc::clone(&self.api);
                    async move { api.list_comments(&credential, owner_id, post_id, offset).await }
                })
                .await;

            match listed {
                Ok(Some(page)) => {
                    comments.extend(page.items);
                    match page.next_offset {
                        Some(next) if next > offset => offset = next,
                        _ => return (comments, Ok(())),
                    }
                }
                Ok(None) => return (comments, Ok(())),
                Err(error) => return (comments, Err(error)),
            }
        }
    }

    // Everything that can reject a config before a single request goes out
    fn prepare(&self) -> Result<(HashMap<String, MatchFilter>, RetryPolicy, usize), CrawlError> {
        let config = &self.config;
        config.validate()?;

        let filters = config
            .queries()
            .into_iter()
            .map(|q| {
                let filter = MatchFilter::new(&q).map_err(|e| CrawlError::InvalidConfig(e.to_string()))?;
                Ok((q.text, filter))
            })
            .collect::<Result<HashMap<String, MatchFilter>, CrawlError>>()?;

        let distinct: HashSet<&str> = config
            .tokens
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        let policy = config.retry_policy(distinct.len());

        Ok((filters, policy, config.total_work_items()?))
    }

    // One work item: page through search, filter, then comments.
    async fn process(
        &self,
        item: WorkItem,
        retry: &RetryController,
        filter: &MatchFilter,
        stop: &CancellationToken,
    ) -> WorkOutput {
        let mut output = WorkOutput { finished: true, ..WorkOutput::default() };
        let failure = |stage: Stage, post: Option<PostKey>, error: CrawlError| WorkItemFailure {
            query: item.query.text.clone(),
            window: item.window,
            stage,
            post,
            error,
        };

        debug!(item = item.index, query = %item.query.text, window = %item.window, "work item started");

        let mut matched: Vec<Post> = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0;

        loop {
            // Only reached with a continuation token in hand, so there is
            // more to read that we are about to leave behind
            if pages == self.config.max_pages {
                warn!(
                    query = %item.query.text,
                    window = %item.window,
                    pages,
                    "page limit reached, window truncated; use a smaller step"
                );
                output.failures.push(failure(Stage::Search, None, CrawlError::Truncated { pages }));
                break;
            }
            pages += 1;

            let token = page_token.clone();
            let searched = retry
                .run("search", |credential| {
                    let api = Arc::clone(&self.api);
                    let query = item.query.clone();
                    let window = item.window;
                    let token = token.clone();
                    async move { api.search_content(&credential, &query, &window, token.as_deref()).await }
                })
                .await;

            match searched {
                Ok(Some(page)) => {
                    let owner = self.config.owner_id;
                    matched.extend(
                        page.items
                            .into_iter()
                            .filter(|post| owner.map_or(true, |o| o == post.owner_id))
                            .filter(|post| filter.matches(&post.text)),
                    );
                    match page.next_from {
                        Some(next) => page_token = Some(next),
                        None => break,
                    }
                }
                Ok(None) => break,
                Err(CrawlError::Cancelled) => {
                    output.finished = false;
                    break;
                }
                Err(error) => {
                    warn!(query = %item.query.text, window = %item.window, %error, "search failed");
                    output.failures.push(failure(Stage::Search, None, error));
                    break;
                }
            }
        }

        if self.config.fetch_comments && output.finished {
            for post in &matched {
                if stop.is_cancelled() {
                    output.finished = false;
                    break;
                }
                let (comments, ended) = self.fetch_comments(retry, post.owner_id, post.post_id).await;
                if !comments.is_empty() {
                    output.comments.push((post.key(), comments));
                }

                match ended {
                    Ok(()) => {}
                    Err(CrawlError::Cancelled) => {
                        output.finished = false;
                        break;
                    }
                    Err(error) => {
                        warn!(owner_id = post.owner_id, post_id = post.post_id, %error, "comment listing failed");
                        let global = error.is_global();
                        output.failures.push(failure(Stage::Comments, Some(post.key()), error));
                        if global {
                            break;
                        }
                    }
                }
            }
        }

        info!(
            item = item.index,
            query = %item.query.text,
            window = %item.window,
            matched = matched.len(),
            "work item done"
        );
        output.posts = matched
            .into_iter()
            .map(|post| (post, item.query.text.clone()))
            .collect();
        output
    }
}

fn refuse(observer: &dyn CrawlObserver, error: CrawlError) -> CrawlError {
    warn!(%error, "crawl could not start");
    observer.on_error(&error);
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::{ProgressFn, ProgressReport, Silent};
    use crate::model::{CommentPage, Credential, FetchOutcome, MatchMode, Query, SearchPage, TimeWindow};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const STUB_COMMENT_PAGE: usize = 2;

    // In-memory platform: posts keyed by the window they belong to,
    // comments served STUB_COMMENT_PAGE at a time
    #[derive(Default)]
    struct StubApi {
        posts: HashMap<DateTime<Utc>, Vec<Post>>,
        comments: HashMap<(i64, i64), Vec<Comment>>,
        invalid_slots: HashSet<usize>,
        fatal_windows: HashSet<DateTime<Utc>>,
        // Cancelled right after the first search call returns
        cancel_after_first_search: Option<CancellationToken>,
        // Every search page holds one matching post and points at another
        endless_search: bool,
        // Cancelled once this many comment pages have been requested
        cancel_after_comment_calls: Option<(usize, CancellationToken)>,
        // Comment offsets that answer RateLimited once
        throttle_comments_at: Mutex<HashSet<u64>>,
        comment_offsets: Mutex<Vec<u64>>,
        search_calls: AtomicUsize,
        comment_calls: AtomicUsize,
        log: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ContentApi for StubApi {
        async fn search_content(
            &self,
            credential: &Credential,
            _query: &Query,
            window: &TimeWindow,
            page_token: Option<&str>,
        ) -> FetchOutcome<SearchPage> {
            let call = self.search_calls.fetch_add(1, Ordering::SeqCst) as i64;
            self.log.lock().push(format!("search {}", window.start.timestamp()));
            if let Some(token) = &self.cancel_after_first_search {
                token.cancel();
            }
            if self.invalid_slots.contains(&credential.slot()) {
                return FetchOutcome::InvalidCredential;
            }
            if self.fatal_windows.contains(&window.start) {
                return FetchOutcome::FatalError { code: 15, message: "Access denied".into() };
            }
            if self.endless_search {
                return FetchOutcome::Success(SearchPage {
                    items: vec![post(call + 1, window.start, "budget again")],
                    next_from: Some(format!("page-{}", call + 1)),
                    total_count: None,
                });
            }
            match (self.posts.get(&window.start), page_token) {
                (Some(posts), None) if !posts.is_empty() => FetchOutcome::Success(SearchPage {
                    items: posts.clone(),
                    next_from: None,
                    total_count: Some(posts.len() as u64),
                }),
                _ => FetchOutcome::Empty,
            }
        }

        async fn list_comments(
            &self,
            _credential: &Credential,
            owner_id: i64,
            post_id: i64,
            offset: u64,
        ) -> FetchOutcome<CommentPage> {
            let calls = self.comment_calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.comment_offsets.lock().push(offset);
            if let Some((after, token)) = &self.cancel_after_comment_calls {
                if calls >= *after {
                    token.cancel();
                }
            }
            if self.throttle_comments_at.lock().remove(&offset) {
                return FetchOutcome::RateLimited;
            }

            let Some(all) = self.comments.get(&(owner_id, post_id)) else {
                return FetchOutcome::Empty;
            };
            let start = (offset as usize).min(all.len());
            let end = (start + STUB_COMMENT_PAGE).min(all.len());
            if start == end {
                return FetchOutcome::Empty;
            }
            FetchOutcome::Success(CommentPage {
                items: all[start..end].to_vec(),
                next_offset: (end < all.len()).then_some(end as u64),
                total_count: Some(all.len() as u64),
            })
        }

        async fn probe(&self, _credential: &Credential) -> FetchOutcome<()> {
            FetchOutcome::Success(())
        }
    }

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 10, h, 0, 0).unwrap()
    }

    fn post(post_id: i64, at: DateTime<Utc>, text: &str) -> Post {
        Post {
            owner_id: -10,
            post_id,
            author_id: Some(-10),
            text: text.to_string(),
            published_at: at,
            likes: 1,
            reposts: 0,
            views: 5,
            comment_count: 0,
        }
    }

    fn comment(comment_id: i64, post_id: i64) -> Comment {
        Comment {
            comment_id,
            owner_id: -10,
            post_id,
            author_id: 3,
            text: "agreed".to_string(),
            published_at: hour(0),
            likes: 0,
        }
    }

    fn config(windows: u32, tokens: &[&str]) -> CrawlConfig {
        CrawlConfig::new(["budget"], hour(0), hour(windows))
            .with_step(chrono::Duration::hours(1))
            .with_tokens(tokens.iter().copied())
            .with_pause(Duration::from_millis(500))
            .with_workers(2)
            .with_comments(false)
    }

    fn recorder() -> (Arc<Mutex<Vec<f64>>>, ProgressFn<impl Fn(&ProgressReport) + Send + Sync>) {
        let fractions = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fractions);
        (fractions, ProgressFn(move |r: &ProgressReport| sink.lock().push(r.fraction)))
    }

    #[tokio::test(start_paused = true)]
    async fn two_windows_two_posts_end_to_end() {
        let mut stub = StubApi::default();
        stub.posts.insert(
            hour(0),
            vec![
                post(1, hour(0) + chrono::Duration::minutes(5), "City budget vote today"),
                post(2, hour(0) + chrono::Duration::minutes(40), "The budget passed"),
            ],
        );
        let stub = Arc::new(stub);
        let (fractions, observer) = recorder();

        let result = Crawler::new(stub.clone(), config(2, &["tok-1"]))
            .run(&observer)
            .await
            .unwrap();

        assert_eq!(result.outcome, CrawlOutcome::Completed);
        assert_eq!(result.data.posts.len(), 2);
        assert_eq!(result.data.comments.len(), 0);
        assert!(result.is_clean());
        assert_eq!(result.completed_items, 2);

        let fractions = fractions.lock();
        assert_eq!(fractions.iter().filter(|f| **f == 1.0).count(), 1);
        assert_eq!(fractions.last(), Some(&1.0));
        assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(stub.comment_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn same_post_in_two_windows_is_kept_once() {
        let mut stub = StubApi::default();
        let shared = post(7, hour(1), "budget at the boundary");
        stub.posts.insert(hour(0), vec![shared.clone()]);
        stub.posts.insert(hour(1), vec![shared]);

        let result = Crawler::new(Arc::new(stub), config(2, &["tok-1"]))
            .run(&Silent)
            .await
            .unwrap();

        assert_eq!(result.data.posts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_matching_and_foreign_posts_are_filtered() {
        let mut stub = StubApi::default();
        let mut foreign = post(3, hour(0), "budget elsewhere");
        foreign.owner_id = -99;
        stub.posts.insert(
            hour(0),
            vec![post(1, hour(0), "budgetary concerns"), post(2, hour(0), "budget news"), foreign],
        );

        let result = Crawler::new(Arc::new(stub), config(1, &["tok-1"]).with_owner(Some(-10)))
            .run(&Silent)
            .await
            .unwrap();

        let ids: Vec<i64> = result.data.posts.iter().map(|p| p.post_id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_mode_keeps_substring_matches() {
        let mut stub = StubApi::default();
        stub.posts.insert(hour(0), vec![post(1, hour(0), "budgetary concerns")]);

        let result = Crawler::new(Arc::new(stub), config(1, &["tok-1"]).with_mode(MatchMode::Partial))
            .run(&Silent)
            .await
            .unwrap();

        assert_eq!(result.data.posts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn comments_are_fetched_for_matching_posts() {
        let mut stub = StubApi::default();
        stub.posts.insert(hour(0), vec![post(1, hour(0), "budget"), post(2, hour(0), "weather")]);
        stub.comments.insert((-10, 1), vec![comment(100, 1), comment(101, 1)]);
        stub.comments.insert((-10, 2), vec![comment(200, 2)]);
        let stub = Arc::new(stub);

        let result = Crawler::new(stub.clone(), config(1, &["tok-1"]).with_comments(true))
            .run(&Silent)
            .await
            .unwrap();

        assert_eq!(result.data.posts.len(), 1);
        assert_eq!(result.data.comments.len(), 2);
        assert!(result.data.comments.iter().all(|c| c.post_id == 1 && !c.orphaned));
        // Only the matching post had its comments requested
        assert_eq!(stub.comment_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_window_does_not_stop_siblings() {
        let mut stub = StubApi::default();
        stub.fatal_windows.insert(hour(0));
        stub.posts.insert(hour(1), vec![post(5, hour(1), "budget")]);

        let result = Crawler::new(Arc::new(stub), config(2, &["tok-1"]))
            .run(&Silent)
            .await
            .unwrap();

        assert_eq!(result.outcome, CrawlOutcome::Completed);
        assert_eq!(result.data.posts.len(), 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].stage, Stage::Search);
        assert_eq!(result.failures[0].window.start, hour(0));
        assert!(matches!(result.failures[0].error, CrawlError::Fatal { code: 15, .. }));
        assert!(!result.is_clean());
    }

    #[tokio::test(start_paused = true)]
    async fn losing_every_credential_aborts_with_partial_data() {
        let mut stub = StubApi::default();
        stub.invalid_slots.insert(0);
        stub.invalid_slots.insert(1);

        let result = Crawler::new(Arc::new(stub), config(3, &["tok-1", "tok-2"]))
            .run(&Silent)
            .await
            .unwrap();

        assert_eq!(result.outcome, CrawlOutcome::Aborted(CrawlError::PoolExhausted));
        assert!(result.failures.iter().any(|f| f.error == CrawlError::PoolExhausted));
        assert!(result
            .credentials
            .iter()
            .all(|c| c.state == crate::model::CredentialState::Invalid));
        assert!(result.completed_items < result.work_items);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_credential_is_dropped_and_crawl_continues() {
        let mut stub = StubApi::default();
        stub.invalid_slots.insert(1);
        stub.posts.insert(hour(0), vec![post(1, hour(0), "budget")]);

        let result = Crawler::new(Arc::new(stub), config(4, &["tok-1", "tok-2", "tok-3"]))
            .run(&Silent)
            .await
            .unwrap();

        assert_eq!(result.outcome, CrawlOutcome::Completed);
        assert_eq!(result.data.posts.len(), 1);
        assert!(result.failures.is_empty());
        assert_eq!(result.retry_stats.removed_credentials, 1);
        assert_eq!(result.credentials[1].state, crate::model::CredentialState::Invalid);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_keeps_partial_results_and_stops_requests() {
        let cancel = CancellationToken::new();
        let mut stub = StubApi::default();
        stub.posts.insert(hour(0), vec![post(1, hour(0), "budget")]);
        stub.posts.insert(hour(1), vec![post(2, hour(1), "budget")]);
        stub.cancel_after_first_search = Some(cancel.clone());
        let stub = Arc::new(stub);
        let (fractions, observer) = recorder();

        let result = Crawler::new(stub.clone(), config(3, &["tok-1"]).with_workers(1))
            .with_cancellation(cancel)
            .run(&observer)
            .await
            .unwrap();

        assert_eq!(result.outcome, CrawlOutcome::Cancelled);
        assert_eq!(result.data.posts.len(), 1);
        assert_eq!(stub.search_calls.load(Ordering::SeqCst), 1);
        assert!(fractions.lock().iter().all(|f| *f < 1.0));
        assert!(result.failures.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_makes_no_requests() {
        let stub = Arc::new(StubApi::default());
        let crawler = Crawler::new(stub.clone(), config(2, &["tok-1"]));
        crawler.cancellation_token().cancel();

        let result = crawler.run(&Silent).await.unwrap();

        assert_eq!(result.outcome, CrawlOutcome::Cancelled);
        assert_eq!(result.completed_items, 0);
        assert_eq!(stub.search_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_config_is_an_error() {
        let stub = Arc::new(StubApi::default());
        let err = Crawler::new(stub, config(1, &[])).run(&Silent).await.unwrap_err();
        assert!(matches!(err, CrawlError::InvalidConfig(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn every_window_and_query_is_searched() {
        let stub = Arc::new(StubApi::default());
        let cfg = CrawlConfig::new(["budget", "tax"], hour(0), hour(3))
            .with_step(chrono::Duration::hours(1))
            .with_tokens(["tok-1"])
            .with_pause(Duration::ZERO)
            .with_comments(false);

        let result = Crawler::new(stub.clone(), cfg).run(&Silent).await.unwrap();

        assert_eq!(result.work_items, 6);
        assert_eq!(result.completed_items, 6);
        let mut log = stub.log.lock().clone();
        log.sort();
        log.dedup();
        assert_eq!(log.len(), 3);
        assert_eq!(stub.search_calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn hitting_the_page_limit_is_recorded_as_a_failure() {
        let mut stub = StubApi::default();
        stub.endless_search = true;
        let stub = Arc::new(stub);

        let result = Crawler::new(stub.clone(), config(1, &["tok-1"]).with_max_pages(3))
            .run(&Silent)
            .await
            .unwrap();

        assert_eq!(stub.search_calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.data.posts.len(), 3);
        assert_eq!(result.outcome, CrawlOutcome::Completed);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].stage, Stage::Search);
        assert_eq!(result.failures[0].error, CrawlError::Truncated { pages: 3 });
        assert!(!result.is_clean());
    }

    #[tokio::test(start_paused = true)]
    async fn long_comment_thread_is_read_page_by_page() {
        let mut stub = StubApi::default();
        stub.posts.insert(hour(0), vec![post(1, hour(0), "budget")]);
        stub.comments.insert((-10, 1), (0..5).map(|i| comment(100 + i, 1)).collect());
        stub.throttle_comments_at.lock().insert(2);
        let stub = Arc::new(stub);

        let result = Crawler::new(stub.clone(), config(1, &["tok-1", "tok-2"]).with_comments(true))
            .run(&Silent)
            .await
            .unwrap();

        assert_eq!(result.data.comments.len(), 5);
        assert!(result.is_clean());
        // The throttled page is retried on its own; earlier pages are kept
        assert_eq!(*stub.comment_offsets.lock(), vec![0, 2, 2, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_mid_thread_stops_comment_requests() {
        let cancel = CancellationToken::new();
        let mut stub = StubApi::default();
        stub.posts.insert(hour(0), vec![post(1, hour(0), "budget")]);
        stub.comments.insert((-10, 1), (0..10).map(|i| comment(100 + i, 1)).collect());
        stub.cancel_after_comment_calls = Some((1, cancel.clone()));
        let stub = Arc::new(stub);

        let result = Crawler::new(stub.clone(), config(1, &["tok-1"]).with_comments(true))
            .with_cancellation(cancel)
            .run(&Silent)
            .await
            .unwrap();

        assert_eq!(result.outcome, CrawlOutcome::Cancelled);
        assert_eq!(stub.comment_calls.load(Ordering::SeqCst), 1);
        // The page read before the signal is kept
        assert_eq!(result.data.posts.len(), 1);
        assert_eq!(result.data.comments.len(), STUB_COMMENT_PAGE);
        assert_eq!(result.completed_items, 0);
    }

    #[derive(Default)]
    struct Terminal {
        errors: Mutex<Vec<CrawlError>>,
        finished: AtomicUsize,
    }

    impl CrawlObserver for Terminal {
        fn on_progress(&self, _report: &ProgressReport) {}

        fn on_finish(&self, _result: &CrawlResult) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, error: &CrawlError) {
            self.errors.lock().push(error.clone());
        }
    }

    #[tokio::test]
    async fn observer_hears_why_a_crawl_could_not_start() {
        let observer = Terminal::default();
        let err = Crawler::new(Arc::new(StubApi::default()), config(1, &[]))
            .run(&observer)
            .await
            .unwrap_err();

        assert_eq!(*observer.errors.lock(), vec![err]);
        assert_eq!(observer.finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn observer_gets_exactly_one_finish() {
        let observer = Terminal::default();
        Crawler::new(Arc::new(StubApi::default()), config(2, &["tok-1"]))
            .run(&observer)
            .await
            .unwrap();

        assert!(observer.errors.lock().is_empty());
        assert_eq!(observer.finished.load(Ordering::SeqCst), 1);
    }
}
