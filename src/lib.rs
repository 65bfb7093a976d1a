// src/lib.rs
// =============================================================================
// wall_sweeper: finds posts (and their comments) that mention a keyword on a
// paginated, rate-limited social network API, over any date range, using
// one or more access tokens.
//
// Module map, leaves first:
// - model        shared data types
// - error        typed errors
// - credentials  token pool and token checks
// - api          the platform client and its response classification
// - filter       exact / partial text matching
// - aggregate    de-duplicated posts and comments datasets
// - crawl        windows, retries, the worker pool and progress
// - config       everything a crawl needs up front
// - export       writes the datasets to disk
//
// Typical use:
//
//   let api = Arc::new(VkClient::new(DEFAULT_BASE_URL, 100)?);
//   let config = CrawlConfig::new(["budget"], start, end).with_tokens(tokens);
//   let result = Crawler::new(api, config).run(&Silent).await?;
// =============================================================================

pub mod aggregate;
pub mod api;
pub mod config;
pub mod credentials;
pub mod crawl;
pub mod error;
pub mod export;
pub mod filter;
pub mod model;

pub use aggregate::{CommentRecord, Datasets, DatasetSummary, PostRecord, ResultAggregator};
pub use api::{ContentApi, VkClient, DEFAULT_BASE_URL};
pub use config::CrawlConfig;
pub use crawl::{CrawlObserver, CrawlOutcome, CrawlResult, Crawler, ProgressFn, ProgressReport, Silent};
pub use credentials::{CredentialPool, PoolError};
pub use error::CrawlError;
pub use filter::MatchFilter;
pub use model::{Comment, CommentPage, Credential, CredentialState, FetchOutcome, MatchMode, Post, Query, TimeWindow};
