// src/api/mod.rs
// =============================================================================
// The seam between the crawl engine and the content platform.
//
// Submodules:
// - wire: response envelopes, raw JSON shapes, error-code classification
// - vk: the real HTTP client
//
// Everything above this module talks to ContentApi and only ever sees
// FetchOutcome values, never raw platform error codes. Tests swap in a
// scripted implementation of the same trait.
// =============================================================================

mod vk;
pub mod wire;

pub use vk::{VkClient, API_VERSION, DEFAULT_BASE_URL, MAX_SEARCH_PAGE};

use crate::model::{CommentPage, Credential, FetchOutcome, Query, SearchPage, TimeWindow};
use async_trait::async_trait;

#[async_trait]
pub trait ContentApi: Send + Sync {
    /// One page of posts published inside `window` that the platform
    /// considers relevant to `query`. `page_token` continues a previous page.
    async fn search_content(
        &self,
        credential: &Credential,
        query: &Query,
        window: &TimeWindow,
        page_token: Option<&str>,
    ) -> FetchOutcome<SearchPage>;

    /// One page of the comments on a post, starting at `offset`.
    ///
    /// The crawl walks the thread page by page, so every page gets its own
    /// retry and cancellation check. `next_offset` is None on the last page.
    async fn list_comments(
        &self,
        credential: &Credential,
        owner_id: i64,
        post_id: i64,
        offset: u64,
    ) -> FetchOutcome<CommentPage>;

    /// Cheapest authenticated call, used to test a credential.
    async fn probe(&self, credential: &Credential) -> FetchOutcome<()>;
}
