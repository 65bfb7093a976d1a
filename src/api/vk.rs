// src/api/vk.rs
// =============================================================================
// HTTP client for the VK-style method API.
//
// Every call is a GET to {base}/{method}?...&access_token=...&v=5.131
// and the JSON body goes through wire::decode for classification.
//
// Three calls:
// - newsfeed.search   one page of posts inside a time window
// - wall.getComments  one page of a post's comments
// - users.get         cheap authenticated call to test a token
//
// Rust concepts:
// - async-trait: lets us put async fns in the ContentApi trait
// - url::Url: builds the request URL and escapes query parameters
// =============================================================================

use super::wire::{self, RawCommentsResponse, RawSearchResponse};
use super::ContentApi;
use crate::error::CrawlError;
use crate::model::{CommentPage, Credential, FetchOutcome, Query, SearchPage, TimeWindow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.vk.com/method/";
pub const API_VERSION: &str = "5.131";
/// The platform refuses search pages larger than this
pub const MAX_SEARCH_PAGE: u32 = 200;
pub const COMMENTS_PAGE: u32 = 100;

#[derive(Debug, Clone)]
pub struct VkClient {
    http: Client,
    base: Url,
    page_size: u32,
}

impl VkClient {
    // Creates a client for the given base URL.
    //
    // Tests point base_url at a local mock server; everyone else uses
    // DEFAULT_BASE_URL.
    pub fn new(base_url: &str, page_size: u32) -> Result<Self, CrawlError> {
        // join() replaces the last path segment unless the base ends in '/'
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base = Url::parse(&normalized)
            .map_err(|e| CrawlError::InvalidConfig(format!("bad API base URL '{}': {}", base_url, e)))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CrawlError::InvalidConfig(format!("could not build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base,
            page_size: page_size.clamp(1, MAX_SEARCH_PAGE),
        })
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        credential: &Credential,
        params: &[(&str, String)],
    ) -> FetchOutcome<T> {
        let mut url = match self.base.join(method) {
            Ok(url) => url,
            Err(e) => return FetchOutcome::FatalError { code: 0, message: format!("bad method '{}': {}", method, e) },
        };
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
            .append_pair("access_token", credential.token())
            .append_pair("v", API_VERSION);

        debug!(method, credential = %credential, "API request");

        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) => return FetchOutcome::NetworkError(describe_transport_error(&e)),
        };

        // The platform reports its own errors with HTTP 200; anything else
        // came from a proxy or load balancer in front of it. Only the
        // platform's own error code may condemn a token, so 401/403 from an
        // edge node count as transport trouble.
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return FetchOutcome::RateLimited;
        }
        if !status.is_success() {
            return FetchOutcome::NetworkError(format!("HTTP {}", status.as_u16()));
        }

        match response.text().await {
            Ok(body) => wire::decode(&body),
            Err(e) => FetchOutcome::NetworkError(describe_transport_error(&e)),
        }
    }
}

#[async_trait]
impl ContentApi for VkClient {
    async fn search_content(
        &self,
        credential: &Credential,
        query: &Query,
        window: &TimeWindow,
        page_token: Option<&str>,
    ) -> FetchOutcome<SearchPage> {
        // end_time is inclusive on the platform side and has one-second
        // resolution, so [start, end) becomes start..=end-1
        let mut params = vec![
            ("q", query.text.clone()),
            ("start_time", window.start.timestamp().to_string()),
            ("end_time", (window.end.timestamp() - 1).max(window.start.timestamp()).to_string()),
            ("count", self.page_size.to_string()),
            ("extended", "0".to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("start_from", token.to_string()));
        }

        let raw: RawSearchResponse = match self.call("newsfeed.search", credential, &params).await {
            FetchOutcome::Success(raw) => raw,
            other => return other.map(|_| SearchPage::default()),
        };

        if raw.items.is_empty() {
            return FetchOutcome::Empty;
        }

        let items = raw
            .items
            .into_iter()
            .filter_map(wire::into_post)
            .filter(|post| window.contains(post.published_at))
            .collect();

        FetchOutcome::Success(SearchPage {
            items,
            next_from: raw.next_from.filter(|token| !token.is_empty()),
            total_count: raw.total_count,
        })
    }

    async fn list_comments(
        &self,
        credential: &Credential,
        owner_id: i64,
        post_id: i64,
        offset: u64,
    ) -> FetchOutcome<CommentPage> {
        let params = [
            ("owner_id", owner_id.to_string()),
            ("post_id", post_id.to_string()),
            ("count", COMMENTS_PAGE.to_string()),
            ("offset", offset.to_string()),
            ("sort", "asc".to_string()),
            ("need_likes", "1".to_string()),
        ];
        let raw: RawCommentsResponse = match self.call("wall.getComments", credential, &params).await {
            FetchOutcome::Success(raw) => raw,
            other => return other.map(|_| CommentPage::default()),
        };

        if raw.items.is_empty() {
            return FetchOutcome::Empty;
        }

        let fetched = raw.items.len() as u64;
        let next = offset + fetched;
        // Done on a short page, or once we've read what the server says exists
        let reached_total = raw.count.is_some_and(|total| next >= total);
        let next_offset = if fetched < COMMENTS_PAGE as u64 || reached_total {
            None
        } else {
            Some(next)
        };

        FetchOutcome::Success(CommentPage {
            items: raw
                .items
                .into_iter()
                .filter_map(|item| wire::into_comment(item, owner_id, post_id))
                .collect(),
            next_offset,
            total_count: raw.count,
        })
    }

    async fn probe(&self, credential: &Credential) -> FetchOutcome<()> {
        self.call::<serde_json::Value>("users.get", credential, &[])
            .await
            .map(|_| ())
    }
}

// Turns a reqwest error into a short human-readable reason.
fn describe_transport_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        "connection failed".to_string()
    } else if error.is_decode() || error.is_body() {
        format!("could not read response body: {}", error)
    } else {
        error.to_string()
    }
}
