// src/crawl/retry.rs
// =============================================================================
// The one place retry policy lives.
//
// Every API call in a crawl (search pages, comment listings) goes through
// RetryController::run, which picks a credential, makes the call and
// reacts to the classified outcome:
//
//   Success / Empty     -> pause, then hand the result back
//   RateLimited         -> park the credential, pause, rotate, try again
//                          (at most max_rate_limit_retries times)
//   InvalidCredential   -> drop the credential for good, rotate, try again;
//                          no credentials left means PoolExhausted
//   NetworkError        -> pause and retry once, then give up on this call
//   FatalError          -> give up immediately, retrying won't help
//
// The pause after a successful call is deliberate: it keeps each worker
// under the platform's requests-per-second limit.
//
// Cancellation is checked before every call and interrupts every pause.
// =============================================================================

use crate::credentials::{CredentialPool, PoolError};
use crate::error::CrawlError;
use crate::model::{Credential, FetchOutcome};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Sleep after every request and before every retry
    pub pause: Duration,
    /// How many rate-limit backoffs one call may go through
    pub max_rate_limit_retries: u32,
    /// How many times a transport failure is retried
    pub network_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            pause: Duration::from_secs(5),
            max_rate_limit_retries: 5,
            network_retries: 1,
        }
    }
}

/// Counters across every call made through one controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryStats {
    pub attempts: u64,
    pub backoffs: u64,
    pub removed_credentials: u64,
}

#[derive(Debug)]
pub struct RetryController {
    pool: Arc<CredentialPool>,
    policy: RetryPolicy,
    cancel: CancellationToken,
    attempts: AtomicU64,
    backoffs: AtomicU64,
    removed: AtomicU64,
}

impl RetryController {
    pub fn new(pool: Arc<CredentialPool>, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            pool,
            policy,
            cancel,
            attempts: AtomicU64::new(0),
            backoffs: AtomicU64::new(0),
            removed: AtomicU64::new(0),
        }
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    pub fn stats(&self) -> RetryStats {
        RetryStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            backoffs: self.backoffs.load(Ordering::Relaxed),
            removed_credentials: self.removed.load(Ordering::Relaxed),
        }
    }

    // Runs `call` until it produces a terminal outcome.
    //
    // Returns Ok(Some(payload)) on Success, Ok(None) on Empty.
    // `what` only shows up in log lines.
    pub async fn run<T, F, Fut>(&self, what: &str, mut call: F) -> Result<Option<T>, CrawlError>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = FetchOutcome<T>>,
    {
        let mut rate_limited: u32 = 0;
        let mut network_failures: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }

            let credential = match self.pool.next() {
                Ok(credential) => credential,
                Err(PoolError::Exhausted) => return Err(CrawlError::PoolExhausted),
                Err(PoolError::AllRateLimited { retry_in }) => {
                    rate_limited += 1;
                    if rate_limited > self.policy.max_rate_limit_retries {
                        return Err(CrawlError::RateLimited { attempts: rate_limited });
                    }
                    debug!(what, ?retry_in, "every credential is cooling down");
                    self.backoffs.fetch_add(1, Ordering::Relaxed);
                    self.pause(retry_in).await?;
                    continue;
                }
            };

            self.attempts.fetch_add(1, Ordering::Relaxed);
            match call(credential.clone()).await {
                FetchOutcome::Success(payload) => {
                    self.pool.mark_valid(&credential);
                    // A cancelled pause must not throw away what we just fetched
                    let _ = self.pause(self.policy.pause).await;
                    return Ok(Some(payload));
                }
                FetchOutcome::Empty => {
                    self.pool.mark_valid(&credential);
                    let _ = self.pause(self.policy.pause).await;
                    return Ok(None);
                }
                FetchOutcome::RateLimited => {
                    self.pool.mark_rate_limited(&credential);
                    rate_limited += 1;
                    warn!(what, credential = %credential, attempt = rate_limited, "rate limited, rotating credential");
                    if rate_limited > self.policy.max_rate_limit_retries {
                        return Err(CrawlError::RateLimited { attempts: rate_limited });
                    }
                    self.backoffs.fetch_add(1, Ordering::Relaxed);
                    self.pause(self.policy.pause).await?;
                }
                FetchOutcome::InvalidCredential => {
                    self.pool.remove(&credential);
                    self.removed.fetch_add(1, Ordering::Relaxed);
                    warn!(what, credential = %credential, remaining = self.pool.len(), "credential rejected, removed from pool");
                    if self.pool.is_empty() {
                        return Err(CrawlError::PoolExhausted);
                    }
                }
                FetchOutcome::FatalError { code, message } => {
                    return Err(CrawlError::Fatal { code, message });
                }
                FetchOutcome::NetworkError(message) => {
                    network_failures += 1;
                    warn!(what, attempt = network_failures, error = %message, "network error");
                    if network_failures > self.policy.network_retries {
                        return Err(CrawlError::Network(message));
                    }
                    self.pause(self.policy.pause).await?;
                }
            }
        }
    }

    async fn pause(&self, duration: Duration) -> Result<(), CrawlError> {
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(CrawlError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
