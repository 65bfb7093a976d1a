// src/credentials/check.rs
// =============================================================================
// Tests each token with one cheap authenticated call before a crawl.
//
// Tokens are probed one at a time with a short gap in between, so checking a
// long list doesn't itself trip the rate limit.
// =============================================================================

use super::CredentialPool;
use crate::api::ContentApi;
use crate::model::{CredentialState, FetchOutcome};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenCheck {
    pub credential: String,
    pub state: CredentialState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub async fn check_tokens(api: &dyn ContentApi, pool: &CredentialPool, gap: Duration) -> Vec<TokenCheck> {
    let mut checks = Vec::new();

    for (i, (credential, _)) in pool.snapshot().into_iter().enumerate() {
        if i > 0 && !gap.is_zero() {
            tokio::time::sleep(gap).await;
        }

        let outcome = api.probe(&credential).await;
        debug!(credential = %credential, ?outcome, "probed");

        let message = match &outcome {
            FetchOutcome::FatalError { code, message } => Some(format!("API error {}: {}", code, message)),
            FetchOutcome::NetworkError(message) => Some(message.clone()),
            _ => None,
        };
        match outcome {
            FetchOutcome::Success(()) | FetchOutcome::Empty => pool.mark_valid(&credential),
            FetchOutcome::RateLimited => pool.mark_rate_limited(&credential),
            FetchOutcome::InvalidCredential => pool.remove(&credential),
            // Can't tell either way; leave it untested
            FetchOutcome::FatalError { .. } | FetchOutcome::NetworkError(_) => {}
        }

        checks.push(TokenCheck {
            credential: credential.to_string(),
            state: pool.state_of(&credential).unwrap_or(CredentialState::Untested),
            message,
        });
    }

    checks
}
