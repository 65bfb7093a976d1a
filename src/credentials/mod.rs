// src/credentials/mod.rs
// =============================================================================
// Access tokens for the content API.
//
// Submodules:
// - pool: the shared round-robin pool every worker draws from
// - check: probes tokens one by one before a crawl
//
// The pool hands out tokens in turn, parks throttled ones for a cool-down
// and drops the ones the platform rejects for good.
// =============================================================================

mod check;
mod pool;

pub use check::{check_tokens, TokenCheck};
pub use pool::{CredentialPool, PoolError};
