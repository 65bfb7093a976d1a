// src/credentials/pool.rs
// =============================================================================
// Round-robin rotation over a set of access tokens.
//
// How it works:
// 1. Every credential sits in a slot with a state (untested/valid/...)
// 2. next() walks the slots starting at the cursor, skipping invalid ones
//    and ones still cooling down after a rate limit
// 3. The cursor moves past whatever was handed out, so concurrent workers
//    get different credentials in turn
//
// All of this lives behind one mutex: many workers call next() at once and
// the cursor has to advance exactly once per call.
//
// Rust concepts:
// - parking_lot::Mutex: like std's Mutex but never poisoned, so no unwrap()
// - tokio::time::Instant: follows tokio's clock, which tests can pause
// =============================================================================

use crate::model::{Credential, CredentialState};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Why next() couldn't hand out a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Every credential has been removed
    #[error("no valid credentials left")]
    Exhausted,
    /// Some credentials are alive but all of them are cooling down
    #[error("all credentials are rate limited for another {retry_in:?}")]
    AllRateLimited { retry_in: Duration },
}

#[derive(Debug)]
struct Slot {
    credential: Credential,
    state: CredentialState,
    cooling_until: Option<Instant>,
}

#[derive(Debug)]
struct PoolInner {
    slots: Vec<Slot>,
    cursor: usize,
}

#[derive(Debug)]
pub struct CredentialPool {
    inner: Mutex<PoolInner>,
    cooldown: Duration,
}

impl CredentialPool {
    // Builds a pool from raw token strings.
    //
    // Blank tokens are skipped and duplicates collapse into one slot, so
    // "a, b, a," gives a pool of two.
    pub fn new<I, S>(tokens: I, cooldown: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut slots: Vec<Slot> = Vec::new();
        for token in tokens {
            let token = token.as_ref().trim();
            if token.is_empty() || slots.iter().any(|s| s.credential.token() == token) {
                continue;
            }
            slots.push(Slot {
                credential: Credential::new(slots.len(), Arc::<str>::from(token)),
                state: CredentialState::Untested,
                cooling_until: None,
            });
        }

        Self {
            inner: Mutex::new(PoolInner { slots, cursor: 0 }),
            cooldown,
        }
    }

    /// Hands out the next usable credential in round-robin order
    pub fn next(&self) -> Result<Credential, PoolError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let total = inner.slots.len();

        let mut soonest: Option<Instant> = None;
        for step in 0..total {
            let idx = (inner.cursor + step) % total;
            let slot = &inner.slots[idx];

            if slot.state == CredentialState::Invalid {
                continue;
            }
            if let Some(until) = slot.cooling_until {
                if until > now {
                    soonest = Some(soonest.map_or(until, |s| s.min(until)));
                    continue;
                }
            }

            let credential = slot.credential.clone();
            inner.cursor = (idx + 1) % total;
            return Ok(credential);
        }

        match soonest {
            Some(until) => Err(PoolError::AllRateLimited { retry_in: until - now }),
            None => Err(PoolError::Exhausted),
        }
    }

    /// Permanently drops a credential from rotation
    pub fn remove(&self, credential: &Credential) {
        self.update(credential, |slot| {
            slot.state = CredentialState::Invalid;
            slot.cooling_until = None;
        });
    }

    /// Parks a credential until the cool-down has passed
    pub fn mark_rate_limited(&self, credential: &Credential) {
        let until = Instant::now() + self.cooldown;
        self.update(credential, |slot| {
            if slot.state != CredentialState::Invalid {
                slot.state = CredentialState::RateLimited;
                slot.cooling_until = Some(until);
            }
        });
    }

    /// Records that a request with this credential went through
    pub fn mark_valid(&self, credential: &Credential) {
        self.update(credential, |slot| {
            if slot.state != CredentialState::Invalid {
                slot.state = CredentialState::Valid;
                slot.cooling_until = None;
            }
        });
    }

    /// Number of credentials that haven't been removed
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .slots
            .iter()
            .filter(|s| s.state != CredentialState::Invalid)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state_of(&self, credential: &Credential) -> Option<CredentialState> {
        self.inner
            .lock()
            .slots
            .get(credential.slot())
            .filter(|s| s.credential == *credential)
            .map(|s| s.state)
    }

    /// Every credential with its current state, in slot order
    pub fn snapshot(&self) -> Vec<(Credential, CredentialState)> {
        self.inner
            .lock()
            .slots
            .iter()
            .map(|s| (s.credential.clone(), s.state))
            .collect()
    }

    fn update(&self, credential: &Credential, apply: impl FnOnce(&mut Slot)) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.slots.get_mut(credential.slot()) {
            if slot.credential == *credential {
                apply(slot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(tokens: &[&str]) -> CredentialPool {
        CredentialPool::new(tokens.iter().copied(), Duration::from_secs(5))
    }

    #[test]
    fn rotates_round_robin() {
        let pool = pool(&["aaaa", "bbbb", "cccc"]);
        let order: Vec<usize> = (0..6).map(|_| pool.next().unwrap().slot()).collect();
        assert_eq!(order, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn skips_blank_and_duplicate_tokens() {
        let pool = pool(&["a1", " ", "b2", "a1", ""]);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn removed_credential_is_never_selected_again() {
        let pool = pool(&["aaaa", "bbbb", "cccc"]);
        let second = pool.snapshot()[1].0.clone();

        pool.remove(&second);

        assert_eq!(pool.len(), 2);
        for _ in 0..10 {
            assert_ne!(pool.next().unwrap().slot(), 1);
        }
        assert_eq!(pool.state_of(&second), Some(CredentialState::Invalid));
    }

    #[test]
    fn exhausted_when_everything_removed() {
        let pool = pool(&["aaaa"]);
        let only = pool.next().unwrap();
        pool.remove(&only);

        assert!(pool.is_empty());
        assert_eq!(pool.next(), Err(PoolError::Exhausted));
    }

    #[test]
    fn empty_pool_is_exhausted() {
        let pool = pool(&[]);
        assert_eq!(pool.next(), Err(PoolError::Exhausted));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_credential_comes_back_after_cooldown() {
        let pool = pool(&["aaaa", "bbbb"]);
        let first = pool.next().unwrap();
        pool.mark_rate_limited(&first);

        // Only the other one is eligible while the first cools down
        assert_eq!(pool.next().unwrap().slot(), 1);
        assert_eq!(pool.next().unwrap().slot(), 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        let slots: Vec<usize> = (0..2).map(|_| pool.next().unwrap().slot()).collect();
        assert!(slots.contains(&0));
    }

    #[tokio::test(start_paused = true)]
    async fn all_rate_limited_reports_wait_time() {
        let pool = pool(&["aaaa"]);
        let only = pool.next().unwrap();
        pool.mark_rate_limited(&only);

        match pool.next() {
            Err(PoolError::AllRateLimited { retry_in }) => {
                assert!(retry_in <= Duration::from_secs(5));
                assert!(retry_in > Duration::ZERO);
            }
            other => panic!("expected AllRateLimited, got {:?}", other),
        }
        assert_eq!(pool.state_of(&only), Some(CredentialState::RateLimited));
    }

    #[test]
    fn mark_valid_does_not_resurrect_removed_credential() {
        let pool = pool(&["aaaa", "bbbb"]);
        let first = pool.next().unwrap();
        pool.remove(&first);
        pool.mark_valid(&first);

        assert_eq!(pool.state_of(&first), Some(CredentialState::Invalid));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn concurrent_callers_share_one_cursor() {
        let pool = Arc::new(pool(&["a1", "b2", "c3", "d4"]));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || (0..100).map(|_| pool.next().unwrap().slot()).collect::<Vec<_>>())
            })
            .collect();

        let mut counts = [0usize; 4];
        for handle in handles {
            for slot in handle.join().unwrap() {
                counts[slot] += 1;
            }
        }
        // 400 picks over 4 credentials with a shared cursor is perfectly even
        assert_eq!(counts, [100, 100, 100, 100]);
    }
}
