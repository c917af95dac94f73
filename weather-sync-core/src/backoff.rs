use std::{collections::HashMap, time::Duration};

use crate::{
    error::{ReconcileError, RetryPolicy},
    model::ObjectKey,
};

/// Per-key retry delays for failed reconciles: immediate for conflicts,
/// capped exponential otherwise. A success resets the key.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    failures: HashMap<ObjectKey, u32>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(5 * 60))
    }
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap, failures: HashMap::new() }
    }

    /// Delay before retrying `key` after `err`.
    pub fn on_error(&mut self, key: &ObjectKey, err: &ReconcileError) -> Duration {
        if err.retry_policy() == RetryPolicy::Immediate {
            return Duration::ZERO;
        }

        let attempt = self.failures.entry(key.clone()).or_insert(0);
        let factor = 2u32.saturating_pow(*attempt);
        *attempt = attempt.saturating_add(1);

        self.base.saturating_mul(factor).min(self.cap)
    }

    pub fn reset(&mut self, key: &ObjectKey) {
        self.failures.remove(key);
    }

    pub fn failures(&self, key: &ObjectKey) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProviderError, StoreError};

    fn key() -> ObjectKey {
        ObjectKey::new("default", "home")
    }

    fn api_error() -> ReconcileError {
        ProviderError::Status { code: 429, body: String::new() }.into()
    }

    #[test]
    fn doubles_until_capped() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5));

        let delays: Vec<_> = (0..5).map(|_| backoff.on_error(&key(), &api_error())).collect();
        assert_eq!(delays, [1, 2, 4, 5, 5].map(Duration::from_secs).to_vec());
    }

    #[test]
    fn conflicts_retry_immediately_without_counting() {
        let mut backoff = Backoff::default();
        let conflict = ReconcileError::Conflict(StoreError::Conflict {
            key: key(),
            expected: 1,
            actual: 2,
        });

        assert_eq!(backoff.on_error(&key(), &conflict), Duration::ZERO);
        assert_eq!(backoff.failures(&key()), 0);
    }

    #[test]
    fn reset_starts_over() {
        let mut backoff = Backoff::default();
        backoff.on_error(&key(), &api_error());
        backoff.on_error(&key(), &api_error());
        backoff.reset(&key());

        assert_eq!(backoff.on_error(&key(), &api_error()), Duration::from_secs(1));
    }

    #[test]
    fn huge_attempt_counts_do_not_overflow() {
        let mut backoff = Backoff::default();
        for _ in 0..100 {
            backoff.on_error(&key(), &api_error());
        }
        assert_eq!(backoff.on_error(&key(), &api_error()), Duration::from_secs(300));
    }
}
