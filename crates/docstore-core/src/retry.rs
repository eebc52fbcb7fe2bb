//! Bounded retry policy for writes.

use crate::error::Error;

/// Action taken between a failed attempt and the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Retry without doing anything in between.
    None,
    /// Create the target collection if it is missing.
    EnsureCollectionExists,
}

/// How many times a write is attempted, and what runs between attempts.
///
/// Only store failures are retried. Configuration and input errors are
/// returned from the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never less than one.
    pub max_attempts: u32,
    /// Action run before each retry.
    pub recovery: RecoveryAction,
}

impl RetryPolicy {
    /// Attempt once, never retry.
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            recovery: RecoveryAction::None,
        }
    }

    /// Create the collection and try exactly once more.
    pub const fn create_collection_and_retry() -> Self {
        Self {
            max_attempts: 2,
            recovery: RecoveryAction::EnsureCollectionExists,
        }
    }

    /// Decide whether `attempt` (1-based) may be followed by another one
    /// after failing with `err`.
    pub fn should_retry(&self, attempt: u32, err: &Error) -> bool {
        matches!(err, Error::Store(_)) && attempt < self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::create_collection_and_retry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigurationError, Operation, StoreError};

    fn store_err() -> Error {
        StoreError::transport(Operation::Upsert, "memory", "boom").into()
    }

    #[test]
    fn default_allows_exactly_one_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.recovery, RecoveryAction::EnsureCollectionExists);
        assert!(policy.should_retry(1, &store_err()));
        assert!(!policy.should_retry(2, &store_err()));
    }

    #[test]
    fn no_retry_policy() {
        assert!(!RetryPolicy::no_retry().should_retry(1, &store_err()));
    }

    #[test]
    fn zero_attempts_behaves_like_one() {
        let policy = RetryPolicy {
            max_attempts: 0,
            recovery: RecoveryAction::None,
        };
        assert!(!policy.should_retry(1, &store_err()));
    }

    #[test]
    fn non_store_errors_are_not_retried() {
        let err = Error::from(ConfigurationError::MissingConnection);
        assert!(!RetryPolicy::default().should_retry(1, &err));
    }
}
