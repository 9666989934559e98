use crate::model::TokenId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors generated in `pulse-feed`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum FeedError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no Tokio runtime available to drive feed timers")]
    RuntimeUnavailable,

    #[error("network error: {0}")]
    Network(String),

    #[error("token not found: {0}")]
    NotFound(TokenId),
}

impl FeedError {
    /// Determine if an error is transient and the failed operation may be retried.
    ///
    /// Only simulated fetch failures qualify; configuration and lookup errors will fail the same
    /// way on every attempt.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::Network(_) => true,
            _ => false,
        }
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_error_is_retryable() {
        struct TestCase {
            input: FeedError,
            expected: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: is retryable w/ FeedError::Network
                input: FeedError::Network("Failed to fetch tokens".to_string()),
                expected: true,
            },
            TestCase {
                // TC1: is not retryable w/ FeedError::InvalidConfig
                input: FeedError::invalid_config("tick interval must be positive"),
                expected: false,
            },
            TestCase {
                // TC2: is not retryable w/ FeedError::RuntimeUnavailable
                input: FeedError::RuntimeUnavailable,
                expected: false,
            },
            TestCase {
                // TC3: is not retryable w/ FeedError::NotFound
                input: FeedError::NotFound(TokenId::from("new-pairs-1")),
                expected: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = test.input.is_retryable();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_feed_error_display() {
        assert_eq!(
            FeedError::invalid_config("tick interval must be positive").to_string(),
            "invalid configuration: tick interval must be positive"
        );
        assert_eq!(
            FeedError::NotFound(TokenId::from("simulated-1001")).to_string(),
            "token not found: simulated-1001"
        );
    }
}
