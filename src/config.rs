//! Ledger configuration
//!
//! Tunables shared by the store, the movement engine and the account number
//! generator. Every field has a sensible default; the CLI overrides a subset.

use std::time::Duration;

/// Settings for generated account numbers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountNumberConfig {
    /// Fixed leading component, e.g. `ACC`
    pub prefix: String,

    /// Generated numbers are truncated to this many characters
    pub max_len: usize,

    /// Attempts before giving up when the store reports a collision
    pub max_attempts: u32,
}

impl Default for AccountNumberConfig {
    fn default() -> Self {
        Self {
            prefix: "ACC".to_string(),
            max_len: 20,
            max_attempts: 5,
        }
    }
}

/// Configuration for the ledger engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Longest a unit of work waits for a single account lock
    pub lock_timeout: Duration,

    /// Retries after `Contention` in [`submit_with_retry`](crate::core::MovementEngine::submit_with_retry)
    pub max_retries: u32,

    /// Decimal places accepted in amounts
    pub currency_scale: u32,

    pub max_description_len: usize,

    pub max_nickname_len: usize,

    pub account_number: AccountNumberConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(2),
            max_retries: 3,
            currency_scale: 2,
            max_description_len: 255,
            max_nickname_len: 50,
            account_number: AccountNumberConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Override the lock timeout; zero falls back to the default
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        if timeout.is_zero() {
            tracing::warn!(
                default_ms = Self::default().lock_timeout.as_millis() as u64,
                "Invalid lock_timeout (0), using default"
            );
        } else {
            self.lock_timeout = timeout;
        }
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Truncate `text` to at most `max_chars` characters on a char boundary
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.lock_timeout, Duration::from_secs(2));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.currency_scale, 2);
        assert_eq!(config.max_description_len, 255);
        assert_eq!(config.max_nickname_len, 50);
        assert_eq!(config.account_number.prefix, "ACC");
        assert_eq!(config.account_number.max_len, 20);
    }

    #[test]
    fn test_zero_lock_timeout_falls_back_to_default() {
        let config = LedgerConfig::default().with_lock_timeout(Duration::ZERO);
        assert_eq!(config.lock_timeout, Duration::from_secs(2));

        let config = LedgerConfig::default().with_lock_timeout(Duration::from_millis(50));
        assert_eq!(config.lock_timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_truncate_chars_respects_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
