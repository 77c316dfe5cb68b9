//! Account number generation
//!
//! Numbers look like `ACC` + 8 time digits + 4 random digits + 3 owner digits,
//! e.g. `ACC123456784821042`. They are probabilistically
//! unique only: the store's unique index is the real guard, and callers retry
//! generation when an insert reports `DuplicateAccountNumber`.

use crate::config::{truncate_chars, AccountNumberConfig};
use crate::types::{AccountNumber, OwnerId};
use chrono::Utc;
use rand::Rng;

/// Produces human-presentable account numbers
#[derive(Debug, Clone, Default)]
pub struct AccountNumberGenerator {
    config: AccountNumberConfig,
}

impl AccountNumberGenerator {
    pub fn new(config: AccountNumberConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Generate a candidate number for `owner_id`
    ///
    /// Without an owner the 3-digit suffix is random as well.
    pub fn generate(&self, owner_id: Option<OwnerId>) -> AccountNumber {
        let now_millis = Utc::now().timestamp_millis();
        self.generate_with(owner_id, now_millis, &mut rand::thread_rng())
    }

    /// Deterministic core of [`generate`](Self::generate)
    pub fn generate_with<R: Rng>(
        &self,
        owner_id: Option<OwnerId>,
        now_millis: i64,
        rng: &mut R,
    ) -> AccountNumber {
        let millis = now_millis.unsigned_abs().to_string();
        let time_part = last_digits(&millis, 8);
        let random_part: u32 = rng.gen_range(1000..=9999);
        let owner_part = match owner_id {
            Some(owner) => format!("{:0>3}", last_digits(&owner.to_string(), 3)),
            None => rng.gen_range(100..=999u32).to_string(),
        };

        let number = format!(
            "{}{}{}{}",
            self.config.prefix, time_part, random_part, owner_part
        );
        truncate_chars(&number, self.config.max_len)
    }
}

fn last_digits(digits: &str, count: usize) -> &str {
    &digits[digits.len().saturating_sub(count)..]
}
