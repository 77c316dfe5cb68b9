//! Beneficiary types
//!
//! A beneficiary is a saved destination account a user transfers to
//! repeatedly. Rows are soft-deleted through `is_active` and never removed.

use super::account::AccountId;
use super::transaction::UserId;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub type BeneficiaryId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Beneficiary {
    pub beneficiary_id: BeneficiaryId,

    /// User who saved the beneficiary
    pub user_id: UserId,

    pub beneficiary_account_id: AccountId,

    /// Holder name of the destination account at the time it was saved
    pub display_name: String,

    /// User-chosen label; defaults to `display_name`
    pub nickname: String,

    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}

/// Values for a beneficiary row that does not exist yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBeneficiary {
    pub user_id: UserId,
    pub beneficiary_account_id: AccountId,
    pub display_name: String,
    pub nickname: String,
}

/// Result of saving a beneficiary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "beneficiary", rename_all = "lowercase")]
pub enum BeneficiaryOutcome {
    /// A new row was created
    Added(Beneficiary),

    /// A soft-deleted row was switched back on
    Reactivated(Beneficiary),
}

impl BeneficiaryOutcome {
    pub fn beneficiary(&self) -> &Beneficiary {
        match self {
            BeneficiaryOutcome::Added(b) | BeneficiaryOutcome::Reactivated(b) => b,
        }
    }

    pub fn into_beneficiary(self) -> Beneficiary {
        match self {
            BeneficiaryOutcome::Added(b) | BeneficiaryOutcome::Reactivated(b) => b,
        }
    }
}
