//! Beneficiary directory
//!
//! Maps a user to the destination accounts they saved for repeat transfers.
//! The directory only reads accounts; it never touches balances.

use crate::config::{truncate_chars, LedgerConfig};
use crate::core::audit::{AuditEvent, AuditSink, EntityType, TracingAuditSink};
use crate::core::traits::LedgerStore;
use crate::types::{
    normalize_account_number, Beneficiary, BeneficiaryId, BeneficiaryOutcome, LedgerError,
    NewBeneficiary, UserId,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Per-user saved destinations, soft-deleted and never removed
pub struct BeneficiaryDirectory<S: LedgerStore> {
    store: Arc<S>,
    audit: Arc<dyn AuditSink>,
    max_nickname_len: usize,
}

impl<S: LedgerStore> BeneficiaryDirectory<S> {
    pub fn new(store: Arc<S>, config: &LedgerConfig) -> Self {
        Self {
            store,
            audit: Arc::new(TracingAuditSink),
            max_nickname_len: config.max_nickname_len,
        }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    /// Save `account_number` as a beneficiary of `user_id`
    ///
    /// # Arguments
    ///
    /// * `user_id` - User saving the beneficiary
    /// * `account_number` - Destination account, normalized before lookup
    /// * `nickname` - Optional label; defaults to the holder name
    ///
    /// # Returns
    ///
    /// * `Ok(BeneficiaryOutcome::Added)` - A new beneficiary was saved
    /// * `Ok(BeneficiaryOutcome::Reactivated)` - A removed beneficiary was restored
    ///   with the new nickname
    /// * `Err(LedgerError::AccountNotFound)` - No active account with that number
    /// * `Err(LedgerError::SelfReference)` - The account belongs to `user_id`
    /// * `Err(LedgerError::BeneficiaryExists)` - Already saved and active
    pub fn add(
        &self,
        user_id: UserId,
        account_number: &str,
        nickname: Option<&str>,
    ) -> Result<BeneficiaryOutcome, LedgerError> {
        let number = normalize_account_number(account_number);
        let account = match self.store.get_account_by_number(&number) {
            Ok(account) if account.is_active() => account,
            Ok(_) | Err(LedgerError::AccountNotFound { .. }) => {
                return Err(LedgerError::account_not_found(&number))
            }
            Err(err) => return Err(err),
        };
        if account.owner_id == user_id {
            return Err(LedgerError::self_reference(&number));
        }

        let nickname = truncate_chars(
            nickname
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(&account.holder_name),
            self.max_nickname_len,
        );

        let outcome = match self.store.find_beneficiary(user_id, account.account_id)? {
            Some(existing) if existing.is_active => {
                return Err(LedgerError::beneficiary_exists(&number))
            }
            Some(existing) => {
                let restored = self.store.update_beneficiary(existing.beneficiary_id, |b| {
                    if b.is_active {
                        return Err(LedgerError::beneficiary_exists(&number));
                    }
                    b.is_active = true;
                    b.nickname = nickname.clone();
                    Ok(())
                })?;
                BeneficiaryOutcome::Reactivated(restored)
            }
            None => {
                let created = self
                    .store
                    .insert_beneficiary(
                        NewBeneficiary {
                            user_id,
                            beneficiary_account_id: account.account_id,
                            display_name: account.holder_name.clone(),
                            nickname,
                        },
                        Utc::now(),
                    )
                    .map_err(|err| match err {
                        LedgerError::BeneficiaryExists { .. } => {
                            LedgerError::beneficiary_exists(&number)
                        }
                        other => other,
                    })?;
                BeneficiaryOutcome::Added(created)
            }
        };

        let action = match &outcome {
            BeneficiaryOutcome::Added(_) => "ADD_BENEFICIARY",
            BeneficiaryOutcome::Reactivated(_) => "REACTIVATE_BENEFICIARY",
        };
        let saved = outcome.beneficiary();
        info!(user_id, account = %number, action, "Beneficiary saved");
        self.audit.record(
            AuditEvent::new(
                user_id,
                action,
                EntityType::Beneficiary,
                saved.beneficiary_id.to_string(),
            )
            .with_new(json!({
                "account_number": number,
                "nickname": saved.nickname,
            })),
        );
        Ok(outcome)
    }

    /// Soft-delete a beneficiary owned by `user_id`
    ///
    /// A beneficiary of another user, or one already removed, is reported as
    /// `BeneficiaryNotFound` and left untouched.
    pub fn remove(
        &self,
        user_id: UserId,
        beneficiary_id: BeneficiaryId,
    ) -> Result<Beneficiary, LedgerError> {
        let removed = self.store.update_beneficiary(beneficiary_id, |b| {
            if b.user_id != user_id || !b.is_active {
                return Err(LedgerError::beneficiary_not_found(beneficiary_id));
            }
            b.is_active = false;
            Ok(())
        });

        match &removed {
            Ok(_) => {
                info!(user_id, beneficiary_id, "Beneficiary removed");
                self.audit.record(
                    AuditEvent::new(
                        user_id,
                        "REMOVE_BENEFICIARY",
                        EntityType::Beneficiary,
                        beneficiary_id.to_string(),
                    )
                    .with_old(json!({ "is_active": true }))
                    .with_new(json!({ "is_active": false })),
                );
            }
            Err(err) => debug!(user_id, beneficiary_id, error = %err, "Beneficiary not removed"),
        }
        removed
    }

    /// Active beneficiaries of `user_id`, oldest first
    pub fn list(&self, user_id: UserId) -> Result<Vec<Beneficiary>, LedgerError> {
        Ok(self
            .store
            .beneficiaries_for_user(user_id)?
            .into_iter()
            .filter(|b| b.is_active)
            .collect())
    }
}
