//! Audit events and sinks
//!
//! The ledger emits one [`AuditEvent`] after every committed or rejected
//! movement and after registry changes (account opening, status changes,
//! beneficiaries). Delivery is best-effort: a sink must never block the
//! caller, and a failed delivery never affects the ledger.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Kind of entity an audit event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Account,
    Transaction,
    Beneficiary,
}

/// One structured audit record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    /// User on whose behalf the action ran
    pub actor: UserId,

    /// Upper-case action name, e.g. `TRANSFER` or `TRANSFER_REJECTED`
    pub action: String,

    pub entity_type: EntityType,

    /// External identifier (transaction uid, account number, beneficiary id)
    pub entity_id: String,

    pub old_value: Option<Value>,

    pub new_value: Option<Value>,

    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        actor: UserId,
        action: impl Into<String>,
        entity_type: EntityType,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            actor,
            action: action.into(),
            entity_type,
            entity_id: entity_id.into(),
            old_value: None,
            new_value: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_old(mut self, value: Value) -> Self {
        self.old_value = Some(value);
        self
    }

    pub fn with_new(mut self, value: Value) -> Self {
        self.new_value = Some(value);
        self
    }
}

/// Destination for audit events
///
/// Implementations must return promptly; they run on the request path right
/// after the ledger commit.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes audit events as structured log lines on target `audit`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let old_value = event.old_value.map(|v| v.to_string()).unwrap_or_default();
        let new_value = event.new_value.map(|v| v.to_string()).unwrap_or_default();
        info!(
            target: "audit",
            actor = event.actor,
            action = %event.action,
            entity_type = ?event.entity_type,
            entity_id = %event.entity_id,
            old_value = %old_value,
            new_value = %new_value,
            timestamp = %event.timestamp.to_rfc3339(),
            "audit event"
        );
    }
}

/// Forwards audit events into a bounded tokio channel
///
/// Uses `try_send`, so a full or closed channel drops the event with a
/// warning instead of blocking the ledger.
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    sender: mpsc::Sender<AuditEvent>,
}

impl ChannelAuditSink {
    /// Create a sink and the receiver that drains it
    ///
    /// # Arguments
    ///
    /// * `capacity` - Channel capacity (at least 1)
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Err(err) = self.sender.try_send(event) {
            let (reason, event) = match err {
                mpsc::error::TrySendError::Full(event) => ("full", event),
                mpsc::error::TrySendError::Closed(event) => ("closed", event),
            };
            warn!(
                action = %event.action,
                entity_id = %event.entity_id,
                reason,
                "Dropped audit event"
            );
        }
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: AuditEvent) {}
}
