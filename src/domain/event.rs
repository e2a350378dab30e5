use super::money::Money;
use super::status::TransactionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Processing,
    Authorized,
    Captured,
    Completed,
    Failed,
    Declined,
    Cancelled,
    Expired,
    Refunded,
    PartiallyRefunded,
    RefundRequested,
    RefundReleased,
    Chargeback,
    Disputed,
    AwaitingAction,
    RetryAttempted,
    FraudScoreUpdated,
    FraudDetected,
}

impl EventType {
    /// Event recorded when a transaction enters `state`.
    pub fn for_state(state: TransactionState) -> Self {
        match state {
            TransactionState::Pending => EventType::Created,
            TransactionState::Processing => EventType::Processing,
            TransactionState::Authorized => EventType::Authorized,
            TransactionState::Captured => EventType::Captured,
            TransactionState::Completed => EventType::Completed,
            TransactionState::Failed => EventType::Failed,
            TransactionState::Declined
            | TransactionState::InsufficientFunds
            | TransactionState::InvalidCard => EventType::Declined,
            TransactionState::Cancelled => EventType::Cancelled,
            TransactionState::Expired => EventType::Expired,
            TransactionState::Refunded => EventType::Refunded,
            TransactionState::PartiallyRefunded => EventType::PartiallyRefunded,
            TransactionState::Chargeback => EventType::Chargeback,
            TransactionState::Disputed => EventType::Disputed,
            TransactionState::FraudDetected | TransactionState::Blocked => {
                EventType::FraudDetected
            }
            TransactionState::AwaitingCapture
            | TransactionState::AwaitingConfirmation
            | TransactionState::AwaitingFunds => EventType::AwaitingAction,
        }
    }
}

/// An immutable audit record of one change to a transaction.
///
/// Only the delivery bookkeeping (`processed`, `processing_error`, `version`)
/// changes after creation, and only through [`mark_processed`] and
/// [`mark_failed`].
///
/// [`mark_processed`]: TransactionEvent::mark_processed
/// [`mark_failed`]: TransactionEvent::mark_failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    id: Uuid,
    transaction_id: Uuid,
    event_type: EventType,
    previous_status: Option<TransactionState>,
    new_status: TransactionState,
    amount: Option<Money>,
    data: BTreeMap<String, String>,
    source: String,
    occurred_at: DateTime<Utc>,
    processed: bool,
    processing_error: Option<String>,
    version: u32,
}

impl TransactionEvent {
    pub fn new(
        transaction_id: Uuid,
        event_type: EventType,
        previous_status: Option<TransactionState>,
        new_status: TransactionState,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            event_type,
            previous_status,
            new_status,
            amount: None,
            data: BTreeMap::new(),
            source: source.into(),
            occurred_at: Utc::now(),
            processed: false,
            processing_error: None,
            version: 1,
        }
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Idempotent: an already processed event is left untouched.
    pub fn mark_processed(&mut self) -> bool {
        if self.processed {
            return false;
        }
        self.processed = true;
        self.processing_error = None;
        self.version += 1;
        true
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.processed = false;
        self.processing_error = Some(error.into());
        self.version += 1;
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn transaction_id(&self) -> Uuid {
        self.transaction_id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn previous_status(&self) -> Option<TransactionState> {
        self.previous_status
    }

    pub fn new_status(&self) -> TransactionState {
        self.new_status
    }

    pub fn amount(&self) -> Option<Money> {
        self.amount
    }

    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub fn processing_error(&self) -> Option<&str> {
        self.processing_error.as_deref()
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}
