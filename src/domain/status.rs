use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Pending,
    Processing,
    Authorized,
    Captured,
    Completed,
    Failed,
    Cancelled,
    Refunded,
    PartiallyRefunded,
    Chargeback,
    Disputed,
    AwaitingCapture,
    AwaitingConfirmation,
    AwaitingFunds,
    Declined,
    Expired,
    FraudDetected,
    InsufficientFunds,
    InvalidCard,
    Blocked,
}

use TransactionState::*;

impl TransactionState {
    pub const ALL: [TransactionState; 20] = [
        Pending,
        Processing,
        Authorized,
        Captured,
        Completed,
        Failed,
        Cancelled,
        Refunded,
        PartiallyRefunded,
        Chargeback,
        Disputed,
        AwaitingCapture,
        AwaitingConfirmation,
        AwaitingFunds,
        Declined,
        Expired,
        FraudDetected,
        InsufficientFunds,
        InvalidCard,
        Blocked,
    ];

    /// Outgoing edges of the lifecycle graph.
    ///
    /// `Failed -> Processing` is the only re-entry edge and is guarded by the
    /// retry limit on the aggregate.
    pub fn allowed_transitions(self) -> &'static [TransactionState] {
        match self {
            Pending => &[
                Processing,
                Authorized,
                Captured,
                Failed,
                Cancelled,
                Declined,
                FraudDetected,
            ],
            Processing => &[
                Authorized,
                Captured,
                Completed,
                Failed,
                Declined,
                FraudDetected,
                AwaitingCapture,
                AwaitingConfirmation,
            ],
            Authorized | AwaitingCapture => &[Captured, Cancelled, Expired, Failed],
            AwaitingConfirmation => &[Authorized, Captured, Completed, Failed, Cancelled],
            AwaitingFunds => &[Completed, Failed, Cancelled],
            Captured => &[Completed, Refunded, PartiallyRefunded, Chargeback, Disputed],
            Completed => &[Refunded, PartiallyRefunded, Chargeback, Disputed],
            PartiallyRefunded => &[Refunded, Chargeback, Disputed],
            Failed => &[Processing],
            Declined | Expired | FraudDetected | InsufficientFunds | InvalidCard | Blocked
            | Cancelled | Refunded | Chargeback | Disputed => &[],
        }
    }

    pub fn can_transition_to(self, target: TransactionState) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn is_waiting(self) -> bool {
        matches!(self, AwaitingCapture | AwaitingConfirmation | AwaitingFunds)
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Failed | Declined | Expired | FraudDetected | InsufficientFunds | InvalidCard | Blocked
        )
    }

    /// States in which funds have actually moved to the merchant.
    pub fn is_settled(self) -> bool {
        matches!(self, Captured | Completed | PartiallyRefunded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Pending => "pending",
            Processing => "processing",
            Authorized => "authorized",
            Captured => "captured",
            Completed => "completed",
            Failed => "failed",
            Cancelled => "cancelled",
            Refunded => "refunded",
            PartiallyRefunded => "partially_refunded",
            Chargeback => "chargeback",
            Disputed => "disputed",
            AwaitingCapture => "awaiting_capture",
            AwaitingConfirmation => "awaiting_confirmation",
            AwaitingFunds => "awaiting_funds",
            Declined => "declined",
            Expired => "expired",
            FraudDetected => "fraud_detected",
            InsufficientFunds => "insufficient_funds",
            InvalidCard => "invalid_card",
            Blocked => "blocked",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionState {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        TransactionState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == wanted)
            .ok_or_else(|| PaymentError::InvalidArgument(format!("unknown transaction state '{s}'")))
    }
}

/// Rejects any move that is not an edge of the lifecycle graph.
pub fn validate_transition(from: TransactionState, to: TransactionState) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(PaymentError::IllegalTransition { from, to })
    }
}

/// A point-in-time state together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatus {
    state: TransactionState,
    timestamp: DateTime<Utc>,
    reason: Option<String>,
    provider_code: Option<String>,
    metadata: BTreeMap<String, String>,
}

impl TransactionStatus {
    pub fn new(state: TransactionState) -> Self {
        Self {
            state,
            timestamp: Utc::now(),
            reason: None,
            provider_code: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn provider_code(&self) -> Option<&str> {
        self.provider_code.as_deref()
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}
