use super::event::{EventType, TransactionEvent};
use super::fraud_score::{FraudScore, RiskTier};
use super::money::Money;
use super::payment_method::PaymentMethod;
use super::status::{TransactionState, TransactionStatus, validate_transition};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Maximum number of times a failed transaction may re-enter processing.
pub const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Payment,
    Refund,
    Chargeback,
}

/// The aggregate root for a single payment attempt.
///
/// Status and fraud score only change through methods that validate against
/// the lifecycle graph first; every accepted change appends exactly one
/// [`TransactionEvent`]. Refunds and chargebacks are separate transactions
/// linked by id in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    id: Uuid,
    customer_id: String,
    kind: TransactionKind,
    amount: Money,
    payment_method: PaymentMethod,
    country: Option<String>,
    description: Option<String>,
    capture_requested: bool,
    status: TransactionStatus,
    fraud_score: Option<FraudScore>,
    events: Vec<TransactionEvent>,
    retry_count: u32,
    parent_transaction_id: Option<Uuid>,
    child_transactions: BTreeSet<Uuid>,
    total_refunded: Money,
    /// Refunds claimed against this payment whose gateway call has not settled.
    #[serde(default)]
    refunds_in_flight: BTreeMap<Uuid, Money>,
    net_amount: Money,
    provider_transaction_id: Option<String>,
    provider_data: BTreeMap<String, String>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    settled_at: Option<DateTime<Utc>>,
    /// Persistence version for optimistic concurrency; 0 until first saved.
    version: u64,
}

impl Transaction {
    pub fn new(
        customer_id: impl Into<String>,
        amount: Money,
        payment_method: PaymentMethod,
    ) -> Result<Self> {
        Self::create(
            TransactionKind::Payment,
            customer_id.into(),
            amount,
            payment_method,
            None,
        )
    }

    fn create(
        kind: TransactionKind,
        customer_id: String,
        amount: Money,
        payment_method: PaymentMethod,
        parent_transaction_id: Option<Uuid>,
    ) -> Result<Self> {
        if customer_id.trim().is_empty() {
            return Err(PaymentError::InvalidArgument(
                "customer id is required".to_string(),
            ));
        }
        if !amount.is_positive() {
            return Err(PaymentError::InvalidArgument(format!(
                "transaction amount must be positive, got {amount}"
            )));
        }

        let id = Uuid::new_v4();
        let status = TransactionStatus::new(TransactionState::Pending);
        let zero = Money::zero(amount.currency());
        let mut created = TransactionEvent::new(
            id,
            EventType::Created,
            None,
            TransactionState::Pending,
            "system",
        )
        .with_amount(amount)
        .with_data("kind", format!("{kind:?}").to_lowercase());
        if let Some(parent) = parent_transaction_id {
            created = created.with_data("parent_transaction_id", parent.to_string());
        }

        Ok(Self {
            id,
            customer_id,
            kind,
            amount,
            payment_method,
            country: None,
            description: None,
            capture_requested: false,
            created_at: status.timestamp(),
            status,
            fraud_score: None,
            events: vec![created],
            retry_count: 0,
            parent_transaction_id,
            child_transactions: BTreeSet::new(),
            total_refunded: zero,
            refunds_in_flight: BTreeMap::new(),
            net_amount: amount,
            provider_transaction_id: None,
            provider_data: BTreeMap::new(),
            processed_at: None,
            settled_at: None,
            version: 0,
        })
    }

    /// A refund of part or all of a settled payment.
    pub fn refund_of(parent: &Transaction, amount: Money) -> Result<Self> {
        if parent.kind != TransactionKind::Payment {
            return Err(PaymentError::InvalidArgument(
                "only payments can be refunded".to_string(),
            ));
        }
        if !parent.can_refund() {
            return Err(PaymentError::InvalidArgument(format!(
                "transaction in state {} cannot be refunded",
                parent.state()
            )));
        }
        if amount.exceeds_threshold(&parent.refundable_amount())? {
            return Err(PaymentError::InvalidArgument(format!(
                "refund of {amount} exceeds refundable {}",
                parent.refundable_amount()
            )));
        }
        let mut refund = Self::create(
            TransactionKind::Refund,
            parent.customer_id.clone(),
            amount,
            parent.payment_method.clone(),
            Some(parent.id),
        )?;
        refund.country = parent.country.clone();
        Ok(refund)
    }

    /// A bank-initiated reversal of whatever is still held from the payment.
    pub fn chargeback_of(parent: &Transaction) -> Result<Self> {
        if parent.kind != TransactionKind::Payment
            || !parent.state().can_transition_to(TransactionState::Chargeback)
        {
            return Err(PaymentError::InvalidArgument(format!(
                "transaction in state {} cannot be charged back",
                parent.state()
            )));
        }
        let mut chargeback = Self::create(
            TransactionKind::Chargeback,
            parent.customer_id.clone(),
            parent.net_amount,
            parent.payment_method.clone(),
            Some(parent.id),
        )?;
        chargeback.country = parent.country.clone();
        Ok(chargeback)
    }

    pub fn with_country(mut self, country: Option<String>) -> Self {
        self.country = country.map(|c| c.trim().to_ascii_uppercase());
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_capture_requested(mut self, capture: bool) -> Self {
        self.capture_requested = capture;
        self
    }

    /// Applies a lifecycle transition, or fails without touching the transaction.
    ///
    /// `Failed -> Processing` counts as a retry and is refused once
    /// [`MAX_RETRIES`] retries have been used.
    pub fn transition(&mut self, next: TransactionStatus, source: &str) -> Result<()> {
        let from = self.status.state();
        let to = next.state();
        validate_transition(from, to)?;

        let is_retry = from == TransactionState::Failed && to == TransactionState::Processing;
        if is_retry && self.retry_count >= MAX_RETRIES {
            return Err(PaymentError::RetryLimitExceeded { limit: MAX_RETRIES });
        }

        let event_type = if is_retry {
            EventType::RetryAttempted
        } else {
            EventType::for_state(to)
        };
        let mut event = TransactionEvent::new(self.id, event_type, Some(from), to, source)
            .with_amount(self.amount);
        if let Some(reason) = next.reason() {
            event = event.with_data("reason", reason);
        }
        if let Some(code) = next.provider_code() {
            event = event.with_data("provider_code", code);
        }
        for (key, value) in next.metadata() {
            event = event.with_data(key.clone(), value.clone());
        }

        if is_retry {
            self.retry_count += 1;
        }
        self.stamp(to, next.timestamp());
        self.status = next;
        self.events.push(event);
        Ok(())
    }

    fn stamp(&mut self, state: TransactionState, at: DateTime<Utc>) {
        let decided = state.is_failure()
            || matches!(
                state,
                TransactionState::Authorized
                    | TransactionState::Captured
                    | TransactionState::Completed
            );
        if decided && self.processed_at.is_none() {
            self.processed_at = Some(at);
        }
        if matches!(
            state,
            TransactionState::Captured | TransactionState::Completed
        ) && self.settled_at.is_none()
        {
            self.settled_at = Some(at);
        }
    }

    /// Moves to `authorized` and remembers the provider's reference.
    pub fn mark_authorized(
        &mut self,
        provider_transaction_id: Option<String>,
        provider_data: BTreeMap<String, String>,
    ) -> Result<()> {
        let mut status = TransactionStatus::new(TransactionState::Authorized);
        if let Some(reference) = &provider_transaction_id {
            status = status.with_metadata("provider_transaction_id", reference.clone());
        }
        self.transition(status, "gateway")?;
        if provider_transaction_id.is_some() {
            self.provider_transaction_id = provider_transaction_id;
        }
        self.provider_data.extend(provider_data);
        Ok(())
    }

    /// Applies a new fraud score.
    ///
    /// The event is typed `fraud_detected` when the score newly reaches the
    /// high tier. A critical-tier score on a still pending transaction also
    /// cancels it.
    pub fn update_fraud_score(&mut self, score: FraudScore) -> Result<()> {
        let was_high = self
            .fraud_score
            .as_ref()
            .is_some_and(FraudScore::is_high_risk);
        let event_type = if score.is_high_risk() && !was_high {
            EventType::FraudDetected
        } else {
            EventType::FraudScoreUpdated
        };
        let state = self.status.state();
        let event = TransactionEvent::new(self.id, event_type, Some(state), state, "risk_engine")
            .with_data("score", score.value().to_string())
            .with_data("risk_tier", score.risk_tier().as_str())
            .with_data(
                "triggered_rules",
                score
                    .triggered_rules()
                    .iter()
                    .map(|r| r.factor.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            );

        let critical = score.risk_tier() == RiskTier::Critical;
        self.fraud_score = Some(score);
        self.events.push(event);

        if critical && state == TransactionState::Pending {
            self.transition(
                TransactionStatus::new(TransactionState::Cancelled)
                    .with_reason("blocked: critical fraud score"),
                "risk_engine",
            )?;
        }
        Ok(())
    }

    /// Claims `refund.amount` of the refundable balance before the provider
    /// is asked to move money. The claim is settled by [`record_refund`] or
    /// given back by [`release_refund`].
    ///
    /// [`record_refund`]: Transaction::record_refund
    /// [`release_refund`]: Transaction::release_refund
    pub fn reserve_refund(&mut self, refund: &Transaction) -> Result<()> {
        self.ensure_child(refund, TransactionKind::Refund)?;
        if self.refunds_in_flight.contains_key(&refund.id) {
            return Err(PaymentError::InvalidArgument(format!(
                "refund {} is already reserved",
                refund.id
            )));
        }
        if !self.can_refund() {
            return Err(PaymentError::InvalidArgument(format!(
                "transaction in state {} cannot be refunded",
                self.state()
            )));
        }
        if refund.amount.exceeds_threshold(&self.refundable_amount())? {
            return Err(PaymentError::InvalidArgument(format!(
                "refund of {} exceeds refundable {}",
                refund.amount,
                self.refundable_amount()
            )));
        }

        let state = self.state();
        self.events.push(
            TransactionEvent::new(self.id, EventType::RefundRequested, Some(state), state, "system")
                .with_amount(refund.amount)
                .with_data("refund_transaction_id", refund.id.to_string()),
        );
        self.refunds_in_flight.insert(refund.id, refund.amount);
        Ok(())
    }

    /// Returns a reserved refund amount after the provider refused it.
    pub fn release_refund(&mut self, refund_id: Uuid, reason: &str) -> Result<()> {
        let amount = self.refunds_in_flight.remove(&refund_id).ok_or_else(|| {
            PaymentError::InvalidArgument(format!("refund {refund_id} is not reserved"))
        })?;
        let state = self.state();
        self.events.push(
            TransactionEvent::new(self.id, EventType::RefundReleased, Some(state), state, "system")
                .with_amount(amount)
                .with_data("refund_transaction_id", refund_id.to_string())
                .with_data("reason", reason),
        );
        Ok(())
    }

    /// Links a completed refund and updates the refund accounting, settling
    /// its reservation if one was made.
    pub fn record_refund(&mut self, refund: &Transaction) -> Result<()> {
        self.ensure_child(refund, TransactionKind::Refund)?;
        if refund.state() != TransactionState::Completed {
            return Err(PaymentError::InvalidArgument(format!(
                "refund {} has not completed",
                refund.id
            )));
        }
        if let Some(reserved) = self.refunds_in_flight.get(&refund.id)
            && *reserved != refund.amount
        {
            return Err(PaymentError::InvalidArgument(format!(
                "refund {} reserved {reserved} but completed {}",
                refund.id, refund.amount
            )));
        }
        let total = self.total_refunded.add(&refund.amount)?;
        if total.exceeds_threshold(&self.amount)? {
            return Err(PaymentError::InvalidArgument(format!(
                "refunds of {total} would exceed the original {}",
                self.amount
            )));
        }

        let from = self.status.state();
        let target = if total == self.amount {
            TransactionState::Refunded
        } else {
            TransactionState::PartiallyRefunded
        };

        if from == TransactionState::PartiallyRefunded && target == from {
            // Another partial refund: the accounting changes, the state does not.
            let event = TransactionEvent::new(
                self.id,
                EventType::PartiallyRefunded,
                Some(from),
                from,
                "system",
            )
            .with_amount(refund.amount)
            .with_data("refund_transaction_id", refund.id.to_string());
            self.events.push(event);
        } else {
            self.transition(
                TransactionStatus::new(target)
                    .with_reason(format!("refund of {}", refund.amount))
                    .with_metadata("refund_transaction_id", refund.id.to_string()),
                "system",
            )?;
        }

        self.child_transactions.insert(refund.id);
        self.refunds_in_flight.remove(&refund.id);
        self.total_refunded = total;
        self.net_amount = self.amount.subtract(&total)?;
        Ok(())
    }

    pub fn record_chargeback(&mut self, chargeback: &Transaction, reason: &str) -> Result<()> {
        self.ensure_child(chargeback, TransactionKind::Chargeback)?;
        self.transition(
            TransactionStatus::new(TransactionState::Chargeback)
                .with_reason(reason)
                .with_metadata("chargeback_transaction_id", chargeback.id.to_string()),
            "system",
        )?;
        self.child_transactions.insert(chargeback.id);
        Ok(())
    }

    fn ensure_child(&self, child: &Transaction, kind: TransactionKind) -> Result<()> {
        if child.kind != kind || child.parent_transaction_id != Some(self.id) {
            return Err(PaymentError::InvalidArgument(format!(
                "transaction {} is not a {kind:?} of {}",
                child.id, self.id
            )));
        }
        if self.child_transactions.contains(&child.id) {
            return Err(PaymentError::InvalidArgument(format!(
                "transaction {} is already linked",
                child.id
            )));
        }
        Ok(())
    }

    /// Marks one event of the log as delivered; returns false if it already was.
    pub fn mark_event_processed(&mut self, event_id: Uuid) -> Result<bool> {
        self.event_mut(event_id).map(TransactionEvent::mark_processed)
    }

    pub fn mark_event_failed(&mut self, event_id: Uuid, error: &str) -> Result<()> {
        self.event_mut(event_id)?.mark_failed(error);
        Ok(())
    }

    fn event_mut(&mut self, event_id: Uuid) -> Result<&mut TransactionEvent> {
        self.events
            .iter_mut()
            .find(|e| e.id() == event_id)
            .ok_or_else(|| PaymentError::InvalidArgument(format!("unknown event {event_id}")))
    }

    /// Records the version a repository adapter has just stored.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    pub fn can_capture(&self) -> bool {
        matches!(
            self.state(),
            TransactionState::Authorized | TransactionState::AwaitingCapture
        )
    }

    pub fn can_cancel(&self) -> bool {
        self.state().can_transition_to(TransactionState::Cancelled)
    }

    pub fn can_retry(&self) -> bool {
        self.state() == TransactionState::Failed && self.retry_count < MAX_RETRIES
    }

    pub fn can_refund(&self) -> bool {
        self.state().is_settled() && self.refundable_amount().is_positive()
    }

    /// Net amount minus refunds still in flight.
    pub fn refundable_amount(&self) -> Money {
        self.refunds_in_flight
            .values()
            .try_fold(self.net_amount, |left, claimed| left.subtract(claimed))
            .unwrap_or_else(|_| Money::zero(self.amount.currency()))
    }

    pub fn refunds_in_flight(&self) -> &BTreeMap<Uuid, Money> {
        &self.refunds_in_flight
    }

    /// Days this record must be kept, driven by its risk tier.
    pub fn retention_days(&self) -> u32 {
        self.fraud_score
            .as_ref()
            .map(FraudScore::retention_days)
            .unwrap_or_else(|| RiskTier::VeryLow.retention_days())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn payment_method(&self) -> &PaymentMethod {
        &self.payment_method
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn capture_requested(&self) -> bool {
        self.capture_requested
    }

    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    pub fn state(&self) -> TransactionState {
        self.status.state()
    }

    pub fn fraud_score(&self) -> Option<&FraudScore> {
        self.fraud_score.as_ref()
    }

    pub fn events(&self) -> &[TransactionEvent] {
        &self.events
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn parent_transaction_id(&self) -> Option<Uuid> {
        self.parent_transaction_id
    }

    pub fn child_transactions(&self) -> &BTreeSet<Uuid> {
        &self.child_transactions
    }

    pub fn total_refunded(&self) -> Money {
        self.total_refunded
    }

    pub fn net_amount(&self) -> Money {
        self.net_amount
    }

    pub fn provider_transaction_id(&self) -> Option<&str> {
        self.provider_transaction_id.as_deref()
    }

    pub fn provider_data(&self) -> &BTreeMap<String, String> {
        &self.provider_data
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    pub fn settled_at(&self) -> Option<DateTime<Utc>> {
        self.settled_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}
