use crate::config::OrchestratorConfig;
use crate::domain::fraud_score::FraudScore;
use crate::domain::money::Money;
use crate::domain::payment_method::PaymentMethod;
use crate::domain::ports::{
    FraudAnalyzerRef, GatewayResponse, NotifierRef, PaymentGatewayRef, TransactionRepositoryRef,
};
use crate::domain::risk_factors::RiskFactors;
use crate::domain::status::{TransactionState, TransactionStatus};
use crate::domain::transaction::Transaction;
use crate::error::{PaymentError, Result};
use chrono::{TimeDelta, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Provider codes meaning the instrument itself was refused.
const DECLINE_CODES: [&str; 9] = [
    "card_declined",
    "insufficient_funds",
    "do_not_honor",
    "expired_card",
    "incorrect_cvc",
    "invalid_card",
    "lost_card",
    "stolen_card",
    "fraudulent",
];

const INTERNAL_FAILURE_MESSAGE: &str = "internal processing error";

const PARENT_UPDATE_ATTEMPTS: u32 = 5;

/// States only reachable through a provider answer or a dedicated operation,
/// never through [`PaymentOrchestrator::transition`].
const OPERATION_OWNED_STATES: [TransactionState; 6] = [
    TransactionState::Authorized,
    TransactionState::Captured,
    TransactionState::Completed,
    TransactionState::Refunded,
    TransactionState::PartiallyRefunded,
    TransactionState::Chargeback,
];

/// A payment intent as submitted by a caller.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub customer_id: String,
    pub amount: Money,
    pub payment_method: PaymentMethod,
    pub country: Option<String>,
    pub description: Option<String>,
    /// Overrides [`OrchestratorConfig::capture_immediately`] when set.
    pub capture: Option<bool>,
}

impl PaymentRequest {
    pub fn new(customer_id: impl Into<String>, amount: Money, payment_method: PaymentMethod) -> Self {
        Self {
            customer_id: customer_id.into(),
            amount,
            payment_method,
            country: None,
            description: None,
            capture: None,
        }
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture = Some(capture);
        self
    }
}

enum Notification {
    Confirmation,
    Success,
    Failure(String),
    FraudAlert(FraudScore),
}

/// Drives a payment from intent to settlement through the injected ports.
///
/// Every operation loads or creates one aggregate, mutates it through its
/// validated methods and persists it with an optimistic version check.
/// Errors outside the payment domain are logged and replaced by a generic
/// [`PaymentError::PaymentProcessingFailed`].
pub struct PaymentOrchestrator {
    repository: TransactionRepositoryRef,
    gateway: PaymentGatewayRef,
    analyzer: FraudAnalyzerRef,
    notifier: NotifierRef,
    config: OrchestratorConfig,
}

impl PaymentOrchestrator {
    pub fn new(
        repository: TransactionRepositoryRef,
        gateway: PaymentGatewayRef,
        analyzer: FraudAnalyzerRef,
        notifier: NotifierRef,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            repository,
            gateway,
            analyzer,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Validates, scores, authorizes and (optionally) captures a new payment.
    pub async fn process_payment(&self, request: PaymentRequest) -> Result<Transaction> {
        self.surface(self.run_payment(request).await)
    }

    /// Captures an authorized payment whose first capture did not go through.
    pub async fn capture_payment(&self, id: Uuid) -> Result<Transaction> {
        self.surface(self.run_capture(id).await)
    }

    /// Sends a failed payment back through authorization.
    pub async fn retry_payment(&self, id: Uuid) -> Result<Transaction> {
        self.surface(self.run_retry(id).await)
    }

    /// Releases a payment held for review into authorization (and capture,
    /// if it was requested).
    pub async fn approve_review(&self, id: Uuid) -> Result<Transaction> {
        self.surface(self.run_approve_review(id).await)
    }

    /// Cancels a payment held for review.
    pub async fn reject_review(&self, id: Uuid, reason: &str) -> Result<Transaction> {
        self.surface(self.run_reject_review(id, reason).await)
    }

    pub async fn cancel_payment(&self, id: Uuid, reason: &str) -> Result<Transaction> {
        self.surface(self.run_cancel(id, reason).await)
    }

    /// Refunds part or all of a settled payment. Returns the refund transaction;
    /// the parent is updated and stored alongside it.
    pub async fn refund_payment(&self, id: Uuid, amount: Money, reason: &str) -> Result<Transaction> {
        self.surface(self.run_refund(id, amount, reason).await)
    }

    /// Records a bank-initiated chargeback against a settled payment.
    pub async fn record_chargeback(&self, id: Uuid, reason: &str) -> Result<Transaction> {
        self.surface(self.run_chargeback(id, reason).await)
    }

    /// Applies an audited transition to a stored transaction. Settlement and
    /// refund states are refused here; they belong to the operations that
    /// talk to the provider.
    pub async fn transition(&self, id: Uuid, status: TransactionStatus) -> Result<Transaction> {
        self.surface(self.run_transition(id, status).await)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Transaction>> {
        self.surface(self.repository.find_by_id(id).await)
    }

    async fn run_payment(&self, request: PaymentRequest) -> Result<Transaction> {
        self.validate(&request)?;

        let capture = request.capture.unwrap_or(self.config.capture_immediately);
        let mut tx = Transaction::new(request.customer_id, request.amount, request.payment_method)
            .map_err(|e| PaymentError::InvalidPaymentData(e.to_string()))?
            .with_country(request.country)
            .with_description(request.description)
            .with_capture_requested(capture);
        info!(
            transaction_id = %tx.id(),
            customer_id = tx.customer_id(),
            amount = %tx.amount(),
            "payment received"
        );

        let score = self.score(&mut tx).await?;

        if score.should_block() {
            if !tx.state().is_terminal() {
                tx.transition(
                    TransactionStatus::new(TransactionState::FraudDetected)
                        .with_reason(format!("fraud score {}", score.value())),
                    "risk_engine",
                )?;
            }
            self.repository.save(&mut tx).await?;
            warn!(
                transaction_id = %tx.id(),
                score = score.value(),
                state = %tx.state(),
                "payment blocked by fraud screening"
            );
            self.notify(&tx, Notification::FraudAlert(score.clone()));
            return Err(PaymentError::FraudBlocked {
                score: Box::new(score),
                transaction_id: Some(tx.id()),
            });
        }

        if score.requires_review() {
            tx.transition(TransactionStatus::new(TransactionState::Processing), "orchestrator")?;
            tx.transition(
                TransactionStatus::new(TransactionState::AwaitingConfirmation)
                    .with_reason(format!("manual review, fraud score {}", score.value())),
                "risk_engine",
            )?;
            self.repository.save(&mut tx).await?;
            info!(
                transaction_id = %tx.id(),
                score = score.value(),
                "payment held for review"
            );
            self.notify(&tx, Notification::FraudAlert(score));
            return Ok(tx);
        }

        tx.transition(TransactionStatus::new(TransactionState::Processing), "orchestrator")?;
        self.settle(tx).await
    }

    async fn run_capture(&self, id: Uuid) -> Result<Transaction> {
        let mut tx = self.load(id).await?;
        if !tx.can_capture() {
            return Err(PaymentError::IllegalTransition {
                from: tx.state(),
                to: TransactionState::Captured,
            });
        }
        let response = self.capture(&mut tx).await?;
        self.repository.save(&mut tx).await?;
        if !response.success {
            return Err(rejection(tx.id(), &response));
        }
        self.notify(&tx, Notification::Success);
        Ok(tx)
    }

    async fn run_retry(&self, id: Uuid) -> Result<Transaction> {
        let mut tx = self.load(id).await?;
        tx.transition(
            TransactionStatus::new(TransactionState::Processing)
                .with_reason(format!("retry {}", tx.retry_count() + 1)),
            "orchestrator",
        )?;
        info!(transaction_id = %tx.id(), retry = tx.retry_count(), "retrying payment");
        self.settle(tx).await
    }

    async fn run_approve_review(&self, id: Uuid) -> Result<Transaction> {
        let tx = self.load(id).await?;
        if tx.state() != TransactionState::AwaitingConfirmation {
            return Err(PaymentError::IllegalTransition {
                from: tx.state(),
                to: TransactionState::Authorized,
            });
        }
        info!(transaction_id = %tx.id(), "review approved");
        self.settle(tx).await
    }

    async fn run_reject_review(&self, id: Uuid, reason: &str) -> Result<Transaction> {
        let mut tx = self.load(id).await?;
        if tx.state() != TransactionState::AwaitingConfirmation {
            return Err(PaymentError::IllegalTransition {
                from: tx.state(),
                to: TransactionState::Cancelled,
            });
        }
        tx.transition(
            TransactionStatus::new(TransactionState::Cancelled)
                .with_reason(format!("review rejected: {reason}")),
            "risk_review",
        )?;
        self.repository.save(&mut tx).await?;
        info!(transaction_id = %tx.id(), reason, "review rejected");
        self.notify(&tx, Notification::Failure(format!("review rejected: {reason}")));
        Ok(tx)
    }

    async fn run_cancel(&self, id: Uuid, reason: &str) -> Result<Transaction> {
        let mut tx = self.load(id).await?;
        tx.transition(
            TransactionStatus::new(TransactionState::Cancelled).with_reason(reason),
            "orchestrator",
        )?;
        self.repository.save(&mut tx).await?;
        info!(transaction_id = %tx.id(), reason, "payment cancelled");
        self.notify(&tx, Notification::Failure(format!("cancelled: {reason}")));
        Ok(tx)
    }

    async fn run_refund(&self, id: Uuid, amount: Money, reason: &str) -> Result<Transaction> {
        let mut parent = self.load(id).await?;
        let mut refund = Transaction::refund_of(&parent, amount)?.with_description(Some(reason.to_string()));

        // Claim the balance first; a concurrent refund loses here, before any money moves.
        parent.reserve_refund(&refund)?;
        self.repository.save(&mut parent).await?;

        refund.transition(TransactionStatus::new(TransactionState::Processing), "orchestrator")?;
        self.repository.save(&mut refund).await?;

        let response = self
            .call_gateway("refund", self.gateway.refund(&parent, amount))
            .await;
        if !response.success {
            let err = rejection(refund.id(), &response);
            let why = err.to_string();
            refund.transition(
                TransactionStatus::new(TransactionState::Failed).with_reason(why.clone()),
                "gateway",
            )?;
            self.repository.save(&mut refund).await?;
            let refund_id = refund.id();
            self.update_parent(parent, |p| p.release_refund(refund_id, &why))
                .await?;
            warn!(transaction_id = %id, refund_id = %refund_id, "refund rejected");
            return Err(err);
        }

        let mut completed = TransactionStatus::new(TransactionState::Completed).with_reason(reason);
        if let Some(reference) = &response.provider_transaction_id {
            completed = completed.with_metadata("provider_transaction_id", reference.clone());
        }
        refund.transition(completed, "gateway")?;
        self.repository.save(&mut refund).await?;

        let parent = self
            .update_parent(parent, |p| p.record_refund(&refund))
            .await?;
        info!(
            transaction_id = %parent.id(),
            refund_id = %refund.id(),
            amount = %amount,
            state = %parent.state(),
            "payment refunded"
        );
        self.notify(&refund, Notification::Success);
        Ok(refund)
    }

    /// Applies `change` to `parent` and stores it. A version conflict means
    /// another operation touched the parent meanwhile; reload and reapply.
    async fn update_parent<F>(&self, parent: Transaction, change: F) -> Result<Transaction>
    where
        F: Fn(&mut Transaction) -> Result<()>,
    {
        let mut current = parent;
        let mut attempt = 1;
        loop {
            let mut next = current.clone();
            change(&mut next)?;
            match self.repository.save(&mut next).await {
                Ok(()) => return Ok(next),
                Err(PaymentError::ConcurrencyConflict { .. }) if attempt < PARENT_UPDATE_ATTEMPTS => {
                    debug!(transaction_id = %current.id(), attempt, "parent changed, reloading");
                    attempt += 1;
                    current = self.load(current.id()).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn run_chargeback(&self, id: Uuid, reason: &str) -> Result<Transaction> {
        let mut parent = self.load(id).await?;
        let mut chargeback = Transaction::chargeback_of(&parent)?.with_description(Some(reason.to_string()));
        chargeback.transition(TransactionStatus::new(TransactionState::Processing), "bank")?;
        chargeback.transition(
            TransactionStatus::new(TransactionState::Completed).with_reason(reason),
            "bank",
        )?;
        self.repository.save(&mut chargeback).await?;

        parent.record_chargeback(&chargeback, reason)?;
        self.repository.save(&mut parent).await?;
        warn!(
            transaction_id = %parent.id(),
            chargeback_id = %chargeback.id(),
            reason,
            "chargeback recorded"
        );
        self.notify(&parent, Notification::Failure(format!("chargeback: {reason}")));
        Ok(parent)
    }

    async fn run_transition(&self, id: Uuid, status: TransactionStatus) -> Result<Transaction> {
        let mut tx = self.load(id).await?;
        if OPERATION_OWNED_STATES.contains(&status.state()) {
            return Err(PaymentError::IllegalTransition {
                from: tx.state(),
                to: status.state(),
            });
        }
        tx.transition(status, "operator")?;
        self.repository.save(&mut tx).await?;
        info!(transaction_id = %tx.id(), state = %tx.state(), "manual transition");
        Ok(tx)
    }

    fn validate(&self, request: &PaymentRequest) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(PaymentError::InvalidPaymentData(msg)) };

        if request.customer_id.trim().is_empty() {
            return invalid("customer id is required".to_string());
        }
        if !request.amount.is_positive() {
            return invalid(format!("amount must be positive, got {}", request.amount));
        }
        if request.amount.to_major_units() > self.config.max_amount {
            return invalid(format!(
                "amount {} exceeds the maximum of {} {}",
                request.amount,
                self.config.max_amount,
                request.amount.currency()
            ));
        }
        let method = &request.payment_method;
        if !method.supports_currency(request.amount.currency()) {
            return invalid(format!(
                "{} does not support {}",
                method.method_type().as_str(),
                request.amount.currency()
            ));
        }
        if let Some(country) = &request.country
            && !method.supports_country(country)
        {
            return invalid(format!(
                "{} is not available in {country}",
                method.method_type().as_str()
            ));
        }
        Ok(())
    }

    async fn score(&self, tx: &mut Transaction) -> Result<FraudScore> {
        let window = TimeDelta::from_std(self.config.velocity_window)
            .map_err(|e| PaymentError::InternalError(Box::new(e)))?;
        let since = Utc::now() - window;
        let recent = self
            .repository
            .count_recent_by_customer(tx.customer_id(), since)
            .await?;
        let history = self.repository.customer_history(tx.customer_id()).await?;

        let factors = RiskFactors::assess(tx, recent, &history, Utc::now());
        let score = self.analyzer.analyze(tx, &factors).await?;
        debug!(
            transaction_id = %tx.id(),
            score = score.value(),
            tier = %score.risk_tier(),
            recent,
            "fraud score computed"
        );
        tx.update_fraud_score(score.clone())?;
        Ok(score)
    }

    /// Authorization onward for a transaction in `processing` or released
    /// from review.
    async fn settle(&self, mut tx: Transaction) -> Result<Transaction> {
        let response = self
            .call_gateway("authorize", self.gateway.authorize(&tx))
            .await;

        if !response.success {
            let err = rejection(tx.id(), &response);
            let declined = response
                .error_code
                .as_deref()
                .is_some_and(|code| DECLINE_CODES.contains(&code));
            // Review holds have no `declined` edge; a refusal there is a failure.
            let state = if declined && tx.state().can_transition_to(TransactionState::Declined) {
                TransactionState::Declined
            } else {
                TransactionState::Failed
            };
            let mut status = TransactionStatus::new(state).with_reason(err.to_string());
            if let Some(code) = &response.error_code {
                status = status.with_provider_code(code.clone());
            }
            tx.transition(status, "gateway")?;
            self.repository.save(&mut tx).await?;
            warn!(
                transaction_id = %tx.id(),
                state = %tx.state(),
                code = response.error_code.as_deref().unwrap_or("none"),
                "authorization failed"
            );
            self.notify(&tx, Notification::Failure(err.to_string()));
            return Err(err);
        }

        tx.mark_authorized(response.provider_transaction_id, response.provider_data)?;
        info!(transaction_id = %tx.id(), "payment authorized");

        if tx.capture_requested() && tx.can_capture() {
            self.capture(&mut tx).await?;
        }

        self.repository.save(&mut tx).await?;
        let notification = if tx.state() == TransactionState::Completed {
            Notification::Success
        } else {
            Notification::Confirmation
        };
        self.notify(&tx, notification);
        Ok(tx)
    }

    /// Captures and completes; a rejected capture leaves the transaction as it was.
    async fn capture(&self, tx: &mut Transaction) -> Result<GatewayResponse> {
        let response = self.call_gateway("capture", self.gateway.capture(tx)).await;
        if !response.success {
            warn!(
                transaction_id = %tx.id(),
                code = response.error_code.as_deref().unwrap_or("none"),
                "capture failed, payment stays authorized"
            );
            return Ok(response);
        }

        let mut captured = TransactionStatus::new(TransactionState::Captured);
        if let Some(reference) = &response.provider_transaction_id {
            captured = captured.with_metadata("capture_reference", reference.clone());
        }
        tx.transition(captured, "gateway")?;
        tx.transition(TransactionStatus::new(TransactionState::Completed), "orchestrator")?;
        info!(transaction_id = %tx.id(), "payment captured");
        Ok(response)
    }

    /// Bounds a gateway call by the configured timeout. Timeouts and adapter
    /// errors come back as rejected responses.
    async fn call_gateway<F>(&self, operation: &str, call: F) -> GatewayResponse
    where
        F: Future<Output = Result<GatewayResponse>>,
    {
        match timeout(self.config.gateway_timeout, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!(operation, error = %e, "gateway call failed");
                GatewayResponse::rejected("gateway_error", "payment provider unavailable")
            }
            Err(_) => {
                warn!(operation, timeout = ?self.config.gateway_timeout, "gateway call timed out");
                GatewayResponse::rejected("timeout", "payment provider did not answer in time")
            }
        }
    }

    async fn load(&self, id: Uuid) -> Result<Transaction> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or(PaymentError::NotFound(id))
    }

    fn notify(&self, tx: &Transaction, notification: Notification) {
        let notifier = Arc::clone(&self.notifier);
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = match &notification {
                Notification::Confirmation => notifier.send_confirmation(&tx).await,
                Notification::Success => notifier.send_success(&tx).await,
                Notification::Failure(reason) => notifier.send_failure(&tx, reason).await,
                Notification::FraudAlert(score) => notifier.send_fraud_alert(&tx, score).await,
            };
            if let Err(e) = result {
                warn!(transaction_id = %tx.id(), error = %e, "notification failed");
            }
        });
    }

    fn surface<T>(&self, result: Result<T>) -> Result<T> {
        result.map_err(|e| {
            if e.is_domain_error() {
                e
            } else {
                error!(error = %e, "payment operation failed");
                PaymentError::PaymentProcessingFailed {
                    code: None,
                    message: INTERNAL_FAILURE_MESSAGE.to_string(),
                    transaction_id: None,
                }
            }
        })
    }
}

fn rejection(transaction_id: Uuid, response: &GatewayResponse) -> PaymentError {
    PaymentError::PaymentProcessingFailed {
        transaction_id: Some(transaction_id),
        code: response.error_code.clone(),
        message: response
            .error_message
            .clone()
            .unwrap_or_else(|| "payment provider rejected the request".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Currency;
    use crate::domain::ports::{FraudAnalyzer, TransactionRepository};
    use crate::infrastructure::in_memory::InMemoryTransactionRepository;
    use crate::infrastructure::simulated_gateway::SimulatedGateway;
    use crate::infrastructure::tracing_notifier::TracingNotifier;
    use async_trait::async_trait;
    use chrono::DateTime;

    struct FixedAnalyzer(i64);

    #[async_trait]
    impl FraudAnalyzer for FixedAnalyzer {
        async fn analyze(&self, _tx: &Transaction, _factors: &RiskFactors) -> Result<FraudScore> {
            Ok(FraudScore::new(self.0))
        }
    }

    struct BrokenRepository;

    #[async_trait]
    impl TransactionRepository for BrokenRepository {
        async fn save(&self, _tx: &mut Transaction) -> Result<()> {
            Err(PaymentError::IoError(std::io::Error::other("disk full at /var/lib/payflow")))
        }
        async fn find_by_id(&self, _id: Uuid) -> Result<Option<Transaction>> {
            Ok(None)
        }
        async fn count_recent_by_customer(&self, _c: &str, _s: DateTime<Utc>) -> Result<usize> {
            Ok(0)
        }
        async fn customer_history(&self, _c: &str) -> Result<Vec<TransactionState>> {
            Ok(Vec::new())
        }
    }

    fn orchestrator(repository: TransactionRepositoryRef, score: i64) -> PaymentOrchestrator {
        PaymentOrchestrator::new(
            repository,
            Arc::new(SimulatedGateway::new()),
            Arc::new(FixedAnalyzer(score)),
            Arc::new(TracingNotifier),
            OrchestratorConfig::default(),
        )
    }

    fn request(amount: &str) -> PaymentRequest {
        let card = PaymentMethod::credit_card("stripe", "4242", 12, 2030).unwrap();
        let amount = Money::from_major_units(amount, Currency::EUR).unwrap();
        PaymentRequest::new("cust-1", amount, card)
    }

    #[tokio::test]
    async fn test_validation_rejects_without_creating() {
        let repository = Arc::new(InMemoryTransactionRepository::new());
        let orchestrator = orchestrator(repository.clone(), 10);

        for bad in [
            request("10000.01"),
            request("0"),
            PaymentRequest {
                customer_id: "  ".to_string(),
                ..request("5.00")
            },
        ] {
            let err = orchestrator.process_payment(bad).await.unwrap_err();
            assert!(matches!(err, PaymentError::InvalidPaymentData(_)), "{err}");
        }
        assert!(repository.is_empty().await);
    }

    #[tokio::test]
    async fn test_ceiling_is_inclusive() {
        let orchestrator = orchestrator(Arc::new(InMemoryTransactionRepository::new()), 10);
        let tx = orchestrator.process_payment(request("10000.00")).await.unwrap();
        assert_eq!(tx.state(), TransactionState::Completed);
    }

    #[tokio::test]
    async fn test_unsupported_currency_and_country() {
        let orchestrator = orchestrator(Arc::new(InMemoryTransactionRepository::new()), 10);
        let bank = PaymentMethod::bank_transfer("sepa", "DE89370400440532013000", None).unwrap();

        let jpy = Money::from_major_units("500", Currency::JPY).unwrap();
        let err = orchestrator
            .process_payment(PaymentRequest::new("c", jpy, bank.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidPaymentData(_)));

        let eur = Money::from_major_units("50", Currency::EUR).unwrap();
        let err = orchestrator
            .process_payment(PaymentRequest::new("c", eur, bank).with_country("JP"))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidPaymentData(_)));
    }

    #[tokio::test]
    async fn test_review_band_waits_for_confirmation() {
        let repository = Arc::new(InMemoryTransactionRepository::new());
        let orchestrator = orchestrator(repository.clone(), 450);
        let tx = orchestrator.process_payment(request("50.00")).await.unwrap();
        assert_eq!(tx.state(), TransactionState::AwaitingConfirmation);
        assert!(tx.provider_transaction_id().is_none());

        let stored = repository.find_by_id(tx.id()).await.unwrap().unwrap();
        assert_eq!(stored.version(), 1);
        assert_eq!(stored.state(), TransactionState::AwaitingConfirmation);
    }

    #[tokio::test]
    async fn test_infrastructure_errors_are_masked() {
        let orchestrator = orchestrator(Arc::new(BrokenRepository), 10);
        let err = orchestrator.process_payment(request("50.00")).await.unwrap_err();
        match err {
            PaymentError::PaymentProcessingFailed { code, message, .. } => {
                assert!(code.is_none());
                assert_eq!(message, INTERNAL_FAILURE_MESSAGE);
                assert!(!message.contains("/var/lib"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_transaction() {
        let orchestrator = orchestrator(Arc::new(InMemoryTransactionRepository::new()), 10);
        let id = Uuid::new_v4();
        assert!(matches!(
            orchestrator.capture_payment(id).await,
            Err(PaymentError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn test_authorize_only_then_capture() {
        let orchestrator = orchestrator(Arc::new(InMemoryTransactionRepository::new()), 10);
        let tx = orchestrator
            .process_payment(request("75.00").with_capture(false))
            .await
            .unwrap();
        assert_eq!(tx.state(), TransactionState::Authorized);

        let captured = orchestrator.capture_payment(tx.id()).await.unwrap();
        assert_eq!(captured.state(), TransactionState::Completed);
        assert!(captured.settled_at().is_some());
        assert!(orchestrator.capture_payment(tx.id()).await.is_err());
    }

    #[tokio::test]
    async fn test_manual_transition() {
        let orchestrator = orchestrator(Arc::new(InMemoryTransactionRepository::new()), 10);
        let tx = orchestrator.process_payment(request("20.00")).await.unwrap();
        let disputed = orchestrator
            .transition(
                tx.id(),
                TransactionStatus::new(TransactionState::Disputed).with_reason("customer claim"),
            )
            .await
            .unwrap();
        assert_eq!(disputed.state(), TransactionState::Disputed);
        assert!(matches!(
            orchestrator
                .transition(tx.id(), TransactionStatus::new(TransactionState::Completed))
                .await,
            Err(PaymentError::IllegalTransition { .. })
        ));
    }
}
