#![allow(dead_code)]

use async_trait::async_trait;
use payflow::application::orchestrator::{PaymentOrchestrator, PaymentRequest};
use payflow::config::OrchestratorConfig;
use payflow::domain::fraud_score::{FraudScore, AMOUNT_SCORE, VELOCITY_SCORE};
use payflow::domain::money::{Currency, Money};
use payflow::domain::payment_method::PaymentMethod;
use payflow::domain::ports::{FraudAnalyzer, Notifier};
use payflow::domain::risk_factors::RiskFactors;
use payflow::domain::transaction::Transaction;
use payflow::error::Result;
use payflow::infrastructure::in_memory::InMemoryTransactionRepository;
use payflow::infrastructure::simulated_gateway::SimulatedGateway;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Always answers with the same raw score.
pub struct FixedAnalyzer(pub i64);

#[async_trait]
impl FraudAnalyzer for FixedAnalyzer {
    async fn analyze(&self, _tx: &Transaction, _factors: &RiskFactors) -> Result<FraudScore> {
        Ok(FraudScore::new(self.0))
    }
}

/// Scores a fixed factor set at default weights, ignoring the transaction.
///
/// Only the factors given take part in the weighted average, unlike
/// `WeightedFraudAnalyzer`, which always weighs all six assessed factors.
pub struct FactorAnalyzer(pub BTreeMap<String, f64>);

impl FactorAnalyzer {
    /// Maximal velocity and amount risk.
    pub fn velocity_and_amount() -> Self {
        Self(BTreeMap::from([
            (VELOCITY_SCORE.to_string(), 1.0),
            (AMOUNT_SCORE.to_string(), 1.0),
        ]))
    }
}

#[async_trait]
impl FraudAnalyzer for FactorAnalyzer {
    async fn analyze(&self, _tx: &Transaction, _factors: &RiskFactors) -> Result<FraudScore> {
        Ok(FraudScore::calculate(&self.0, None))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(&'static str, Uuid)>>,
}

impl RecordingNotifier {
    fn record(&self, kind: &'static str, tx: &Transaction) {
        self.sent.lock().unwrap().push((kind, tx.id()));
    }

    pub fn sent(&self) -> Vec<(&'static str, Uuid)> {
        self.sent.lock().unwrap().clone()
    }

    /// Notifications are dispatched on spawned tasks; give them a moment.
    pub async fn wait_for(&self, kind: &str, id: Uuid) -> bool {
        for _ in 0..100 {
            if self.sent().iter().any(|(k, i)| *k == kind && *i == id) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    /// Id of the first transaction that received a `kind` notification.
    pub async fn first_of(&self, kind: &str) -> Option<Uuid> {
        for _ in 0..100 {
            if let Some((_, id)) = self.sent().into_iter().find(|(k, _)| *k == kind) {
                return Some(id);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_confirmation(&self, tx: &Transaction) -> Result<()> {
        self.record("confirmation", tx);
        Ok(())
    }

    async fn send_success(&self, tx: &Transaction) -> Result<()> {
        self.record("success", tx);
        Ok(())
    }

    async fn send_failure(&self, tx: &Transaction, _reason: &str) -> Result<()> {
        self.record("failure", tx);
        Ok(())
    }

    async fn send_fraud_alert(&self, tx: &Transaction, _score: &FraudScore) -> Result<()> {
        self.record("fraud_alert", tx);
        Ok(())
    }
}

pub struct Harness {
    pub orchestrator: PaymentOrchestrator,
    pub repository: Arc<InMemoryTransactionRepository>,
    pub gateway: Arc<SimulatedGateway>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness<A: FraudAnalyzer + 'static>(analyzer: A) -> Harness {
    harness_with(SimulatedGateway::new(), analyzer, OrchestratorConfig::default())
}

pub fn harness_with<A: FraudAnalyzer + 'static>(
    gateway: SimulatedGateway,
    analyzer: A,
    config: OrchestratorConfig,
) -> Harness {
    let repository = Arc::new(InMemoryTransactionRepository::new());
    let gateway = Arc::new(gateway);
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = PaymentOrchestrator::new(
        repository.clone(),
        gateway.clone(),
        Arc::new(analyzer),
        notifier.clone(),
        config,
    );
    Harness {
        orchestrator,
        repository,
        gateway,
        notifier,
    }
}

pub fn eur(amount: &str) -> Money {
    Money::from_major_units(amount, Currency::EUR).unwrap()
}

pub fn card(last_four: &str) -> PaymentMethod {
    PaymentMethod::credit_card("stripe", last_four, 12, 2030).unwrap()
}

pub fn card_request(customer: &str, amount: &str, last_four: &str) -> PaymentRequest {
    PaymentRequest::new(customer, eur(amount), card(last_four)).with_country("DE")
}
