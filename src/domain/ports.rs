use super::fraud_score::FraudScore;
use super::money::Money;
use super::risk_factors::RiskFactors;
use super::status::TransactionState;
use super::transaction::Transaction;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Stores the aggregate if the stored version still equals `tx.version()`,
    /// then bumps the version on both sides.
    async fn save(&self, tx: &mut Transaction) -> Result<()>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>>;
    async fn count_recent_by_customer(
        &self,
        customer_id: &str,
        since: DateTime<Utc>,
    ) -> Result<usize>;
    /// Current states of every stored transaction of the customer.
    async fn customer_history(&self, customer_id: &str) -> Result<Vec<TransactionState>>;
}

/// What a provider answered to one gateway call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayResponse {
    pub success: bool,
    pub provider_transaction_id: Option<String>,
    pub provider_data: BTreeMap<String, String>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
}

impl GatewayResponse {
    pub fn approved(provider_transaction_id: impl Into<String>) -> Self {
        Self {
            success: true,
            provider_transaction_id: Some(provider_transaction_id.into()),
            ..Self::default()
        }
    }

    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_code: Some(code.into()),
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn authorize(&self, tx: &Transaction) -> Result<GatewayResponse>;
    async fn capture(&self, tx: &Transaction) -> Result<GatewayResponse>;
    /// Returns `amount` of the settled `original` to the customer.
    async fn refund(&self, original: &Transaction, amount: Money) -> Result<GatewayResponse>;
}

#[async_trait]
pub trait FraudAnalyzer: Send + Sync {
    async fn analyze(&self, tx: &Transaction, factors: &RiskFactors) -> Result<FraudScore>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_confirmation(&self, tx: &Transaction) -> Result<()>;
    async fn send_success(&self, tx: &Transaction) -> Result<()>;
    async fn send_failure(&self, tx: &Transaction, reason: &str) -> Result<()>;
    async fn send_fraud_alert(&self, tx: &Transaction, score: &FraudScore) -> Result<()>;
}

pub type TransactionRepositoryRef = Arc<dyn TransactionRepository>;
pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type FraudAnalyzerRef = Arc<dyn FraudAnalyzer>;
pub type NotifierRef = Arc<dyn Notifier>;
