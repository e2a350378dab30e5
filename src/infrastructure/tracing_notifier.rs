use crate::domain::fraud_score::FraudScore;
use crate::domain::ports::Notifier;
use crate::domain::transaction::Transaction;
use crate::error::Result;
use async_trait::async_trait;
use tracing::{info, warn};

/// Delivers notifications as structured log records on the `notifications` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send_confirmation(&self, tx: &Transaction) -> Result<()> {
        info!(
            target: "notifications",
            transaction_id = %tx.id(),
            customer_id = tx.customer_id(),
            state = %tx.state(),
            "payment confirmation"
        );
        Ok(())
    }

    async fn send_success(&self, tx: &Transaction) -> Result<()> {
        info!(
            target: "notifications",
            transaction_id = %tx.id(),
            customer_id = tx.customer_id(),
            amount = %tx.amount(),
            "payment succeeded"
        );
        Ok(())
    }

    async fn send_failure(&self, tx: &Transaction, reason: &str) -> Result<()> {
        warn!(
            target: "notifications",
            transaction_id = %tx.id(),
            customer_id = tx.customer_id(),
            reason,
            "payment failed"
        );
        Ok(())
    }

    async fn send_fraud_alert(&self, tx: &Transaction, score: &FraudScore) -> Result<()> {
        warn!(
            target: "notifications",
            transaction_id = %tx.id(),
            customer_id = tx.customer_id(),
            score = score.value(),
            tier = %score.risk_tier(),
            "fraud alert"
        );
        Ok(())
    }
}
