use crate::domain::ports::TransactionRepository;
use crate::domain::status::TransactionState;
use crate::domain::transaction::{Transaction, TransactionKind};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A thread-safe in-memory transaction repository.
///
/// Uses `Arc<RwLock<HashMap<Uuid, Transaction>>>` for shared concurrent access.
/// The version check and the insert happen under the same write guard, so two
/// stale copies of one transaction can never both be saved.
#[derive(Default, Clone)]
pub struct InMemoryTransactionRepository {
    transactions: Arc<RwLock<HashMap<Uuid, Transaction>>>,
}

impl InMemoryTransactionRepository {
    /// Creates a new, empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.transactions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.transactions.read().await.is_empty()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn save(&self, tx: &mut Transaction) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        let stored = transactions.get(&tx.id()).map_or(0, Transaction::version);
        if stored != tx.version() {
            return Err(PaymentError::ConcurrencyConflict {
                id: tx.id(),
                expected: tx.version(),
                actual: stored,
            });
        }
        tx.set_version(stored + 1);
        transactions.insert(tx.id(), tx.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(&id).cloned())
    }

    async fn count_recent_by_customer(
        &self,
        customer_id: &str,
        since: DateTime<Utc>,
    ) -> Result<usize> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .filter(|tx| {
                tx.kind() == TransactionKind::Payment
                    && tx.customer_id() == customer_id
                    && tx.created_at() >= since
            })
            .count())
    }

    async fn customer_history(&self, customer_id: &str) -> Result<Vec<TransactionState>> {
        let transactions = self.transactions.read().await;
        let mut history: Vec<&Transaction> = transactions
            .values()
            .filter(|tx| tx.kind() == TransactionKind::Payment && tx.customer_id() == customer_id)
            .collect();
        history.sort_by_key(|tx| tx.created_at());
        Ok(history.into_iter().map(Transaction::state).collect())
    }
}
