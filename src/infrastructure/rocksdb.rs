use crate::domain::ports::TransactionRepository;
use crate::domain::status::TransactionState;
use crate::domain::transaction::{Transaction, TransactionKind};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family holding transactions as JSON, keyed by id.
pub const CF_TRANSACTIONS: &str = "transactions";

/// A persistent transaction repository backed by RocksDB.
///
/// Writes go through a single async mutex so that the version read and the
/// put of one save cannot interleave with another save.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbTransactionRepository {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbTransactionRepository {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_transactions = ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_transactions])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn column(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(CF_TRANSACTIONS).ok_or_else(|| {
            PaymentError::InternalError(Box::new(std::io::Error::other(
                "Transactions column family not found",
            )))
        })
    }

    fn read(&self, id: Uuid) -> Result<Option<Transaction>> {
        let cf = self.column()?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<F>(&self, mut keep: F) -> Result<Vec<Transaction>>
    where
        F: FnMut(&Transaction) -> bool,
    {
        let cf = self.column()?;
        let mut found = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let tx: Transaction = serde_json::from_slice(&value)?;
            if keep(&tx) {
                found.push(tx);
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl TransactionRepository for RocksDbTransactionRepository {
    async fn save(&self, tx: &mut Transaction) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let stored = self.read(tx.id())?.map_or(0, |t| t.version());
        if stored != tx.version() {
            return Err(PaymentError::ConcurrencyConflict {
                id: tx.id(),
                expected: tx.version(),
                actual: stored,
            });
        }

        let mut next = tx.clone();
        next.set_version(stored + 1);
        let value = serde_json::to_vec(&next)?;
        let cf = self.column()?;
        self.db.put_cf(cf, next.id().as_bytes(), value)?;

        *tx = next;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>> {
        self.read(id)
    }

    async fn count_recent_by_customer(
        &self,
        customer_id: &str,
        since: DateTime<Utc>,
    ) -> Result<usize> {
        let recent = self.scan(|tx| {
            tx.kind() == TransactionKind::Payment
                && tx.customer_id() == customer_id
                && tx.created_at() >= since
        })?;
        Ok(recent.len())
    }

    async fn customer_history(&self, customer_id: &str) -> Result<Vec<TransactionState>> {
        let mut history = self.scan(|tx| {
            tx.kind() == TransactionKind::Payment && tx.customer_id() == customer_id
        })?;
        history.sort_by_key(Transaction::created_at);
        Ok(history.iter().map(Transaction::state).collect())
    }
}
