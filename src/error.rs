use crate::domain::fraud_score::FraudScore;
use crate::domain::money::Currency;
use crate::domain::status::TransactionState;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: Currency, right: Currency },
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),
    #[error("Unsupported payment method type: {0}")]
    UnsupportedPaymentMethodType(String),
    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition {
        from: TransactionState,
        to: TransactionState,
    },
    #[error("Invalid payment data: {0}")]
    InvalidPaymentData(String),
    #[error("Payment blocked by fraud screening (score {})", score.value())]
    FraudBlocked {
        score: Box<FraudScore>,
        /// The blocked transaction, kept for audit.
        transaction_id: Option<Uuid>,
    },
    #[error("Payment processing failed: {message}")]
    PaymentProcessingFailed {
        code: Option<String>,
        message: String,
        /// The stored transaction the failure was recorded on, if any.
        transaction_id: Option<Uuid>,
    },
    #[error("Retry limit of {limit} attempts exceeded")]
    RetryLimitExceeded { limit: u32 },
    #[error("Transaction {0} not found")]
    NotFound(Uuid),
    #[error(
        "Concurrent modification of transaction {id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict { id: Uuid, expected: u64, actual: u64 },
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    StorageError(#[from] rocksdb::Error),
}

impl PaymentError {
    /// Errors that belong to the payment domain and may be shown to callers as-is.
    pub fn is_domain_error(&self) -> bool {
        !matches!(
            self,
            PaymentError::CsvError(_) | PaymentError::IoError(_) | PaymentError::InternalError(_)
        ) && !self.is_storage_error()
    }

    /// Id of the transaction persisted before this error was raised.
    pub fn transaction_id(&self) -> Option<Uuid> {
        match self {
            PaymentError::FraudBlocked { transaction_id, .. }
            | PaymentError::PaymentProcessingFailed { transaction_id, .. } => *transaction_id,
            _ => None,
        }
    }

    #[cfg(feature = "storage-rocksdb")]
    fn is_storage_error(&self) -> bool {
        matches!(self, PaymentError::StorageError(_))
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    fn is_storage_error(&self) -> bool {
        false
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        PaymentError::InternalError(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
