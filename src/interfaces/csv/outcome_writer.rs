use crate::domain::transaction::Transaction;
use crate::error::{PaymentError, Result};
use serde::Serialize;
use std::io::Write;

/// One output row: what happened to one payment request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeRecord {
    pub transaction_id: Option<String>,
    pub customer: String,
    pub amount: String,
    pub currency: String,
    pub state: String,
    pub fraud_score: Option<u16>,
    pub risk_tier: Option<String>,
    pub error: Option<String>,
}

impl OutcomeRecord {
    pub fn from_transaction(tx: &Transaction) -> Self {
        let amount = tx.amount();
        Self {
            transaction_id: Some(tx.id().to_string()),
            customer: tx.customer_id().to_string(),
            amount: amount.to_major_units().to_string(),
            currency: amount.currency().to_string(),
            state: tx.state().to_string(),
            fraud_score: tx.fraud_score().map(|s| s.value()),
            risk_tier: tx.fraud_score().map(|s| s.risk_tier().to_string()),
            error: None,
        }
    }

    /// A request that produced no successful transaction. Blocked and failed
    /// payments still point at the transaction stored for audit.
    pub fn rejected(customer: &str, amount: &str, currency: &str, error: &PaymentError) -> Self {
        let (state, fraud_score, risk_tier) = match error {
            PaymentError::FraudBlocked { score, .. } => (
                "blocked",
                Some(score.value()),
                Some(score.risk_tier().to_string()),
            ),
            PaymentError::PaymentProcessingFailed { .. } => ("failed", None, None),
            _ => ("rejected", None, None),
        };
        Self {
            transaction_id: error.transaction_id().map(|id| id.to_string()),
            customer: customer.to_string(),
            amount: amount.to_string(),
            currency: currency.to_ascii_uppercase(),
            state: state.to_string(),
            fraud_score,
            risk_tier,
            error: Some(error.to_string()),
        }
    }
}

/// Writes outcome rows as CSV, header first.
pub struct OutcomeWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OutcomeWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write(&mut self, record: &OutcomeRecord) -> Result<()> {
        self.writer.serialize(record)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fraud_score::FraudScore;
    use crate::domain::money::{Currency, Money};
    use crate::domain::payment_method::PaymentMethod;
    use uuid::Uuid;

    fn render(records: &[OutcomeRecord]) -> String {
        let mut out = Vec::new();
        {
            let mut writer = OutcomeWriter::new(&mut out);
            for record in records {
                writer.write(record).unwrap();
            }
            writer.flush().unwrap();
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_writer_rows() {
        let card = PaymentMethod::credit_card("stripe", "4242", 12, 2030).unwrap();
        let mut tx =
            Transaction::new("cust-1", Money::from_minor_units(5000, Currency::EUR), card).unwrap();
        tx.update_fraud_score(FraudScore::new(42)).unwrap();

        let blocked = PaymentError::FraudBlocked {
            score: Box::new(FraudScore::new(1000)),
            transaction_id: None,
        };
        let output = render(&[
            OutcomeRecord::from_transaction(&tx),
            OutcomeRecord::rejected("cust-2", "9000", "eur", &blocked),
        ]);

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines[0],
            "transaction_id,customer,amount,currency,state,fraud_score,risk_tier,error"
        );
        assert!(lines[1].ends_with(",cust-1,50.00,EUR,pending,42,very_low,"));
        assert!(lines[2].starts_with(",cust-2,9000,EUR,blocked,1000,critical,"));
    }

    #[test]
    fn test_rejections_keep_the_stored_transaction_id() {
        let id = Uuid::new_v4();
        let failed = PaymentError::PaymentProcessingFailed {
            code: Some("card_declined".to_string()),
            message: "The card was declined".to_string(),
            transaction_id: Some(id),
        };
        let record = OutcomeRecord::rejected("cust-3", "30.00", "EUR", &failed);
        assert_eq!(record.transaction_id, Some(id.to_string()));
        assert_eq!(record.state, "failed");

        let invalid = PaymentError::InvalidPaymentData("amount must be positive".to_string());
        let record = OutcomeRecord::rejected("cust-4", "0", "EUR", &invalid);
        assert_eq!(record.transaction_id, None);
        assert_eq!(record.state, "rejected");
    }
}
