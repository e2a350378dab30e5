use crate::application::orchestrator::PaymentRequest;
use crate::domain::money::{Currency, Money};
use crate::domain::payment_method::{PaymentMethod, PaymentMethodType};
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::io::Read;

/// One row of a payment-request CSV.
///
/// `detail` carries the instrument: the card's last four digits, a bank
/// account number, a wallet account, or `network:address` for crypto.
/// Cards also need `expiry` as `MM/YYYY`.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRecord {
    pub customer: String,
    pub amount: String,
    pub currency: String,
    pub method: String,
    #[serde(default)]
    pub provider: Option<String>,
    pub detail: String,
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub capture: Option<bool>,
}

impl PaymentRecord {
    pub fn into_request(self) -> Result<PaymentRequest> {
        let currency: Currency = self.currency.parse()?;
        let amount = Money::from_major_units(&self.amount, currency)?;
        let method_type: PaymentMethodType = self.method.parse()?;
        let provider = self
            .provider
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| method_type.default_provider().to_string());

        let method = match method_type {
            PaymentMethodType::CreditCard | PaymentMethodType::DebitCard => {
                let (month, year) = parse_expiry(self.expiry.as_deref())?;
                if method_type == PaymentMethodType::CreditCard {
                    PaymentMethod::credit_card(&provider, &self.detail, month, year)?
                } else {
                    PaymentMethod::debit_card(&provider, &self.detail, month, year)?
                }
            }
            PaymentMethodType::BankTransfer => {
                PaymentMethod::bank_transfer(&provider, &self.detail, None)?
            }
            PaymentMethodType::DigitalWallet => {
                PaymentMethod::digital_wallet(&provider, &self.detail)?
            }
            PaymentMethodType::BuyNowPayLater => {
                PaymentMethod::buy_now_pay_later(&provider, &self.detail)?
            }
            PaymentMethodType::Crypto => {
                let (network, address) = self.detail.split_once(':').ok_or_else(|| {
                    PaymentError::InvalidPaymentData(
                        "crypto detail must be network:address".to_string(),
                    )
                })?;
                PaymentMethod::crypto(&provider, network, address)?
            }
        };

        let mut request = PaymentRequest::new(self.customer, amount, method);
        request.country = self.country.filter(|c| !c.is_empty());
        request.capture = self.capture;
        Ok(request)
    }
}

fn parse_expiry(expiry: Option<&str>) -> Result<(u8, u16)> {
    let invalid = || PaymentError::InvalidPaymentData("card expiry must be MM/YYYY".to_string());
    let (month, year) = expiry.and_then(|e| e.split_once('/')).ok_or_else(invalid)?;
    let month = month.trim().parse().map_err(|_| invalid())?;
    let year = year.trim().parse().map_err(|_| invalid())?;
    Ok((month, year))
}

/// Reads payment requests from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<PaymentRequest>`.
/// It handles whitespace trimming and flexible record lengths automatically.
pub struct PaymentReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> PaymentReader<R> {
    /// Creates a new `PaymentReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads rows, yielding the raw record alongside its conversion so
    /// callers can still report on rows that do not make a valid request.
    pub fn requests(self) -> impl Iterator<Item = Result<(PaymentRecord, Result<PaymentRequest>)>> {
        self.reader
            .into_deserialize::<PaymentRecord>()
            .map(|row| {
                let record = row.map_err(PaymentError::from)?;
                let request = record.clone().into_request();
                Ok((record, request))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment_method::MethodDetails;

    const HEADER: &str = "customer,amount,currency,method,provider,detail,expiry,country,capture";

    fn read(rows: &str) -> Vec<Result<(PaymentRecord, Result<PaymentRequest>)>> {
        let data = format!("{HEADER}\n{rows}");
        PaymentReader::new(data.as_bytes()).requests().collect()
    }

    #[test]
    fn test_reader_card_row() {
        let rows = read("cust-1, 50.00, eur, credit_card, , 4242, 12/2030, DE, true");
        let (record, request) = rows[0].as_ref().unwrap();
        assert_eq!(record.customer, "cust-1");
        let request = request.as_ref().unwrap();
        assert_eq!(request.amount, Money::from_minor_units(5000, Currency::EUR));
        assert_eq!(request.payment_method.provider(), "stripe");
        assert_eq!(request.payment_method.card_last_four(), Some("4242"));
        assert_eq!(request.country.as_deref(), Some("DE"));
        assert_eq!(request.capture, Some(true));
    }

    #[test]
    fn test_reader_other_instruments() {
        let rows = read(
            "a,10,EUR,bank_transfer,,DE89370400440532013000,,,\n\
             b,10,USD,crypto,coinbase,bitcoin:1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa,,,\n\
             c,10,USD,digital_wallet,,jane@example.com,,US,false",
        );
        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert!(row.as_ref().unwrap().1.is_ok());
        }
        let (_, bank) = rows[0].as_ref().unwrap();
        assert!(matches!(
            bank.as_ref().unwrap().payment_method.details(),
            MethodDetails::BankAccount { .. }
        ));
        let (_, wallet) = rows[2].as_ref().unwrap();
        assert_eq!(wallet.as_ref().unwrap().capture, Some(false));
    }

    #[test]
    fn test_reader_rejects_bad_rows() {
        let rows = read(
            "a,10,XYZ,credit_card,,4242,12/2030,,\n\
             b,ten,EUR,credit_card,,4242,12/2030,,\n\
             c,10,EUR,cheque,,123,,,\n\
             d,10,EUR,credit_card,,4242,,,",
        );
        assert!(matches!(
            rows[0].as_ref().unwrap().1,
            Err(PaymentError::UnsupportedCurrency(_))
        ));
        assert!(matches!(
            rows[1].as_ref().unwrap().1,
            Err(PaymentError::InvalidArgument(_))
        ));
        assert!(matches!(
            rows[2].as_ref().unwrap().1,
            Err(PaymentError::UnsupportedPaymentMethodType(_))
        ));
        assert!(matches!(
            rows[3].as_ref().unwrap().1,
            Err(PaymentError::InvalidPaymentData(_))
        ));
    }

    #[test]
    fn test_reader_short_row() {
        let data = "customer,amount,currency,method,provider,detail\nx,1.00,EUR,digital_wallet,,x@y.z";
        let rows: Vec<_> = PaymentReader::new(data.as_bytes()).requests().collect();
        let (record, request) = rows[0].as_ref().unwrap();
        assert!(record.country.is_none());
        assert!(request.is_ok());
    }
}
