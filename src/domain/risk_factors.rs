use super::fraud_score::{
    AMOUNT_SCORE, BEHAVIORAL_SCORE, GEOLOCATION_SCORE, PAYMENT_METHOD_SCORE, TIME_SCORE,
    VELOCITY_SCORE,
};
use super::money::Money;
use super::payment_method::PaymentMethodType;
use super::status::TransactionState;
use super::transaction::Transaction;
use chrono::{DateTime, Timelike, Utc};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const HIGH_RISK_COUNTRIES: [&str; 6] = ["AF", "IR", "KP", "MM", "SY", "YE"];
const ELEVATED_RISK_COUNTRIES: [&str; 8] = ["BR", "ID", "NG", "PH", "PK", "RU", "UA", "VE"];

/// Normalized inputs to the fraud score, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskFactors {
    pub amount_score: f64,
    pub velocity_score: f64,
    pub geolocation_score: f64,
    pub payment_method_score: f64,
    pub time_score: f64,
    pub behavioral_score: f64,
}

impl RiskFactors {
    /// Assesses a transaction against its customer's recent activity.
    ///
    /// `recent_count` is the number of the customer's transactions inside the
    /// velocity window; `history` holds the states of all earlier ones.
    pub fn assess(
        tx: &Transaction,
        recent_count: usize,
        history: &[TransactionState],
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            amount_score: amount_score(&tx.amount()),
            velocity_score: velocity_score(recent_count),
            geolocation_score: geolocation_score(tx.country()),
            payment_method_score: payment_method_score(tx.payment_method().method_type()),
            time_score: time_score(at),
            behavioral_score: behavioral_score(history),
        }
    }

    /// Factor map keyed by the names the score weights use.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        [
            (AMOUNT_SCORE, self.amount_score),
            (VELOCITY_SCORE, self.velocity_score),
            (GEOLOCATION_SCORE, self.geolocation_score),
            (PAYMENT_METHOD_SCORE, self.payment_method_score),
            (TIME_SCORE, self.time_score),
            (BEHAVIORAL_SCORE, self.behavioral_score),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
    }
}

pub fn amount_score(amount: &Money) -> f64 {
    let major = amount.to_major_units().abs();
    if major < dec!(100) {
        0.1
    } else if major < dec!(500) {
        0.2
    } else if major < dec!(1000) {
        0.4
    } else if major < dec!(5000) {
        0.6
    } else if major < dec!(10000) {
        0.8
    } else {
        1.0
    }
}

pub fn velocity_score(recent_count: usize) -> f64 {
    match recent_count {
        0 => 0.0,
        1..=2 => 0.2,
        3..=5 => 0.5,
        6..=9 => 0.8,
        _ => 1.0,
    }
}

pub fn geolocation_score(country: Option<&str>) -> f64 {
    match country {
        None => 0.3,
        Some(code) if HIGH_RISK_COUNTRIES.contains(&code) => 0.9,
        Some(code) if ELEVATED_RISK_COUNTRIES.contains(&code) => 0.5,
        Some(_) => 0.1,
    }
}

pub fn payment_method_score(method: PaymentMethodType) -> f64 {
    match method {
        PaymentMethodType::CreditCard => 0.2,
        PaymentMethodType::DebitCard => 0.15,
        PaymentMethodType::BankTransfer => 0.1,
        PaymentMethodType::DigitalWallet => 0.25,
        PaymentMethodType::Crypto => 0.8,
        PaymentMethodType::BuyNowPayLater => 0.4,
    }
}

/// Night-time activity (UTC) is riskier than business hours.
pub fn time_score(at: DateTime<Utc>) -> f64 {
    match at.hour() {
        0..=5 => 0.6,
        22..=23 => 0.4,
        _ => 0.1,
    }
}

/// Failure rate over the customer's history; any fraud or chargeback on
/// record lifts it to at least 0.9. A customer without history is neutral.
pub fn behavioral_score(history: &[TransactionState]) -> f64 {
    if history.is_empty() {
        return 0.2;
    }
    let failures = history.iter().filter(|s| s.is_failure()).count();
    let rate = failures as f64 / history.len() as f64;
    let flagged = history.iter().any(|s| {
        matches!(
            s,
            TransactionState::FraudDetected | TransactionState::Blocked | TransactionState::Chargeback
        )
    });
    if flagged { rate.max(0.9) } else { rate }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Currency;
    use crate::domain::payment_method::PaymentMethod;
    use chrono::TimeZone;

    #[test]
    fn test_amount_buckets() {
        let eur = |s: &str| Money::from_major_units(s, Currency::EUR).unwrap();
        assert_eq!(amount_score(&eur("50.00")), 0.1);
        assert_eq!(amount_score(&eur("100.00")), 0.2);
        assert_eq!(amount_score(&eur("999.99")), 0.4);
        assert_eq!(amount_score(&eur("4999")), 0.6);
        assert_eq!(amount_score(&eur("9999.99")), 0.8);
        assert_eq!(amount_score(&eur("10000")), 1.0);
    }

    #[test]
    fn test_velocity_buckets() {
        assert_eq!(velocity_score(0), 0.0);
        assert_eq!(velocity_score(2), 0.2);
        assert_eq!(velocity_score(5), 0.5);
        assert_eq!(velocity_score(9), 0.8);
        assert_eq!(velocity_score(25), 1.0);
    }

    #[test]
    fn test_geolocation_and_time() {
        assert_eq!(geolocation_score(None), 0.3);
        assert_eq!(geolocation_score(Some("KP")), 0.9);
        assert_eq!(geolocation_score(Some("NG")), 0.5);
        assert_eq!(geolocation_score(Some("DE")), 0.1);

        let at = |h| Utc.with_ymd_and_hms(2026, 3, 1, h, 30, 0).unwrap();
        assert_eq!(time_score(at(3)), 0.6);
        assert_eq!(time_score(at(23)), 0.4);
        assert_eq!(time_score(at(14)), 0.1);
    }

    #[test]
    fn test_behavioral_score() {
        use TransactionState::*;
        assert_eq!(behavioral_score(&[]), 0.2);
        assert_eq!(behavioral_score(&[Completed, Completed, Failed, Declined]), 0.5);
        assert_eq!(behavioral_score(&[Completed, Chargeback]), 0.9);
        assert_eq!(behavioral_score(&[Completed; 3]), 0.0);
    }

    #[test]
    fn test_assess_produces_named_factors() {
        let card = PaymentMethod::credit_card("stripe", "4242", 12, 2030).unwrap();
        let amount = Money::from_minor_units(5000, Currency::EUR);
        let tx = Transaction::new("cust", amount, card)
            .unwrap()
            .with_country(Some("de".to_string()));
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        let factors = RiskFactors::assess(&tx, 0, &[], at);
        assert_eq!(factors.geolocation_score, 0.1);
        let map = factors.to_map();
        assert_eq!(map.len(), 6);
        assert_eq!(map[AMOUNT_SCORE], 0.1);
        assert_eq!(map[PAYMENT_METHOD_SCORE], 0.2);
        assert!(map.values().all(|v| (0.0..=1.0).contains(v)));
    }
}
