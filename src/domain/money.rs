use crate::error::{PaymentError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// ISO-4217 currencies accepted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Currency {
    USD,
    EUR,
    GBP,
    JPY,
    CHF,
    CAD,
    AUD,
    NZD,
    CNY,
    HKD,
    SGD,
    SEK,
    NOK,
    DKK,
    PLN,
    CZK,
    HUF,
    RON,
    BGN,
    TRY,
    INR,
    BRL,
    MXN,
    ZAR,
    KRW,
    ILS,
    AED,
    SAR,
    KWD,
    BHD,
    JOD,
    CLP,
}

impl Currency {
    pub const ALL: [Currency; 32] = [
        Currency::USD,
        Currency::EUR,
        Currency::GBP,
        Currency::JPY,
        Currency::CHF,
        Currency::CAD,
        Currency::AUD,
        Currency::NZD,
        Currency::CNY,
        Currency::HKD,
        Currency::SGD,
        Currency::SEK,
        Currency::NOK,
        Currency::DKK,
        Currency::PLN,
        Currency::CZK,
        Currency::HUF,
        Currency::RON,
        Currency::BGN,
        Currency::TRY,
        Currency::INR,
        Currency::BRL,
        Currency::MXN,
        Currency::ZAR,
        Currency::KRW,
        Currency::ILS,
        Currency::AED,
        Currency::SAR,
        Currency::KWD,
        Currency::BHD,
        Currency::JOD,
        Currency::CLP,
    ];

    /// Number of decimal places between the major and the minor unit.
    pub fn exponent(self) -> u32 {
        match self {
            Currency::JPY | Currency::KRW | Currency::CLP => 0,
            Currency::KWD | Currency::BHD | Currency::JOD => 3,
            _ => 2,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
            Currency::CHF => "CHF",
            Currency::CAD => "CAD",
            Currency::AUD => "AUD",
            Currency::NZD => "NZD",
            Currency::CNY => "CNY",
            Currency::HKD => "HKD",
            Currency::SGD => "SGD",
            Currency::SEK => "SEK",
            Currency::NOK => "NOK",
            Currency::DKK => "DKK",
            Currency::PLN => "PLN",
            Currency::CZK => "CZK",
            Currency::HUF => "HUF",
            Currency::RON => "RON",
            Currency::BGN => "BGN",
            Currency::TRY => "TRY",
            Currency::INR => "INR",
            Currency::BRL => "BRL",
            Currency::MXN => "MXN",
            Currency::ZAR => "ZAR",
            Currency::KRW => "KRW",
            Currency::ILS => "ILS",
            Currency::AED => "AED",
            Currency::SAR => "SAR",
            Currency::KWD => "KWD",
            Currency::BHD => "BHD",
            Currency::JOD => "JOD",
            Currency::CLP => "CLP",
        }
    }

    fn minor_per_major(self) -> Decimal {
        Decimal::from(10i64.pow(self.exponent()))
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_ascii_uppercase();
        Currency::ALL
            .iter()
            .copied()
            .find(|c| c.code() == code)
            .ok_or_else(|| PaymentError::UnsupportedCurrency(s.to_string()))
    }
}

/// An exact amount of money held as integer minor units.
///
/// Decimal conversion only happens when parsing or formatting; arithmetic stays
/// on integers, and scaling by a factor goes through `rust_decimal::Decimal`
/// before settling back to a whole minor unit (round half up).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "MoneyRepr", try_from = "MoneyRepr")]
pub struct Money {
    minor_units: i64,
    currency: Currency,
}

/// Wire form: `{ "minor_units": 5000, "amount": "50.00", "currency": "EUR" }`.
#[derive(Serialize, Deserialize)]
struct MoneyRepr {
    minor_units: i64,
    amount: String,
    currency: Currency,
}

impl From<Money> for MoneyRepr {
    fn from(money: Money) -> Self {
        Self {
            minor_units: money.minor_units,
            amount: money.to_major_units().to_string(),
            currency: money.currency,
        }
    }
}

impl TryFrom<MoneyRepr> for Money {
    type Error = PaymentError;

    fn try_from(repr: MoneyRepr) -> Result<Self> {
        let money = Money::from_minor_units(repr.minor_units, repr.currency);
        let stated = Decimal::from_str(&repr.amount).map_err(|_| {
            PaymentError::InvalidArgument(format!("'{}' is not a decimal amount", repr.amount))
        })?;
        if stated != money.to_major_units() {
            return Err(PaymentError::InvalidArgument(format!(
                "amount {} does not match {} minor units",
                repr.amount, repr.minor_units
            )));
        }
        Ok(money)
    }
}

fn settle(value: Decimal) -> Result<i64> {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| PaymentError::InvalidArgument(format!("{value} is out of range")))
}

impl Money {
    pub fn from_minor_units(minor_units: i64, currency: Currency) -> Self {
        Self {
            minor_units,
            currency,
        }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::from_minor_units(0, currency)
    }

    /// Parses a major-unit decimal string such as `"50.00"`.
    pub fn from_major_units(amount: &str, currency: Currency) -> Result<Self> {
        let value = Decimal::from_str(amount.trim()).map_err(|_| {
            PaymentError::InvalidArgument(format!("'{amount}' is not a valid decimal amount"))
        })?;
        Self::from_decimal(value, currency)
    }

    pub fn from_decimal(value: Decimal, currency: Currency) -> Result<Self> {
        let scaled = value
            .checked_mul(currency.minor_per_major())
            .ok_or_else(|| PaymentError::InvalidArgument(format!("{value} is out of range")))?;
        Ok(Self::from_minor_units(settle(scaled)?, currency))
    }

    pub fn minor_units(&self) -> i64 {
        self.minor_units
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn to_major_units(&self) -> Decimal {
        Decimal::new(self.minor_units, self.currency.exponent())
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<()> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(PaymentError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            })
        }
    }

    pub fn add(&self, other: &Money) -> Result<Money> {
        self.ensure_same_currency(other)?;
        let sum = self
            .minor_units
            .checked_add(other.minor_units)
            .ok_or_else(|| PaymentError::InvalidArgument("addition overflow".to_string()))?;
        Ok(Self::from_minor_units(sum, self.currency))
    }

    pub fn subtract(&self, other: &Money) -> Result<Money> {
        self.ensure_same_currency(other)?;
        let diff = self
            .minor_units
            .checked_sub(other.minor_units)
            .ok_or_else(|| PaymentError::InvalidArgument("subtraction overflow".to_string()))?;
        Ok(Self::from_minor_units(diff, self.currency))
    }

    pub fn multiply(&self, factor: Decimal) -> Result<Money> {
        let product = Decimal::from(self.minor_units)
            .checked_mul(factor)
            .ok_or_else(|| PaymentError::InvalidArgument("multiplication overflow".to_string()))?;
        Ok(Self::from_minor_units(settle(product)?, self.currency))
    }

    pub fn divide(&self, divisor: Decimal) -> Result<Money> {
        if divisor.is_zero() {
            return Err(PaymentError::InvalidArgument(
                "cannot divide money by zero".to_string(),
            ));
        }
        let quotient = Decimal::from(self.minor_units)
            .checked_div(divisor)
            .ok_or_else(|| PaymentError::InvalidArgument("division overflow".to_string()))?;
        Ok(Self::from_minor_units(settle(quotient)?, self.currency))
    }

    pub fn compare(&self, other: &Money) -> Result<Ordering> {
        self.ensure_same_currency(other)?;
        Ok(self.minor_units.cmp(&other.minor_units))
    }

    pub fn is_zero(&self) -> bool {
        self.minor_units == 0
    }

    pub fn is_positive(&self) -> bool {
        self.minor_units > 0
    }

    pub fn is_negative(&self) -> bool {
        self.minor_units < 0
    }

    pub fn absolute(&self) -> Money {
        Self::from_minor_units(self.minor_units.saturating_abs(), self.currency)
    }

    /// Fee charged at `percentage` percent of this amount, e.g. `2.9` for 2.9%.
    pub fn fee_for_percentage(&self, percentage: Decimal) -> Result<Money> {
        if percentage.is_sign_negative() {
            return Err(PaymentError::InvalidArgument(format!(
                "fee percentage {percentage} must not be negative"
            )));
        }
        self.multiply(percentage / Decimal::ONE_HUNDRED)
    }

    /// This amount with a percentage fee added on top.
    pub fn apply_fee_percentage(&self, percentage: Decimal) -> Result<Money> {
        self.add(&self.fee_for_percentage(percentage)?)
    }

    pub fn exceeds_threshold(&self, threshold: &Money) -> Result<bool> {
        Ok(self.compare(threshold)? == Ordering::Greater)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_major_units(), self.currency)
    }
}
