use super::money::Currency;
use crate::error::{PaymentError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

const MAX_PROVIDER_LEN: usize = 50;
const MASK: &str = "****";
const MASK_KEEP: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodType {
    CreditCard,
    DebitCard,
    BankTransfer,
    DigitalWallet,
    Crypto,
    BuyNowPayLater,
}

impl PaymentMethodType {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethodType::CreditCard => "credit_card",
            PaymentMethodType::DebitCard => "debit_card",
            PaymentMethodType::BankTransfer => "bank_transfer",
            PaymentMethodType::DigitalWallet => "digital_wallet",
            PaymentMethodType::Crypto => "crypto",
            PaymentMethodType::BuyNowPayLater => "buy_now_pay_later",
        }
    }

    pub fn default_provider(self) -> &'static str {
        match self {
            PaymentMethodType::CreditCard | PaymentMethodType::DebitCard => "stripe",
            PaymentMethodType::BankTransfer => "sepa",
            PaymentMethodType::DigitalWallet => "paypal",
            PaymentMethodType::Crypto => "coinbase",
            PaymentMethodType::BuyNowPayLater => "klarna",
        }
    }

    pub fn is_card(self) -> bool {
        matches!(
            self,
            PaymentMethodType::CreditCard | PaymentMethodType::DebitCard
        )
    }
}

impl fmt::Display for PaymentMethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethodType {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "credit_card" => Ok(PaymentMethodType::CreditCard),
            "debit_card" => Ok(PaymentMethodType::DebitCard),
            "bank_transfer" => Ok(PaymentMethodType::BankTransfer),
            "digital_wallet" => Ok(PaymentMethodType::DigitalWallet),
            "crypto" => Ok(PaymentMethodType::Crypto),
            "buy_now_pay_later" => Ok(PaymentMethodType::BuyNowPayLater),
            _ => Err(PaymentError::UnsupportedPaymentMethodType(s.to_string())),
        }
    }
}

/// A sensitive value that has already been masked.
///
/// Built by [`MaskedValue::mask`]; deserializing only accepts strings already
/// in masked form, so a raw account number never ends up in a `PaymentMethod`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MaskedValue(String);

impl From<MaskedValue> for String {
    fn from(value: MaskedValue) -> Self {
        value.0
    }
}

impl TryFrom<String> for MaskedValue {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self> {
        let chars: Vec<char> = value.chars().collect();
        let fully_hidden = value == MASK.repeat(2);
        let partly_hidden = chars.len() == MASK_KEEP * 2 + MASK.len()
            && chars[MASK_KEEP..MASK_KEEP + MASK.len()].iter().all(|c| *c == '*');
        if fully_hidden || partly_hidden {
            Ok(Self(value))
        } else {
            Err(PaymentError::InvalidPaymentData(
                "stored account value is not masked".to_string(),
            ))
        }
    }
}

impl MaskedValue {
    pub fn mask(raw: &str) -> Self {
        let chars: Vec<char> = raw.trim().chars().collect();
        if chars.len() <= MASK_KEEP * 2 {
            return Self(MASK.repeat(2));
        }
        let prefix: String = chars[..MASK_KEEP].iter().collect();
        let suffix: String = chars[chars.len() - MASK_KEEP..].iter().collect();
        Self(format!("{prefix}{MASK}{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Instrument-specific data, one shape per family of payment method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MethodDetails {
    Card {
        last_four: String,
        expiry_month: u8,
        expiry_year: u16,
    },
    BankAccount {
        account_number: MaskedValue,
        bank_code: Option<String>,
    },
    Wallet {
        account: MaskedValue,
    },
    Crypto {
        network: String,
        address: MaskedValue,
    },
}

impl MethodDetails {
    pub fn card(last_four: &str, expiry_month: u8, expiry_year: u16) -> Result<Self> {
        if last_four.len() != 4 || !last_four.chars().all(|c| c.is_ascii_digit()) {
            return Err(PaymentError::InvalidArgument(
                "card last four must be exactly 4 digits".to_string(),
            ));
        }
        if !(1..=12).contains(&expiry_month) {
            return Err(PaymentError::InvalidArgument(format!(
                "invalid card expiry month {expiry_month}"
            )));
        }
        Ok(MethodDetails::Card {
            last_four: last_four.to_string(),
            expiry_month,
            expiry_year,
        })
    }

    pub fn bank_account(account_number: &str, bank_code: Option<&str>) -> Result<Self> {
        let account_number = account_number.trim();
        if !(8..=34).contains(&account_number.len())
            || !account_number.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(PaymentError::InvalidArgument(
                "bank account number must be 8-34 alphanumeric characters".to_string(),
            ));
        }
        Ok(MethodDetails::BankAccount {
            account_number: MaskedValue::mask(account_number),
            bank_code: bank_code.map(str::to_string),
        })
    }

    pub fn wallet(account: &str) -> Result<Self> {
        if !account.contains('@') {
            return Err(PaymentError::InvalidArgument(
                "wallet account must be an email address".to_string(),
            ));
        }
        Ok(MethodDetails::Wallet {
            account: MaskedValue::mask(account),
        })
    }

    pub fn crypto(network: &str, address: &str) -> Result<Self> {
        let address = address.trim();
        if network.trim().is_empty() {
            return Err(PaymentError::InvalidArgument(
                "crypto network is required".to_string(),
            ));
        }
        if !(26..=90).contains(&address.len()) || !address.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(PaymentError::InvalidArgument(
                "crypto address must be 26-90 alphanumeric characters".to_string(),
            ));
        }
        Ok(MethodDetails::Crypto {
            network: network.trim().to_ascii_lowercase(),
            address: MaskedValue::mask(address),
        })
    }

    fn fits(&self, method_type: PaymentMethodType) -> bool {
        matches!(
            (self, method_type),
            (
                MethodDetails::Card { .. },
                PaymentMethodType::CreditCard | PaymentMethodType::DebitCard
            ) | (
                MethodDetails::BankAccount { .. },
                PaymentMethodType::BankTransfer
            ) | (
                MethodDetails::Wallet { .. },
                PaymentMethodType::DigitalWallet | PaymentMethodType::BuyNowPayLater
            ) | (MethodDetails::Crypto { .. }, PaymentMethodType::Crypto)
        )
    }

    fn canonical(&self) -> String {
        match self {
            MethodDetails::Card {
                last_four,
                expiry_month,
                expiry_year,
            } => format!("card:{last_four}:{expiry_month:02}/{expiry_year}"),
            MethodDetails::BankAccount {
                account_number,
                bank_code,
            } => format!(
                "bank:{}:{}",
                account_number.as_str(),
                bank_code.as_deref().unwrap_or_default()
            ),
            MethodDetails::Wallet { account } => format!("wallet:{}", account.as_str()),
            MethodDetails::Crypto { network, address } => {
                format!("crypto:{network}:{}", address.as_str())
            }
        }
    }
}

/// A payment instrument together with what it can be used for.
///
/// Empty `supported_currencies` or `supported_countries` mean the method is not
/// restricted on that axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    method_type: PaymentMethodType,
    provider: String,
    details: MethodDetails,
    requires_verification: bool,
    supported_currencies: BTreeSet<Currency>,
    supported_countries: BTreeSet<String>,
}

impl PaymentMethod {
    pub fn new(
        method_type: PaymentMethodType,
        provider: &str,
        details: MethodDetails,
    ) -> Result<Self> {
        let provider = provider.trim();
        if provider.is_empty() {
            return Err(PaymentError::InvalidArgument(
                "payment provider is required".to_string(),
            ));
        }
        if provider.chars().count() > MAX_PROVIDER_LEN {
            return Err(PaymentError::InvalidArgument(format!(
                "payment provider must be at most {MAX_PROVIDER_LEN} characters"
            )));
        }
        if !details.fits(method_type) {
            return Err(PaymentError::InvalidArgument(format!(
                "details do not match payment method type {method_type}"
            )));
        }
        Ok(Self {
            method_type,
            provider: provider.to_string(),
            details,
            requires_verification: false,
            supported_currencies: BTreeSet::new(),
            supported_countries: BTreeSet::new(),
        })
    }

    pub fn credit_card(
        provider: &str,
        last_four: &str,
        expiry_month: u8,
        expiry_year: u16,
    ) -> Result<Self> {
        let details = MethodDetails::card(last_four, expiry_month, expiry_year)?;
        Self::new(PaymentMethodType::CreditCard, provider, details)
    }

    pub fn debit_card(
        provider: &str,
        last_four: &str,
        expiry_month: u8,
        expiry_year: u16,
    ) -> Result<Self> {
        let details = MethodDetails::card(last_four, expiry_month, expiry_year)?;
        Self::new(PaymentMethodType::DebitCard, provider, details)
    }

    pub fn bank_transfer(
        provider: &str,
        account_number: &str,
        bank_code: Option<&str>,
    ) -> Result<Self> {
        let details = MethodDetails::bank_account(account_number, bank_code)?;
        Ok(Self::new(PaymentMethodType::BankTransfer, provider, details)?
            .with_verification(true)
            .with_supported_currencies([
                Currency::EUR,
                Currency::GBP,
                Currency::USD,
                Currency::CHF,
                Currency::SEK,
                Currency::DKK,
                Currency::NOK,
                Currency::PLN,
            ])
            .with_supported_countries([
                "AT", "BE", "CH", "DE", "DK", "ES", "FI", "FR", "GB", "IE", "IT", "LU", "NL",
                "NO", "PL", "PT", "SE", "US",
            ]))
    }

    pub fn digital_wallet(provider: &str, account: &str) -> Result<Self> {
        let details = MethodDetails::wallet(account)?;
        Ok(
            Self::new(PaymentMethodType::DigitalWallet, provider, details)?
                .with_supported_currencies([
                    Currency::USD,
                    Currency::EUR,
                    Currency::GBP,
                    Currency::CAD,
                    Currency::AUD,
                    Currency::JPY,
                ]),
        )
    }

    pub fn crypto(provider: &str, network: &str, address: &str) -> Result<Self> {
        let details = MethodDetails::crypto(network, address)?;
        Ok(Self::new(PaymentMethodType::Crypto, provider, details)?
            .with_verification(true)
            .with_supported_currencies([Currency::USD, Currency::EUR]))
    }

    pub fn buy_now_pay_later(provider: &str, account: &str) -> Result<Self> {
        let details = MethodDetails::wallet(account)?;
        Ok(
            Self::new(PaymentMethodType::BuyNowPayLater, provider, details)?
                .with_verification(true)
                .with_supported_currencies([
                    Currency::USD,
                    Currency::EUR,
                    Currency::GBP,
                    Currency::AUD,
                ])
                .with_supported_countries(["AU", "AT", "DE", "FI", "GB", "NL", "SE", "US"]),
        )
    }

    pub fn with_verification(mut self, required: bool) -> Self {
        self.requires_verification = required;
        self
    }

    pub fn with_supported_currencies<I>(mut self, currencies: I) -> Self
    where
        I: IntoIterator<Item = Currency>,
    {
        self.supported_currencies = currencies.into_iter().collect();
        self
    }

    pub fn with_supported_countries<I, S>(mut self, countries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.supported_countries = countries
            .into_iter()
            .map(|c| c.as_ref().trim().to_ascii_uppercase())
            .collect();
        self
    }

    pub fn method_type(&self) -> PaymentMethodType {
        self.method_type
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn details(&self) -> &MethodDetails {
        &self.details
    }

    pub fn requires_verification(&self) -> bool {
        self.requires_verification
    }

    pub fn supported_currencies(&self) -> &BTreeSet<Currency> {
        &self.supported_currencies
    }

    pub fn supported_countries(&self) -> &BTreeSet<String> {
        &self.supported_countries
    }

    pub fn supports_currency(&self, currency: Currency) -> bool {
        self.supported_currencies.is_empty() || self.supported_currencies.contains(&currency)
    }

    pub fn supports_country(&self, country: &str) -> bool {
        self.supported_countries.is_empty()
            || self
                .supported_countries
                .contains(&country.trim().to_ascii_uppercase())
    }

    /// Card last four, when the instrument is a card.
    pub fn card_last_four(&self) -> Option<&str> {
        match &self.details {
            MethodDetails::Card { last_four, .. } => Some(last_four),
            _ => None,
        }
    }

    /// Deterministic SHA-256 over type, provider and (masked) details.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.method_type.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(self.provider.to_ascii_lowercase().as_bytes());
        hasher.update(b"|");
        hasher.update(self.details.canonical().as_bytes());
        hex::encode(hasher.finalize())
    }
}
