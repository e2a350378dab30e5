use crate::domain::money::Money;
use crate::domain::ports::{GatewayResponse, PaymentGateway};
use crate::domain::transaction::Transaction;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Card ending that is always declined at authorization.
pub const DECLINED_CARD: &str = "0002";
/// Card ending that authorizes but can never be captured.
pub const CAPTURE_FAILURE_CARD: &str = "0341";

/// A deterministic stand-in for a payment provider.
///
/// Outcomes depend only on the card's last four digits and on the failure
/// switches, which makes it usable from the CLI as well as from tests.
#[derive(Debug, Default)]
pub struct SimulatedGateway {
    latency: Option<Duration>,
    fail_authorizations: AtomicBool,
    fail_captures: AtomicBool,
    calls: AtomicUsize,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_fail_authorizations(&self, fail: bool) {
        self.fail_authorizations.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_captures(&self, fail: bool) {
        self.fail_captures.store(fail, Ordering::SeqCst);
    }

    /// Number of calls received so far, of any kind.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn reference(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn authorize(&self, tx: &Transaction) -> Result<GatewayResponse> {
        self.enter().await;
        if self.fail_authorizations.load(Ordering::SeqCst) {
            return Ok(GatewayResponse::rejected(
                "processing_error",
                "simulated provider outage",
            ));
        }
        if tx.payment_method().card_last_four() == Some(DECLINED_CARD) {
            return Ok(GatewayResponse::rejected(
                "card_declined",
                "The card was declined",
            ));
        }

        let mut response = GatewayResponse::approved(reference("auth"));
        response.provider_data = BTreeMap::from([
            (
                "provider".to_string(),
                tx.payment_method().provider().to_string(),
            ),
            ("authorized_amount".to_string(), tx.amount().to_string()),
        ]);
        Ok(response)
    }

    async fn capture(&self, tx: &Transaction) -> Result<GatewayResponse> {
        self.enter().await;
        if self.fail_captures.load(Ordering::SeqCst)
            || tx.payment_method().card_last_four() == Some(CAPTURE_FAILURE_CARD)
        {
            return Ok(GatewayResponse::rejected(
                "capture_failed",
                "The authorization could not be captured",
            ));
        }
        Ok(GatewayResponse::approved(reference("cap")))
    }

    async fn refund(&self, original: &Transaction, amount: Money) -> Result<GatewayResponse> {
        self.enter().await;
        if self.fail_authorizations.load(Ordering::SeqCst) {
            return Ok(GatewayResponse::rejected(
                "processing_error",
                "simulated provider outage",
            ));
        }
        let mut response = GatewayResponse::approved(reference("re"));
        response
            .provider_data
            .insert("refunded_amount".to_string(), amount.to_string());
        if let Some(charge) = original.provider_transaction_id() {
            response
                .provider_data
                .insert("charge".to_string(), charge.to_string());
        }
        Ok(response)
    }
}
