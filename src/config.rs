use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;

/// Tunables of the payment workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Largest accepted amount, in major units of the payment currency.
    pub max_amount: Decimal,
    /// Trailing window used to count a customer's recent transactions.
    pub velocity_window: Duration,
    /// Upper bound for a single gateway call.
    pub gateway_timeout: Duration,
    /// Capture straight after authorization unless a request says otherwise.
    pub capture_immediately: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_amount: dec!(10000),
            velocity_window: Duration::from_secs(60 * 60),
            gateway_timeout: Duration::from_secs(5),
            capture_immediately: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn with_max_amount(mut self, max_amount: Decimal) -> Self {
        self.max_amount = max_amount;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_amount, dec!(10000));
        assert_eq!(config.velocity_window, Duration::from_secs(3600));
        assert_eq!(config.gateway_timeout, Duration::from_secs(5));
        assert!(config.capture_immediately);

        let tuned = config.with_gateway_timeout(Duration::from_millis(250));
        assert_eq!(tuned.gateway_timeout, Duration::from_millis(250));
    }
}
