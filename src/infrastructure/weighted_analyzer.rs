use crate::domain::fraud_score::FraudScore;
use crate::domain::ports::FraudAnalyzer;
use crate::domain::risk_factors::RiskFactors;
use crate::domain::transaction::Transaction;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Scores transactions with the weighted-average risk engine.
pub struct WeightedFraudAnalyzer {
    weights: Option<BTreeMap<String, f64>>,
    rng: Mutex<StdRng>,
}

impl Default for WeightedFraudAnalyzer {
    fn default() -> Self {
        Self {
            weights: None,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl WeightedFraudAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reproducible scores for tests and replays.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            weights: None,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Overrides the default weight of the named factors.
    pub fn with_weights(mut self, weights: BTreeMap<String, f64>) -> Self {
        self.weights = Some(weights);
        self
    }
}

#[async_trait]
impl FraudAnalyzer for WeightedFraudAnalyzer {
    async fn analyze(&self, _tx: &Transaction, factors: &RiskFactors) -> Result<FraudScore> {
        let factors = factors.to_map();
        let mut rng = self.rng.lock().map_err(|e| {
            PaymentError::InternalError(Box::new(std::io::Error::other(e.to_string())))
        })?;
        Ok(FraudScore::calculate_with_rng(
            &factors,
            self.weights.as_ref(),
            &mut *rng,
        ))
    }
}
