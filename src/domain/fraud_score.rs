use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const MAX_SCORE: u16 = 1000;
pub const SCORE_VERSION: &str = "1.0";

/// Normalized factor values above this are recorded as triggered rules.
const TRIGGER_THRESHOLD: f64 = 0.7;
const UNKNOWN_FACTOR_WEIGHT: f64 = 0.05;
/// Hard "critical" predicate; deliberately higher than the critical tier boundary.
const CRITICAL_THRESHOLD: u16 = 900;
const ACCEPTABLE_MAX: u16 = 300;
const REVIEW_MAX: u16 = 600;
// Absorbs binary float error so that values on the 1/1000 grid score exactly.
const SCALE_TOLERANCE: f64 = 1e-9;

pub const VELOCITY_SCORE: &str = "velocity_score";
pub const GEOLOCATION_SCORE: &str = "geolocation_score";
pub const DEVICE_SCORE: &str = "device_score";
pub const BEHAVIORAL_SCORE: &str = "behavioral_score";
pub const PAYMENT_METHOD_SCORE: &str = "payment_method_score";
pub const AMOUNT_SCORE: &str = "amount_score";
pub const TIME_SCORE: &str = "time_score";

pub const DEFAULT_WEIGHTS: [(&str, f64); 7] = [
    (VELOCITY_SCORE, 0.25),
    (GEOLOCATION_SCORE, 0.20),
    (DEVICE_SCORE, 0.15),
    (BEHAVIORAL_SCORE, 0.15),
    (PAYMENT_METHOD_SCORE, 0.10),
    (AMOUNT_SCORE, 0.10),
    (TIME_SCORE, 0.05),
];

pub fn default_weight(factor: &str) -> f64 {
    DEFAULT_WEIGHTS
        .iter()
        .find(|(name, _)| *name == factor)
        .map(|(_, weight)| *weight)
        .unwrap_or(UNKNOWN_FACTOR_WEIGHT)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
    Critical,
}

impl RiskTier {
    pub fn from_value(value: u16) -> Self {
        match value {
            0..=50 => RiskTier::VeryLow,
            51..=150 => RiskTier::Low,
            151..=300 => RiskTier::Medium,
            301..=600 => RiskTier::High,
            601..=800 => RiskTier::VeryHigh,
            _ => RiskTier::Critical,
        }
    }

    pub fn recommended_action(self) -> RecommendedAction {
        match self {
            RiskTier::VeryLow | RiskTier::Low => RecommendedAction::Approve,
            RiskTier::Medium => RecommendedAction::Review,
            RiskTier::High => RecommendedAction::Challenge,
            RiskTier::VeryHigh => RecommendedAction::ManualReview,
            RiskTier::Critical => RecommendedAction::Block,
        }
    }

    /// How long a transaction scored in this tier is kept for audit.
    pub fn retention_days(self) -> u32 {
        match self {
            RiskTier::VeryLow => 30,
            RiskTier::Low => 60,
            RiskTier::Medium => 180,
            RiskTier::High => 365,
            RiskTier::VeryHigh | RiskTier::Critical => 1095,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskTier::VeryLow => "very_low",
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
            RiskTier::VeryHigh => "very_high",
            RiskTier::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Approve,
    Review,
    /// Step-up authentication.
    Challenge,
    ManualReview,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    Penalty,
    Bonus,
}

/// Provenance of a manual shift applied after the score was computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreAdjustment {
    pub kind: AdjustmentKind,
    pub points: u16,
    pub reason: String,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactorEntry {
    Score(f64),
    Adjustment(ScoreAdjustment),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredRule {
    pub factor: String,
    pub value: f64,
    pub weight: f64,
    pub triggered_at: DateTime<Utc>,
}

/// A 0-1000 risk score. Every transform returns a new score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FraudScoreRepr")]
pub struct FraudScore {
    value: u16,
    risk_tier: RiskTier,
    factors: BTreeMap<String, FactorEntry>,
    triggered_rules: Vec<TriggeredRule>,
    computed_at: DateTime<Utc>,
    version: String,
}

/// Stored form, checked before it becomes a [`FraudScore`].
#[derive(Deserialize)]
struct FraudScoreRepr {
    value: u16,
    risk_tier: RiskTier,
    factors: BTreeMap<String, FactorEntry>,
    triggered_rules: Vec<TriggeredRule>,
    computed_at: DateTime<Utc>,
    version: String,
}

impl TryFrom<FraudScoreRepr> for FraudScore {
    type Error = PaymentError;

    fn try_from(repr: FraudScoreRepr) -> Result<Self> {
        if repr.value > MAX_SCORE {
            return Err(PaymentError::InvalidArgument(format!(
                "fraud score {} is above {MAX_SCORE}",
                repr.value
            )));
        }
        let tier = RiskTier::from_value(repr.value);
        if repr.risk_tier != tier {
            return Err(PaymentError::InvalidArgument(format!(
                "fraud score {} is tier {tier}, not {}",
                repr.value, repr.risk_tier
            )));
        }
        Ok(Self {
            value: repr.value,
            risk_tier: tier,
            factors: repr.factors,
            triggered_rules: repr.triggered_rules,
            computed_at: repr.computed_at,
            version: repr.version,
        })
    }
}

fn scale(ratio: f64) -> u16 {
    let scaled = (ratio * f64::from(MAX_SCORE) + SCALE_TOLERANCE).floor();
    scaled.clamp(0.0, f64::from(MAX_SCORE)) as u16
}

impl FraudScore {
    fn build(
        value: u16,
        factors: BTreeMap<String, FactorEntry>,
        triggered_rules: Vec<TriggeredRule>,
        computed_at: DateTime<Utc>,
    ) -> Self {
        let value = value.min(MAX_SCORE);
        Self {
            value,
            risk_tier: RiskTier::from_value(value),
            factors,
            triggered_rules,
            computed_at,
            version: SCORE_VERSION.to_string(),
        }
    }

    /// A score with a known raw value; out-of-range values are clamped.
    pub fn new(value: i64) -> Self {
        let value = value.clamp(0, i64::from(MAX_SCORE)) as u16;
        Self::build(value, BTreeMap::new(), Vec::new(), Utc::now())
    }

    pub fn calculate(factors: &BTreeMap<String, f64>, weights: Option<&BTreeMap<String, f64>>) -> Self {
        Self::calculate_with_rng(factors, weights, &mut rand::thread_rng())
    }

    /// Weighted average of the normalized factors scaled to 0-1000.
    ///
    /// An empty factor set has nothing to weigh; it lands somewhere in the
    /// very-low bucket, drawn from `rng`.
    pub fn calculate_with_rng<R: Rng>(
        factors: &BTreeMap<String, f64>,
        weights: Option<&BTreeMap<String, f64>>,
        rng: &mut R,
    ) -> Self {
        let now = Utc::now();
        if factors.is_empty() {
            let value = rng.gen_range(0..=50);
            return Self::build(value, BTreeMap::new(), Vec::new(), now);
        }

        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        let mut recorded = BTreeMap::new();
        let mut triggered_rules = Vec::new();

        for (name, raw) in factors {
            let normalized = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) };
            let weight = weights
                .and_then(|w| w.get(name))
                .copied()
                .unwrap_or_else(|| default_weight(name))
                .max(0.0);

            weighted_sum += normalized * weight;
            total_weight += weight;
            recorded.insert(name.clone(), FactorEntry::Score(normalized));

            if normalized > TRIGGER_THRESHOLD {
                triggered_rules.push(TriggeredRule {
                    factor: name.clone(),
                    value: normalized,
                    weight,
                    triggered_at: now,
                });
            }
        }

        let ratio = if total_weight > 0.0 {
            weighted_sum / total_weight
        } else {
            0.0
        };
        Self::build(scale(ratio), recorded, triggered_rules, now)
    }

    pub fn value(&self) -> u16 {
        self.value
    }

    pub fn risk_tier(&self) -> RiskTier {
        self.risk_tier
    }

    pub fn factors(&self) -> &BTreeMap<String, FactorEntry> {
        &self.factors
    }

    pub fn triggered_rules(&self) -> &[TriggeredRule] {
        &self.triggered_rules
    }

    pub fn computed_at(&self) -> DateTime<Utc> {
        self.computed_at
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn recommended_action(&self) -> RecommendedAction {
        self.risk_tier.recommended_action()
    }

    pub fn retention_days(&self) -> u32 {
        self.risk_tier.retention_days()
    }

    pub fn is_acceptable(&self) -> bool {
        self.value <= ACCEPTABLE_MAX
    }

    pub fn requires_review(&self) -> bool {
        self.value > ACCEPTABLE_MAX && self.value <= REVIEW_MAX
    }

    pub fn should_block(&self) -> bool {
        self.value > REVIEW_MAX
    }

    pub fn is_critical(&self) -> bool {
        self.value >= CRITICAL_THRESHOLD
    }

    pub fn is_high_risk(&self) -> bool {
        self.risk_tier >= RiskTier::High
    }

    /// Linear blend: `self * (1 - weight) + other * weight`.
    pub fn combine_with(&self, other: &FraudScore, weight: f64) -> Result<FraudScore> {
        if !(0.0..=1.0).contains(&weight) {
            return Err(PaymentError::InvalidArgument(format!(
                "blend weight {weight} must be within [0, 1]"
            )));
        }
        let blended =
            f64::from(self.value) * (1.0 - weight) + f64::from(other.value) * weight;
        let value = (blended + SCALE_TOLERANCE).floor() as u16;

        let mut factors = self.factors.clone();
        for (name, entry) in &other.factors {
            factors
                .entry(name.clone())
                .or_insert_with(|| entry.clone());
        }

        let mut rules = self.triggered_rules.clone();
        for rule in &other.triggered_rules {
            if !rules.iter().any(|r| r.factor == rule.factor) {
                rules.push(rule.clone());
            }
        }

        Ok(Self::build(value, factors, rules, Utc::now()))
    }

    pub fn apply_penalty(&self, points: u16, reason: &str) -> FraudScore {
        let value = self.value.saturating_add(points).min(MAX_SCORE);
        self.adjusted(value, AdjustmentKind::Penalty, points, reason)
    }

    pub fn apply_bonus(&self, points: u16, reason: &str) -> FraudScore {
        let value = self.value.saturating_sub(points);
        self.adjusted(value, AdjustmentKind::Bonus, points, reason)
    }

    fn adjusted(&self, value: u16, kind: AdjustmentKind, points: u16, reason: &str) -> FraudScore {
        let applied_at = Utc::now();
        let sequence = self
            .factors
            .values()
            .filter(|f| matches!(f, FactorEntry::Adjustment(_)))
            .count()
            + 1;
        let mut factors = self.factors.clone();
        factors.insert(
            format!("adjustment_{sequence}"),
            FactorEntry::Adjustment(ScoreAdjustment {
                kind,
                points,
                reason: reason.to_string(),
                applied_at,
            }),
        );
        let mut score = Self::build(value, factors, self.triggered_rules.clone(), applied_at);
        score.version = self.version.clone();
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn factors(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(FraudScore::new(50).risk_tier(), RiskTier::VeryLow);
        assert_eq!(FraudScore::new(51).risk_tier(), RiskTier::Low);
        assert_eq!(FraudScore::new(150).risk_tier(), RiskTier::Low);
        assert_eq!(FraudScore::new(151).risk_tier(), RiskTier::Medium);
        assert_eq!(FraudScore::new(300).risk_tier(), RiskTier::Medium);
        assert_eq!(FraudScore::new(301).risk_tier(), RiskTier::High);
        assert_eq!(FraudScore::new(600).risk_tier(), RiskTier::High);
        assert_eq!(FraudScore::new(601).risk_tier(), RiskTier::VeryHigh);
        assert_eq!(FraudScore::new(800).risk_tier(), RiskTier::VeryHigh);
    }

    #[test]
    fn test_critical_tier_and_predicate_differ() {
        let s801 = FraudScore::new(801);
        assert_eq!(s801.risk_tier(), RiskTier::Critical);
        assert!(!s801.is_critical());

        let s899 = FraudScore::new(899);
        assert_eq!(s899.risk_tier(), RiskTier::Critical);
        assert!(!s899.is_critical());

        let s900 = FraudScore::new(900);
        assert_eq!(s900.risk_tier(), RiskTier::Critical);
        assert!(s900.is_critical());
    }

    #[test]
    fn test_decision_predicates() {
        assert!(FraudScore::new(300).is_acceptable());
        assert!(!FraudScore::new(300).requires_review());
        assert!(FraudScore::new(301).requires_review());
        assert!(FraudScore::new(600).requires_review());
        assert!(!FraudScore::new(600).should_block());
        assert!(FraudScore::new(601).should_block());
        assert!(!FraudScore::new(601).requires_review());
    }

    #[test]
    fn test_actions_and_retention() {
        let expectations = [
            (10, RecommendedAction::Approve, 30),
            (100, RecommendedAction::Approve, 60),
            (200, RecommendedAction::Review, 180),
            (400, RecommendedAction::Challenge, 365),
            (700, RecommendedAction::ManualReview, 1095),
            (950, RecommendedAction::Block, 1095),
        ];
        for (value, action, days) in expectations {
            let score = FraudScore::new(value);
            assert_eq!(score.recommended_action(), action, "value {value}");
            assert_eq!(score.retention_days(), days, "value {value}");
        }
    }

    #[test]
    fn test_clamping() {
        assert_eq!(FraudScore::new(-5).value(), 0);
        assert_eq!(FraudScore::new(5000).value(), 1000);

        let score = FraudScore::calculate(&factors(&[("velocity_score", 3.5)]), None);
        assert_eq!(score.value(), 1000);
        let score = FraudScore::calculate(&factors(&[("velocity_score", -1.0)]), None);
        assert_eq!(score.value(), 0);
    }

    #[test]
    fn test_single_factor_full_weight() {
        let mut weights = BTreeMap::new();
        weights.insert("amount_score".to_string(), 1.0);
        for v in [0.0, 0.001, 0.15, 0.29, 0.3, 0.57, 0.999, 1.0] {
            let score = FraudScore::calculate(&factors(&[("amount_score", v)]), Some(&weights));
            assert_eq!(score.value(), (v * 1000.0).round() as u16, "value {v}");
        }
    }

    #[test]
    fn test_weighted_average_with_defaults() {
        let score = FraudScore::calculate(
            &factors(&[("velocity_score", 1.0), ("amount_score", 1.0)]),
            None,
        );
        assert_eq!(score.value(), 1000);
        assert!(score.should_block());

        // (0.25 * 0.8 + 0.20 * 0.2) / 0.45 = 0.5333..
        let score = FraudScore::calculate(
            &factors(&[("velocity_score", 0.8), ("geolocation_score", 0.2)]),
            None,
        );
        assert_eq!(score.value(), 533);
    }

    #[test]
    fn test_unknown_factor_gets_minimal_weight() {
        assert_eq!(default_weight("shipping_mismatch"), 0.05);
        // (0.25 * 0.0 + 0.05 * 1.0) / 0.30
        let score = FraudScore::calculate(
            &factors(&[("velocity_score", 0.0), ("shipping_mismatch", 1.0)]),
            None,
        );
        assert_eq!(score.value(), 166);
    }

    #[test]
    fn test_triggered_rules() {
        let score = FraudScore::calculate(
            &factors(&[
                ("velocity_score", 0.71),
                ("amount_score", 0.7),
                ("time_score", 0.9),
            ]),
            None,
        );
        let triggered: Vec<&str> = score
            .triggered_rules()
            .iter()
            .map(|r| r.factor.as_str())
            .collect();
        assert_eq!(triggered, vec!["time_score", "velocity_score"]);
        assert_eq!(score.triggered_rules()[1].weight, 0.25);
    }

    #[test]
    fn test_empty_factors_land_in_very_low_bucket() {
        let empty = BTreeMap::new();
        let mut rng = StdRng::seed_from_u64(7);
        let first = FraudScore::calculate_with_rng(&empty, None, &mut rng);
        assert_eq!(first.risk_tier(), RiskTier::VeryLow);

        let mut replay = StdRng::seed_from_u64(7);
        let second = FraudScore::calculate_with_rng(&empty, None, &mut replay);
        assert_eq!(first.value(), second.value());

        for _ in 0..100 {
            assert!(FraudScore::calculate(&empty, None).value() <= 50);
        }
    }

    #[test]
    fn test_combine_with() {
        let low = FraudScore::calculate(&factors(&[("velocity_score", 0.1)]), None);
        let high = FraudScore::calculate(&factors(&[("time_score", 0.9)]), None);

        let blended = low.combine_with(&high, 0.5).unwrap();
        assert_eq!(blended.value(), 500);
        assert_eq!(blended.risk_tier(), RiskTier::High);
        assert_eq!(blended.triggered_rules().len(), 1);
        assert!(blended.factors().contains_key("velocity_score"));
        assert!(blended.factors().contains_key("time_score"));

        assert_eq!(low.combine_with(&high, 0.0).unwrap().value(), 100);
        assert_eq!(low.combine_with(&high, 1.0).unwrap().value(), 900);
        assert!(matches!(
            low.combine_with(&high, 1.5),
            Err(PaymentError::InvalidArgument(_))
        ));
        assert!(low.combine_with(&high, f64::NAN).is_err());
    }

    #[test]
    fn test_penalty_and_bonus_are_pure() {
        let base = FraudScore::new(140);
        let penalized = base.apply_penalty(20, "new device");
        assert_eq!(base.value(), 140);
        assert_eq!(base.risk_tier(), RiskTier::Low);
        assert_eq!(penalized.value(), 160);
        assert_eq!(penalized.risk_tier(), RiskTier::Medium);
        assert!(matches!(
            penalized.factors().get("adjustment_1"),
            Some(FactorEntry::Adjustment(ScoreAdjustment {
                kind: AdjustmentKind::Penalty,
                points: 20,
                ..
            }))
        ));

        let rewarded = penalized.apply_bonus(500, "trusted customer");
        assert_eq!(rewarded.value(), 0);
        assert!(rewarded.factors().contains_key("adjustment_2"));

        assert_eq!(FraudScore::new(990).apply_penalty(50, "x").value(), 1000);
    }

    #[test]
    fn test_serde_round_trip_keeps_adjustments() {
        let score = FraudScore::calculate(&factors(&[("amount_score", 0.4)]), None)
            .apply_penalty(10, "manual flag");
        let json = serde_json::to_string(&score).unwrap();
        let back: FraudScore = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value(), score.value());
        assert_eq!(back.risk_tier(), score.risk_tier());
        assert_eq!(back.computed_at(), score.computed_at());
        assert!(matches!(
            back.factors().get("adjustment_1"),
            Some(FactorEntry::Adjustment(_))
        ));
        assert!(matches!(
            back.factors().get("amount_score"),
            Some(FactorEntry::Score(_))
        ));
    }

    #[test]
    fn test_deserialize_rejects_inconsistent_scores() {
        let mut json = serde_json::to_value(FraudScore::new(100)).unwrap();
        json["risk_tier"] = serde_json::json!("critical");
        assert!(serde_json::from_value::<FraudScore>(json).is_err());

        let mut json = serde_json::to_value(FraudScore::new(1000)).unwrap();
        json["value"] = serde_json::json!(1001);
        assert!(serde_json::from_value::<FraudScore>(json).is_err());

        let json = serde_json::to_value(FraudScore::new(850)).unwrap();
        let back: FraudScore = serde_json::from_value(json).unwrap();
        assert_eq!(back.risk_tier(), RiskTier::Critical);
    }
}
