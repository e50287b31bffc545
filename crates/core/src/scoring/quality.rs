use rust_decimal::Decimal;

use crate::config::ScoringConfig;
use crate::domain::vendor::VendorAttributes;
use crate::scoring::{clamp_score, round_score, HUNDRED};

/// Reputation score for a vendor, independent of price. Must land in 0..=100.
pub trait QualityPolicy: Send + Sync {
    fn score(&self, attributes: &VendorAttributes) -> Decimal;
}

#[derive(Clone, Copy, Debug)]
pub struct WeightedQualityPolicy {
    weights: ScoringConfig,
}

impl WeightedQualityPolicy {
    pub fn new(weights: ScoringConfig) -> Self {
        Self { weights }
    }

    pub fn verification_score(attributes: &VendorAttributes) -> Decimal {
        let mut score = Decimal::ZERO;
        if attributes.email_verified {
            score += Decimal::new(3_333, 2);
        }
        if attributes.phone_verified {
            score += Decimal::new(3_333, 2);
        }
        if attributes.business_verified {
            score += Decimal::new(3_334, 2);
        }
        score
    }

    pub fn rating_score(attributes: &VendorAttributes) -> Decimal {
        let rating = attributes.overall_rating.clamp(Decimal::ZERO, Decimal::new(5, 0));
        rating / Decimal::new(5, 0) * HUNDRED
    }

    pub fn delivery_score(attributes: &VendorAttributes) -> Decimal {
        clamp_score(attributes.on_time_delivery_rate)
    }
}

impl Default for WeightedQualityPolicy {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

impl QualityPolicy for WeightedQualityPolicy {
    fn score(&self, attributes: &VendorAttributes) -> Decimal {
        let verification = Decimal::from(self.weights.verification_weight);
        let rating = Decimal::from(self.weights.rating_weight);
        let delivery = Decimal::from(self.weights.delivery_weight);
        let total_weight = verification + rating + delivery;
        if total_weight.is_zero() {
            return Decimal::ZERO;
        }

        let weighted = Self::verification_score(attributes) * verification
            + Self::rating_score(attributes) * rating
            + Self::delivery_score(attributes) * delivery;
        round_score(clamp_score(weighted / total_weight))
    }
}
