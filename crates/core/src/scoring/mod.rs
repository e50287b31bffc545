//! Price/quality scoring, ranking and the lowest-quote fallback.
//!
//! Everything here is pure: callers gather quotations and vendor attributes,
//! these functions only do the arithmetic and ordering.

pub mod price;
pub mod quality;
pub mod ranking;
pub mod selection;

use rust_decimal::{Decimal, RoundingStrategy};

pub use price::{PriceCurve, ReciprocalPriceCurve};
pub use quality::{QualityPolicy, WeightedQualityPolicy};
pub use ranking::{rank_vendors, ScoringCandidate};
pub use selection::{lowest_quotes, scored_amounts, LowestQuote};

pub const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Scores are reported to two decimal places, half away from zero.
pub fn round_score(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn clamp_score(value: Decimal) -> Decimal {
    value.clamp(Decimal::ZERO, HUNDRED)
}
