use rust_decimal::Decimal;

use crate::scoring::{clamp_score, round_score, HUNDRED};

/// Maps a vendor's amount onto a 0..=100 price score relative to the cohort minimum.
///
/// Implementations must give exactly 100 when `amount == cohort_min` and must be
/// monotonically non-increasing in `amount`.
pub trait PriceCurve: Send + Sync {
    fn score(&self, amount: Decimal, cohort_min: Decimal) -> Decimal;
}

/// `100 * cohort_min / amount`, rounded to two places.
///
/// Halving the price doubles the score. Before rounding the curve is strictly
/// decreasing; after it, amounts within rounding distance of each other share a
/// score, and quotes more than 20000x the minimum round down to zero.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReciprocalPriceCurve;

impl PriceCurve for ReciprocalPriceCurve {
    fn score(&self, amount: Decimal, cohort_min: Decimal) -> Decimal {
        if amount <= cohort_min {
            return HUNDRED;
        }
        if cohort_min <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        // ratio < 1 here, so scaling it cannot overflow even near `Decimal::MAX`
        let score = cohort_min
            .checked_div(amount)
            .and_then(|ratio| ratio.checked_mul(HUNDRED))
            .unwrap_or(Decimal::ZERO);
        round_score(clamp_score(score))
    }
}
