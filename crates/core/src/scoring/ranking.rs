use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::score::VendorScore;
use crate::domain::template::TemplateId;
use crate::domain::vendor::VendorId;
use crate::scoring::price::PriceCurve;
use crate::scoring::{clamp_score, round_score};

/// One vendor entering a scoring run: its lowest quoted amount and its quality score.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScoringCandidate {
    pub vendor_id: VendorId,
    pub amount: Decimal,
    pub quality_score: Decimal,
}

/// Full ranking for a template's cohort. Ordered by final score descending, then
/// vendor id ascending; ranks are 1-based and contiguous.
pub fn rank_vendors<C>(
    template_id: &TemplateId,
    candidates: &[ScoringCandidate],
    curve: &C,
    computed_at: DateTime<Utc>,
) -> Vec<VendorScore>
where
    C: PriceCurve + ?Sized,
{
    let Some(cohort_min) = candidates.iter().map(|candidate| candidate.amount).min() else {
        return Vec::new();
    };
    let half = Decimal::new(5, 1);

    let mut scores = candidates
        .iter()
        .map(|candidate| {
            let price_score = clamp_score(curve.score(candidate.amount, cohort_min));
            let quality_score = round_score(clamp_score(candidate.quality_score));
            VendorScore {
                template_id: template_id.clone(),
                vendor_id: candidate.vendor_id,
                price_score,
                quality_score,
                final_score: round_score(half * price_score + half * quality_score),
                rank: 0,
                scored_amount: candidate.amount,
                computed_at,
            }
        })
        .collect::<Vec<_>>();

    scores.sort_by(|left, right| {
        right.final_score.cmp(&left.final_score).then_with(|| left.vendor_id.cmp(&right.vendor_id))
    });
    for (index, score) in scores.iter_mut().enumerate() {
        score.rank = index as u32 + 1;
    }
    scores
}
