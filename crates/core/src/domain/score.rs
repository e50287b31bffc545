use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::template::TemplateId;
use crate::domain::vendor::VendorId;

/// One row of a template's ranking. A template's rows are always written as a whole set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorScore {
    pub template_id: TemplateId,
    pub vendor_id: VendorId,
    pub price_score: Decimal,
    pub quality_score: Decimal,
    pub final_score: Decimal,
    /// 1-based
    pub rank: u32,
    /// The vendor's lowest quoted amount, the price input.
    pub scored_amount: Decimal,
    pub computed_at: DateTime<Utc>,
}
