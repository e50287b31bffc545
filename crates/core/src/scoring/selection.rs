use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::domain::quotation::Quotation;
use crate::domain::vendor::VendorId;

/// Lowest non-null amount per vendor. Vendors with only unpriced replies are absent.
pub fn scored_amounts(quotations: &[Quotation]) -> BTreeMap<VendorId, Decimal> {
    let mut amounts = BTreeMap::new();
    for quotation in quotations {
        let Some(amount) = quotation.quoted_amount else {
            continue;
        };
        amounts
            .entry(quotation.key.vendor_id)
            .and_modify(|current: &mut Decimal| *current = (*current).min(amount))
            .or_insert(amount);
    }
    amounts
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LowestQuote {
    pub vendor_id: VendorId,
    pub amount: Decimal,
    pub quotation: Quotation,
}

/// Raw lowest-quote selection used when a template has no scores yet.
///
/// Per vendor the quotation with the minimum amount wins, the earliest one on
/// equal amounts. Vendors are then ordered by that amount ascending, ties by
/// the winning quotation's `received_at`, then by vendor id.
pub fn lowest_quotes(quotations: &[Quotation]) -> Vec<LowestQuote> {
    let mut best: BTreeMap<VendorId, &Quotation> = BTreeMap::new();
    for quotation in quotations.iter().filter(|quotation| quotation.is_priced()) {
        best.entry(quotation.key.vendor_id)
            .and_modify(|current| {
                if beats(quotation, *current) {
                    *current = quotation;
                }
            })
            .or_insert(quotation);
    }

    let mut selected = best
        .into_iter()
        .filter_map(|(vendor_id, quotation)| {
            quotation.quoted_amount.map(|amount| LowestQuote {
                vendor_id,
                amount,
                quotation: quotation.clone(),
            })
        })
        .collect::<Vec<_>>();

    selected.sort_by(|left, right| {
        left.amount
            .cmp(&right.amount)
            .then_with(|| left.quotation.received_at.cmp(&right.quotation.received_at))
            .then_with(|| left.vendor_id.cmp(&right.vendor_id))
    });
    selected
}

fn beats(candidate: &Quotation, current: &Quotation) -> bool {
    match (candidate.quoted_amount, current.quoted_amount) {
        (Some(candidate_amount), Some(current_amount)) => {
            candidate_amount < current_amount
                || (candidate_amount == current_amount && candidate.received_at < current.received_at)
        }
        (Some(_), None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{lowest_quotes, scored_amounts};
    use crate::domain::dispatch::DispatchKey;
    use crate::domain::quotation::{MessageId, Quotation, QuotationId};
    use crate::domain::template::TemplateId;
    use crate::domain::vendor::VendorId;

    fn quotation(vendor: i64, message: &str, amount: Option<i64>, minutes: i64) -> Quotation {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid timestamp");
        Quotation {
            id: QuotationId(format!("Q-{message}")),
            key: DispatchKey::new(TemplateId("T-1".to_owned()), VendorId(vendor)),
            message_id: MessageId(message.to_owned()),
            subject: "Re: RFP".to_owned(),
            body: String::new(),
            quoted_amount: amount.map(|value| Decimal::new(value, 0)),
            currency: amount.map(|_| "USD".to_owned()),
            received_at: base + Duration::minutes(minutes),
            is_reviewed: false,
            notes: None,
        }
    }

    #[test]
    fn lowest_quote_fallback_orders_vendors_by_amount() {
        let quotations = vec![
            quotation(2, "b1", Some(15_000), 0),
            quotation(1, "a1", Some(16_000), 1),
            quotation(1, "a2", Some(14_500), 2),
            quotation(3, "c1", None, 3),
        ];

        let lowest = lowest_quotes(&quotations);
        let order = lowest.iter().map(|entry| entry.vendor_id.0).collect::<Vec<_>>();
        assert_eq!(order, vec![1, 2]);
        assert_eq!(lowest[0].quotation.message_id.0, "a2");
        assert_eq!(lowest[0].amount, Decimal::new(14_500, 0));
    }

    #[test]
    fn equal_amounts_break_ties_by_earliest_receipt_then_vendor() {
        let quotations = vec![
            quotation(7, "late", Some(900), 30),
            quotation(7, "early", Some(900), 5),
            quotation(4, "v4", Some(900), 10),
            quotation(2, "v2", Some(900), 10),
        ];

        let lowest = lowest_quotes(&quotations);
        assert_eq!(lowest[0].vendor_id, VendorId(7));
        assert_eq!(lowest[0].quotation.message_id.0, "early");
        let rest = lowest[1..].iter().map(|entry| entry.vendor_id.0).collect::<Vec<_>>();
        assert_eq!(rest, vec![2, 4]);
    }

    #[test]
    fn scored_amounts_skip_unpriced_vendors() {
        let quotations = vec![
            quotation(1, "a1", Some(300), 0),
            quotation(1, "a2", Some(250), 1),
            quotation(2, "b1", None, 2),
        ];

        let amounts = scored_amounts(&quotations);
        assert_eq!(amounts.len(), 1);
        assert_eq!(amounts.get(&VendorId(1)), Some(&Decimal::new(250, 0)));
    }
}
