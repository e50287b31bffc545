use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;

use rfpdesk_core::collaborators::{ExtractedQuote, QuoteExtractionError, QuoteExtractor};

use crate::conversation::{currency_code, parse_money};
use crate::llm::{extract_json_object, LlmClient};

const DEFAULT_CURRENCY: &str = "USD";

const PRICE_WORDS: [&str; 14] = [
    "price", "priced", "quote", "quoted", "quotation", "cost", "costs", "charge", "total", "for",
    "at", "amount", "offer", "give",
];

/// Reads amounts written with currency symbols, codes or words, `k`/`m` suffixes and
/// thousands separators. Bare numbers count only next to a price word. The largest
/// amount found is the primary quote.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicQuoteExtractor;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuoteCandidate {
    pub amount: Decimal,
    pub currency: Option<&'static str>,
}

impl HeuristicQuoteExtractor {
    pub fn candidates(&self, text: &str) -> Vec<QuoteCandidate> {
        let tokens = text
            .split_whitespace()
            .map(|raw| {
                raw.trim_matches(|c: char| matches!(c, ',' | ';' | ':' | '!' | '?' | '(' | ')' | '"' | '*'))
                    .trim_end_matches('.')
                    .to_lowercase()
            })
            .filter(|token| !token.is_empty())
            .collect::<Vec<_>>();

        let mut candidates = Vec::new();
        for (index, token) in tokens.iter().enumerate() {
            // `usd5000` and `5000usd`
            let (token, glued) = split_glued_code(token);
            let Some((amount, symbol)) = parse_money(token) else {
                continue;
            };
            let neighbour = |offset: isize| {
                index
                    .checked_add_signed(offset)
                    .and_then(|position| tokens.get(position))
                    .and_then(|word| currency_code(word))
            };
            let currency = symbol.or(glued).or_else(|| neighbour(1)).or_else(|| neighbour(-1));
            let priced = tokens[index.saturating_sub(3)..index]
                .iter()
                .any(|word| PRICE_WORDS.contains(&word.as_str()));
            if currency.is_some() || priced {
                candidates.push(QuoteCandidate { amount, currency });
            }
        }
        candidates
    }
}

#[async_trait]
impl QuoteExtractor for HeuristicQuoteExtractor {
    async fn extract(&self, text: &str) -> Result<ExtractedQuote, QuoteExtractionError> {
        let primary = self
            .candidates(text)
            .into_iter()
            .max_by(|left, right| left.amount.cmp(&right.amount))
            .ok_or(QuoteExtractionError::NoAmount)?;
        Ok(ExtractedQuote {
            amount: Some(primary.amount),
            currency: Some(primary.currency.unwrap_or(DEFAULT_CURRENCY).to_string()),
        })
    }
}

fn split_glued_code(token: &str) -> (&str, Option<&'static str>) {
    for code in ["usd", "eur", "gbp", "inr"] {
        if let Some(rest) = token.strip_prefix(code).filter(|rest| rest.starts_with(|c: char| c.is_ascii_digit())) {
            return (rest, currency_code(code));
        }
        if let Some(rest) = token.strip_suffix(code).filter(|rest| rest.ends_with(|c: char| c.is_ascii_digit())) {
            return (rest, currency_code(code));
        }
    }
    (token, None)
}

/// Asks the model for `primary_quotation {amount, currency}`.
pub struct LlmQuoteExtractor {
    llm: Arc<dyn LlmClient>,
}

impl LlmQuoteExtractor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn prompt(text: &str) -> String {
        format!(
            "Extract the quoted price from this vendor reply to a request for proposal.\n\n\
             Email text:\n{text}\n\n\
             Reply with JSON: {{\"quotations\": [{{\"amount\": \"40000.00\", \"currency\": \"USD\", \"context\": \"...\"}}], \
             \"primary_quotation\": {{\"amount\": \"40000.00\", \"currency\": \"USD\"}}}}\n\
             Amounts carry no symbols or separators. Currencies are ISO codes; assume USD when none is stated.\n\
             The primary quotation is the largest or most important amount. \
             Use \"primary_quotation\": null when the reply names no price."
        )
    }
}

#[async_trait]
impl QuoteExtractor for LlmQuoteExtractor {
    async fn extract(&self, text: &str) -> Result<ExtractedQuote, QuoteExtractionError> {
        if text.trim().is_empty() {
            return Err(QuoteExtractionError::NoAmount);
        }
        let raw = self
            .llm
            .complete(&Self::prompt(text))
            .await
            .map_err(|error| QuoteExtractionError::Unavailable(format!("{error:#}")))?;
        let parsed = extract_json_object(&raw)
            .ok_or_else(|| QuoteExtractionError::Malformed("reply carried no JSON object".to_string()))?;

        let primary = match parsed.get("primary_quotation") {
            None | Some(Value::Null) => return Err(QuoteExtractionError::NoAmount),
            Some(primary) => primary,
        };
        let amount = match primary.get("amount") {
            Some(Value::String(raw)) => Decimal::from_str(&raw.replace(',', ""))
                .map_err(|_| QuoteExtractionError::Malformed(format!("amount `{raw}`")))?,
            Some(Value::Number(number)) => Decimal::from_str(&number.to_string())
                .map_err(|_| QuoteExtractionError::Malformed(format!("amount `{number}`")))?,
            _ => return Err(QuoteExtractionError::NoAmount),
        };
        if amount <= Decimal::ZERO {
            let reason = format!("amount `{amount}` is not positive");
            return Err(QuoteExtractionError::Malformed(reason));
        }
        let currency = primary
            .get("currency")
            .and_then(Value::as_str)
            .map(|code| code.trim().to_uppercase())
            .filter(|code| !code.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        Ok(ExtractedQuote { amount: Some(amount), currency: Some(currency) })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;

    use rust_decimal::Decimal;

    use rfpdesk_core::collaborators::{QuoteExtractionError, QuoteExtractor};

    use super::{HeuristicQuoteExtractor, LlmQuoteExtractor};
    use crate::llm::tests::ScriptedLlm;

    fn decimal(raw: &str) -> Decimal {
        Decimal::from_str(raw).expect("decimal")
    }

    #[tokio::test]
    async fn heuristic_reads_common_price_phrasings() {
        let cases = [
            ("We can do $14,500 for the full order.", "14500", "USD"),
            ("Our price is 15k EUR, delivery in 3 weeks", "15000", "EUR"),
            ("Total: 1,200.50 pounds", "1200.50", "GBP"),
            ("I can give you the lot for 40000", "40000", "USD"),
            ("Quote attached: INR 2.5m including taxes", "2500000", "INR"),
            ("usd9800 all in", "9800", "USD"),
        ];
        for (text, amount, currency) in cases {
            let quote = HeuristicQuoteExtractor.extract(text).await.expect(text);
            assert_eq!(quote.amount, Some(decimal(amount)), "{text}");
            assert_eq!(quote.currency.as_deref(), Some(currency), "{text}");
        }
    }

    #[tokio::test]
    async fn heuristic_picks_the_largest_amount_and_ignores_bare_numbers() {
        let quote = HeuristicQuoteExtractor
            .extract("Option A is $900 per unit, the full batch of 20 comes to $18,000.")
            .await
            .expect("quote");
        assert_eq!(quote.amount, Some(decimal("18000")));

        let error = HeuristicQuoteExtractor
            .extract("Thanks, we will revert with 2 options by Friday.")
            .await
            .expect_err("no price");
        assert_eq!(error, QuoteExtractionError::NoAmount);
    }

    #[tokio::test]
    async fn heuristic_treats_out_of_range_amounts_as_no_amount() {
        for text in [
            "Our price is $79228162514264337593543950m",
            "Quoted at 792281625142643375935439504k USD",
            "Total: $79228162514264337593543950336",
            "We can do it for $0",
            "Our price is -500 USD",
        ] {
            assert_eq!(
                HeuristicQuoteExtractor.extract(text).await,
                Err(QuoteExtractionError::NoAmount),
                "{text}"
            );
        }

        let quote = HeuristicQuoteExtractor
            .extract("Total: $79228162514264337593543950335 or $79228162514264337593543950m")
            .await
            .expect("largest representable amount");
        assert_eq!(quote.amount, Some(Decimal::MAX));
    }

    #[tokio::test]
    async fn llm_extractor_rejects_non_positive_amounts() {
        let llm = ScriptedLlm::replying(&[
            "{\"primary_quotation\": {\"amount\": 0, \"currency\": \"USD\"}}",
            "{\"primary_quotation\": {\"amount\": \"-1200\"}}",
        ]);
        let extractor = LlmQuoteExtractor::new(Arc::new(llm));

        assert!(matches!(extractor.extract("free").await, Err(QuoteExtractionError::Malformed(_))));
        assert!(matches!(extractor.extract("refund").await, Err(QuoteExtractionError::Malformed(_))));
    }

    #[tokio::test]
    async fn llm_extractor_reads_primary_quotation() {
        let llm = ScriptedLlm::replying(&[
            "{\"quotations\": [], \"primary_quotation\": {\"amount\": \"12,000.00\", \"currency\": \"eur\"}}",
            "{\"quotations\": [], \"primary_quotation\": null}",
            "{\"primary_quotation\": {\"amount\": \"about twelve\"}}",
        ]);
        let extractor = LlmQuoteExtractor::new(Arc::new(llm));

        let quote = extractor.extract("12k euros").await.expect("quote");
        assert_eq!(quote.amount, Some(decimal("12000")));
        assert_eq!(quote.currency.as_deref(), Some("EUR"));
        assert_eq!(extractor.extract("no price").await, Err(QuoteExtractionError::NoAmount));
        assert!(matches!(extractor.extract("odd").await, Err(QuoteExtractionError::Malformed(_))));
    }
}
