use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::warn;

use rfpdesk_core::collaborators::{CollaboratorError, ExtractionResult, ExtractionService};
use rfpdesk_core::domain::session::{ChatTurn, DraftFields, TurnRole};

use crate::llm::{extract_json_object, unavailable, LlmClient};

/// Draft fields the rule-based extractor knows how to fill.
pub const KNOWN_FIELDS: [&str; 6] =
    ["item", "quantity", "budget", "currency", "deadline", "delivery_location"];

const STOP_WORDS: [&str; 21] = [
    "by", "before", "with", "under", "for", "budget", "within", "to", "deliver", "delivered",
    "delivery", "at", "in", "on", "and", "due", "deadline", "ship", "shipped", "is", "asap",
];

const TIMELINE_PHRASES: [&str; 10] = [
    "asap",
    "this week",
    "next week",
    "end of month",
    "this month",
    "next month",
    "this quarter",
    "next quarter",
    "end of year",
    "next year",
];

/// Deterministic extraction: labelled `field: value` lines first, then free-text cues.
#[derive(Clone, Debug)]
pub struct RuleBasedDraftExtractor {
    required_fields: Vec<String>,
}

impl RuleBasedDraftExtractor {
    pub fn new(required_fields: Vec<String>) -> Self {
        Self { required_fields }
    }

    /// Fields mentioned in one message. Nothing here knows about earlier turns.
    pub fn extract_fields(&self, text: &str) -> DraftFields {
        let mut fields = labelled_fields(text);
        let tokens = tokenize(text);

        let budget = find_budget(&tokens);
        if let Some(found) = &budget {
            set_if_absent(&mut fields, "budget", json!(found.amount.normalize().to_string()));
            if let Some(currency) = &found.currency {
                set_if_absent(&mut fields, "currency", json!(currency));
            }
        }
        if let Some(currency) = tokens.iter().find_map(|token| currency_code(&token.lower)) {
            set_if_absent(&mut fields, "currency", json!(currency));
        }

        let skip = budget.as_ref().map(|found| found.index);
        if let Some((quantity, item)) = find_quantity_and_item(&tokens, skip) {
            set_if_absent(&mut fields, "quantity", json!(quantity));
            if let Some(item) = item {
                set_if_absent(&mut fields, "item", json!(item));
            }
        }
        if let Some(deadline) = find_deadline(&tokens) {
            set_if_absent(&mut fields, "deadline", json!(deadline));
        }
        if let Some(location) = find_delivery_location(&tokens) {
            set_if_absent(&mut fields, "delivery_location", json!(location));
        }
        fields
    }

    fn reply(&self, draft: &DraftFields, missing: &[String]) -> String {
        if missing.is_empty() {
            let summary = self
                .required_fields
                .iter()
                .filter_map(|field| draft.get(field).map(|value| format!("{} {}", label(field), display(value))))
                .collect::<Vec<_>>();
            return format!(
                "Thanks, I have everything needed for this RFP ({}). Submit when you are ready and I will draft the vendor email.",
                summary.join(", ")
            );
        }
        let labels = missing.iter().map(|field| label(field)).collect::<Vec<_>>();
        format!("Got it. I still need the {} before I can draft the RFP.", join_natural(&labels))
    }
}

#[async_trait]
impl ExtractionService for RuleBasedDraftExtractor {
    async fn extract(
        &self,
        turns: &[ChatTurn],
        draft: &DraftFields,
    ) -> Result<ExtractionResult, CollaboratorError> {
        let mut draft = draft.clone();
        if let Some(latest) = turns.iter().rev().find(|turn| turn.role == TurnRole::User) {
            for (field, value) in self.extract_fields(&latest.text).iter() {
                draft.insert(field.clone(), value.clone());
            }
        }
        let missing_fields = draft.missing(&self.required_fields);
        Ok(ExtractionResult {
            assistant_reply: self.reply(&draft, &missing_fields),
            draft,
            missing_fields,
        })
    }
}

/// Model-backed extraction. The reply must carry
/// `{assistant_reply, updated_json, missing_fields}`; prose around it is ignored.
pub struct LlmDraftExtractor {
    llm: Arc<dyn LlmClient>,
    required_fields: Vec<String>,
}

impl LlmDraftExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, required_fields: Vec<String>) -> Self {
        Self { llm, required_fields }
    }

    fn prompt(&self, turns: &[ChatTurn], draft: &DraftFields) -> String {
        let conversation = turns
            .iter()
            .map(|turn| format!("{}: {}", turn.role.as_str(), turn.text))
            .collect::<Vec<_>>()
            .join("\n");
        let draft_json =
            serde_json::to_string_pretty(&draft.to_value()).unwrap_or_else(|_| "{}".to_string());
        format!(
            "You help a procurement buyer assemble a request for proposal.\n\
             Conversation so far:\n{conversation}\n\n\
             Current draft (JSON):\n{draft_json}\n\n\
             Required fields: {required}\n\
             Reply with exactly one JSON object of the form\n\
             {{\"assistant_reply\": \"...\", \"updated_json\": {{...}}, \"missing_fields\": [\"...\"]}}\n\
             updated_json must hold the whole draft, including fields already known.\n\
             Ask for the missing required fields in assistant_reply.",
            required = self.required_fields.join(", ")
        )
    }
}

#[async_trait]
impl ExtractionService for LlmDraftExtractor {
    async fn extract(
        &self,
        turns: &[ChatTurn],
        draft: &DraftFields,
    ) -> Result<ExtractionResult, CollaboratorError> {
        let raw = self.llm.complete(&self.prompt(turns, draft)).await.map_err(unavailable)?;
        let Some(parsed) = extract_json_object(&raw) else {
            warn!(event_name = "agent.extraction.unparsed", "model reply carried no json object");
            return Err(CollaboratorError::Rejected("model reply carried no JSON object".to_string()));
        };

        let mut updated = draft.clone();
        if let Some(Value::Object(fields)) = parsed.get("updated_json") {
            for (field, value) in fields {
                updated.insert(field.clone(), value.clone());
            }
        }

        let mut missing_fields = updated.missing(&self.required_fields);
        if let Some(Value::Array(listed)) = parsed.get("missing_fields") {
            for field in listed.iter().filter_map(Value::as_str) {
                if !updated.is_met(field) && !missing_fields.iter().any(|known| known == field) {
                    missing_fields.push(field.to_string());
                }
            }
        }

        let assistant_reply = parsed
            .get("assistant_reply")
            .and_then(Value::as_str)
            .filter(|reply| !reply.trim().is_empty())
            .unwrap_or("Noted. Tell me more about the request.")
            .to_string();
        Ok(ExtractionResult { assistant_reply, draft: updated, missing_fields })
    }
}

#[derive(Clone, Debug)]
struct Token {
    original: String,
    lower: String,
}

fn tokenize(text: &str) -> Vec<Token> {
    text.split_whitespace()
        .map(|raw| raw.trim_matches(|c: char| matches!(c, ',' | ';' | ':' | '!' | '?' | '(' | ')' | '"')))
        .map(|raw| raw.trim_end_matches('.'))
        .filter(|raw| !raw.is_empty())
        .map(|raw| Token { original: raw.to_string(), lower: raw.to_lowercase() })
        .collect()
}

fn labelled_fields(text: &str) -> DraftFields {
    let mut fields = DraftFields::new();
    for line in text.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let Some(field) = field_for_label(label) else {
            continue;
        };
        match field {
            "budget" => {
                let tokens = tokenize(value);
                match tokens.iter().find_map(|token| parse_money(&token.lower)) {
                    Some((amount, symbol_currency)) => {
                        fields.insert("budget", json!(amount.normalize().to_string()));
                        let currency = symbol_currency
                            .or_else(|| tokens.iter().find_map(|token| currency_code(&token.lower)));
                        if let Some(currency) = currency {
                            set_if_absent(&mut fields, "currency", json!(currency));
                        }
                    }
                    None => fields.insert("budget", json!(value)),
                }
            }
            "quantity" => match value.replace(',', "").parse::<u64>() {
                Ok(quantity) => fields.insert("quantity", json!(quantity)),
                Err(_) => fields.insert("quantity", json!(value)),
            },
            "currency" => {
                let code = currency_code(&value.to_lowercase()).unwrap_or(value);
                fields.insert("currency", json!(code.to_uppercase()));
            }
            other => fields.insert(other, json!(value)),
        }
    }
    fields
}

fn field_for_label(label: &str) -> Option<&'static str> {
    let normalized = label.trim().to_lowercase().replace(['_', '-'], " ");
    let field = match normalized.as_str() {
        "item" | "items" | "product" | "products" => "item",
        "quantity" | "qty" | "units" => "quantity",
        "budget" | "max budget" => "budget",
        "currency" => "currency",
        "deadline" | "due" | "due date" | "delivery date" | "needed by" => "deadline",
        "delivery location" | "location" | "deliver to" | "ship to" | "address" => "delivery_location",
        _ => return None,
    };
    Some(field)
}

struct BudgetMatch {
    index: usize,
    amount: Decimal,
    currency: Option<String>,
}

fn find_budget(tokens: &[Token]) -> Option<BudgetMatch> {
    let context = ["budget", "under", "below", "max", "maximum", "within", "spend", "cap", "upto"];
    tokens.iter().enumerate().find_map(|(index, token)| {
        let has_symbol = token.lower.starts_with(['$', '€', '£', '₹']);
        let in_context = tokens[index.saturating_sub(3)..index]
            .iter()
            .any(|previous| context.contains(&previous.lower.as_str()));
        if !has_symbol && !in_context {
            return None;
        }
        let (amount, symbol_currency) = parse_money(&token.lower)?;
        let currency = symbol_currency
            .or_else(|| tokens.get(index + 1).and_then(|next| currency_code(&next.lower)));
        Some(BudgetMatch { index, amount, currency: currency.map(str::to_string) })
    })
}

/// `$15k`, `15,000`, `€1.2m`. The currency comes back only when a symbol carried it.
pub(crate) fn parse_money(token: &str) -> Option<(Decimal, Option<&'static str>)> {
    let (symbol_currency, rest) = match token.chars().next()? {
        '$' => (Some("USD"), &token[1..]),
        '€' => (Some("EUR"), &token['€'.len_utf8()..]),
        '£' => (Some("GBP"), &token['£'.len_utf8()..]),
        '₹' => (Some("INR"), &token['₹'.len_utf8()..]),
        _ => (None, token),
    };
    let rest = rest.replace(',', "");
    let (number, multiplier) = if let Some(prefix) = rest.strip_suffix('k') {
        (prefix.to_string(), Decimal::from(1_000))
    } else if let Some(prefix) = rest.strip_suffix('m') {
        (prefix.to_string(), Decimal::from(1_000_000))
    } else {
        (rest, Decimal::ONE)
    };
    if !number.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let amount = Decimal::from_str(&number).ok()?.checked_mul(multiplier)?;
    (amount > Decimal::ZERO).then_some((amount, symbol_currency))
}

/// ISO code for a currency code or word, if the token is one.
pub(crate) fn currency_code(token: &str) -> Option<&'static str> {
    let code = match token {
        "usd" | "dollar" | "dollars" | "us$" => "USD",
        "eur" | "euro" | "euros" => "EUR",
        "gbp" | "pound" | "pounds" => "GBP",
        "inr" | "rupee" | "rupees" | "rs" => "INR",
        "cad" => "CAD",
        "aud" => "AUD",
        "jpy" | "yen" => "JPY",
        _ => return None,
    };
    Some(code)
}

fn find_quantity_and_item(tokens: &[Token], skip: Option<usize>) -> Option<(u64, Option<String>)> {
    tokens.iter().enumerate().find_map(|(index, token)| {
        if Some(index) == skip || token.lower.starts_with(['$', '€', '£', '₹']) {
            return None;
        }
        let quantity = token.lower.replace(',', "").parse::<u64>().ok()?;
        let next = tokens.get(index + 1)?;
        if currency_code(&next.lower).is_some() || STOP_WORDS.contains(&next.lower.as_str()) {
            return None;
        }

        let mut start = index + 1;
        if tokens.get(index + 2).is_some_and(|of| of.lower == "of") {
            start = index + 3;
        }
        let item = tokens[start.min(tokens.len())..]
            .iter()
            .take_while(|word| !STOP_WORDS.contains(&word.lower.as_str()))
            .take(6)
            .map(|word| word.original.as_str())
            .collect::<Vec<_>>();
        Some((quantity, (!item.is_empty()).then(|| item.join(" "))))
    })
}

fn find_deadline(tokens: &[Token]) -> Option<String> {
    if let Some(date) = tokens
        .iter()
        .find_map(|token| NaiveDate::parse_from_str(&token.lower, "%Y-%m-%d").ok())
    {
        return Some(date.format("%Y-%m-%d").to_string());
    }

    let lowered = tokens.iter().map(|token| token.lower.as_str()).collect::<Vec<_>>().join(" ");
    if let Some(phrase) = TIMELINE_PHRASES.iter().find(|phrase| lowered.contains(**phrase)) {
        return Some((*phrase).to_string());
    }

    let position = tokens
        .iter()
        .position(|token| matches!(token.lower.as_str(), "by" | "before" | "deadline" | "due"))?;
    let phrase = tokens[position + 1..]
        .iter()
        .take_while(|word| !STOP_WORDS.contains(&word.lower.as_str()))
        .take(4)
        .map(|word| word.original.as_str())
        .collect::<Vec<_>>();
    (!phrase.is_empty()).then(|| phrase.join(" "))
}

fn find_delivery_location(tokens: &[Token]) -> Option<String> {
    let position = tokens.windows(2).position(|pair| {
        matches!(pair[0].lower.as_str(), "deliver" | "delivered" | "delivery" | "ship" | "shipped")
            && matches!(pair[1].lower.as_str(), "to" | "at")
    })?;
    let place = tokens[position + 2..]
        .iter()
        .take_while(|word| {
            !matches!(word.lower.as_str(), "by" | "before" | "with" | "budget" | "within" | "and" | "for")
        })
        .take(5)
        .map(|word| word.original.as_str())
        .collect::<Vec<_>>();
    (!place.is_empty()).then(|| place.join(" "))
}

fn set_if_absent(fields: &mut DraftFields, field: &str, value: Value) {
    if !fields.is_met(field) {
        fields.insert(field, value);
    }
}

pub(crate) fn label(field: &str) -> String {
    field.replace('_', " ")
}

pub(crate) fn display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(", "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn join_natural(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [head @ .., last] => format!("{} and {last}", head.join(", ")),
    }
}
