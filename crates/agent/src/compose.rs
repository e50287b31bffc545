use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use rfpdesk_core::collaborators::{CollaboratorError, TemplateGenerator};
use rfpdesk_core::domain::session::{DraftFields, SessionId, TemplateProposal};

use crate::conversation::{display, label, KNOWN_FIELDS};
use crate::llm::{strip_code_fence, unavailable, LlmClient};

/// Builds the vendor email straight from the draft. Output carries the
/// `{{ vendor_name }}` placeholder that dispatch fills per vendor.
#[derive(Clone, Copy, Debug, Default)]
pub struct DraftTemplateComposer;

impl DraftTemplateComposer {
    pub fn compose(&self, draft: &DraftFields) -> TemplateProposal {
        let subject = match draft.get("item").map(display).filter(|item| !item.trim().is_empty()) {
            Some(item) => format!("Request for Proposal: {item}"),
            None => "Request for Proposal".to_string(),
        };

        let known = KNOWN_FIELDS
            .iter()
            .filter(|field| draft.is_met(field))
            .filter_map(|field| draft.get(field).map(|value| (field.to_string(), value)));
        let extra = draft
            .iter()
            .filter(|(field, _)| !KNOWN_FIELDS.contains(&field.as_str()) && draft.is_met(field))
            .map(|(field, value)| (field.clone(), value));
        let lines = known
            .chain(extra)
            .map(|(field, value)| format!("- {}: {}", capitalize(&label(&field)), display(value)))
            .collect::<Vec<_>>()
            .join("\n");

        let body = format!(
            "Dear {{{{ vendor_name }}}},\n\n\
             We are requesting a quotation for the following requirement:\n\n\
             {lines}\n\n\
             Please reply to this email with your best price, including currency and delivery terms.\n\n\
             Best regards"
        );
        TemplateProposal { subject, body }
    }
}

#[async_trait]
impl TemplateGenerator for DraftTemplateComposer {
    async fn generate(
        &self,
        _session_id: &SessionId,
        draft: &DraftFields,
    ) -> Result<TemplateProposal, CollaboratorError> {
        Ok(self.compose(draft))
    }
}

pub struct LlmTemplateComposer {
    llm: Arc<dyn LlmClient>,
}

impl LlmTemplateComposer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn prompt(draft: &DraftFields) -> String {
        let rfp_json =
            serde_json::to_string_pretty(&draft.to_value()).unwrap_or_else(|_| "{}".to_string());
        format!(
            "Write a professional request-for-proposal email to a vendor for this requirement:\n\
             {rfp_json}\n\n\
             Address the vendor as {{{{ vendor_name }}}} and their company as {{{{ vendor_company }}}}.\n\
             Ask for a price with currency and delivery terms.\n\
             Reply with JSON {{\"subject\": \"...\", \"template_body\": \"...\"}}."
        )
    }
}

#[async_trait]
impl TemplateGenerator for LlmTemplateComposer {
    async fn generate(
        &self,
        session_id: &SessionId,
        draft: &DraftFields,
    ) -> Result<TemplateProposal, CollaboratorError> {
        let raw = self.llm.complete(&Self::prompt(draft)).await.map_err(unavailable)?;
        parse_email_reply(&raw).ok_or_else(|| {
            warn!(
                event_name = "agent.compose.unparsed",
                session_id = %session_id.0,
                "model reply carried no subject and body"
            );
            CollaboratorError::Rejected("model reply carried no subject and body".to_string())
        })
    }
}

/// Reads `{"subject", "template_body"}` JSON or `Subject:` / `Body:` sections.
/// `None` unless both parts are non-blank.
pub fn parse_email_reply(raw: &str) -> Option<TemplateProposal> {
    let cleaned = strip_code_fence(raw);

    let (subject, body) = if cleaned.starts_with('{') {
        let parsed: Value = serde_json::from_str(cleaned).ok()?;
        let field = |name: &str| parsed.get(name).and_then(Value::as_str).unwrap_or_default().to_string();
        (field("subject"), field("template_body"))
    } else {
        let mut subject = String::new();
        let mut body_lines = Vec::new();
        let mut in_body = false;
        for line in cleaned.lines() {
            let lowered = line.trim().to_lowercase();
            if !in_body && lowered.starts_with("subject:") {
                subject = line.trim()["subject:".len()..].trim().to_string();
            } else if !in_body && (lowered.starts_with("body:") || lowered.starts_with("template_body:")) {
                in_body = true;
                let rest = line.trim().split_once(':').map(|(_, rest)| rest.trim()).unwrap_or_default();
                if !rest.is_empty() {
                    body_lines.push(rest.to_string());
                }
            } else if in_body {
                body_lines.push(line.trim_end().to_string());
            }
        }
        (subject, body_lines.join("\n").trim().to_string())
    };

    (!subject.trim().is_empty() && !body.trim().is_empty())
        .then(|| TemplateProposal { subject: subject.trim().to_string(), body })
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
