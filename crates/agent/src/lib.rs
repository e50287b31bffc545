//! Collaborator adapters for the RFP engine.
//!
//! - `conversation`: draft extraction from chat turns (rule-based or model-backed)
//! - `compose`: vendor email generation from a finished draft
//! - `quotes`: price extraction from vendor replies
//! - `mail`: send and thread-fetch transports
//! - `llm`: the HTTP model client the model-backed adapters share
//!
//! The model only ever proposes text and draft fields. Validation, state changes and
//! scoring stay in the engine.

pub mod compose;
pub mod conversation;
pub mod llm;
pub mod mail;
pub mod quotes;

use std::sync::Arc;

use rfpdesk_core::collaborators::{
    ExtractionService, MailSender, QuoteExtractor, TemplateGenerator, ThreadFetcher,
};
use rfpdesk_core::config::{AppConfig, LlmProvider, MailTransport};

pub use compose::{parse_email_reply, DraftTemplateComposer, LlmTemplateComposer};
pub use conversation::{LlmDraftExtractor, RuleBasedDraftExtractor};
pub use llm::{HttpLlmClient, LlmClient};
pub use mail::{HttpMailGateway, LoopbackMailbox};
pub use quotes::{HeuristicQuoteExtractor, LlmQuoteExtractor};

/// Draft extraction, template generation and quote extraction for one provider.
#[derive(Clone)]
pub struct ModelAdapters {
    pub extraction: Arc<dyn ExtractionService>,
    pub generator: Arc<dyn TemplateGenerator>,
    pub quotes: Arc<dyn QuoteExtractor>,
}

impl ModelAdapters {
    pub fn rule_based(required_fields: Vec<String>) -> Self {
        Self {
            extraction: Arc::new(RuleBasedDraftExtractor::new(required_fields)),
            generator: Arc::new(DraftTemplateComposer),
            quotes: Arc::new(HeuristicQuoteExtractor),
        }
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let required_fields = config.rfp.required_fields.clone();
        if config.llm.provider == LlmProvider::Rules {
            return Ok(Self::rule_based(required_fields));
        }
        let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::from_config(&config.llm)?);
        Ok(Self {
            extraction: Arc::new(LlmDraftExtractor::new(llm.clone(), required_fields)),
            generator: Arc::new(LlmTemplateComposer::new(llm.clone())),
            quotes: Arc::new(LlmQuoteExtractor::new(llm)),
        })
    }
}

/// Send and thread-fetch sides of the configured transport. `loopback` is set when
/// mail stays in process, so callers can inject vendor replies.
#[derive(Clone)]
pub struct MailAdapters {
    pub sender: Arc<dyn MailSender>,
    pub threads: Arc<dyn ThreadFetcher>,
    pub loopback: Option<Arc<LoopbackMailbox>>,
}

impl MailAdapters {
    pub fn loopback() -> Self {
        let mailbox = Arc::new(LoopbackMailbox::default());
        Self { sender: mailbox.clone(), threads: mailbox.clone(), loopback: Some(mailbox) }
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        match config.mail.transport {
            MailTransport::Loopback => Ok(Self::loopback()),
            MailTransport::Gateway => {
                let gateway = Arc::new(HttpMailGateway::from_config(&config.mail)?);
                Ok(Self { sender: gateway.clone(), threads: gateway, loopback: None })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rfpdesk_core::config::{AppConfig, LlmProvider, MailTransport};

    use super::{MailAdapters, ModelAdapters};

    #[test]
    fn defaults_build_offline_adapters() {
        let config = AppConfig::default();
        assert!(ModelAdapters::from_config(&config).is_ok());
        let mail = MailAdapters::from_config(&config).expect("mail");
        assert!(mail.loopback.is_some());
    }

    #[test]
    fn model_and_gateway_settings_are_checked() {
        let mut config = AppConfig::default();
        config.llm.provider = LlmProvider::OpenAi;
        assert!(ModelAdapters::from_config(&config).is_err(), "openai without api key");

        config.mail.transport = MailTransport::Gateway;
        config.mail.gateway_url = Some("https://mail.internal".to_string());
        let mail = MailAdapters::from_config(&config).expect("gateway");
        assert!(mail.loopback.is_none());
    }
}
