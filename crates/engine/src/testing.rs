//! Scripted collaborators and a wired engine over in-memory repositories.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use rfpdesk_core::audit::InMemoryAuditSink;
use rfpdesk_core::collaborators::{
    CollaboratorError, ExtractedQuote, ExtractionResult, ExtractionService, MailSender,
    MessageDirection, OutboundEmail, QuoteExtractionError, QuoteExtractor, SendReceipt,
    TemplateGenerator, ThreadFetcher, ThreadMessage,
};
use rfpdesk_core::config::ScoringConfig;
use rfpdesk_core::domain::quotation::MessageId;
use rfpdesk_core::domain::session::{AccountId, ChatTurn, DraftFields, SessionId, TemplateProposal};
use rfpdesk_core::domain::template::EmailTemplate;
use rfpdesk_core::domain::vendor::{VendorAttributes, VendorContact, VendorId, VendorProfile};
use rfpdesk_db::repositories::InMemoryVendorDirectory;

use crate::context::CallContext;
use crate::{Collaborators, EngineSettings, Repositories, RfpEngine};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Reads `field: value` lines from the newest user turn into the draft.
#[derive(Default)]
pub struct ScriptedExtraction {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl ExtractionService for ScriptedExtraction {
    async fn extract(
        &self,
        turns: &[ChatTurn],
        draft: &DraftFields,
    ) -> Result<ExtractionResult, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("extraction offline".to_string()));
        }

        let mut draft = draft.clone();
        if let Some(last) = turns.last() {
            for line in last.text.lines() {
                if let Some((field, value)) = line.split_once(':') {
                    draft.insert(field.trim(), Value::String(value.trim().to_string()));
                }
            }
        }
        let required = ["item", "budget", "deadline"].map(String::from);
        let missing_fields = draft.missing(&required);
        Ok(ExtractionResult {
            assistant_reply: format!("Still need: {}", missing_fields.join(", ")),
            draft,
            missing_fields,
        })
    }
}

#[derive(Default)]
pub struct ScriptedGenerator {
    pub fail: AtomicBool,
}

#[async_trait]
impl TemplateGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        _session_id: &SessionId,
        draft: &DraftFields,
    ) -> Result<TemplateProposal, CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("generator offline".to_string()));
        }
        let item = draft.get("item").and_then(Value::as_str).unwrap_or("goods");
        Ok(TemplateProposal {
            subject: format!("RFP: {item}"),
            body: "Dear {{ vendor_name }},\nPlease quote for {{ vendor_company }}.".to_string(),
        })
    }
}

/// Records every email; recipients listed in `fail_for` get a rejection.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutboundEmail>>,
    pub fail_for: Mutex<HashSet<String>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutboundEmail> {
        lock(&self.sent).clone()
    }

    pub fn fail_recipient(&self, email: &str, failing: bool) {
        let mut fail_for = lock(&self.fail_for);
        if failing {
            fail_for.insert(email.to_string());
        } else {
            fail_for.remove(email);
        }
    }
}

#[async_trait]
impl MailSender for RecordingMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, CollaboratorError> {
        tokio::task::yield_now().await;
        if lock(&self.fail_for).contains(&email.to) {
            return Err(CollaboratorError::Rejected(format!("mailbox {} refused", email.to)));
        }
        let mut sent = lock(&self.sent);
        sent.push(email.clone());
        Ok(SendReceipt {
            thread_id: format!("thread-{}", email.to),
            message_id: format!("out-{}", sent.len()),
        })
    }
}

#[derive(Default)]
pub struct ScriptedThreads {
    pub threads: Mutex<HashMap<String, Vec<ThreadMessage>>>,
    pub failing: Mutex<HashSet<String>>,
    pub fetches: Mutex<Vec<(AccountId, String)>>,
}

impl ScriptedThreads {
    pub fn push_reply(&self, thread_id: &str, message_id: &str, body: &str, at: DateTime<Utc>) {
        lock(&self.threads).entry(thread_id.to_string()).or_default().push(ThreadMessage {
            message_id: MessageId(message_id.to_string()),
            direction: MessageDirection::Inbound,
            timestamp: at,
            subject: "Re: RFP".to_string(),
            body: body.to_string(),
        });
    }

    pub fn push_outbound(&self, thread_id: &str, message_id: &str, at: DateTime<Utc>) {
        lock(&self.threads).entry(thread_id.to_string()).or_default().push(ThreadMessage {
            message_id: MessageId(message_id.to_string()),
            direction: MessageDirection::Outbound,
            timestamp: at,
            subject: "RFP".to_string(),
            body: "Price: 1 USD".to_string(),
        });
    }

    pub fn fail_thread(&self, thread_id: &str) {
        lock(&self.failing).insert(thread_id.to_string());
    }
}

#[async_trait]
impl ThreadFetcher for ScriptedThreads {
    async fn fetch_thread(
        &self,
        account: &AccountId,
        thread_id: &str,
    ) -> Result<Vec<ThreadMessage>, CollaboratorError> {
        lock(&self.fetches).push((account.clone(), thread_id.to_string()));
        if lock(&self.failing).contains(thread_id) {
            return Err(CollaboratorError::Unavailable(format!("thread {thread_id} unreachable")));
        }
        Ok(lock(&self.threads).get(thread_id).cloned().unwrap_or_default())
    }
}

/// First whitespace token that parses as a number (commas ignored); `USD` if mentioned.
#[derive(Default)]
pub struct FirstNumberQuotes;

#[async_trait]
impl QuoteExtractor for FirstNumberQuotes {
    async fn extract(&self, text: &str) -> Result<ExtractedQuote, QuoteExtractionError> {
        let amount = text
            .split_whitespace()
            .find_map(|token| Decimal::from_str(&token.replace(',', "")).ok())
            .ok_or(QuoteExtractionError::NoAmount)?;
        Ok(ExtractedQuote {
            amount: Some(amount),
            currency: text.contains("USD").then(|| "USD".to_string()),
        })
    }
}

pub fn vendor(id: i64, name: &str, rating: i64, delivery: i64, verified: bool) -> VendorProfile {
    VendorProfile {
        id: VendorId(id),
        contact: VendorContact {
            name: name.to_string(),
            email: format!("{}@supply.test", name.to_lowercase()),
            phone: None,
            company: Some(format!("{name} Corp")),
            address: None,
        },
        attributes: VendorAttributes {
            email_verified: verified,
            phone_verified: verified,
            business_verified: verified,
            overall_rating: Decimal::new(rating, 1),
            on_time_delivery_rate: Decimal::new(delivery, 0),
        },
    }
}

pub struct Harness {
    pub engine: RfpEngine,
    pub ctx: CallContext,
    pub owner: AccountId,
    pub audit: InMemoryAuditSink,
    pub extraction: Arc<ScriptedExtraction>,
    pub generator: Arc<ScriptedGenerator>,
    pub mailer: Arc<RecordingMailer>,
    pub threads: Arc<ScriptedThreads>,
    pub directory: Arc<InMemoryVendorDirectory>,
}

impl Harness {
    /// Vendors 1 Alpha, 2 Beta and 3 Gamma are in the directory.
    pub async fn new() -> Self {
        Self::with_repositories(Repositories::in_memory()).await
    }

    pub async fn with_repositories(repositories: Repositories) -> Self {
        let audit = InMemoryAuditSink::default();
        let extraction = Arc::new(ScriptedExtraction::default());
        let generator = Arc::new(ScriptedGenerator::default());
        let mailer = Arc::new(RecordingMailer::default());
        let threads = Arc::new(ScriptedThreads::default());
        let directory = Arc::new(InMemoryVendorDirectory::default());
        directory.insert(vendor(1, "Alpha", 45, 95, true)).await;
        directory.insert(vendor(2, "Beta", 40, 90, true)).await;
        directory.insert(vendor(3, "Gamma", 30, 70, false)).await;

        let engine = RfpEngine::new(
            repositories,
            Collaborators {
                extraction: extraction.clone(),
                generator: generator.clone(),
                mail: mailer.clone(),
                threads: threads.clone(),
                directory: directory.clone(),
                quotes: Arc::new(FirstNumberQuotes),
            },
            EngineSettings {
                required_fields: ["item", "budget", "deadline"].map(String::from).to_vec(),
                default_top_n: 2,
                scoring: ScoringConfig::default(),
            },
            Arc::new(audit.clone()),
        );

        Self {
            engine,
            ctx: CallContext::new("req-test", "tester"),
            owner: AccountId("buyer@acme.test".to_string()),
            audit,
            extraction,
            generator,
            mailer,
            threads,
            directory,
        }
    }

    /// Runs a session through start, one complete message, submit and confirm.
    pub async fn confirmed_template(&self) -> EmailTemplate {
        let sessions = &self.engine.sessions;
        let session = sessions.start(&self.ctx, self.owner.clone()).await.expect("start");
        sessions
            .post_message(
                &self.ctx,
                &session.id,
                "item: 10 laptops\nbudget: 15000 USD\ndeadline: 2026-12-01",
            )
            .await
            .expect("message");
        let submitted = sessions.submit(&self.ctx, &session.id).await.expect("submit");
        let proposal = submitted.proposal.expect("proposal");
        sessions
            .confirm(&self.ctx, &session.id, &proposal.subject, &proposal.body)
            .await
            .expect("confirm")
    }

    /// Confirms a template and dispatches it to `vendors`, all successfully.
    pub async fn dispatched_template(&self, vendors: &[i64]) -> EmailTemplate {
        let template = self.confirmed_template().await;
        for vendor in vendors {
            let record = self
                .engine
                .dispatch
                .dispatch(&self.ctx, &template.id, VendorId(*vendor))
                .await
                .expect("dispatch");
            assert!(record.is_sent(), "vendor {vendor} should be sent");
        }
        template
    }

    pub fn thread_of(&self, vendor_name: &str) -> String {
        format!("thread-{}@supply.test", vendor_name.to_lowercase())
    }

    pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
        Utc::now() - Duration::minutes(minutes)
    }
}
