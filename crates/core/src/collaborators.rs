//! Contracts for the external services the lifecycle engine calls.
//!
//! Every call is request/response. Implementations live in `rfpdesk-agent`
//! (model-backed and rule-based adapters, mail transports) and `rfpdesk-db`
//! (the vendor directory).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::quotation::MessageId;
use crate::domain::session::{AccountId, ChatTurn, DraftFields, SessionId, TemplateProposal};
use crate::domain::vendor::{VendorId, VendorProfile};
use crate::errors::ApplicationError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("collaborator rejected the request: {0}")]
    Rejected(String),
    #[error("collaborator has no record: {0}")]
    NotFound(String),
}

impl From<CollaboratorError> for ApplicationError {
    fn from(value: CollaboratorError) -> Self {
        match value {
            CollaboratorError::NotFound(id) => Self::NotFound { entity: "upstream record", id },
            other => Self::Upstream(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExtractionResult {
    pub assistant_reply: String,
    pub draft: DraftFields,
    pub missing_fields: Vec<String>,
}

/// Turns the conversation so far into an assistant reply and an updated draft.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(
        &self,
        turns: &[ChatTurn],
        draft: &DraftFields,
    ) -> Result<ExtractionResult, CollaboratorError>;
}

#[async_trait]
pub trait TemplateGenerator: Send + Sync {
    async fn generate(
        &self,
        session_id: &SessionId,
        draft: &DraftFields,
    ) -> Result<TemplateProposal, CollaboratorError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub from: AccountId,
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub thread_id: String,
    pub message_id: String,
}

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, CollaboratorError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub message_id: MessageId,
    pub direction: MessageDirection,
    pub timestamp: DateTime<Utc>,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait ThreadFetcher: Send + Sync {
    async fn fetch_thread(
        &self,
        account: &AccountId,
        thread_id: &str,
    ) -> Result<Vec<ThreadMessage>, CollaboratorError>;
}

/// Read side of the vendor directory. Unknown ids are `CollaboratorError::NotFound`.
#[async_trait]
pub trait VendorDirectory: Send + Sync {
    async fn get_by_id(&self, vendor_id: VendorId) -> Result<VendorProfile, CollaboratorError>;
    async fn list_all(&self) -> Result<Vec<VendorProfile>, CollaboratorError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedQuote {
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
}

/// A reply that could not be read as a price. Always recovered by storing a null amount.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QuoteExtractionError {
    #[error("no quoted amount found")]
    NoAmount,
    #[error("malformed quote: {0}")]
    Malformed(String),
    #[error("quote extraction backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait QuoteExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<ExtractedQuote, QuoteExtractionError>;
}
