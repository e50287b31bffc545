use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use rfpdesk_core::audit::AuditEvent;
use rfpdesk_core::domain::dispatch::{DispatchKey, DispatchRecord};
use rfpdesk_core::domain::quotation::{Quotation, QuotationId};
use rfpdesk_core::domain::score::VendorScore;
use rfpdesk_core::domain::session::{AccountId, ChatSession, SessionId};
use rfpdesk_core::domain::template::{EmailTemplate, TemplateId};
use rfpdesk_core::errors::ApplicationError;

pub mod audit;
pub mod dispatch;
pub mod memory;
pub mod quotation;
pub mod score;
pub mod session;
pub mod template;
pub mod vendor;

pub use audit::SqlAuditEventRepository;
pub use dispatch::SqlDispatchRepository;
pub use memory::{
    InMemoryAuditEventRepository, InMemoryDispatchRepository, InMemoryQuotationRepository,
    InMemoryScoreRepository, InMemorySessionRepository, InMemoryTemplateRepository,
    InMemoryVendorDirectory,
};
pub use quotation::SqlQuotationRepository;
pub use score::SqlScoreRepository;
pub use session::SqlSessionRepository;
pub use template::SqlTemplateRepository;
pub use vendor::SqlVendorDirectory;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict(message) => Self::invalid_state(message),
            other => Self::Persistence(other.to_string()),
        }
    }
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<ChatSession>, RepositoryError>;
    /// Upsert. A session already stored as Confirmed is never overwritten (`Conflict`).
    async fn save(&self, session: ChatSession) -> Result<(), RepositoryError>;
    /// Every session of `owner`, most recently updated first.
    async fn list_for_owner(&self, owner: &AccountId) -> Result<Vec<ChatSession>, RepositoryError>;
}

#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn find_by_id(&self, id: &TemplateId) -> Result<Option<EmailTemplate>, RepositoryError>;
    async fn find_by_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<EmailTemplate>, RepositoryError>;
    /// Stores `template` unless its session already has one; returns whichever is stored.
    async fn insert_for_session(
        &self,
        template: EmailTemplate,
    ) -> Result<EmailTemplate, RepositoryError>;
    async fn list_for_owner(&self, owner: &AccountId)
        -> Result<Vec<EmailTemplate>, RepositoryError>;
}

#[async_trait]
pub trait DispatchRepository: Send + Sync {
    async fn find(&self, key: &DispatchKey) -> Result<Option<DispatchRecord>, RepositoryError>;
    async fn save(&self, record: DispatchRecord) -> Result<(), RepositoryError>;
    /// Ordered by vendor id.
    async fn list_for_template(
        &self,
        template_id: &TemplateId,
    ) -> Result<Vec<DispatchRecord>, RepositoryError>;
}

#[async_trait]
pub trait QuotationRepository: Send + Sync {
    /// Inserts unless a quotation with the same message id exists. Returns whether it inserted.
    async fn insert_if_absent(&self, quotation: Quotation) -> Result<bool, RepositoryError>;
    async fn find_by_id(&self, id: &QuotationId) -> Result<Option<Quotation>, RepositoryError>;
    /// Ordered by receipt time, then message id.
    async fn list_for_template(
        &self,
        template_id: &TemplateId,
    ) -> Result<Vec<Quotation>, RepositoryError>;
    async fn mark_reviewed(
        &self,
        id: &QuotationId,
        notes: Option<String>,
    ) -> Result<Option<Quotation>, RepositoryError>;
}

#[async_trait]
pub trait ScoreRepository: Send + Sync {
    /// Swaps the template's whole score set in one step. Readers see the old set or the new one.
    async fn replace_for_template(
        &self,
        template_id: &TemplateId,
        scores: Vec<VendorScore>,
    ) -> Result<(), RepositoryError>;
    /// Ordered by rank.
    async fn list_for_template(
        &self,
        template_id: &TemplateId,
    ) -> Result<Vec<VendorScore>, RepositoryError>;
}

#[async_trait]
pub trait AuditEventRepository: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError>;
    async fn list_for_template(
        &self,
        template_id: &TemplateId,
    ) -> Result<Vec<AuditEvent>, RepositoryError>;
}

/// Fixed-width so that stored timestamps sort lexically and round-trip exactly.
pub(crate) fn encode_time(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_time(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn decode_decimal(column: &str, raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw).map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn decode_error(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}
