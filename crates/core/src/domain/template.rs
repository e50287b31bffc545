use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::session::{AccountId, SessionId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TemplateId(pub String);

impl TemplateId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Finalized RFP email. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub id: TemplateId,
    pub session_id: SessionId,
    pub owner: AccountId,
    pub subject: String,
    pub body: String,
    pub generated_at: DateTime<Utc>,
}

impl EmailTemplate {
    /// Template finalization: rejects a blank subject or body, otherwise
    /// produces the immutable template for `session_id`.
    pub fn finalize(
        session_id: SessionId,
        owner: AccountId,
        subject: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(DomainError::Validation("template subject must not be empty".to_string()));
        }
        if body.trim().is_empty() {
            return Err(DomainError::Validation("template body must not be empty".to_string()));
        }

        Ok(Self {
            id: TemplateId::generate(),
            session_id,
            owner,
            subject: subject.to_string(),
            body: body.to_string(),
            generated_at: now,
        })
    }
}
