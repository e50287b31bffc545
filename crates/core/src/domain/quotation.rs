use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::dispatch::DispatchKey;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuotationId(pub String);

impl QuotationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// External id of an inbound email. Globally unique; the ingestion dedupe key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotation {
    pub id: QuotationId,
    pub key: DispatchKey,
    pub message_id: MessageId,
    pub subject: String,
    pub body: String,
    pub quoted_amount: Option<Decimal>,
    pub currency: Option<String>,
    pub received_at: DateTime<Utc>,
    pub is_reviewed: bool,
    pub notes: Option<String>,
}

impl Quotation {
    pub fn is_priced(&self) -> bool {
        self.quoted_amount.is_some()
    }
}
