use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::template::TemplateId;

const DEFAULT_TITLE: &str = "New RFP";
const TITLE_MAX_CHARS: usize = 60;

/// Owning user identity. Doubles as the sender mailbox address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self { role: TurnRole::User, text: text.into(), at }
    }

    pub fn assistant(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self { role: TurnRole::Assistant, text: text.into(), at }
    }
}

/// Partial structured RFP data accumulated over the conversation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftFields(BTreeMap<String, Value>);

impl DraftFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.insert(field, value);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// A field is met when it is present and carries something other than
    /// null, a blank string, or an empty collection.
    pub fn is_met(&self, field: &str) -> bool {
        match self.0.get(field) {
            None | Some(Value::Null) => false,
            Some(Value::String(text)) => !text.trim().is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(entries)) => !entries.is_empty(),
            Some(_) => true,
        }
    }

    /// Unmet fields in the order `required` lists them.
    pub fn missing(&self, required: &[String]) -> Vec<String> {
        required.iter().filter(|field| !self.is_met(field)).cloned().collect()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect())
    }

    /// Non-object values yield an empty draft.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(entries) => Self(entries.into_iter().collect()),
            _ => Self::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Submitted,
    Confirmed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "submitted" => Some(Self::Submitted),
            "confirmed" => Some(Self::Confirmed),
            _ => None,
        }
    }
}

/// Subject/body pair proposed by template generation, not yet an EmailTemplate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateProposal {
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: SessionId,
    pub owner: AccountId,
    pub title: String,
    pub turns: Vec<ChatTurn>,
    pub draft: DraftFields,
    pub missing_fields: Vec<String>,
    pub status: SessionStatus,
    pub proposal: Option<TemplateProposal>,
    pub template_id: Option<TemplateId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn start(owner: AccountId, now: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::generate(),
            owner,
            title: DEFAULT_TITLE.to_string(),
            turns: Vec::new(),
            draft: DraftFields::default(),
            missing_fields: Vec::new(),
            status: SessionStatus::Active,
            proposal: None,
            template_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == SessionStatus::Confirmed
    }

    pub fn user_turns(&self) -> impl Iterator<Item = &ChatTurn> {
        self.turns.iter().filter(|turn| turn.role == TurnRole::User)
    }

    /// Titles come from the first user message; later messages leave it alone.
    pub fn retitle_from_first_message(&mut self) {
        if self.title != DEFAULT_TITLE {
            return;
        }
        let Some(first) = self.user_turns().next() else {
            return;
        };
        let trimmed = first.text.trim();
        if trimmed.is_empty() {
            return;
        }
        self.title = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    }
}
