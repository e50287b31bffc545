use serde::{Deserialize, Serialize};

use crate::domain::session::SessionStatus;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    MessagePosted,
    SubmitRequested,
    ConfirmRequested,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub missing_required_fields: Vec<String>,
}

impl FlowContext {
    pub fn with_missing(missing_required_fields: Vec<String>) -> Self {
        Self { missing_required_fields }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionAction {
    ExtractDraftFields,
    GenerateTemplateProposal,
    PersistTemplate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: SessionStatus,
    pub to: SessionStatus,
    pub event: SessionEvent,
    pub actions: Vec<SessionAction>,
}
