use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::session::SessionStatus;
use crate::flows::states::{FlowContext, SessionAction, SessionEvent, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_state(&self) -> SessionStatus;
    fn transition(
        &self,
        current: &SessionStatus,
        event: &SessionEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// The RFP chat lifecycle: `Active -> Submitted -> Confirmed`, no skips, no reversal.
#[derive(Clone, Debug, Default)]
pub struct SessionFlow;

impl FlowDefinition for SessionFlow {
    fn initial_state(&self) -> SessionStatus {
        SessionStatus::Active
    }

    fn transition(
        &self,
        current: &SessionStatus,
        event: &SessionEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_session(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> SessionStatus {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &SessionStatus,
        event: &SessionEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &SessionStatus,
        event: &SessionEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "session.transition_applied",
                        AuditCategory::Session,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "session.transition_rejected",
                        AuditCategory::Session,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<SessionFlow> {
    fn default() -> Self {
        Self::new(SessionFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("missing required fields before transition from {state:?}: {missing_fields:?}")]
    MissingRequiredFields { state: SessionStatus, missing_fields: Vec<String> },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: SessionStatus, event: SessionEvent },
}

fn transition_session(
    current: &SessionStatus,
    event: &SessionEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use SessionAction::{ExtractDraftFields, GenerateTemplateProposal, PersistTemplate};
    use SessionEvent::{ConfirmRequested, MessagePosted, SubmitRequested};
    use SessionStatus::{Active, Confirmed, Submitted};

    let (to, actions) = match (current, event) {
        (Active, MessagePosted) => (Active, vec![ExtractDraftFields]),
        (Active, SubmitRequested) => {
            if !context.missing_required_fields.is_empty() {
                return Err(FlowTransitionError::MissingRequiredFields {
                    state: *current,
                    missing_fields: context.missing_required_fields.clone(),
                });
            }
            (Submitted, vec![GenerateTemplateProposal])
        }
        (Submitted, ConfirmRequested) => (Confirmed, vec![PersistTemplate]),
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}
