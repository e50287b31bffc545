pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, SessionFlow};
pub use states::{FlowContext, SessionAction, SessionEvent, TransitionOutcome};
