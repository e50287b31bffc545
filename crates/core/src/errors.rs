use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::dispatch::DispatchStatus;
use crate::flows::FlowTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    FlowTransition(FlowTransitionError),
    #[error("draft is missing required fields: {missing_fields:?}")]
    IncompleteDraft { missing_fields: Vec<String> },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid dispatch transition from {from:?} to {to:?}")]
    InvalidDispatchTransition { from: DispatchStatus, to: DispatchStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl From<FlowTransitionError> for DomainError {
    fn from(value: FlowTransitionError) -> Self {
        match value {
            FlowTransitionError::MissingRequiredFields { missing_fields, .. } => {
                Self::IncompleteDraft { missing_fields }
            }
            other => Self::FlowTransition(other),
        }
    }
}

/// Caller-facing error vocabulary shared by the HTTP API and the CLI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidState,
    ValidationError,
    IncompleteDraft,
    NotFound,
    UpstreamFailure,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidState => "invalid_state",
            Self::ValidationError => "validation_error",
            Self::IncompleteDraft => "incomplete_draft",
            Self::NotFound => "not_found",
            Self::UpstreamFailure => "upstream_failure",
            Self::Internal => "internal",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::Domain(DomainError::InvariantViolation(message.into()))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Domain(DomainError::FlowTransition(_))
            | Self::Domain(DomainError::InvalidDispatchTransition { .. })
            | Self::Domain(DomainError::InvariantViolation(_)) => ErrorKind::InvalidState,
            Self::Domain(DomainError::IncompleteDraft { .. }) => ErrorKind::IncompleteDraft,
            Self::Domain(DomainError::Validation(_)) => ErrorKind::ValidationError,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Upstream(_) | Self::Persistence(_) => ErrorKind::UpstreamFailure,
            Self::Configuration(_) => ErrorKind::Internal,
        }
    }

    pub fn missing_fields(&self) -> Option<&[String]> {
        match self {
            Self::Domain(DomainError::IncompleteDraft { missing_fields }) => Some(missing_fields),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest {
        kind: ErrorKind,
        message: String,
        missing_fields: Vec<String>,
        correlation_id: String,
    },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { kind: ErrorKind::IncompleteDraft, .. } => {
                "The RFP draft is missing required details. Provide them and submit again."
            }
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest { kind, .. } => *kind,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ServiceUnavailable { .. } => ErrorKind::UpstreamFailure,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let kind = value.kind();
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::IncompleteDraft { missing_fields }) => {
                Self::BadRequest {
                    kind,
                    message: format!("missing required fields: {}", missing_fields.join(", ")),
                    missing_fields,
                    correlation_id: unassigned(),
                }
            }
            ApplicationError::Domain(error) => Self::BadRequest {
                kind,
                message: error.to_string(),
                missing_fields: Vec::new(),
                correlation_id: unassigned(),
            },
            error @ ApplicationError::NotFound { .. } => {
                Self::NotFound { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Persistence(message) | ApplicationError::Upstream(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}
