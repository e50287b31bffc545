pub mod audit;
pub mod collaborators;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod scoring;

pub use domain::dispatch::{DispatchKey, DispatchRecord, DispatchStats, DispatchStatus};
pub use domain::quotation::{MessageId, Quotation, QuotationId};
pub use domain::score::VendorScore;
pub use domain::session::{
    AccountId, ChatSession, ChatTurn, DraftFields, SessionId, SessionStatus, TemplateProposal,
    TurnRole,
};
pub use domain::template::{EmailTemplate, TemplateId};
pub use domain::vendor::{VendorAttributes, VendorContact, VendorId, VendorProfile};
pub use errors::{ApplicationError, DomainError, ErrorKind, InterfaceError};
