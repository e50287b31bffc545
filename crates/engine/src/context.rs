use uuid::Uuid;

use rfpdesk_core::audit::AuditContext;
use rfpdesk_core::domain::session::SessionId;
use rfpdesk_core::domain::template::TemplateId;

/// Who is calling and under which correlation id. Passed into every engine action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallContext {
    pub correlation_id: String,
    pub actor: String,
}

impl CallContext {
    pub fn new(correlation_id: impl Into<String>, actor: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into(), actor: actor.into() }
    }

    /// Fresh correlation id.
    pub fn for_actor(actor: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), actor)
    }

    pub fn session(&self, session_id: &SessionId) -> AuditContext {
        AuditContext::for_session(session_id.clone(), &self.correlation_id, &self.actor)
    }

    pub fn template(&self, template_id: &TemplateId) -> AuditContext {
        AuditContext::for_template(template_id.clone(), &self.correlation_id, &self.actor)
    }
}
