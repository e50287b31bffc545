use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use rfpdesk_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use rfpdesk_core::domain::session::{AccountId, ChatSession};
use rfpdesk_core::domain::template::{EmailTemplate, TemplateId};
use rfpdesk_core::errors::ApplicationError;
use rfpdesk_db::TemplateRepository;

use crate::context::CallContext;

/// Turns a confirmed subject/body into the session's one EmailTemplate.
#[derive(Clone)]
pub struct TemplateFinalizer {
    templates: Arc<dyn TemplateRepository>,
    audit: Arc<dyn AuditSink>,
}

impl TemplateFinalizer {
    pub fn new(templates: Arc<dyn TemplateRepository>, audit: Arc<dyn AuditSink>) -> Self {
        Self { templates, audit }
    }

    /// Validates the pair, then stores it unless the session already has a template,
    /// in which case the stored one is returned untouched.
    pub async fn finalize(
        &self,
        ctx: &CallContext,
        session: &ChatSession,
        subject: &str,
        body: &str,
    ) -> Result<EmailTemplate, ApplicationError> {
        let candidate = EmailTemplate::finalize(
            session.id.clone(),
            session.owner.clone(),
            subject,
            body,
            Utc::now(),
        )?;

        let stored = self.templates.insert_for_session(candidate.clone()).await?;
        let reused = stored.id != candidate.id;

        info!(
            event_name = "engine.template.finalized",
            correlation_id = %ctx.correlation_id,
            session_id = %session.id.0,
            template_id = %stored.id.0,
            reused,
            "email template finalized"
        );
        self.audit.emit(
            AuditEvent::from_context(
                &ctx.template(&stored.id),
                "template.finalized",
                AuditCategory::Template,
                AuditOutcome::Success,
            )
            .with_metadata("session_id", session.id.0.clone())
            .with_metadata("reused", reused.to_string()),
        );
        Ok(stored)
    }

    pub async fn get(&self, template_id: &TemplateId) -> Result<EmailTemplate, ApplicationError> {
        self.templates
            .find_by_id(template_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("template", &template_id.0))
    }

    /// Newest first.
    pub async fn list_for_owner(
        &self,
        owner: &AccountId,
    ) -> Result<Vec<EmailTemplate>, ApplicationError> {
        Ok(self.templates.list_for_owner(owner).await?)
    }
}
