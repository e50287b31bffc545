use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use rfpdesk_core::audit::AuditSink;
use rfpdesk_core::collaborators::{ExtractionService, TemplateGenerator};
use rfpdesk_core::domain::session::{AccountId, ChatSession, ChatTurn, SessionId};
use rfpdesk_core::domain::template::EmailTemplate;
use rfpdesk_core::errors::{ApplicationError, DomainError};
use rfpdesk_core::flows::{FlowContext, FlowEngine, SessionEvent, SessionFlow, TransitionOutcome};
use rfpdesk_db::SessionRepository;

use crate::context::CallContext;
use crate::locks::KeyedLocks;
use crate::template_finalizer::TemplateFinalizer;

/// Chat sessions and their `Active -> Submitted -> Confirmed` lifecycle.
///
/// Mutations of one session run one at a time; a session only changes after the
/// collaborator call that drives the change has succeeded.
pub struct SessionStore {
    sessions: Arc<dyn SessionRepository>,
    finalizer: TemplateFinalizer,
    extraction: Arc<dyn ExtractionService>,
    generator: Arc<dyn TemplateGenerator>,
    flow: FlowEngine<SessionFlow>,
    required_fields: Vec<String>,
    locks: KeyedLocks<SessionId>,
    audit: Arc<dyn AuditSink>,
}

impl SessionStore {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        finalizer: TemplateFinalizer,
        extraction: Arc<dyn ExtractionService>,
        generator: Arc<dyn TemplateGenerator>,
        required_fields: Vec<String>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            sessions,
            finalizer,
            extraction,
            generator,
            flow: FlowEngine::default(),
            required_fields,
            locks: KeyedLocks::default(),
            audit,
        }
    }

    pub async fn start(
        &self,
        ctx: &CallContext,
        owner: AccountId,
    ) -> Result<ChatSession, ApplicationError> {
        if owner.0.trim().is_empty() {
            return Err(DomainError::Validation("owner must not be empty".to_string()).into());
        }
        let mut session = ChatSession::start(owner, Utc::now());
        session.status = self.flow.initial_state();
        self.sessions.save(session.clone()).await?;

        info!(
            event_name = "engine.session.started",
            correlation_id = %ctx.correlation_id,
            session_id = %session.id.0,
            owner = %session.owner.0,
            "chat session started"
        );
        Ok(session)
    }

    pub async fn post_message(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
        text: &str,
    ) -> Result<ChatSession, ApplicationError> {
        if text.trim().is_empty() {
            return Err(DomainError::Validation("message text must not be empty".to_string()).into());
        }
        let _guard = self.locks.lock(session_id).await;
        let mut session = self.load(session_id).await?;
        self.transition(ctx, &session, SessionEvent::MessagePosted, FlowContext::default())?;

        let now = Utc::now();
        let mut turns = session.turns.clone();
        turns.push(ChatTurn::user(text, now));

        let extracted = match self.extraction.extract(&turns, &session.draft).await {
            Ok(extracted) => extracted,
            Err(error) => {
                warn!(
                    event_name = "engine.session.extraction_failed",
                    correlation_id = %ctx.correlation_id,
                    session_id = %session_id.0,
                    error = %error,
                    "draft extraction failed; session left unchanged"
                );
                return Err(error.into());
            }
        };

        turns.push(ChatTurn::assistant(extracted.assistant_reply, Utc::now()));
        session.turns = turns;
        session.draft = extracted.draft;
        session.missing_fields = extracted.missing_fields;
        session.retitle_from_first_message();
        session.updated_at = Utc::now();
        self.sessions.save(session.clone()).await?;

        info!(
            event_name = "engine.session.message_posted",
            correlation_id = %ctx.correlation_id,
            session_id = %session_id.0,
            turns = session.turns.len(),
            missing_fields = ?session.missing_fields,
            "chat message processed"
        );
        Ok(session)
    }

    /// Moves an Active session with a complete draft to Submitted and attaches the
    /// generated proposal. Missing fields come back in `IncompleteDraft`.
    pub async fn submit(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
    ) -> Result<ChatSession, ApplicationError> {
        let _guard = self.locks.lock(session_id).await;
        let mut session = self.load(session_id).await?;
        let missing = session.draft.missing(&self.required_fields);
        let outcome = self.transition(
            ctx,
            &session,
            SessionEvent::SubmitRequested,
            FlowContext::with_missing(missing),
        )?;

        let proposal = self.generator.generate(&session.id, &session.draft).await?;

        session.status = outcome.to;
        session.proposal = Some(proposal);
        session.missing_fields.clear();
        session.updated_at = Utc::now();
        self.sessions.save(session.clone()).await?;

        info!(
            event_name = "engine.session.submitted",
            correlation_id = %ctx.correlation_id,
            session_id = %session_id.0,
            "session submitted with template proposal"
        );
        Ok(session)
    }

    /// Finalizes the (possibly edited) subject/body and closes the session.
    pub async fn confirm(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
        subject: &str,
        body: &str,
    ) -> Result<EmailTemplate, ApplicationError> {
        let _guard = self.locks.lock(session_id).await;
        let mut session = self.load(session_id).await?;
        let outcome =
            self.transition(ctx, &session, SessionEvent::ConfirmRequested, FlowContext::default())?;

        let template = self.finalizer.finalize(ctx, &session, subject, body).await?;

        session.status = outcome.to;
        session.template_id = Some(template.id.clone());
        session.updated_at = Utc::now();
        self.sessions.save(session).await?;

        info!(
            event_name = "engine.session.confirmed",
            correlation_id = %ctx.correlation_id,
            session_id = %session_id.0,
            template_id = %template.id.0,
            "session confirmed"
        );
        Ok(template)
    }

    /// Any state. The returned value is a copy; a Confirmed session cannot be changed
    /// through it.
    pub async fn history(&self, session_id: &SessionId) -> Result<ChatSession, ApplicationError> {
        self.load(session_id).await
    }

    /// Non-confirmed sessions of `owner`, most recently updated first.
    pub async fn list(&self, owner: &AccountId) -> Result<Vec<ChatSession>, ApplicationError> {
        let sessions = self.sessions.list_for_owner(owner).await?;
        Ok(sessions.into_iter().filter(|session| !session.is_confirmed()).collect())
    }

    async fn load(&self, session_id: &SessionId) -> Result<ChatSession, ApplicationError> {
        self.sessions
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("session", &session_id.0))
    }

    fn transition(
        &self,
        ctx: &CallContext,
        session: &ChatSession,
        event: SessionEvent,
        context: FlowContext,
    ) -> Result<TransitionOutcome, ApplicationError> {
        self.flow
            .apply_with_audit(
                &session.status,
                &event,
                &context,
                self.audit.as_ref(),
                &ctx.session(&session.id),
            )
            .map_err(|error| ApplicationError::Domain(error.into()))
    }
}
