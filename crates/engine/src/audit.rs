//! Audit sinks used by the binaries. Tests use `rfpdesk_core::audit::InMemoryAuditSink`.

use std::sync::Arc;

use tracing::{info, warn};

use rfpdesk_core::audit::{AuditEvent, AuditSink};
use rfpdesk_db::AuditEventRepository;

/// Writes every event as a structured `tracing` record.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = %event.event_type,
            category = event.category.as_str(),
            outcome = event.outcome.as_str(),
            correlation_id = %event.correlation_id,
            actor = %event.actor,
            session_id = event.session_id.as_ref().map(|id| id.0.as_str()).unwrap_or("none"),
            template_id = event.template_id.as_ref().map(|id| id.0.as_str()).unwrap_or("none"),
            vendor_id = event.vendor_id.map(|id| id.0).unwrap_or_default(),
            metadata = ?event.metadata,
            "audit event"
        );
    }
}

/// Appends events to the `audit_event` table without blocking the emitting call.
///
/// Outside a tokio runtime there is nowhere to run the write, so the event is dropped
/// with a warning.
pub struct RepositoryAuditSink {
    repository: Arc<dyn AuditEventRepository>,
}

impl RepositoryAuditSink {
    pub fn new(repository: Arc<dyn AuditEventRepository>) -> Self {
        Self { repository }
    }
}

impl AuditSink for RepositoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                event_name = "engine.audit.dropped",
                audit_event = %event.event_type,
                correlation_id = %event.correlation_id,
                "no runtime available to persist audit event"
            );
            return;
        };

        let repository = self.repository.clone();
        handle.spawn(async move {
            let event_type = event.event_type.clone();
            if let Err(error) = repository.append(event).await {
                warn!(
                    event_name = "engine.audit.persist_failed",
                    audit_event = %event_type,
                    error = %error,
                    "failed to persist audit event"
                );
            }
        });
    }
}

/// Forwards each event to every inner sink in order.
#[derive(Clone, Default)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for FanoutAuditSink {
    fn emit(&self, event: AuditEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rfpdesk_core::audit::{
        AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
    };
    use rfpdesk_core::domain::template::TemplateId;
    use rfpdesk_db::repositories::InMemoryAuditEventRepository;
    use rfpdesk_db::AuditEventRepository;

    use super::{FanoutAuditSink, RepositoryAuditSink, TracingAuditSink};

    fn scoring_event(template_id: &TemplateId) -> AuditEvent {
        let context = AuditContext::for_template(template_id.clone(), "req-1", "test");
        AuditEvent::from_context(
            &context,
            "scoring.completed",
            AuditCategory::Scoring,
            AuditOutcome::Success,
        )
    }

    #[tokio::test]
    async fn repository_sink_persists_in_background() {
        let repository = Arc::new(InMemoryAuditEventRepository::default());
        let sink = RepositoryAuditSink::new(repository.clone());
        let template_id = TemplateId("T-1".to_string());

        sink.emit(scoring_event(&template_id));

        let mut stored = Vec::new();
        for _ in 0..50 {
            stored = repository.list_for_template(&template_id).await.expect("list");
            if !stored.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].event_type, "scoring.completed");
    }

    #[test]
    fn fanout_delivers_to_every_sink() {
        let first = InMemoryAuditSink::default();
        let second = InMemoryAuditSink::default();
        let fanout = FanoutAuditSink::new(vec![
            Arc::new(first.clone()),
            Arc::new(TracingAuditSink),
            Arc::new(second.clone()),
        ]);

        fanout.emit(scoring_event(&TemplateId("T-2".to_string())));

        assert_eq!(first.event_types(), vec!["scoring.completed".to_string()]);
        assert_eq!(second.event_types(), vec!["scoring.completed".to_string()]);
    }
}
