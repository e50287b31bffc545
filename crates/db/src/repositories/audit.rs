use std::collections::BTreeMap;

use sqlx::Row;

use rfpdesk_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use rfpdesk_core::domain::session::SessionId;
use rfpdesk_core::domain::template::TemplateId;
use rfpdesk_core::domain::vendor::VendorId;

use super::{decode_error, decode_time, encode_time, AuditEventRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAuditEventRepository {
    pool: DbPool,
}

impl SqlAuditEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let session_id: Option<String> = row.try_get("session_id").map_err(decode_error)?;
    let template_id: Option<String> = row.try_get("template_id").map_err(decode_error)?;
    let vendor_id: Option<i64> = row.try_get("vendor_id").map_err(decode_error)?;
    let category: String = row.try_get("category").map_err(decode_error)?;
    let outcome: String = row.try_get("outcome").map_err(decode_error)?;
    let metadata_json: String = row.try_get("metadata_json").map_err(decode_error)?;
    let occurred_at: String = row.try_get("occurred_at").map_err(decode_error)?;

    let metadata = serde_json::from_str::<BTreeMap<String, String>>(&metadata_json)
        .map_err(|error| RepositoryError::Decode(format!("audit_event.metadata_json: {error}")))?;

    Ok(AuditEvent {
        event_id: row.try_get("id").map_err(decode_error)?,
        session_id: session_id.map(SessionId),
        template_id: template_id.map(TemplateId),
        vendor_id: vendor_id.map(VendorId),
        correlation_id: row.try_get("correlation_id").map_err(decode_error)?,
        event_type: row.try_get("event_type").map_err(decode_error)?,
        category: AuditCategory::parse(&category).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown audit category `{category}`"))
        })?,
        actor: row.try_get("actor").map_err(decode_error)?,
        outcome: AuditOutcome::parse(&outcome)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown audit outcome `{outcome}`")))?,
        metadata,
        occurred_at: decode_time("audit_event.occurred_at", &occurred_at)?,
    })
}

#[async_trait::async_trait]
impl AuditEventRepository for SqlAuditEventRepository {
    async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError> {
        let metadata_json = serde_json::to_string(&event.metadata)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO audit_event (id, session_id, template_id, vendor_id, correlation_id,
                                      event_type, category, actor, outcome, metadata_json,
                                      occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id)
        .bind(event.session_id.as_ref().map(|id| id.0.as_str()))
        .bind(event.template_id.as_ref().map(|id| id.0.as_str()))
        .bind(event.vendor_id.map(|id| id.0))
        .bind(&event.correlation_id)
        .bind(&event.event_type)
        .bind(event.category.as_str())
        .bind(&event.actor)
        .bind(event.outcome.as_str())
        .bind(&metadata_json)
        .bind(encode_time(&event.occurred_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_template(
        &self,
        template_id: &TemplateId,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, session_id, template_id, vendor_id, correlation_id, event_type, category,
                    actor, outcome, metadata_json, occurred_at
             FROM audit_event WHERE template_id = ? ORDER BY occurred_at ASC, id ASC",
        )
        .bind(&template_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }
}

#[cfg(test)]
mod tests {
    use rfpdesk_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
    use rfpdesk_core::domain::template::TemplateId;
    use rfpdesk_core::domain::vendor::VendorId;

    use super::SqlAuditEventRepository;
    use crate::repositories::AuditEventRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn appended_events_are_listed_per_template() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlAuditEventRepository::new(pool);

        let template_id = TemplateId("T-1".to_string());
        let context =
            AuditContext::for_template(template_id.clone(), "req-1", "api").with_vendor(VendorId(4));
        let event =
            AuditEvent::from_context(&context, "dispatch.sent", AuditCategory::Dispatch, AuditOutcome::Success)
                .with_metadata("thread_id", "thr-9");
        let unrelated = AuditEvent::new(
            "req-2",
            "system.started",
            AuditCategory::System,
            "cli",
            AuditOutcome::Success,
        );

        repo.append(event.clone()).await.expect("append");
        repo.append(unrelated).await.expect("append unrelated");

        let listed = repo.list_for_template(&template_id).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].event_id, event.event_id);
        assert_eq!(listed[0].vendor_id, Some(VendorId(4)));
        assert_eq!(listed[0].metadata.get("thread_id").map(String::as_str), Some("thr-9"));
        assert_eq!(listed[0].outcome, AuditOutcome::Success);
    }
}
