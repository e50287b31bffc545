use sqlx::Row;

use rfpdesk_core::domain::session::{AccountId, SessionId};
use rfpdesk_core::domain::template::{EmailTemplate, TemplateId};

use super::{decode_error, decode_time, encode_time, RepositoryError, TemplateRepository};
use crate::DbPool;

pub struct SqlTemplateRepository {
    pool: DbPool,
}

impl SqlTemplateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_template(row: &sqlx::sqlite::SqliteRow) -> Result<EmailTemplate, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let session_id: String = row.try_get("session_id").map_err(decode_error)?;
    let owner: String = row.try_get("owner").map_err(decode_error)?;
    let subject: String = row.try_get("subject").map_err(decode_error)?;
    let body: String = row.try_get("body").map_err(decode_error)?;
    let generated_at: String = row.try_get("generated_at").map_err(decode_error)?;

    Ok(EmailTemplate {
        id: TemplateId(id),
        session_id: SessionId(session_id),
        owner: AccountId(owner),
        subject,
        body,
        generated_at: decode_time("email_template.generated_at", &generated_at)?,
    })
}

#[async_trait::async_trait]
impl TemplateRepository for SqlTemplateRepository {
    async fn find_by_id(&self, id: &TemplateId) -> Result<Option<EmailTemplate>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, session_id, owner, subject, body, generated_at
             FROM email_template WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_template).transpose()
    }

    async fn find_by_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<EmailTemplate>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, session_id, owner, subject, body, generated_at
             FROM email_template WHERE session_id = ?",
        )
        .bind(&session_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_template).transpose()
    }

    async fn insert_for_session(
        &self,
        template: EmailTemplate,
    ) -> Result<EmailTemplate, RepositoryError> {
        sqlx::query(
            "INSERT INTO email_template (id, session_id, owner, subject, body, generated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(session_id) DO NOTHING",
        )
        .bind(&template.id.0)
        .bind(&template.session_id.0)
        .bind(&template.owner.0)
        .bind(&template.subject)
        .bind(&template.body)
        .bind(encode_time(&template.generated_at))
        .execute(&self.pool)
        .await?;

        self.find_by_session(&template.session_id).await?.ok_or_else(|| {
            RepositoryError::Decode(format!(
                "template for session {} vanished after insert",
                template.session_id.0
            ))
        })
    }

    async fn list_for_owner(
        &self,
        owner: &AccountId,
    ) -> Result<Vec<EmailTemplate>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, session_id, owner, subject, body, generated_at
             FROM email_template WHERE owner = ? ORDER BY generated_at DESC, id DESC",
        )
        .bind(&owner.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_template).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use rfpdesk_core::domain::session::{AccountId, ChatSession};
    use rfpdesk_core::domain::template::EmailTemplate;

    use super::SqlTemplateRepository;
    use crate::repositories::{SessionRepository, SqlSessionRepository, TemplateRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    async fn insert_session(pool: &sqlx::SqlitePool) -> ChatSession {
        let session = ChatSession::start(AccountId("buyer@acme.test".to_string()), Utc::now());
        SqlSessionRepository::new(pool.clone()).save(session.clone()).await.expect("session");
        session
    }

    #[tokio::test]
    async fn second_insert_for_same_session_returns_first_template() {
        let pool = setup().await;
        let session = insert_session(&pool).await;
        let repo = SqlTemplateRepository::new(pool);

        let first = EmailTemplate::finalize(
            session.id.clone(),
            session.owner.clone(),
            "RFP: laptops",
            "Please quote.",
            Utc::now(),
        )
        .expect("valid");
        let second = EmailTemplate::finalize(
            session.id.clone(),
            session.owner.clone(),
            "Different",
            "Other body",
            Utc::now(),
        )
        .expect("valid");

        let stored = repo.insert_for_session(first.clone()).await.expect("insert first");
        assert_eq!(stored, first);
        let stored_again = repo.insert_for_session(second).await.expect("insert second");
        assert_eq!(stored_again, first);

        let listed = repo.list_for_owner(&session.owner).await.expect("list");
        assert_eq!(listed, vec![first.clone()]);
        assert_eq!(repo.find_by_id(&first.id).await.expect("find"), Some(first));
    }
}
