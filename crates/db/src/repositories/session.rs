use sqlx::Row;

use rfpdesk_core::domain::session::{
    AccountId, ChatSession, ChatTurn, DraftFields, SessionId, SessionStatus, TemplateProposal,
    TurnRole,
};
use rfpdesk_core::domain::template::TemplateId;

use super::{decode_error, decode_time, encode_time, RepositoryError, SessionRepository};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_turns(&self, session_id: &str) -> Result<Vec<ChatTurn>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT role, text, created_at FROM chat_turn
             WHERE session_id = ? ORDER BY turn_index ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let role: String = row.try_get("role").map_err(decode_error)?;
                let text: String = row.try_get("text").map_err(decode_error)?;
                let created_at: String = row.try_get("created_at").map_err(decode_error)?;
                Ok(ChatTurn {
                    role: TurnRole::parse(&role).ok_or_else(|| {
                        RepositoryError::Decode(format!("unknown turn role `{role}`"))
                    })?,
                    text,
                    at: decode_time("chat_turn.created_at", &created_at)?,
                })
            })
            .collect()
    }

    async fn hydrate(&self, row: &sqlx::sqlite::SqliteRow) -> Result<ChatSession, RepositoryError> {
        let mut session = row_to_session(row)?;
        session.turns = self.load_turns(&session.id.0).await?;
        Ok(session)
    }
}

const SESSION_COLUMNS: &str = "id, owner, title, status, draft_json, missing_fields_json,
     proposal_subject, proposal_body, template_id, created_at, updated_at";

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<ChatSession, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let owner: String = row.try_get("owner").map_err(decode_error)?;
    let title: String = row.try_get("title").map_err(decode_error)?;
    let status: String = row.try_get("status").map_err(decode_error)?;
    let draft_json: String = row.try_get("draft_json").map_err(decode_error)?;
    let missing_json: String = row.try_get("missing_fields_json").map_err(decode_error)?;
    let proposal_subject: Option<String> = row.try_get("proposal_subject").map_err(decode_error)?;
    let proposal_body: Option<String> = row.try_get("proposal_body").map_err(decode_error)?;
    let template_id: Option<String> = row.try_get("template_id").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_error)?;

    let draft = serde_json::from_str(&draft_json)
        .map(DraftFields::from_value)
        .map_err(|error| RepositoryError::Decode(format!("chat_session.draft_json: {error}")))?;
    let missing_fields = serde_json::from_str::<Vec<String>>(&missing_json).map_err(|error| {
        RepositoryError::Decode(format!("chat_session.missing_fields_json: {error}"))
    })?;
    let proposal = match (proposal_subject, proposal_body) {
        (Some(subject), Some(body)) => Some(TemplateProposal { subject, body }),
        _ => None,
    };

    Ok(ChatSession {
        id: SessionId(id),
        owner: AccountId(owner),
        title,
        turns: Vec::new(),
        draft,
        missing_fields,
        status: SessionStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown session status `{status}`")))?,
        proposal,
        template_id: template_id.map(TemplateId),
        created_at: decode_time("chat_session.created_at", &created_at)?,
        updated_at: decode_time("chat_session.updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<ChatSession>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SESSION_COLUMNS} FROM chat_session WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn save(&self, session: ChatSession) -> Result<(), RepositoryError> {
        let draft_json = session.draft.to_value().to_string();
        let missing_json = serde_json::to_string(&session.missing_fields)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        let (proposal_subject, proposal_body) = match &session.proposal {
            Some(proposal) => (Some(proposal.subject.as_str()), Some(proposal.body.as_str())),
            None => (None, None),
        };

        let mut tx = self.pool.begin().await?;
        let written = sqlx::query(
            "INSERT INTO chat_session (id, owner, title, status, draft_json, missing_fields_json,
                                       proposal_subject, proposal_body, template_id,
                                       created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 status = excluded.status,
                 draft_json = excluded.draft_json,
                 missing_fields_json = excluded.missing_fields_json,
                 proposal_subject = excluded.proposal_subject,
                 proposal_body = excluded.proposal_body,
                 template_id = excluded.template_id,
                 updated_at = excluded.updated_at
             WHERE chat_session.status <> 'confirmed'",
        )
        .bind(&session.id.0)
        .bind(&session.owner.0)
        .bind(&session.title)
        .bind(session.status.as_str())
        .bind(&draft_json)
        .bind(&missing_json)
        .bind(proposal_subject)
        .bind(proposal_body)
        .bind(session.template_id.as_ref().map(|id| id.0.as_str()))
        .bind(encode_time(&session.created_at))
        .bind(encode_time(&session.updated_at))
        .execute(&mut *tx)
        .await?;

        if written.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::Conflict(format!(
                "session {} is confirmed and can no longer change",
                session.id.0
            )));
        }

        // Turns are append-only; already stored indexes are left alone.
        for (index, turn) in session.turns.iter().enumerate() {
            sqlx::query(
                "INSERT INTO chat_turn (session_id, turn_index, role, text, created_at)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(session_id, turn_index) DO NOTHING",
            )
            .bind(&session.id.0)
            .bind(index as i64)
            .bind(turn.role.as_str())
            .bind(&turn.text)
            .bind(encode_time(&turn.at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_for_owner(&self, owner: &AccountId) -> Result<Vec<ChatSession>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_session
             WHERE owner = ? ORDER BY updated_at DESC, id DESC"
        ))
        .bind(&owner.0)
        .fetch_all(&self.pool)
        .await?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            sessions.push(self.hydrate(row).await?);
        }
        Ok(sessions)
    }
}
