use sqlx::Row;

use rfpdesk_core::domain::dispatch::{DispatchKey, DispatchRecord, DispatchStatus};
use rfpdesk_core::domain::session::AccountId;
use rfpdesk_core::domain::template::TemplateId;
use rfpdesk_core::domain::vendor::VendorId;

use super::{decode_error, decode_time, encode_time, DispatchRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDispatchRepository {
    pool: DbPool,
}

impl SqlDispatchRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const DISPATCH_COLUMNS: &str = "template_id, vendor_id, sender, vendor_name, vendor_email,
     status, thread_id, message_id, sent_at, failure_reason, attempts, created_at, updated_at";

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<DispatchRecord, RepositoryError> {
    let template_id: String = row.try_get("template_id").map_err(decode_error)?;
    let vendor_id: i64 = row.try_get("vendor_id").map_err(decode_error)?;
    let sender: String = row.try_get("sender").map_err(decode_error)?;
    let status: String = row.try_get("status").map_err(decode_error)?;
    let sent_at: Option<String> = row.try_get("sent_at").map_err(decode_error)?;
    let attempts: i64 = row.try_get("attempts").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_error)?;

    Ok(DispatchRecord {
        key: DispatchKey::new(TemplateId(template_id), VendorId(vendor_id)),
        sender: AccountId(sender),
        vendor_name: row.try_get("vendor_name").map_err(decode_error)?,
        vendor_email: row.try_get("vendor_email").map_err(decode_error)?,
        status: DispatchStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown dispatch status `{status}`")))?,
        thread_id: row.try_get("thread_id").map_err(decode_error)?,
        message_id: row.try_get("message_id").map_err(decode_error)?,
        sent_at: sent_at
            .as_deref()
            .map(|raw| decode_time("dispatch_record.sent_at", raw))
            .transpose()?,
        failure_reason: row.try_get("failure_reason").map_err(decode_error)?,
        attempts: u32::try_from(attempts).map_err(|_| {
            RepositoryError::Decode(format!("dispatch_record.attempts out of range: {attempts}"))
        })?,
        created_at: decode_time("dispatch_record.created_at", &created_at)?,
        updated_at: decode_time("dispatch_record.updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl DispatchRepository for SqlDispatchRepository {
    async fn find(&self, key: &DispatchKey) -> Result<Option<DispatchRecord>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {DISPATCH_COLUMNS} FROM dispatch_record
             WHERE template_id = ? AND vendor_id = ?"
        ))
        .bind(&key.template_id.0)
        .bind(key.vendor_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn save(&self, record: DispatchRecord) -> Result<(), RepositoryError> {
        // A sent row is final; the guard keeps a stale writer from reopening it.
        let written = sqlx::query(
            "INSERT INTO dispatch_record (template_id, vendor_id, sender, vendor_name,
                                          vendor_email, status, thread_id, message_id, sent_at,
                                          failure_reason, attempts, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(template_id, vendor_id) DO UPDATE SET
                 status = excluded.status,
                 thread_id = excluded.thread_id,
                 message_id = excluded.message_id,
                 sent_at = excluded.sent_at,
                 failure_reason = excluded.failure_reason,
                 attempts = excluded.attempts,
                 updated_at = excluded.updated_at
             WHERE dispatch_record.status <> 'sent'",
        )
        .bind(&record.key.template_id.0)
        .bind(record.key.vendor_id.0)
        .bind(&record.sender.0)
        .bind(&record.vendor_name)
        .bind(&record.vendor_email)
        .bind(record.status.as_str())
        .bind(&record.thread_id)
        .bind(&record.message_id)
        .bind(record.sent_at.as_ref().map(encode_time))
        .bind(&record.failure_reason)
        .bind(i64::from(record.attempts))
        .bind(encode_time(&record.created_at))
        .bind(encode_time(&record.updated_at))
        .execute(&self.pool)
        .await?;

        if written.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "dispatch {} is already sent",
                record.key
            )));
        }
        Ok(())
    }

    async fn list_for_template(
        &self,
        template_id: &TemplateId,
    ) -> Result<Vec<DispatchRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {DISPATCH_COLUMNS} FROM dispatch_record
             WHERE template_id = ? ORDER BY vendor_id ASC"
        ))
        .bind(&template_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }
}
