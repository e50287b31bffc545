use sqlx::Row;

use rfpdesk_core::domain::dispatch::DispatchKey;
use rfpdesk_core::domain::quotation::{MessageId, Quotation, QuotationId};
use rfpdesk_core::domain::template::TemplateId;
use rfpdesk_core::domain::vendor::VendorId;

use super::{
    decode_decimal, decode_error, decode_time, encode_time, QuotationRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlQuotationRepository {
    pool: DbPool,
}

impl SqlQuotationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const QUOTATION_COLUMNS: &str = "id, template_id, vendor_id, message_id, subject, body,
     quoted_amount, currency, received_at, is_reviewed, notes";

fn row_to_quotation(row: &sqlx::sqlite::SqliteRow) -> Result<Quotation, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let template_id: String = row.try_get("template_id").map_err(decode_error)?;
    let vendor_id: i64 = row.try_get("vendor_id").map_err(decode_error)?;
    let message_id: String = row.try_get("message_id").map_err(decode_error)?;
    let quoted_amount: Option<String> = row.try_get("quoted_amount").map_err(decode_error)?;
    let received_at: String = row.try_get("received_at").map_err(decode_error)?;

    Ok(Quotation {
        id: QuotationId(id),
        key: DispatchKey::new(TemplateId(template_id), VendorId(vendor_id)),
        message_id: MessageId(message_id),
        subject: row.try_get("subject").map_err(decode_error)?,
        body: row.try_get("body").map_err(decode_error)?,
        quoted_amount: quoted_amount
            .as_deref()
            .map(|raw| decode_decimal("quotation.quoted_amount", raw))
            .transpose()?,
        currency: row.try_get("currency").map_err(decode_error)?,
        received_at: decode_time("quotation.received_at", &received_at)?,
        is_reviewed: row.try_get("is_reviewed").map_err(decode_error)?,
        notes: row.try_get("notes").map_err(decode_error)?,
    })
}

#[async_trait::async_trait]
impl QuotationRepository for SqlQuotationRepository {
    async fn insert_if_absent(&self, quotation: Quotation) -> Result<bool, RepositoryError> {
        let written = sqlx::query(
            "INSERT INTO quotation (id, template_id, vendor_id, message_id, subject, body,
                                    quoted_amount, currency, received_at, is_reviewed, notes)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(message_id) DO NOTHING",
        )
        .bind(&quotation.id.0)
        .bind(&quotation.key.template_id.0)
        .bind(quotation.key.vendor_id.0)
        .bind(&quotation.message_id.0)
        .bind(&quotation.subject)
        .bind(&quotation.body)
        .bind(quotation.quoted_amount.map(|amount| amount.to_string()))
        .bind(&quotation.currency)
        .bind(encode_time(&quotation.received_at))
        .bind(quotation.is_reviewed)
        .bind(&quotation.notes)
        .execute(&self.pool)
        .await?;

        Ok(written.rows_affected() > 0)
    }

    async fn find_by_id(&self, id: &QuotationId) -> Result<Option<Quotation>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {QUOTATION_COLUMNS} FROM quotation WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_quotation).transpose()
    }

    async fn list_for_template(
        &self,
        template_id: &TemplateId,
    ) -> Result<Vec<Quotation>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {QUOTATION_COLUMNS} FROM quotation
             WHERE template_id = ? ORDER BY received_at ASC, message_id ASC"
        ))
        .bind(&template_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_quotation).collect()
    }

    async fn mark_reviewed(
        &self,
        id: &QuotationId,
        notes: Option<String>,
    ) -> Result<Option<Quotation>, RepositoryError> {
        // Notes are only replaced when new ones are given.
        let updated = sqlx::query(
            "UPDATE quotation SET is_reviewed = 1, notes = COALESCE(?, notes) WHERE id = ?",
        )
        .bind(&notes)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use rfpdesk_core::domain::dispatch::{DispatchKey, DispatchRecord};
    use rfpdesk_core::domain::quotation::{MessageId, Quotation, QuotationId};
    use rfpdesk_core::domain::template::EmailTemplate;
    use rfpdesk_core::domain::vendor::VendorId;

    use super::SqlQuotationRepository;
    use crate::repositories::dispatch::tests::seeded_pool;
    use crate::repositories::{DispatchRepository, QuotationRepository, SqlDispatchRepository};
    use crate::DbPool;

    async fn with_sent_dispatch() -> (DbPool, EmailTemplate, DispatchKey) {
        let (pool, template) = seeded_pool(1).await;
        let key = DispatchKey::new(template.id.clone(), VendorId(1));
        let mut record = DispatchRecord::pending(
            key.clone(),
            template.owner.clone(),
            "Vendor 1",
            "v1@supply.test",
            Utc::now(),
        );
        record.mark_sent("thread-1", "out-1", Utc::now()).expect("sent");
        SqlDispatchRepository::new(pool.clone()).save(record).await.expect("dispatch");
        (pool, template, key)
    }

    fn quotation(key: &DispatchKey, message: &str, amount: Option<i64>, minutes: i64) -> Quotation {
        Quotation {
            id: QuotationId::generate(),
            key: key.clone(),
            message_id: MessageId(message.to_string()),
            subject: "Re: RFP: chairs".to_string(),
            body: "Our price is attached.".to_string(),
            quoted_amount: amount.map(|value| Decimal::new(value, 2)),
            currency: amount.map(|_| "USD".to_string()),
            received_at: Utc::now() - Duration::minutes(minutes),
            is_reviewed: false,
            notes: None,
        }
    }

    #[tokio::test]
    async fn duplicate_message_id_is_skipped() {
        let (pool, template, key) = with_sent_dispatch().await;
        let repo = SqlQuotationRepository::new(pool);

        let first = quotation(&key, "m1", Some(1_450_000), 5);
        assert!(repo.insert_if_absent(first.clone()).await.expect("insert"));
        assert!(!repo.insert_if_absent(quotation(&key, "m1", Some(1), 1)).await.expect("dupe"));

        let listed = repo.list_for_template(&template.id).await.expect("list");
        assert_eq!(listed, vec![first]);
    }

    #[tokio::test]
    async fn list_orders_by_receipt_and_keeps_null_amounts() {
        let (pool, template, key) = with_sent_dispatch().await;
        let repo = SqlQuotationRepository::new(pool);
        repo.insert_if_absent(quotation(&key, "late", Some(100), 1)).await.expect("late");
        repo.insert_if_absent(quotation(&key, "early", None, 10)).await.expect("early");

        let listed = repo.list_for_template(&template.id).await.expect("list");
        let messages = listed.iter().map(|q| q.message_id.0.as_str()).collect::<Vec<_>>();
        assert_eq!(messages, vec!["early", "late"]);
        assert_eq!(listed[0].quoted_amount, None);
        assert_eq!(listed[1].quoted_amount, Some(Decimal::new(100, 2)));
    }

    #[tokio::test]
    async fn mark_reviewed_sets_flag_and_notes() {
        let (pool, _template, key) = with_sent_dispatch().await;
        let repo = SqlQuotationRepository::new(pool);
        let stored = quotation(&key, "m1", Some(500), 1);
        repo.insert_if_absent(stored.clone()).await.expect("insert");

        let reviewed = repo
            .mark_reviewed(&stored.id, Some("checked freight".to_string()))
            .await
            .expect("review")
            .expect("exists");
        assert!(reviewed.is_reviewed);
        assert_eq!(reviewed.notes.as_deref(), Some("checked freight"));

        let again = repo.mark_reviewed(&stored.id, None).await.expect("review").expect("exists");
        assert_eq!(again.notes.as_deref(), Some("checked freight"));

        let missing = repo.mark_reviewed(&QuotationId::generate(), None).await.expect("query");
        assert_eq!(missing, None);
    }
}
