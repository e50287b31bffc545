use sqlx::Row;

use rfpdesk_core::domain::score::VendorScore;
use rfpdesk_core::domain::template::TemplateId;
use rfpdesk_core::domain::vendor::VendorId;

use super::{
    decode_decimal, decode_error, decode_time, encode_time, RepositoryError, ScoreRepository,
};
use crate::DbPool;

pub struct SqlScoreRepository {
    pool: DbPool,
}

impl SqlScoreRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_score(row: &sqlx::sqlite::SqliteRow) -> Result<VendorScore, RepositoryError> {
    let template_id: String = row.try_get("template_id").map_err(decode_error)?;
    let vendor_id: i64 = row.try_get("vendor_id").map_err(decode_error)?;
    let price_score: String = row.try_get("price_score").map_err(decode_error)?;
    let quality_score: String = row.try_get("quality_score").map_err(decode_error)?;
    let final_score: String = row.try_get("final_score").map_err(decode_error)?;
    let rank: i64 = row.try_get("rank").map_err(decode_error)?;
    let scored_amount: String = row.try_get("scored_amount").map_err(decode_error)?;
    let computed_at: String = row.try_get("computed_at").map_err(decode_error)?;

    Ok(VendorScore {
        template_id: TemplateId(template_id),
        vendor_id: VendorId(vendor_id),
        price_score: decode_decimal("vendor_score.price_score", &price_score)?,
        quality_score: decode_decimal("vendor_score.quality_score", &quality_score)?,
        final_score: decode_decimal("vendor_score.final_score", &final_score)?,
        rank: u32::try_from(rank)
            .map_err(|_| RepositoryError::Decode(format!("vendor_score.rank out of range: {rank}")))?,
        scored_amount: decode_decimal("vendor_score.scored_amount", &scored_amount)?,
        computed_at: decode_time("vendor_score.computed_at", &computed_at)?,
    })
}

#[async_trait::async_trait]
impl ScoreRepository for SqlScoreRepository {
    async fn replace_for_template(
        &self,
        template_id: &TemplateId,
        scores: Vec<VendorScore>,
    ) -> Result<(), RepositoryError> {
        if let Some(stray) = scores.iter().find(|score| &score.template_id != template_id) {
            return Err(RepositoryError::Conflict(format!(
                "score for template {} cannot be stored under {}",
                stray.template_id.0, template_id.0
            )));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM vendor_score WHERE template_id = ?")
            .bind(&template_id.0)
            .execute(&mut *tx)
            .await?;

        for score in &scores {
            sqlx::query(
                "INSERT INTO vendor_score (template_id, vendor_id, price_score, quality_score,
                                           final_score, rank, scored_amount, computed_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&score.template_id.0)
            .bind(score.vendor_id.0)
            .bind(score.price_score.to_string())
            .bind(score.quality_score.to_string())
            .bind(score.final_score.to_string())
            .bind(i64::from(score.rank))
            .bind(score.scored_amount.to_string())
            .bind(encode_time(&score.computed_at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_for_template(
        &self,
        template_id: &TemplateId,
    ) -> Result<Vec<VendorScore>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT template_id, vendor_id, price_score, quality_score, final_score, rank,
                    scored_amount, computed_at
             FROM vendor_score WHERE template_id = ? ORDER BY rank ASC",
        )
        .bind(&template_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_score).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use rfpdesk_core::domain::score::VendorScore;
    use rfpdesk_core::domain::template::TemplateId;
    use rfpdesk_core::domain::vendor::VendorId;

    use super::SqlScoreRepository;
    use crate::repositories::dispatch::tests::seeded_pool;
    use crate::repositories::{RepositoryError, ScoreRepository};

    fn score(template_id: &TemplateId, vendor: i64, rank: u32, final_score: i64) -> VendorScore {
        VendorScore {
            template_id: template_id.clone(),
            vendor_id: VendorId(vendor),
            price_score: Decimal::new(final_score, 0),
            quality_score: Decimal::new(final_score, 0),
            final_score: Decimal::new(final_score, 0),
            rank,
            scored_amount: Decimal::new(1_450_000, 2),
            computed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn replace_swaps_the_whole_set() {
        let (pool, template) = seeded_pool(0).await;
        let repo = SqlScoreRepository::new(pool);

        repo.replace_for_template(
            &template.id,
            vec![score(&template.id, 2, 2, 70), score(&template.id, 1, 1, 90)],
        )
        .await
        .expect("first run");
        repo.replace_for_template(&template.id, vec![score(&template.id, 3, 1, 80)])
            .await
            .expect("second run");

        let listed = repo.list_for_template(&template.id).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].vendor_id, VendorId(3));
        assert_eq!(listed[0].rank, 1);
    }

    #[tokio::test]
    async fn empty_replacement_clears_scores() {
        let (pool, template) = seeded_pool(0).await;
        let repo = SqlScoreRepository::new(pool);
        repo.replace_for_template(&template.id, vec![score(&template.id, 1, 1, 90)])
            .await
            .expect("first run");
        repo.replace_for_template(&template.id, Vec::new()).await.expect("clear");

        assert!(repo.list_for_template(&template.id).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn duplicate_rank_rolls_back_and_keeps_previous_set() {
        let (pool, template) = seeded_pool(0).await;
        let repo = SqlScoreRepository::new(pool);
        let previous = vec![score(&template.id, 1, 1, 90)];
        repo.replace_for_template(&template.id, previous.clone()).await.expect("first run");

        let broken = vec![score(&template.id, 2, 1, 80), score(&template.id, 3, 1, 70)];
        let error = repo.replace_for_template(&template.id, broken).await.expect_err("unique rank");
        assert!(matches!(error, RepositoryError::Database(_)));

        let listed = repo.list_for_template(&template.id).await.expect("list");
        assert_eq!(listed, previous);
    }

    #[tokio::test]
    async fn scores_for_another_template_are_rejected() {
        let (pool, template) = seeded_pool(0).await;
        let repo = SqlScoreRepository::new(pool);
        let other = TemplateId("other".to_string());

        let error = repo
            .replace_for_template(&template.id, vec![score(&other, 1, 1, 90)])
            .await
            .expect_err("mismatch");
        assert!(matches!(error, RepositoryError::Conflict(_)));
    }
}
