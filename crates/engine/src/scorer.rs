use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use rfpdesk_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use rfpdesk_core::collaborators::{CollaboratorError, VendorDirectory};
use rfpdesk_core::domain::score::VendorScore;
use rfpdesk_core::domain::template::TemplateId;
use rfpdesk_core::errors::ApplicationError;
use rfpdesk_core::scoring::{rank_vendors, scored_amounts, PriceCurve, QualityPolicy, ScoringCandidate};
use rfpdesk_db::{QuotationRepository, ScoreRepository, TemplateRepository};

use crate::context::CallContext;

/// Recomputes a template's full vendor ranking from its priced quotations.
pub struct QuotationScorer {
    templates: Arc<dyn TemplateRepository>,
    quotations: Arc<dyn QuotationRepository>,
    scores: Arc<dyn ScoreRepository>,
    directory: Arc<dyn VendorDirectory>,
    quality: Arc<dyn QualityPolicy>,
    curve: Arc<dyn PriceCurve>,
    audit: Arc<dyn AuditSink>,
}

impl QuotationScorer {
    pub fn new(
        templates: Arc<dyn TemplateRepository>,
        quotations: Arc<dyn QuotationRepository>,
        scores: Arc<dyn ScoreRepository>,
        directory: Arc<dyn VendorDirectory>,
        quality: Arc<dyn QualityPolicy>,
        curve: Arc<dyn PriceCurve>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { templates, quotations, scores, directory, quality, curve, audit }
    }

    /// Every input is gathered before the stored set is touched. A failed vendor
    /// lookup leaves the previous ranking in place.
    pub async fn score(
        &self,
        ctx: &CallContext,
        template_id: &TemplateId,
    ) -> Result<Vec<VendorScore>, ApplicationError> {
        self.ensure_template(template_id).await?;
        let quotations = self.quotations.list_for_template(template_id).await?;
        let amounts = scored_amounts(&quotations);

        let mut candidates = Vec::with_capacity(amounts.len());
        for (vendor_id, amount) in amounts {
            let profile = self.directory.get_by_id(vendor_id).await.map_err(|error| {
                warn!(
                    event_name = "engine.scoring.vendor_lookup_failed",
                    correlation_id = %ctx.correlation_id,
                    template_id = %template_id.0,
                    vendor_id = vendor_id.0,
                    error = %error,
                    "vendor lookup failed; keeping previous ranking"
                );
                match error {
                    CollaboratorError::NotFound(_) => ApplicationError::not_found("vendor", vendor_id),
                    other => other.into(),
                }
            })?;
            candidates.push(ScoringCandidate {
                vendor_id,
                amount,
                quality_score: self.quality.score(&profile.attributes),
            });
        }

        let ranking = rank_vendors(template_id, &candidates, self.curve.as_ref(), Utc::now());
        self.scores.replace_for_template(template_id, ranking.clone()).await?;

        info!(
            event_name = "engine.scoring.completed",
            correlation_id = %ctx.correlation_id,
            template_id = %template_id.0,
            vendors = ranking.len(),
            leader = ranking.first().map(|score| score.vendor_id.0),
            "template scoring completed"
        );
        self.audit.emit(
            AuditEvent::from_context(
                &ctx.template(template_id),
                "scoring.completed",
                AuditCategory::Scoring,
                AuditOutcome::Success,
            )
            .with_metadata("vendors", ranking.len().to_string()),
        );
        Ok(ranking)
    }

    /// Stored ranking, by rank. Empty until the first `score`.
    pub async fn ranking(&self, template_id: &TemplateId) -> Result<Vec<VendorScore>, ApplicationError> {
        self.ensure_template(template_id).await?;
        Ok(self.scores.list_for_template(template_id).await?)
    }

    async fn ensure_template(&self, template_id: &TemplateId) -> Result<(), ApplicationError> {
        match self.templates.find_by_id(template_id).await? {
            Some(_) => Ok(()),
            None => Err(ApplicationError::not_found("template", &template_id.0)),
        }
    }
}
