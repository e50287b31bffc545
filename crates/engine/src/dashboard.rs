use std::collections::BTreeSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use rfpdesk_core::collaborators::VendorDirectory;
use rfpdesk_core::domain::quotation::Quotation;
use rfpdesk_core::domain::template::{EmailTemplate, TemplateId};
use rfpdesk_core::domain::vendor::{VendorContact, VendorId};
use rfpdesk_core::errors::ApplicationError;
use rfpdesk_core::scoring::{lowest_quotes, LowestQuote};
use rfpdesk_db::{DispatchRepository, QuotationRepository, ScoreRepository, TemplateRepository};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingSource {
    Scores,
    LowestQuote,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardEntry {
    pub vendor_id: VendorId,
    pub rank: Option<u32>,
    pub final_score: Option<Decimal>,
    pub lowest_quotation: Option<Quotation>,
    /// Absent when the directory lookup failed.
    pub contact: Option<VendorContact>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub template: EmailTemplate,
    pub top_vendors: Vec<DashboardEntry>,
    pub ranking_source: RankingSource,
    pub total_vendors_contacted: usize,
    pub total_vendors_responded: usize,
}

/// Read-only view over scores, quotations and the vendor directory.
pub struct DashboardAggregator {
    templates: Arc<dyn TemplateRepository>,
    dispatches: Arc<dyn DispatchRepository>,
    quotations: Arc<dyn QuotationRepository>,
    scores: Arc<dyn ScoreRepository>,
    directory: Arc<dyn VendorDirectory>,
    default_top_n: usize,
}

impl DashboardAggregator {
    pub fn new(
        templates: Arc<dyn TemplateRepository>,
        dispatches: Arc<dyn DispatchRepository>,
        quotations: Arc<dyn QuotationRepository>,
        scores: Arc<dyn ScoreRepository>,
        directory: Arc<dyn VendorDirectory>,
        default_top_n: usize,
    ) -> Self {
        Self { templates, dispatches, quotations, scores, directory, default_top_n }
    }

    pub async fn top_vendors(
        &self,
        template_id: &TemplateId,
        n: Option<usize>,
    ) -> Result<Vec<DashboardEntry>, ApplicationError> {
        self.template(template_id).await?;
        let quotations = self.quotations.list_for_template(template_id).await?;
        let (entries, _) = self.rank(template_id, &quotations, n).await?;
        Ok(entries)
    }

    pub async fn summary(
        &self,
        template_id: &TemplateId,
        n: Option<usize>,
    ) -> Result<DashboardSummary, ApplicationError> {
        let template = self.template(template_id).await?;
        let quotations = self.quotations.list_for_template(template_id).await?;
        let records = self.dispatches.list_for_template(template_id).await?;
        let (top_vendors, ranking_source) = self.rank(template_id, &quotations, n).await?;

        let responded = quotations
            .iter()
            .map(|quotation| quotation.key.vendor_id)
            .collect::<BTreeSet<_>>();
        Ok(DashboardSummary {
            template,
            top_vendors,
            ranking_source,
            total_vendors_contacted: records.iter().filter(|record| record.is_sent()).count(),
            total_vendors_responded: responded.len(),
        })
    }

    /// Stored scores win; without them vendors are ordered by their lowest priced quote.
    async fn rank(
        &self,
        template_id: &TemplateId,
        quotations: &[Quotation],
        n: Option<usize>,
    ) -> Result<(Vec<DashboardEntry>, RankingSource), ApplicationError> {
        let n = n.unwrap_or(self.default_top_n);
        let lowest = lowest_quotes(quotations);
        let lowest_for = |vendor_id: VendorId| {
            lowest
                .iter()
                .find(|candidate| candidate.vendor_id == vendor_id)
                .map(|candidate| candidate.quotation.clone())
        };

        let scores = self.scores.list_for_template(template_id).await?;
        let (ranked, source) = if scores.is_empty() {
            let ranked = lowest
                .iter()
                .take(n)
                .map(|LowestQuote { vendor_id, quotation, .. }| DashboardEntry {
                    vendor_id: *vendor_id,
                    rank: None,
                    final_score: None,
                    lowest_quotation: Some(quotation.clone()),
                    contact: None,
                })
                .collect::<Vec<_>>();
            (ranked, RankingSource::LowestQuote)
        } else {
            let ranked = scores
                .iter()
                .take(n)
                .map(|score| DashboardEntry {
                    vendor_id: score.vendor_id,
                    rank: Some(score.rank),
                    final_score: Some(score.final_score),
                    lowest_quotation: lowest_for(score.vendor_id),
                    contact: None,
                })
                .collect::<Vec<_>>();
            (ranked, RankingSource::Scores)
        };

        let mut entries = Vec::with_capacity(ranked.len());
        for mut entry in ranked {
            entry.contact = self.contact(template_id, entry.vendor_id).await;
            entries.push(entry);
        }
        Ok((entries, source))
    }

    async fn contact(&self, template_id: &TemplateId, vendor_id: VendorId) -> Option<VendorContact> {
        match self.directory.get_by_id(vendor_id).await {
            Ok(profile) => Some(profile.contact),
            Err(error) => {
                warn!(
                    event_name = "engine.dashboard.contact_unavailable",
                    template_id = %template_id.0,
                    vendor_id = vendor_id.0,
                    error = %error,
                    "vendor contact lookup failed; returning entry without contact"
                );
                None
            }
        }
    }

    async fn template(&self, template_id: &TemplateId) -> Result<EmailTemplate, ApplicationError> {
        self.templates
            .find_by_id(template_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("template", &template_id.0))
    }
}
