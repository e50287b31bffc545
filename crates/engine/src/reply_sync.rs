use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use rfpdesk_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use rfpdesk_core::collaborators::{MessageDirection, QuoteExtractor, ThreadFetcher, ThreadMessage};
use rfpdesk_core::domain::dispatch::{DispatchKey, DispatchRecord, DispatchStatus};
use rfpdesk_core::domain::quotation::{MessageId, Quotation, QuotationId};
use rfpdesk_core::domain::template::TemplateId;
use rfpdesk_core::domain::vendor::VendorId;
use rfpdesk_core::errors::{ApplicationError, ErrorKind};
use rfpdesk_db::{DispatchRepository, QuotationRepository, TemplateRepository};

use crate::context::CallContext;
use crate::locks::KeyedLocks;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub template_id: TemplateId,
    pub vendor_id: VendorId,
    pub new_quotations: Vec<Quotation>,
    /// Inbound messages already stored as quotations.
    pub skipped: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VendorSync {
    Synced { vendor_id: VendorId, new_quotations: usize, skipped: usize },
    Failed { vendor_id: VendorId, kind: ErrorKind, message: String },
}

impl VendorSync {
    pub fn vendor_id(&self) -> VendorId {
        match self {
            Self::Synced { vendor_id, .. } | Self::Failed { vendor_id, .. } => *vendor_id,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub template_id: TemplateId,
    pub vendors: Vec<VendorSync>,
}

impl SyncReport {
    pub fn new_quotations(&self) -> usize {
        self.vendors
            .iter()
            .map(|vendor| match vendor {
                VendorSync::Synced { new_quotations, .. } => *new_quotations,
                VendorSync::Failed { .. } => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> usize {
        self.vendors.iter().filter(|vendor| vendor.is_failed()).count()
    }
}

/// A vendor's quotations for one template, oldest first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorQuotations {
    pub vendor_id: VendorId,
    pub vendor_name: Option<String>,
    pub vendor_email: Option<String>,
    pub quotations: Vec<Quotation>,
}

/// Reconciles vendor reply threads against the dispatch ledger.
pub struct ReplySynchronizer {
    templates: Arc<dyn TemplateRepository>,
    dispatches: Arc<dyn DispatchRepository>,
    quotations: Arc<dyn QuotationRepository>,
    threads: Arc<dyn ThreadFetcher>,
    quotes: Arc<dyn QuoteExtractor>,
    locks: Arc<KeyedLocks<DispatchKey>>,
    audit: Arc<dyn AuditSink>,
}

impl ReplySynchronizer {
    pub fn new(
        templates: Arc<dyn TemplateRepository>,
        dispatches: Arc<dyn DispatchRepository>,
        quotations: Arc<dyn QuotationRepository>,
        threads: Arc<dyn ThreadFetcher>,
        quotes: Arc<dyn QuoteExtractor>,
        locks: Arc<KeyedLocks<DispatchKey>>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { templates, dispatches, quotations, threads, quotes, locks, audit }
    }

    /// Stores every inbound message of the vendor's thread not yet known by message id.
    /// Unchanged threads produce no new quotations.
    pub async fn sync(
        &self,
        ctx: &CallContext,
        template_id: &TemplateId,
        vendor_id: VendorId,
    ) -> Result<SyncOutcome, ApplicationError> {
        self.ensure_template(template_id).await?;
        let key = DispatchKey::new(template_id.clone(), vendor_id);
        let _guard = self.locks.lock(&key).await;

        let record = self
            .dispatches
            .find(&key)
            .await?
            .ok_or_else(|| ApplicationError::not_found("dispatch", &key))?;
        self.sync_record(ctx, &record).await
    }

    /// Syncs every Sent record of the template. Each vendor's result is reported on its
    /// own; one failing thread does not stop the rest.
    pub async fn sync_all(
        &self,
        ctx: &CallContext,
        template_id: &TemplateId,
    ) -> Result<SyncReport, ApplicationError> {
        self.ensure_template(template_id).await?;
        let records = self.dispatches.list_for_template(template_id).await?;

        let mut vendors = Vec::new();
        for record in records.into_iter().filter(|record| record.status == DispatchStatus::Sent) {
            let vendor_id = record.key.vendor_id;
            let _guard = self.locks.lock(&record.key).await;
            let result = match self.sync_record(ctx, &record).await {
                Ok(outcome) => VendorSync::Synced {
                    vendor_id,
                    new_quotations: outcome.new_quotations.len(),
                    skipped: outcome.skipped,
                },
                Err(error) => {
                    warn!(
                        event_name = "engine.sync.vendor_failed",
                        correlation_id = %ctx.correlation_id,
                        template_id = %template_id.0,
                        vendor_id = vendor_id.0,
                        error = %error,
                        "vendor sync failed; continuing with remaining vendors"
                    );
                    VendorSync::Failed { vendor_id, kind: error.kind(), message: error.to_string() }
                }
            };
            vendors.push(result);
        }

        let report = SyncReport { template_id: template_id.clone(), vendors };
        info!(
            event_name = "engine.sync.completed",
            correlation_id = %ctx.correlation_id,
            template_id = %template_id.0,
            vendors = report.vendors.len(),
            new_quotations = report.new_quotations(),
            failures = report.failures(),
            "template sync completed"
        );
        Ok(report)
    }

    /// Quotations grouped by vendor, vendors in id order.
    pub async fn quotations(
        &self,
        template_id: &TemplateId,
    ) -> Result<Vec<VendorQuotations>, ApplicationError> {
        self.ensure_template(template_id).await?;
        let records = self.dispatches.list_for_template(template_id).await?;
        let quotations = self.quotations.list_for_template(template_id).await?;

        let mut grouped: BTreeMap<VendorId, Vec<Quotation>> = BTreeMap::new();
        for quotation in quotations {
            grouped.entry(quotation.key.vendor_id).or_default().push(quotation);
        }

        Ok(grouped
            .into_iter()
            .map(|(vendor_id, quotations)| {
                let record = records.iter().find(|record| record.key.vendor_id == vendor_id);
                VendorQuotations {
                    vendor_id,
                    vendor_name: record.map(|record| record.vendor_name.clone()),
                    vendor_email: record.map(|record| record.vendor_email.clone()),
                    quotations,
                }
            })
            .collect())
    }

    pub async fn review(
        &self,
        ctx: &CallContext,
        quotation_id: &QuotationId,
        notes: Option<String>,
    ) -> Result<Quotation, ApplicationError> {
        let notes = notes.map(|notes| notes.trim().to_string()).filter(|notes| !notes.is_empty());
        let reviewed = self
            .quotations
            .mark_reviewed(quotation_id, notes)
            .await?
            .ok_or_else(|| ApplicationError::not_found("quotation", &quotation_id.0))?;

        info!(
            event_name = "engine.sync.quotation_reviewed",
            correlation_id = %ctx.correlation_id,
            quotation_id = %quotation_id.0,
            template_id = %reviewed.key.template_id.0,
            vendor_id = reviewed.key.vendor_id.0,
            "quotation marked reviewed"
        );
        Ok(reviewed)
    }

    async fn sync_record(
        &self,
        ctx: &CallContext,
        record: &DispatchRecord,
    ) -> Result<SyncOutcome, ApplicationError> {
        let key = &record.key;
        let thread_id = match (&record.status, &record.thread_id) {
            (DispatchStatus::Sent, Some(thread_id)) => thread_id,
            _ => {
                return Err(ApplicationError::invalid_state(format!(
                    "dispatch {key} has no sent thread to sync"
                )))
            }
        };

        let messages = self.threads.fetch_thread(&record.sender, thread_id).await?;
        let known: HashSet<MessageId> = self
            .quotations
            .list_for_template(&key.template_id)
            .await?
            .into_iter()
            .map(|quotation| quotation.message_id)
            .collect();

        let mut new_quotations = Vec::new();
        let mut skipped = 0;
        for message in messages.into_iter().filter(|m| m.direction == MessageDirection::Inbound) {
            if known.contains(&message.message_id) {
                skipped += 1;
                continue;
            }
            let quotation = self.to_quotation(ctx, key, message).await;
            if self.quotations.insert_if_absent(quotation.clone()).await? {
                new_quotations.push(quotation);
            } else {
                skipped += 1;
            }
        }

        info!(
            event_name = "engine.sync.vendor_synced",
            correlation_id = %ctx.correlation_id,
            template_id = %key.template_id.0,
            vendor_id = key.vendor_id.0,
            new_quotations = new_quotations.len(),
            skipped,
            "vendor thread synced"
        );
        self.audit.emit(
            AuditEvent::from_context(
                &ctx.template(&key.template_id).with_vendor(key.vendor_id),
                "sync.vendor_synced",
                AuditCategory::Sync,
                AuditOutcome::Success,
            )
            .with_metadata("new_quotations", new_quotations.len().to_string())
            .with_metadata("skipped", skipped.to_string()),
        );

        Ok(SyncOutcome {
            template_id: key.template_id.clone(),
            vendor_id: key.vendor_id,
            new_quotations,
            skipped,
        })
    }

    /// Price parsing is best effort; a reply that cannot be read keeps a null amount.
    async fn to_quotation(
        &self,
        ctx: &CallContext,
        key: &DispatchKey,
        message: ThreadMessage,
    ) -> Quotation {
        let text = if message.body.trim().is_empty() { &message.subject } else { &message.body };
        let extracted = match self.quotes.extract(text).await {
            Ok(extracted) => extracted,
            Err(error) => {
                warn!(
                    event_name = "engine.sync.quote_unparsed",
                    correlation_id = %ctx.correlation_id,
                    template_id = %key.template_id.0,
                    vendor_id = key.vendor_id.0,
                    message_id = %message.message_id.0,
                    error = %error,
                    "no price extracted from reply; storing without amount"
                );
                Default::default()
            }
        };

        Quotation {
            id: QuotationId::generate(),
            key: key.clone(),
            message_id: message.message_id,
            subject: message.subject,
            body: message.body,
            quoted_amount: extracted.amount,
            currency: extracted.currency,
            received_at: message.timestamp,
            is_reviewed: false,
            notes: None,
        }
    }

    async fn ensure_template(&self, template_id: &TemplateId) -> Result<(), ApplicationError> {
        match self.templates.find_by_id(template_id).await? {
            Some(_) => Ok(()),
            None => Err(ApplicationError::not_found("template", &template_id.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use rfpdesk_core::domain::quotation::QuotationId;
    use rfpdesk_core::domain::template::TemplateId;
    use rfpdesk_core::domain::vendor::VendorId;
    use rfpdesk_core::errors::ErrorKind;

    use super::VendorSync;
    use crate::testing::Harness;

    #[tokio::test]
    async fn repeated_sync_of_unchanged_thread_adds_nothing() {
        let harness = Harness::new().await;
        let template = harness.dispatched_template(&[1]).await;
        let thread = harness.thread_of("Alpha");
        harness.threads.push_reply(&thread, "m1", "We can do 14,500 USD", Harness::minutes_ago(5));
        harness.threads.push_outbound(&thread, "o1", Harness::minutes_ago(10));

        let sync = &harness.engine.sync;
        let first = sync.sync(&harness.ctx, &template.id, VendorId(1)).await.expect("first");
        let second = sync.sync(&harness.ctx, &template.id, VendorId(1)).await.expect("second");

        assert_eq!(first.new_quotations.len(), 1);
        assert_eq!(first.new_quotations[0].quoted_amount, Some(Decimal::new(14_500, 0)));
        assert_eq!(first.new_quotations[0].currency.as_deref(), Some("USD"));
        assert!(second.new_quotations.is_empty());
        assert_eq!(second.skipped, 1);

        let fetches = harness.threads.fetches.lock().expect("fetches").clone();
        assert!(fetches.iter().all(|(account, _)| account == &harness.owner));
    }

    #[tokio::test]
    async fn shared_message_id_across_syncs_yields_one_quotation() {
        let harness = Harness::new().await;
        let template = harness.dispatched_template(&[1]).await;
        let thread = harness.thread_of("Alpha");
        let sync = &harness.engine.sync;

        harness.threads.push_reply(&thread, "m1", "Price 900", Harness::minutes_ago(3));
        sync.sync(&harness.ctx, &template.id, VendorId(1)).await.expect("first");
        harness.threads.push_reply(&thread, "m1", "Price 800", Harness::minutes_ago(1));
        sync.sync(&harness.ctx, &template.id, VendorId(1)).await.expect("second");

        let grouped = sync.quotations(&template.id).await.expect("quotations");
        assert_eq!(grouped.len(), 1);
        let m1 = grouped[0]
            .quotations
            .iter()
            .filter(|quotation| quotation.message_id.0 == "m1")
            .collect::<Vec<_>>();
        assert_eq!(m1.len(), 1);
        assert_eq!(m1[0].quoted_amount, Some(Decimal::new(900, 0)));
    }

    #[tokio::test]
    async fn concurrent_syncs_do_not_duplicate() {
        let harness = Harness::new().await;
        let template = harness.dispatched_template(&[2]).await;
        harness.threads.push_reply(&harness.thread_of("Beta"), "m7", "1200", Harness::minutes_ago(1));
        let sync = &harness.engine.sync;

        let (left, right) = tokio::join!(
            sync.sync(&harness.ctx, &template.id, VendorId(2)),
            sync.sync(&harness.ctx, &template.id, VendorId(2)),
        );
        let created = left.expect("left").new_quotations.len() + right.expect("right").new_quotations.len();
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn unparseable_reply_is_stored_without_amount() {
        let harness = Harness::new().await;
        let template = harness.dispatched_template(&[1]).await;
        harness.threads.push_reply(
            &harness.thread_of("Alpha"),
            "m2",
            "We will get back to you next week.",
            Harness::minutes_ago(1),
        );

        let outcome = harness.engine.sync.sync(&harness.ctx, &template.id, VendorId(1)).await.expect("sync");
        assert_eq!(outcome.new_quotations.len(), 1);
        assert_eq!(outcome.new_quotations[0].quoted_amount, None);
        assert_eq!(outcome.new_quotations[0].currency, None);
    }

    #[tokio::test]
    async fn sync_requires_a_sent_dispatch() {
        let harness = Harness::new().await;
        let template = harness.confirmed_template().await;
        let sync = &harness.engine.sync;

        let missing = sync.sync(&harness.ctx, &template.id, VendorId(1)).await.expect_err("absent");
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        harness.mailer.fail_recipient("alpha@supply.test", true);
        harness.engine.dispatch.dispatch(&harness.ctx, &template.id, VendorId(1)).await.expect("failed");
        let failed = sync.sync(&harness.ctx, &template.id, VendorId(1)).await.expect_err("failed");
        assert_eq!(failed.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn sync_all_isolates_per_vendor_failures() {
        let harness = Harness::new().await;
        let template = harness.dispatched_template(&[1, 2]).await;
        harness.mailer.fail_recipient("gamma@supply.test", true);
        harness.engine.dispatch.dispatch(&harness.ctx, &template.id, VendorId(3)).await.expect("gamma");
        harness.threads.fail_thread(&harness.thread_of("Alpha"));
        harness.threads.push_reply(&harness.thread_of("Beta"), "b1", "15000 USD", Harness::minutes_ago(2));

        let report = harness.engine.sync.sync_all(&harness.ctx, &template.id).await.expect("report");

        assert_eq!(report.vendors.len(), 2, "only sent records are synced");
        assert!(matches!(
            &report.vendors[0],
            VendorSync::Failed { vendor_id: VendorId(1), kind: ErrorKind::UpstreamFailure, .. }
        ));
        assert_eq!(
            report.vendors[1],
            VendorSync::Synced { vendor_id: VendorId(2), new_quotations: 1, skipped: 0 }
        );
        assert_eq!(report.new_quotations(), 1);
        assert_eq!(report.failures(), 1);

        let unknown = harness
            .engine
            .sync
            .sync_all(&harness.ctx, &TemplateId("nope".to_string()))
            .await
            .expect_err("unknown template");
        assert_eq!(unknown.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn review_marks_quotation_and_keeps_notes() {
        let harness = Harness::new().await;
        let template = harness.dispatched_template(&[1]).await;
        harness.threads.push_reply(&harness.thread_of("Alpha"), "m1", "500", Harness::minutes_ago(1));
        let sync = &harness.engine.sync;
        let outcome = sync.sync(&harness.ctx, &template.id, VendorId(1)).await.expect("sync");
        let quotation_id = outcome.new_quotations[0].id.clone();

        let reviewed = sync
            .review(&harness.ctx, &quotation_id, Some(" freight included ".to_string()))
            .await
            .expect("review");
        assert!(reviewed.is_reviewed);
        assert_eq!(reviewed.notes.as_deref(), Some("freight included"));

        let missing = sync
            .review(&harness.ctx, &QuotationId("nope".to_string()), None)
            .await
            .expect_err("missing");
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }
}
