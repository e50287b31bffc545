use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use tracing::{error, info, warn};

use rfpdesk_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use rfpdesk_core::collaborators::{CollaboratorError, MailSender, OutboundEmail, VendorDirectory};
use rfpdesk_core::domain::dispatch::{DispatchKey, DispatchRecord, DispatchStats, DispatchStatus};
use rfpdesk_core::domain::template::{EmailTemplate, TemplateId};
use rfpdesk_core::domain::vendor::{VendorId, VendorProfile};
use rfpdesk_core::errors::{ApplicationError, ErrorKind};
use rfpdesk_db::{DispatchRepository, TemplateRepository};

use crate::context::CallContext;
use crate::locks::KeyedLocks;

/// Per-vendor result inside a batch dispatch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VendorDispatch {
    Dispatched { vendor_id: VendorId, record: DispatchRecord },
    Rejected { vendor_id: VendorId, kind: ErrorKind, message: String },
}

impl VendorDispatch {
    pub fn vendor_id(&self) -> VendorId {
        match self {
            Self::Dispatched { vendor_id, .. } | Self::Rejected { vendor_id, .. } => *vendor_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchBatch {
    pub template_id: TemplateId,
    pub results: Vec<VendorDispatch>,
    pub stats: DispatchStats,
}

/// The (template, vendor) send ledger.
pub struct DispatchLedger {
    templates: Arc<dyn TemplateRepository>,
    dispatches: Arc<dyn DispatchRepository>,
    directory: Arc<dyn VendorDirectory>,
    mail: Arc<dyn MailSender>,
    locks: Arc<KeyedLocks<DispatchKey>>,
    audit: Arc<dyn AuditSink>,
}

impl DispatchLedger {
    pub fn new(
        templates: Arc<dyn TemplateRepository>,
        dispatches: Arc<dyn DispatchRepository>,
        directory: Arc<dyn VendorDirectory>,
        mail: Arc<dyn MailSender>,
        locks: Arc<KeyedLocks<DispatchKey>>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { templates, dispatches, directory, mail, locks, audit }
    }

    /// Sends the template to one vendor at most once.
    ///
    /// A record already `Sent` is returned unchanged. A send failure is not an error
    /// here: the record comes back `Failed` and a later call retries it.
    pub async fn dispatch(
        &self,
        ctx: &CallContext,
        template_id: &TemplateId,
        vendor_id: VendorId,
    ) -> Result<DispatchRecord, ApplicationError> {
        let template = self.template(template_id).await?;
        let key = DispatchKey::new(template_id.clone(), vendor_id);
        let _guard = self.locks.lock(&key).await;

        let existing = self.dispatches.find(&key).await?;
        if let Some(record) = existing.as_ref().filter(|record| record.is_sent()) {
            info!(
                event_name = "engine.dispatch.already_sent",
                correlation_id = %ctx.correlation_id,
                template_id = %template_id.0,
                vendor_id = vendor_id.0,
                "dispatch already sent; returning existing record"
            );
            return Ok(record.clone());
        }

        let vendor = self.directory.get_by_id(vendor_id).await.map_err(|error| match error {
            CollaboratorError::NotFound(_) => ApplicationError::not_found("vendor", vendor_id),
            other => other.into(),
        })?;

        let mut record = match existing {
            Some(failed) => failed,
            None => {
                let pending = DispatchRecord::pending(
                    key.clone(),
                    template.owner.clone(),
                    vendor.contact.name.clone(),
                    vendor.contact.email.clone(),
                    Utc::now(),
                );
                self.dispatches.save(pending.clone()).await?;
                pending
            }
        };

        let email = OutboundEmail {
            from: template.owner.clone(),
            to: record.vendor_email.clone(),
            subject: template.subject.clone(),
            body: render_body(&template, &vendor),
            attachments: Vec::new(),
        };

        let audit_context = ctx.template(template_id).with_vendor(vendor_id);
        match self.mail.send(&email).await {
            Ok(receipt) => {
                record.mark_sent(receipt.thread_id, receipt.message_id, Utc::now())?;
                if let Err(error) = self.dispatches.save(record.clone()).await {
                    // the mail is out but the ledger still says Pending; keep the receipt
                    // so the record can be reconciled by hand before any retry
                    let thread_id = record.thread_id.clone().unwrap_or_default();
                    let message_id = record.message_id.clone().unwrap_or_default();
                    error!(
                        event_name = "engine.dispatch.receipt_unsaved",
                        correlation_id = %ctx.correlation_id,
                        template_id = %template_id.0,
                        vendor_id = vendor_id.0,
                        thread_id = %thread_id,
                        message_id = %message_id,
                        error = %error,
                        "template sent but the dispatch record could not be saved"
                    );
                    self.audit.emit(
                        AuditEvent::from_context(
                            &audit_context,
                            "dispatch.receipt_unsaved",
                            AuditCategory::Dispatch,
                            AuditOutcome::Failed,
                        )
                        .with_metadata("thread_id", thread_id)
                        .with_metadata("message_id", message_id),
                    );
                    return Err(error.into());
                }
                info!(
                    event_name = "engine.dispatch.sent",
                    correlation_id = %ctx.correlation_id,
                    template_id = %template_id.0,
                    vendor_id = vendor_id.0,
                    attempts = record.attempts,
                    "template dispatched to vendor"
                );
                self.audit.emit(
                    AuditEvent::from_context(
                        &audit_context,
                        "dispatch.sent",
                        AuditCategory::Dispatch,
                        AuditOutcome::Success,
                    )
                    .with_metadata("thread_id", record.thread_id.clone().unwrap_or_default()),
                );
            }
            Err(error) => {
                record.mark_failed(error.to_string(), Utc::now())?;
                self.dispatches.save(record.clone()).await?;
                warn!(
                    event_name = "engine.dispatch.failed",
                    correlation_id = %ctx.correlation_id,
                    template_id = %template_id.0,
                    vendor_id = vendor_id.0,
                    attempts = record.attempts,
                    error = %error,
                    "template dispatch failed"
                );
                self.audit.emit(
                    AuditEvent::from_context(
                        &audit_context,
                        "dispatch.failed",
                        AuditCategory::Dispatch,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("reason", error.to_string()),
                );
            }
        }
        Ok(record)
    }

    /// Dispatches to each listed vendor once, in order. One vendor's error never stops
    /// the others.
    pub async fn dispatch_many(
        &self,
        ctx: &CallContext,
        template_id: &TemplateId,
        vendor_ids: &[VendorId],
    ) -> Result<DispatchBatch, ApplicationError> {
        self.template(template_id).await?;

        let mut seen = BTreeSet::new();
        let mut results = Vec::with_capacity(vendor_ids.len());
        for vendor_id in vendor_ids.iter().copied().filter(|id| seen.insert(*id)) {
            let result = match self.dispatch(ctx, template_id, vendor_id).await {
                Ok(record) => VendorDispatch::Dispatched { vendor_id, record },
                Err(error) => VendorDispatch::Rejected {
                    vendor_id,
                    kind: error.kind(),
                    message: error.to_string(),
                },
            };
            results.push(result);
        }

        let stats = DispatchStats::tally(results.iter().filter_map(|result| match result {
            VendorDispatch::Dispatched { record, .. } => Some(record),
            VendorDispatch::Rejected { .. } => None,
        }));
        Ok(DispatchBatch { template_id: template_id.clone(), results, stats })
    }

    pub async fn stats_for_template(
        &self,
        template_id: &TemplateId,
    ) -> Result<DispatchStats, ApplicationError> {
        let records = self.records(template_id).await?;
        Ok(DispatchStats::tally(records.iter()))
    }

    /// The template's ledger, by vendor id.
    pub async fn records(
        &self,
        template_id: &TemplateId,
    ) -> Result<Vec<DispatchRecord>, ApplicationError> {
        self.template(template_id).await?;
        Ok(self.dispatches.list_for_template(template_id).await?)
    }

    pub async fn sent_records(
        &self,
        template_id: &TemplateId,
    ) -> Result<Vec<DispatchRecord>, ApplicationError> {
        let records = self.records(template_id).await?;
        Ok(records.into_iter().filter(|record| record.status == DispatchStatus::Sent).collect())
    }

    async fn template(&self, template_id: &TemplateId) -> Result<EmailTemplate, ApplicationError> {
        self.templates
            .find_by_id(template_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("template", &template_id.0))
    }
}

/// Fills `{{ vendor_name }}`, `{{ vendor_company }}` and `{{ vendor_email }}`.
/// A body that does not render is sent as written.
pub fn render_body(template: &EmailTemplate, vendor: &VendorProfile) -> String {
    let mut context = Context::new();
    context.insert("vendor_name", &vendor.contact.name);
    context.insert(
        "vendor_company",
        vendor.contact.company.as_deref().unwrap_or(vendor.contact.name.as_str()),
    );
    context.insert("vendor_email", &vendor.contact.email);

    match Tera::one_off(&template.body, &context, false) {
        Ok(rendered) => rendered,
        Err(error) => {
            warn!(
                event_name = "engine.dispatch.render_fallback",
                template_id = %template.id.0,
                vendor_id = vendor.id.0,
                error = %error,
                "template body did not render; sending raw body"
            );
            template.body.clone()
        }
    }
}
