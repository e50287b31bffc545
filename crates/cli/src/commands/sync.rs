use rfpdesk_core::domain::template::TemplateId;
use rfpdesk_core::domain::vendor::VendorId;
use rfpdesk_engine::{CallContext, SyncOutcome, SyncReport, VendorSync};
use tracing::info;

use crate::commands::runtime::{action_failure, engine, execute, migrated_pool};
use crate::commands::CommandResult;

/// One pass over the template's Sent dispatches, or over a single vendor.
pub fn run(template_id: &str, vendor_id: Option<i64>) -> CommandResult {
    execute("sync", |config| async move {
        let pool = migrated_pool(&config).await?;
        let engine = engine(&config, &pool)?;
        let ctx = CallContext::for_actor("cli");
        let template_id = TemplateId(template_id.to_string());

        let result = match vendor_id {
            Some(vendor_id) => engine
                .sync
                .sync(&ctx, &template_id, VendorId(vendor_id))
                .await
                .map(|outcome| describe_outcome(&outcome)),
            None => engine.sync.sync_all(&ctx, &template_id).await.map(|report| {
                info!(
                    event_name = "cli.sync.completed",
                    correlation_id = %ctx.correlation_id,
                    template_id = %template_id.0,
                    new_quotations = report.new_quotations(),
                    failures = report.failures(),
                    "sync pass finished"
                );
                describe_report(&report)
            }),
        };
        pool.close().await;
        result.map_err(action_failure)
    })
}

pub fn describe_outcome(outcome: &SyncOutcome) -> String {
    format!(
        "vendor {} on template {}: {} new quotation(s), {} already stored",
        outcome.vendor_id,
        outcome.template_id.0,
        outcome.new_quotations.len(),
        outcome.skipped
    )
}

pub fn describe_report(report: &SyncReport) -> String {
    let mut lines = vec![format!(
        "synced {} vendor(s) on template {}: {} new quotation(s), {} failed",
        report.vendors.len(),
        report.template_id.0,
        report.new_quotations(),
        report.failures()
    )];
    for vendor in &report.vendors {
        lines.push(match vendor {
            VendorSync::Synced { vendor_id, new_quotations, skipped } => {
                format!("  - vendor {vendor_id}: {new_quotations} new, {skipped} already stored")
            }
            VendorSync::Failed { vendor_id, kind, message } => {
                format!("  - vendor {vendor_id}: failed ({}): {message}", kind.as_str())
            }
        });
    }
    lines.join("\n")
}
