use rfpdesk_core::domain::template::TemplateId;
use rfpdesk_engine::{DashboardEntry, DashboardSummary, RankingSource};

use crate::commands::runtime::{action_failure, engine, execute, migrated_pool};
use crate::commands::CommandResult;

pub fn run(template_id: &str, top: Option<usize>) -> CommandResult {
    execute("dashboard", |config| async move {
        let pool = migrated_pool(&config).await?;
        let engine = engine(&config, &pool)?;

        let result = engine.dashboard.summary(&TemplateId(template_id.to_string()), top).await;
        pool.close().await;
        let summary = result.map_err(action_failure)?;
        Ok(describe_summary(&summary))
    })
}

pub fn describe_summary(summary: &DashboardSummary) -> String {
    let source = match summary.ranking_source {
        RankingSource::Scores => "stored scores",
        RankingSource::LowestQuote => "lowest quote",
    };
    let mut lines = vec![format!(
        "template {} \"{}\": {} contacted, {} responded, ranked by {source}",
        summary.template.id.0,
        summary.template.subject,
        summary.total_vendors_contacted,
        summary.total_vendors_responded
    )];
    lines.extend(summary.top_vendors.iter().enumerate().map(|(index, entry)| describe_entry(index, entry)));
    lines.join("\n")
}

fn describe_entry(index: usize, entry: &DashboardEntry) -> String {
    let position = entry.rank.map(|rank| rank as usize).unwrap_or(index + 1);
    let name = entry
        .contact
        .as_ref()
        .map(|contact| format!("{} <{}>", contact.name, contact.email))
        .unwrap_or_else(|| format!("vendor {}", entry.vendor_id));
    let mut line = format!("  {position}. {name}");
    if let Some(score) = entry.final_score {
        line.push_str(&format!(" score {score}"));
    }
    if let Some(amount) = entry.lowest_quotation.as_ref().and_then(|quotation| {
        quotation
            .quoted_amount
            .map(|amount| format!("{amount} {}", quotation.currency.as_deref().unwrap_or("")))
    }) {
        line.push_str(&format!(" lowest {}", amount.trim_end()));
    }
    line
}
