use rfpdesk_core::domain::score::VendorScore;
use rfpdesk_core::domain::template::TemplateId;
use rfpdesk_engine::CallContext;

use crate::commands::runtime::{action_failure, engine, execute, migrated_pool};
use crate::commands::CommandResult;

pub fn run(template_id: &str) -> CommandResult {
    execute("score", |config| async move {
        let pool = migrated_pool(&config).await?;
        let engine = engine(&config, &pool)?;
        let ctx = CallContext::for_actor("cli");
        let template_id = TemplateId(template_id.to_string());

        let result = engine.scorer.score(&ctx, &template_id).await;
        pool.close().await;
        let ranking = result.map_err(action_failure)?;
        Ok(describe_ranking(&template_id, &ranking))
    })
}

pub fn describe_ranking(template_id: &TemplateId, ranking: &[VendorScore]) -> String {
    if ranking.is_empty() {
        return format!("no priced quotations for template {}; nothing ranked", template_id.0);
    }
    let mut lines = vec![format!("ranked {} vendor(s) on template {}:", ranking.len(), template_id.0)];
    lines.extend(ranking.iter().map(|score| {
        format!(
            "  {}. vendor {}: final {} (price {}, quality {}, lowest {})",
            score.rank,
            score.vendor_id,
            score.final_score,
            score.price_score,
            score.quality_score,
            score.scored_amount
        )
    }));
    lines.join("\n")
}
