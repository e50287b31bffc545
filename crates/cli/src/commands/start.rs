use crate::commands::runtime::{engine, execute, migrated_pool};
use crate::commands::CommandResult;

/// Preflight for `rfpdesk-server`: config, database, schema and collaborator wiring.
pub fn run() -> CommandResult {
    execute("start", |config| async move {
        let pool = migrated_pool(&config).await?;
        let assembled = engine(&config, &pool).map(drop);
        pool.close().await;
        assembled?;

        Ok(format!(
            "preflight passed: llm provider `{}`, mail transport `{}`, api ready to bind {}:{}",
            config.llm.provider.as_str(),
            config.mail.transport.as_str(),
            config.server.bind_address,
            config.server.port,
        ))
    })
}
