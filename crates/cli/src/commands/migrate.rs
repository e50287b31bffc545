use crate::commands::runtime::{execute, migrated_pool};
use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    execute("migrate", |config| async move {
        let pool = migrated_pool(&config).await?;
        pool.close().await;
        Ok("applied pending migrations".to_string())
    })
}
