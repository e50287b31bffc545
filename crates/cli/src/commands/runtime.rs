use std::future::Future;
use std::sync::Arc;

use rfpdesk_agent::{MailAdapters, ModelAdapters};
use rfpdesk_core::config::{AppConfig, LoadOptions};
use rfpdesk_core::errors::ApplicationError;
use rfpdesk_db::repositories::SqlVendorDirectory;
use rfpdesk_db::{connect_with_config, migrations, DbPool};
use rfpdesk_engine::{Collaborators, EngineSettings, Repositories, RfpEngine, TracingAuditSink};

use crate::commands::{
    CommandResult, Failure, EXIT_ACTION, EXIT_CONFIG, EXIT_DATABASE, EXIT_MIGRATION, EXIT_RUNTIME,
};

/// Loads config, then drives `action` to completion on a current-thread runtime.
pub(crate) fn execute<F, Fut>(command: &str, action: F) -> CommandResult
where
    F: FnOnce(AppConfig) -> Fut,
    Fut: Future<Output = Result<String, Failure>>,
{
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            );
        }
    };

    CommandResult::from_outcome(command, runtime.block_on(action(config)))
}

pub(crate) async fn migrated_pool(config: &AppConfig) -> Result<DbPool, Failure> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
    Ok(pool)
}

/// The same assembly the server uses, auditing to tracing only: a one-shot process has
/// no time to drain background audit writes.
pub(crate) fn engine(config: &AppConfig, pool: &DbPool) -> Result<RfpEngine, Failure> {
    let models = ModelAdapters::from_config(config)
        .map_err(|error| ("collaborator_setup", format!("{error:#}"), EXIT_CONFIG))?;
    let mail = MailAdapters::from_config(config)
        .map_err(|error| ("collaborator_setup", format!("{error:#}"), EXIT_CONFIG))?;

    Ok(RfpEngine::new(
        Repositories::sqlite(pool.clone()),
        Collaborators {
            extraction: models.extraction,
            generator: models.generator,
            mail: mail.sender,
            threads: mail.threads,
            directory: Arc::new(SqlVendorDirectory::new(pool.clone())),
            quotes: models.quotes,
        },
        EngineSettings::from_config(config),
        Arc::new(TracingAuditSink),
    ))
}

pub(crate) fn action_failure(error: ApplicationError) -> Failure {
    (error.kind().as_str(), error.to_string(), EXIT_ACTION)
}
