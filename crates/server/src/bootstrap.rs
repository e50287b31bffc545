use std::sync::Arc;

use rfpdesk_agent::{LoopbackMailbox, MailAdapters, ModelAdapters};
use rfpdesk_core::audit::AuditSink;
use rfpdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use rfpdesk_db::repositories::{SqlAuditEventRepository, SqlVendorDirectory};
use rfpdesk_db::{connect_with_config, migrations, DbPool};
use rfpdesk_engine::{
    Collaborators, EngineSettings, FanoutAuditSink, Repositories, RepositoryAuditSink, RfpEngine,
    TracingAuditSink,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<RfpEngine>,
    /// Present when mail stays in process.
    pub mailbox: Option<Arc<LoopbackMailbox>>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("collaborator setup failed: {0}")]
    Collaborators(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        llm_provider = config.llm.provider.as_str(),
        mail_transport = config.mail.transport.as_str(),
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let models = ModelAdapters::from_config(&config)
        .map_err(|error| BootstrapError::Collaborators(format!("{error:#}")))?;
    let mail = MailAdapters::from_config(&config)
        .map_err(|error| BootstrapError::Collaborators(format!("{error:#}")))?;

    let audit: Arc<dyn AuditSink> = Arc::new(FanoutAuditSink::new(vec![
        Arc::new(TracingAuditSink),
        Arc::new(RepositoryAuditSink::new(Arc::new(SqlAuditEventRepository::new(db_pool.clone())))),
    ]));
    let engine = RfpEngine::new(
        Repositories::sqlite(db_pool.clone()),
        Collaborators {
            extraction: models.extraction,
            generator: models.generator,
            mail: mail.sender,
            threads: mail.threads,
            directory: Arc::new(SqlVendorDirectory::new(db_pool.clone())),
            quotes: models.quotes,
        },
        EngineSettings::from_config(&config),
        audit,
    );
    info!(
        event_name = "system.bootstrap.engine_ready",
        correlation_id = "bootstrap",
        "rfp engine assembled"
    );

    Ok(Application { config, db_pool, engine: Arc::new(engine), mailbox: mail.loopback })
}

#[cfg(test)]
mod tests {
    use rfpdesk_core::config::{ConfigOverrides, LlmProvider, LoadOptions};
    use rfpdesk_core::domain::session::AccountId;
    use rfpdesk_engine::CallContext;

    use crate::bootstrap::bootstrap;

    fn options(overrides: ConfigOverrides) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                ..overrides
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_llm_api_key() {
        let result = bootstrap(options(ConfigOverrides {
            llm_provider: Some(LlmProvider::OpenAi),
            ..ConfigOverrides::default()
        }))
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("llm.api_key"), "{message}");
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_serves_the_session_path() {
        let app = bootstrap(options(ConfigOverrides::default()))
            .await
            .expect("bootstrap should succeed with defaults");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('vendor', 'chat_session', 'email_template', \
             'dispatch_record', 'quotation', 'vendor_score', 'audit_event')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("tables");
        assert_eq!(table_count, 7);
        assert!(app.mailbox.is_some(), "loopback mail is the offline default");

        let ctx = CallContext::for_actor("bootstrap-test");
        let owner = AccountId("buyer@acme.test".to_string());
        let session = app.engine.sessions.start(&ctx, owner.clone()).await.expect("start");
        let session = app
            .engine
            .sessions
            .post_message(&ctx, &session.id, "item: desks\nbudget: 4000 USD\ndeadline: 2026-12-01")
            .await
            .expect("message");
        assert!(session.missing_fields.is_empty());
        assert_eq!(app.engine.sessions.list(&owner).await.expect("list").len(), 1);

        app.db_pool.close().await;
    }
}
