//! The RFP lifecycle services wired over repositories and collaborators.

pub mod audit;
pub mod context;
pub mod dashboard;
pub mod dispatch_ledger;
pub mod locks;
pub mod reply_sync;
pub mod scorer;
pub mod session_store;
pub mod template_finalizer;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use rfpdesk_core::audit::AuditSink;
use rfpdesk_core::collaborators::{
    ExtractionService, MailSender, QuoteExtractor, TemplateGenerator, ThreadFetcher,
    VendorDirectory,
};
use rfpdesk_core::config::{AppConfig, ScoringConfig};
use rfpdesk_core::scoring::{ReciprocalPriceCurve, WeightedQualityPolicy};
use rfpdesk_db::repositories::{
    InMemoryDispatchRepository, InMemoryQuotationRepository, InMemoryScoreRepository,
    InMemorySessionRepository, InMemoryTemplateRepository, SqlDispatchRepository,
    SqlQuotationRepository, SqlScoreRepository, SqlSessionRepository, SqlTemplateRepository,
};
use rfpdesk_db::{
    DbPool, DispatchRepository, QuotationRepository, ScoreRepository, SessionRepository,
    TemplateRepository,
};

pub use audit::{FanoutAuditSink, RepositoryAuditSink, TracingAuditSink};
pub use context::CallContext;
pub use dashboard::{DashboardAggregator, DashboardEntry, DashboardSummary, RankingSource};
pub use dispatch_ledger::{render_body, DispatchBatch, DispatchLedger, VendorDispatch};
pub use reply_sync::{ReplySynchronizer, SyncOutcome, SyncReport, VendorQuotations, VendorSync};
pub use scorer::QuotationScorer;
pub use session_store::SessionStore;
pub use template_finalizer::TemplateFinalizer;

#[derive(Clone)]
pub struct Repositories {
    pub sessions: Arc<dyn SessionRepository>,
    pub templates: Arc<dyn TemplateRepository>,
    pub dispatches: Arc<dyn DispatchRepository>,
    pub quotations: Arc<dyn QuotationRepository>,
    pub scores: Arc<dyn ScoreRepository>,
}

impl Repositories {
    pub fn sqlite(pool: DbPool) -> Self {
        Self {
            sessions: Arc::new(SqlSessionRepository::new(pool.clone())),
            templates: Arc::new(SqlTemplateRepository::new(pool.clone())),
            dispatches: Arc::new(SqlDispatchRepository::new(pool.clone())),
            quotations: Arc::new(SqlQuotationRepository::new(pool.clone())),
            scores: Arc::new(SqlScoreRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            sessions: Arc::new(InMemorySessionRepository::default()),
            templates: Arc::new(InMemoryTemplateRepository::default()),
            dispatches: Arc::new(InMemoryDispatchRepository::default()),
            quotations: Arc::new(InMemoryQuotationRepository::default()),
            scores: Arc::new(InMemoryScoreRepository::default()),
        }
    }
}

/// External services the lifecycle calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub extraction: Arc<dyn ExtractionService>,
    pub generator: Arc<dyn TemplateGenerator>,
    pub mail: Arc<dyn MailSender>,
    pub threads: Arc<dyn ThreadFetcher>,
    pub directory: Arc<dyn VendorDirectory>,
    pub quotes: Arc<dyn QuoteExtractor>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    pub required_fields: Vec<String>,
    pub default_top_n: usize,
    pub scoring: ScoringConfig,
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            required_fields: config.rfp.required_fields.clone(),
            default_top_n: config.rfp.default_top_n,
            scoring: config.scoring,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

pub struct RfpEngine {
    pub sessions: SessionStore,
    pub templates: TemplateFinalizer,
    pub dispatch: DispatchLedger,
    pub sync: ReplySynchronizer,
    pub scorer: QuotationScorer,
    pub dashboard: DashboardAggregator,
}

impl RfpEngine {
    pub fn new(
        repositories: Repositories,
        collaborators: Collaborators,
        settings: EngineSettings,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let Repositories { sessions, templates, dispatches, quotations, scores } = repositories;
        let Collaborators { extraction, generator, mail, threads, directory, quotes } =
            collaborators;
        let dispatch_locks = Arc::new(locks::KeyedLocks::default());

        let finalizer = TemplateFinalizer::new(templates.clone(), audit.clone());
        Self {
            sessions: SessionStore::new(
                sessions,
                finalizer.clone(),
                extraction,
                generator,
                settings.required_fields,
                audit.clone(),
            ),
            templates: finalizer,
            dispatch: DispatchLedger::new(
                templates.clone(),
                dispatches.clone(),
                directory.clone(),
                mail,
                dispatch_locks.clone(),
                audit.clone(),
            ),
            sync: ReplySynchronizer::new(
                templates.clone(),
                dispatches.clone(),
                quotations.clone(),
                threads,
                quotes,
                dispatch_locks,
                audit.clone(),
            ),
            scorer: QuotationScorer::new(
                templates.clone(),
                quotations.clone(),
                scores.clone(),
                directory.clone(),
                Arc::new(WeightedQualityPolicy::new(settings.scoring)),
                Arc::new(ReciprocalPriceCurve),
                audit,
            ),
            dashboard: DashboardAggregator::new(
                templates,
                dispatches,
                quotations,
                scores,
                directory,
                settings.default_top_n,
            ),
        }
    }
}
