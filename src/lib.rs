pub mod config;
pub mod date_util;
pub mod error;
pub mod ids;
pub mod metrics;
pub mod model;
pub mod query;
pub mod server;
pub mod storage;
pub mod sync;

use std::sync::Arc;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use metrics::{HierarchyFilter, Overview, PeriodTotals};
pub use query::insights::InsightQuery;
pub use query::period::{DateRange, Period};
pub use storage::Database;
pub use sync::{NoopProgress, SyncCursor, SyncOptions, SyncProgress, SyncReport, SyncStatus};

// Re-export repository types needed by the binary crate, but not the module itself
pub use storage::repository::SyncRunRow;
pub use sync::runner::EnrichmentScope;

use storage::repository::{self, RunOutcome};
use storage::SqliteStore;
use sync::budget::{Clock, ExecutionBudget};
use sync::graph::GraphClient;
use sync::jobs::{job_for, EntityJob, InsightsJob, Platform};
use sync::leads::LeadsClient;
use sync::runner::{self, SyncContext, ENRICHMENT_ENTITY};
use sync::UpstreamClient;

/// What a sync invocation should do.
#[derive(Debug, Clone)]
pub enum SyncTarget {
    /// A generic job by wire name, e.g. `campaigns` or `lead-campaigns`.
    Entity(String),
    Insights(DateRange),
    CreativeImages(EnrichmentScope),
}

enum ResolvedJob {
    Generic(Box<dyn EntityJob>),
    Insights(InsightsJob),
    CreativeImages(EnrichmentScope),
}

impl ResolvedJob {
    fn entity(&self) -> &'static str {
        match self {
            ResolvedJob::Generic(job) => job.entity(),
            ResolvedJob::Insights(_) => InsightsJob::ENTITY,
            ResolvedJob::CreativeImages(_) => ENRICHMENT_ENTITY,
        }
    }

    fn platform(&self) -> Platform {
        match self {
            ResolvedJob::Generic(job) => job.platform(),
            _ => Platform::Ads,
        }
    }
}

/// Row counts and latest runs, for `status`.
#[derive(Debug, Clone)]
pub struct WarehouseStatus {
    pub tables: Vec<(&'static str, i64)>,
    pub runs: Vec<SyncRunRow>,
}

/// Main entry point for the ads warehouse.
#[derive(Clone)]
pub struct AdSyncDW {
    db: Database,
    config: Arc<AppConfig>,
    ads_client: Option<Arc<dyn UpstreamClient>>,
    leads_client: Option<Arc<dyn UpstreamClient>>,
    clock: Option<Arc<dyn Clock>>,
}

impl AdSyncDW {
    pub fn new(db: Database, config: AppConfig) -> Self {
        Self {
            db,
            config: Arc::new(config),
            ads_client: None,
            leads_client: None,
            clock: None,
        }
    }

    /// Use this client for the advertising platform instead of one built
    /// from configuration.
    pub fn with_ads_client(mut self, client: Arc<dyn UpstreamClient>) -> Self {
        self.ads_client = Some(client);
        self
    }

    pub fn with_leads_client(mut self, client: Arc<dyn UpstreamClient>) -> Self {
        self.leads_client = Some(client);
        self
    }

    /// Drive every run's budget from this clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn upstream(&self, platform: Platform) -> Result<Arc<dyn UpstreamClient>> {
        match platform {
            Platform::Ads => match &self.ads_client {
                Some(client) => Ok(client.clone()),
                None => Ok(Arc::new(GraphClient::new(&self.config)?)),
            },
            Platform::Leads => match &self.leads_client {
                Some(client) => Ok(client.clone()),
                None => Ok(Arc::new(LeadsClient::new(&self.config)?)),
            },
        }
    }

    fn budget(&self) -> ExecutionBudget {
        match &self.clock {
            Some(clock) => ExecutionBudget::with_clock(self.config.budget_ms, clock.clone()),
            None => ExecutionBudget::new(self.config.budget_ms),
        }
    }

    fn resolve(&self, target: &SyncTarget) -> Result<ResolvedJob> {
        match target {
            SyncTarget::Entity(name) => job_for(name, &self.config.lead_status_labels)
                .map(ResolvedJob::Generic)
                .ok_or_else(|| Error::InvalidInput(format!("unknown sync entity: {name}"))),
            SyncTarget::Insights(range) => {
                range.validate()?;
                Ok(ResolvedJob::Insights(InsightsJob {
                    range: *range,
                    chunk_days: self.config.insight_chunk_days,
                }))
            }
            SyncTarget::CreativeImages(scope) => Ok(ResolvedJob::CreativeImages(scope.clone())),
        }
    }

    // ── Sync commands ──────────────────────────────────────────────

    /// Run one sync and record it in the run ledger.
    ///
    /// Input and configuration problems are returned before anything is
    /// fetched or recorded. An empty `job_id` gets a generated one. Without
    /// an explicit resume cursor, a job id whose latest run stopped on its
    /// budget continues from that run's cursor.
    pub async fn sync(
        &self,
        target: &SyncTarget,
        mut options: SyncOptions,
        progress: &dyn SyncProgress,
    ) -> Result<SyncReport> {
        let job = self.resolve(target)?;
        let entity = job.entity();
        let upstream = self.upstream(job.platform())?;

        if options.job_id.is_empty() {
            options.job_id = format!("{entity}-{}", chrono::Utc::now().timestamp_millis());
        }
        if options.resume.is_none() {
            options.resume = self.latest_resume_cursor(&options.job_id, entity).await?;
            if let Some(cursor) = &options.resume {
                log::info!(
                    "Continuing job {} from {} {:?} {:?}",
                    options.job_id,
                    cursor.parent_id,
                    cursor.child_id,
                    cursor.chunk_from
                );
            }
        }

        let run_id = self
            .db
            .writer()
            .call({
                let job_id = options.job_id.clone();
                move |conn| repository::insert_sync_run(conn, &job_id, entity)
            })
            .await?;

        let store = SqliteStore::new(self.db.clone());
        let ctx = SyncContext {
            store: &store,
            upstream: upstream.as_ref(),
            progress,
        };
        let mut budget = self.budget();
        let result = match &job {
            ResolvedJob::Generic(job) => runner::run_job(job.as_ref(), &ctx, &options, &mut budget).await,
            ResolvedJob::Insights(job) => runner::run_insights(job, &ctx, &options, &mut budget).await,
            ResolvedJob::CreativeImages(scope) => {
                runner::run_creative_image_enrichment(scope, &ctx, &options, &mut budget).await
            }
        };

        let finished = match &result {
            Ok(report) => {
                let resume = report.resume_cursor();
                self.finish_run(
                    run_id,
                    RunOutcome {
                        status: report.status.as_str(),
                        total_count: report.total_count,
                        processed: report.processed,
                        failed: report.errors.len() as u64,
                        resume: resume.as_ref(),
                        elapsed_ms: report.elapsed_ms,
                        error_message: None,
                    },
                )
                .await
            }
            Err(e) => {
                let message = e.to_string();
                self.finish_run(
                    run_id,
                    RunOutcome {
                        status: SyncStatus::Failed.as_str(),
                        elapsed_ms: budget.elapsed_ms(),
                        error_message: Some(&message),
                        ..Default::default()
                    },
                )
                .await
            }
        };
        if let Err(e) = finished {
            log::warn!("Could not record sync run {run_id}: {e}");
        }
        result
    }

    async fn finish_run(&self, run_id: i64, outcome: RunOutcome<'_>) -> Result<()> {
        let status = outcome.status.to_string();
        let resume = outcome.resume.cloned();
        let error_message = outcome.error_message.map(str::to_string);
        let (total_count, processed, failed, elapsed_ms) = (
            outcome.total_count,
            outcome.processed,
            outcome.failed,
            outcome.elapsed_ms,
        );
        self.db
            .writer()
            .call(move |conn| {
                repository::finish_sync_run(
                    conn,
                    run_id,
                    &RunOutcome {
                        status: &status,
                        total_count,
                        processed,
                        failed,
                        resume: resume.as_ref(),
                        elapsed_ms,
                        error_message: error_message.as_deref(),
                    },
                )
            })
            .await?;
        Ok(())
    }

    /// Cursor left by the latest run of `entity` under `job_id`, if it
    /// stopped on its budget.
    pub async fn latest_resume_cursor(&self, job_id: &str, entity: &str) -> Result<Option<SyncCursor>> {
        let (job_id, entity) = (job_id.to_string(), entity.to_string());
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::latest_resume_cursor(conn, &job_id, &entity))
            .await?)
    }

    // ── Dashboard ──────────────────────────────────────────────────

    pub async fn overview(&self, range: DateRange, filter: &HierarchyFilter) -> Result<Overview> {
        metrics::compute_overview(&self.db, range, filter).await
    }

    pub async fn status(&self) -> Result<WarehouseStatus> {
        let (tables, runs) = self
            .db
            .reader()
            .call(|conn| {
                let tables = repository::table_counts(conn)?;
                let runs = repository::latest_runs(conn)?;
                Ok::<_, rusqlite::Error>((tables, runs))
            })
            .await?;
        Ok(WarehouseStatus { tables, runs })
    }

    // ── Customers ──────────────────────────────────────────────────

    pub async fn add_customer(&self, id: &str, name: &str) -> Result<()> {
        let (id, name) = (id.to_string(), name.to_string());
        self.db
            .writer()
            .call(move |conn| repository::upsert_customer(conn, &id, &name))
            .await?;
        Ok(())
    }

    /// Set or clear a campaign's owning customer. Returns false if the
    /// campaign has not been synced.
    pub async fn assign_campaign(&self, campaign_id: &str, customer_id: Option<&str>) -> Result<bool> {
        let campaign_id = campaign_id.to_string();
        let customer_id = customer_id.map(str::to_string);
        Ok(self
            .db
            .writer()
            .call(move |conn| {
                repository::assign_campaign_customer(conn, &campaign_id, customer_id.as_deref())
            })
            .await?)
    }

    pub async fn map_lead_campaign(&self, customer_id: &str, lead_campaign_id: &str) -> Result<()> {
        let (customer_id, lead_campaign_id) = (customer_id.to_string(), lead_campaign_id.to_string());
        self.db
            .writer()
            .call(move |conn| repository::map_lead_campaign(conn, &customer_id, &lead_campaign_id))
            .await?;
        Ok(())
    }
}
