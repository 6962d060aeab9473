pub mod budget;
pub mod chunk;
pub mod graph;
pub mod jobs;
pub mod leads;
pub mod payloads;
pub mod rate_limit;
pub mod runner;
pub mod transform;
pub mod upstream;

#[cfg(test)]
pub(crate) mod testing;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use budget::{Clock, ExecutionBudget, FixedStepClock, SystemClock};
pub use upstream::{Page, PageRequest, UpstreamClient};

/// Options controlling a sync operation.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Correlates the runs of one logical sync across invocations.
    pub job_id: String,
    pub active_only: bool,
    pub account_ids: Vec<String>,
    pub customer_ids: Vec<String>,
    pub resume: Option<SyncCursor>,
}

/// Position from which a budget-limited run continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// First parent that was not completed.
    pub parent_id: String,
    /// First child of that parent that was not completed (insights only).
    pub child_id: Option<String>,
    /// Start of the first date chunk of that child not yet fetched.
    #[serde(default)]
    pub chunk_from: Option<NaiveDate>,
}

impl SyncCursor {
    pub fn parent(id: impl Into<String>) -> Self {
        Self {
            parent_id: id.into(),
            child_id: None,
            chunk_from: None,
        }
    }
}

/// A row or parent that failed without stopping the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    pub id: String,
    pub error: String,
}

/// Resumption metadata for a run that stopped on its time budget.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutInfo {
    pub occurred: bool,
    pub last_processed_id: Option<String>,
    pub elapsed_ms: u64,
    /// Units of work finished before stopping: parents, or ads for insights.
    #[serde(rename = "adsProcessed")]
    pub units_processed: u64,
    #[serde(rename = "adsRemaining")]
    pub units_remaining: u64,
    pub resume_from: String,
    pub resume_child: Option<String>,
    #[serde(rename = "resumeDate")]
    pub resume_chunk_from: Option<NaiveDate>,
}

impl TimeoutInfo {
    pub fn cursor(&self) -> SyncCursor {
        SyncCursor {
            parent_id: self.resume_from.clone(),
            child_id: self.resume_child.clone(),
            chunk_from: self.resume_chunk_from,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Completed,
    /// Stopped on the time budget; resumable.
    Partial,
    Failed,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Completed => "completed",
            SyncStatus::Partial => "partial",
            SyncStatus::Failed => "failed",
        }
    }
}

/// Report returned after a sync operation completes.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub entity: String,
    pub job_id: String,
    pub status: SyncStatus,
    /// Upstream items seen.
    pub total_count: u64,
    /// Rows written.
    pub processed: u64,
    pub errors: Vec<RowError>,
    pub timeout: Option<TimeoutInfo>,
    pub elapsed_ms: u64,
}

impl SyncReport {
    /// Create a SyncReport with the status derived from the counts.
    ///
    /// A run that stopped on its budget is partial. A run where every item
    /// failed and nothing was written is failed. Anything else completed,
    /// with its row errors listed.
    pub fn from_counts(
        entity: &str,
        job_id: &str,
        total_count: u64,
        processed: u64,
        errors: Vec<RowError>,
        timeout: Option<TimeoutInfo>,
        elapsed_ms: u64,
    ) -> Self {
        let status = if timeout.is_some() {
            SyncStatus::Partial
        } else if processed == 0 && !errors.is_empty() {
            SyncStatus::Failed
        } else {
            SyncStatus::Completed
        };
        Self {
            entity: entity.to_string(),
            job_id: job_id.to_string(),
            status,
            total_count,
            processed,
            errors,
            timeout,
            elapsed_ms,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.status == SyncStatus::Partial
    }

    pub fn resume_cursor(&self) -> Option<SyncCursor> {
        self.timeout.as_ref().map(TimeoutInfo::cursor)
    }
}

/// Progress callbacks for long runs.
pub trait SyncProgress: Send + Sync {
    fn on_parents_resolved(&self, _entity: &str, _count: usize) {}
    fn on_parent_done(&self, _entity: &str, _parent_id: &str, _index: usize, _total: usize) {}
    fn on_budget_exhausted(&self, _entity: &str, _resume_from: &str) {}
}

pub struct NoopProgress;

impl SyncProgress for NoopProgress {}
