use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, MethodRouter};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::date_util::parse_ymd;
use crate::error::Error;
use crate::ids::normalize_account_id;
use crate::metrics::{HierarchyFilter, Overview};
use crate::query::period::{DateRange, Period};
use crate::server::{ApiError, AppState};
use crate::sync::{NoopProgress, RowError, SyncCursor, SyncOptions, SyncReport, SyncStatus, TimeoutInfo};
use crate::{EnrichmentScope, SyncTarget};

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/sync/ad-accounts", entity_route("ad-accounts"))
        .route("/sync/campaigns", entity_route("campaigns"))
        .route("/sync/ad-sets", entity_route("ad-sets"))
        .route("/sync/ads", entity_route("ads"))
        .route("/sync/creatives", entity_route("creatives"))
        .route("/sync/lead-campaigns", entity_route("lead-campaigns"))
        .route("/sync/leads", entity_route("leads"))
        .route("/sync/insights", get(sync_insights))
        .route("/sync/creative-images", post(sync_creative_images))
        .route("/metrics/overview", get(metrics_overview))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Query parameters shared by the sync endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncParams {
    status_filter: Option<String>,
    /// One id or a comma-separated list; `act_` prefixes are accepted.
    ad_account_id: Option<String>,
    customer_ids: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    job_id: Option<String>,
    resume_from: Option<String>,
    resume_child: Option<String>,
    /// First date chunk of `resumeChild` not yet fetched (insights).
    resume_date: Option<String>,
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl SyncParams {
    fn options(&self) -> Result<SyncOptions, Error> {
        let account_ids = split_list(self.ad_account_id.as_deref())
            .iter()
            .map(|id| normalize_account_id(id))
            .collect::<Result<Vec<_>, _>>()?;
        let chunk_from = self
            .resume_date
            .as_deref()
            .filter(|d| !d.is_empty())
            .map(|d| parse_ymd(d, "resumeDate"))
            .transpose()?;
        Ok(SyncOptions {
            job_id: self.job_id.clone().unwrap_or_default(),
            active_only: self
                .status_filter
                .as_deref()
                .is_some_and(|f| f.eq_ignore_ascii_case("active")),
            account_ids,
            customer_ids: split_list(self.customer_ids.as_deref()),
            resume: self
                .resume_from
                .as_ref()
                .filter(|id| !id.is_empty())
                .map(|id| SyncCursor {
                    parent_id: id.clone(),
                    child_id: self.resume_child.clone().filter(|c| !c.is_empty()),
                    chunk_from,
                }),
        })
    }

    fn date_range(&self) -> Result<DateRange, Error> {
        match (self.start_date.as_deref(), self.end_date.as_deref()) {
            (Some(start), Some(end)) => DateRange::parse(start, end),
            _ => Err(Error::InvalidInput(
                "startDate and endDate are required (YYYY-MM-DD)".to_string(),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StoreSummary {
    processed: u64,
    errors: usize,
    error_details: Vec<RowError>,
}

/// Body returned by every sync endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    message: String,
    timestamp: String,
    total_count: u64,
    job_id: String,
    status: SyncStatus,
    supabase_sync: StoreSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<TimeoutInfo>,
}

fn describe(report: &SyncReport) -> String {
    let entity = report.entity.replace('_', " ");
    match (&report.status, &report.timeout) {
        (SyncStatus::Partial, Some(timeout)) => format!(
            "Partially synced {entity}: {} written, {} remaining; call again to continue",
            report.processed, timeout.units_remaining
        ),
        (SyncStatus::Failed, _) => format!(
            "Failed to sync {entity}: {} errors, nothing written",
            report.errors.len()
        ),
        _ => format!(
            "Synced {entity}: {} of {} written",
            report.processed, report.total_count
        ),
    }
}

impl From<SyncReport> for SyncResponse {
    fn from(report: SyncReport) -> Self {
        Self {
            message: describe(&report),
            timestamp: Utc::now().to_rfc3339(),
            total_count: report.total_count,
            job_id: report.job_id,
            status: report.status,
            supabase_sync: StoreSummary {
                processed: report.processed,
                errors: report.errors.len(),
                error_details: report.errors,
            },
            timeout: report.timeout,
        }
    }
}

type SyncResult = Result<(StatusCode, Json<SyncResponse>), ApiError>;

async fn run_sync(state: &AppState, target: SyncTarget, options: SyncOptions) -> SyncResult {
    let report = state.dw.sync(&target, options, &NoopProgress).await?;
    let status = match report.status {
        SyncStatus::Completed => StatusCode::OK,
        SyncStatus::Partial => StatusCode::PARTIAL_CONTENT,
        SyncStatus::Failed => StatusCode::INTERNAL_SERVER_ERROR,
    };
    log::info!(
        "/sync/{} -> {}: {} seen, {} written, {} errors",
        report.entity,
        status.as_u16(),
        report.total_count,
        report.processed,
        report.errors.len()
    );
    Ok((status, Json(SyncResponse::from(report))))
}

fn entity_route(entity: &'static str) -> MethodRouter<AppState> {
    get(move |State(state): State<AppState>, Query(params): Query<SyncParams>| {
        sync_entity(state, params, entity)
    })
}

async fn sync_entity(state: AppState, params: SyncParams, entity: &'static str) -> SyncResult {
    let options = params.options()?;
    run_sync(&state, SyncTarget::Entity(entity.to_string()), options).await
}

async fn sync_insights(State(state): State<AppState>, Query(params): Query<SyncParams>) -> SyncResult {
    let range = params.date_range()?;
    let options = params.options()?;
    run_sync(&state, SyncTarget::Insights(range), options).await
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreativeImagesBody {
    ad_account_id: Option<String>,
    #[serde(default)]
    creative_ids: Vec<String>,
}

async fn sync_creative_images(
    State(state): State<AppState>,
    Query(params): Query<SyncParams>,
    body: Bytes,
) -> SyncResult {
    let body: CreativeImagesBody = if body.iter().all(u8::is_ascii_whitespace) {
        CreativeImagesBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| Error::InvalidInput(format!("invalid request body: {e}")))?
    };
    let account_id = body
        .ad_account_id
        .or_else(|| params.ad_account_id.clone())
        .map(|id| normalize_account_id(&id))
        .transpose()?;
    let scope = EnrichmentScope {
        account_id,
        creative_ids: body.creative_ids,
    };
    let options = params.options()?;
    run_sync(&state, SyncTarget::CreativeImages(scope), options).await
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverviewParams {
    start: Option<String>,
    end: Option<String>,
    /// Preset such as `30d`, `mtd` or `2024-03`, used when no dates are given.
    period: Option<String>,
    customer_id: Option<String>,
    campaign_ids: Option<String>,
    ad_set_ids: Option<String>,
    ad_ids: Option<String>,
}

impl OverviewParams {
    fn range(&self) -> Result<DateRange, Error> {
        match (self.start.as_deref(), self.end.as_deref(), self.period.as_deref()) {
            (Some(start), Some(end), _) => DateRange::parse(start, end),
            (None, None, Some(period)) => Period::parse(period)?.date_range(),
            _ => Err(Error::InvalidInput(
                "either start and end, or period, is required".to_string(),
            )),
        }
    }

    fn filter(&self) -> HierarchyFilter {
        HierarchyFilter {
            customer_id: self.customer_id.clone().filter(|c| !c.is_empty()),
            campaign_ids: split_list(self.campaign_ids.as_deref()),
            adset_ids: split_list(self.ad_set_ids.as_deref()),
            ad_ids: split_list(self.ad_ids.as_deref()),
        }
    }
}

async fn metrics_overview(
    State(state): State<AppState>,
    Query(params): Query<OverviewParams>,
) -> Result<Json<Overview>, ApiError> {
    let range = params.range()?;
    let overview = state.dw.overview(range, &params.filter()).await?;
    Ok(Json(overview))
}
