use std::cmp::Ordering;

use chrono::NaiveDate;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::ids::{account_node, compare_ids};
use crate::model::{ParentRef, Record};
use crate::query::period::DateRange;
use crate::storage::{ParentQuery, ParentSource, Store};
use crate::sync::budget::ExecutionBudget;
use crate::sync::chunk::chunk_date_range;
use crate::sync::jobs::{EntityJob, InsightsJob};
use crate::sync::payloads::AdImagePayload;
use crate::sync::rate_limit::fetch_with_retry;
use crate::sync::transform::{self, item_id};
use crate::sync::upstream::{PageRequest, UpstreamClient};
use crate::sync::{RowError, SyncOptions, SyncProgress, SyncReport, TimeoutInfo};

/// Upper bound on pages followed for a single parent.
const MAX_PAGES_PER_PARENT: usize = 50;

/// Collaborators for one sync run.
pub struct SyncContext<'a> {
    pub store: &'a dyn Store,
    pub upstream: &'a dyn UpstreamClient,
    pub progress: &'a dyn SyncProgress,
}

/// Running totals for one run.
#[derive(Default)]
struct Tally {
    total_count: u64,
    processed: u64,
    errors: Vec<RowError>,
}

impl Tally {
    fn fail(&mut self, id: impl Into<String>, error: &Error) {
        let id = id.into();
        log::warn!("Skipping {id}: {error}");
        self.errors.push(RowError {
            id,
            error: error.to_string(),
        });
    }

    /// Write one transformed item; failures are recorded, never raised.
    async fn write(&mut self, store: &dyn Store, fallback_id: String, record: Result<Record>) {
        match record {
            Ok(record) => match store.upsert(&record).await {
                Ok(()) => self.processed += 1,
                Err(e) => self.fail(format!("{}:{}", record.table(), record.key()), &e),
            },
            Err(e) => self.fail(fallback_id, &e),
        }
    }
}

/// Follow a collection's pages. Items fetched before a failing page are
/// returned together with the error.
async fn fetch_pages(
    upstream: &dyn UpstreamClient,
    request: PageRequest,
    budget: &ExecutionBudget,
) -> (Vec<Value>, Option<Error>) {
    let mut items = Vec::new();
    let mut request = request;
    for _ in 0..MAX_PAGES_PER_PARENT {
        match fetch_with_retry(upstream, &request, budget).await {
            Ok(page) => {
                items.extend(page.items);
                match page.next {
                    Some(cursor) => request = request.after(Some(cursor)),
                    None => return (items, None),
                }
            }
            Err(e) => return (items, Some(e)),
        }
    }
    log::warn!(
        "Stopped paging {} after {MAX_PAGES_PER_PARENT} pages",
        request.path
    );
    (items, None)
}

fn skip_before(parents: Vec<ParentRef>, first: Option<&str>) -> Vec<ParentRef> {
    match first {
        Some(first) => parents
            .into_iter()
            .filter(|p| compare_ids(&p.id, first) != Ordering::Less)
            .collect(),
        None => parents,
    }
}

/// Run one generic entity sync.
///
/// Parents are visited in ascending id order. The budget is checked before
/// each parent; when it is spent the run stops with the current parent as
/// resume point. Upstream and row failures are recorded and skipped. Only
/// a failure to read the parents is returned as an error.
pub async fn run_job(
    job: &dyn EntityJob,
    ctx: &SyncContext<'_>,
    options: &SyncOptions,
    budget: &mut ExecutionBudget,
) -> Result<SyncReport> {
    let entity = job.entity();
    let parents = ctx.store.read_parents(&job.parent_query(options)).await?;
    let parents = skip_before(
        parents,
        options.resume.as_ref().map(|c| c.parent_id.as_str()),
    );
    let total = parents.len();
    log::info!("Syncing {entity} (job {}) across {total} parents", options.job_id);
    ctx.progress.on_parents_resolved(entity, total);

    let mut tally = Tally::default();
    let mut last_done: Option<String> = None;
    let mut timeout = None;

    for (index, parent) in parents.iter().enumerate() {
        if !budget.has_remaining() {
            budget.mark_resume_point(parent.id.clone());
            log::info!("Budget spent for {entity}; resume from {}", parent.id);
            ctx.progress.on_budget_exhausted(entity, &parent.id);
            timeout = Some(TimeoutInfo {
                occurred: true,
                last_processed_id: last_done.clone(),
                elapsed_ms: budget.elapsed_ms(),
                units_processed: index as u64,
                units_remaining: (total - index) as u64,
                resume_from: parent.id.clone(),
                resume_child: None,
                resume_chunk_from: None,
            });
            break;
        }

        let (items, fetch_error) = fetch_pages(ctx.upstream, job.request(parent), budget).await;
        if let Some(e) = fetch_error {
            tally.fail(parent.id.clone(), &e);
        }
        for (position, item) in items.into_iter().enumerate() {
            tally.total_count += 1;
            let fallback = item_id(&item).unwrap_or_else(|| format!("{}#{position}", parent.id));
            let record = job.transform(parent, item);
            tally.write(ctx.store, fallback, record).await;
        }

        last_done = Some(parent.id.clone());
        ctx.progress.on_parent_done(entity, &parent.id, index + 1, total);
    }

    let report = SyncReport::from_counts(
        entity,
        &options.job_id,
        tally.total_count,
        tally.processed,
        tally.errors,
        timeout,
        budget.elapsed_ms(),
    );
    log::info!(
        "Finished {entity}: {} seen, {} written, {} errors, status {}",
        report.total_count,
        report.processed,
        report.errors.len(),
        report.status.as_str()
    );
    Ok(report)
}

/// Where an insight run stopped inside an account.
struct AdStop {
    ad_id: String,
    chunk_from: Option<NaiveDate>,
}

/// Run the insight sync: ad accounts, then each account's ads, then each
/// date chunk. The budget is checked before every account, every ad and
/// every further chunk of an ad, so a resume point names an account and,
/// when stopped inside one, the first ad not finished and the first chunk
/// of it not fetched.
pub async fn run_insights(
    job: &InsightsJob,
    ctx: &SyncContext<'_>,
    options: &SyncOptions,
    budget: &mut ExecutionBudget,
) -> Result<SyncReport> {
    let entity = InsightsJob::ENTITY;
    let chunks = chunk_date_range(&job.range, job.chunk_days)?;

    let accounts = ctx.store.read_parents(&job.parent_query(options)).await?;
    let accounts = skip_before(
        accounts,
        options.resume.as_ref().map(|c| c.parent_id.as_str()),
    );
    let account_ids: Vec<String> = accounts.iter().map(|a| a.id.clone()).collect();
    let ads = if account_ids.is_empty() {
        Vec::new()
    } else {
        ctx.store
            .read_parents(
                &ParentQuery::new(ParentSource::Ads)
                    .active_only(options.active_only)
                    .accounts(account_ids),
            )
            .await?
    };

    // Ads of the resumed account that precede the child cursor were done.
    let ads: Vec<ParentRef> = match &options.resume {
        Some(cursor) => ads
            .into_iter()
            .filter(|ad| {
                let in_resumed = ad.account_id.as_deref() == Some(cursor.parent_id.as_str());
                match (&cursor.child_id, in_resumed) {
                    (Some(child), true) => compare_ids(&ad.id, child) != Ordering::Less,
                    _ => true,
                }
            })
            .collect(),
        None => ads,
    };
    // The resumed ad itself continues from its first unfetched chunk.
    let resumed_chunk = options.resume.as_ref().and_then(|c| {
        Some((c.parent_id.as_str(), c.child_id.as_deref()?, c.chunk_from?))
    });
    let total_ads = ads.len();
    log::info!(
        "Syncing insights {}..{} (job {}) for {} accounts, {total_ads} ads, {} chunks",
        job.range.start,
        job.range.end,
        options.job_id,
        accounts.len(),
        chunks.len()
    );
    ctx.progress.on_parents_resolved(entity, total_ads);

    let mut tally = Tally::default();
    let mut ads_done: usize = 0;
    let mut last_done: Option<String> = None;
    let mut timeout = None;

    'accounts: for account in &accounts {
        let stop: Option<Option<AdStop>> = if !budget.has_remaining() {
            Some(None)
        } else {
            let mut stop = None;
            for ad in ads
                .iter()
                .filter(|ad| ad.account_id.as_deref() == Some(account.id.as_str()))
            {
                if !budget.has_remaining() {
                    stop = Some(Some(AdStop {
                        ad_id: ad.id.clone(),
                        chunk_from: None,
                    }));
                    break;
                }
                let from = match resumed_chunk {
                    Some((account_id, ad_id, from)) if account_id == account.id && ad_id == ad.id => {
                        Some(from)
                    }
                    _ => None,
                };
                let ad_chunks: Vec<&DateRange> = chunks
                    .iter()
                    .filter(|chunk| from.is_none_or(|from| chunk.end >= from))
                    .collect();
                if let Some(chunk_from) =
                    sync_ad_insights(job, ctx, budget, &ad_chunks, account, ad, &mut tally).await
                {
                    stop = Some(Some(AdStop {
                        ad_id: ad.id.clone(),
                        chunk_from: Some(chunk_from),
                    }));
                    break;
                }
                ads_done += 1;
                last_done = Some(ad.id.clone());
                ctx.progress.on_parent_done(entity, &ad.id, ads_done, total_ads);
            }
            stop
        };

        if let Some(child) = stop {
            budget.mark_resume_point(account.id.clone());
            log::info!(
                "Budget spent for insights; resume from account {} ad {:?} chunk {:?}",
                account.id,
                child.as_ref().map(|c| c.ad_id.as_str()),
                child.as_ref().and_then(|c| c.chunk_from)
            );
            ctx.progress.on_budget_exhausted(entity, &account.id);
            timeout = Some(TimeoutInfo {
                occurred: true,
                last_processed_id: last_done.clone(),
                elapsed_ms: budget.elapsed_ms(),
                units_processed: ads_done as u64,
                units_remaining: (total_ads - ads_done) as u64,
                resume_from: account.id.clone(),
                resume_chunk_from: child.as_ref().and_then(|c| c.chunk_from),
                resume_child: child.map(|c| c.ad_id),
            });
            break 'accounts;
        }
    }

    let report = SyncReport::from_counts(
        entity,
        &options.job_id,
        tally.total_count,
        tally.processed,
        tally.errors,
        timeout,
        budget.elapsed_ms(),
    );
    log::info!(
        "Finished insights: {} seen, {} written, {} errors, status {}",
        report.total_count,
        report.processed,
        report.errors.len(),
        report.status.as_str()
    );
    Ok(report)
}

/// Fetch and write one ad's insights chunk by chunk. The first chunk is
/// always fetched; before each later one the budget is checked. Returns
/// the start of the first chunk left unfetched when the budget ran out.
async fn sync_ad_insights(
    job: &InsightsJob,
    ctx: &SyncContext<'_>,
    budget: &ExecutionBudget,
    chunks: &[&DateRange],
    account: &ParentRef,
    ad: &ParentRef,
    tally: &mut Tally,
) -> Option<NaiveDate> {
    let adset_id = ad.adset_id.clone().unwrap_or_default();
    let campaign_id = ad.campaign_id.clone().unwrap_or_default();
    for (index, chunk) in chunks.iter().enumerate() {
        if index > 0 && !budget.has_remaining() {
            return Some(chunk.start);
        }
        let (items, fetch_error) = fetch_pages(ctx.upstream, job.request(&ad.id, chunk), budget).await;
        if let Some(e) = fetch_error {
            tally.fail(format!("{}:{}..{}", ad.id, chunk.start, chunk.end), &e);
        }
        for item in items {
            tally.total_count += 1;
            let fallback = format!(
                "{}:{}",
                ad.id,
                item.get("date_start").and_then(Value::as_str).unwrap_or("?")
            );
            let record = transform::to_insight(item, &ad.id, &adset_id, &campaign_id, &account.id)
                .map(Record::Insight);
            tally.write(ctx.store, fallback, record).await;
        }
    }
    None
}

/// Which creatives the image enrichment considers.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentScope {
    pub account_id: Option<String>,
    pub creative_ids: Vec<String>,
}

pub const ENRICHMENT_ENTITY: &str = "creative_images";

/// Fill missing creative image URLs by looking up their hashes in each ad
/// account's image library. Only `image_url` is written.
pub async fn run_creative_image_enrichment(
    scope: &EnrichmentScope,
    ctx: &SyncContext<'_>,
    options: &SyncOptions,
    budget: &mut ExecutionBudget,
) -> Result<SyncReport> {
    let pending = ctx
        .store
        .pending_creative_images(scope.account_id.as_deref(), &scope.creative_ids)
        .await?;

    let mut accounts: Vec<(String, Vec<String>)> = Vec::new();
    for p in &pending {
        match accounts.iter_mut().find(|(id, _)| *id == p.account_id) {
            Some((_, hashes)) => {
                if !hashes.contains(&p.image_hash) {
                    hashes.push(p.image_hash.clone());
                }
            }
            None => accounts.push((p.account_id.clone(), vec![p.image_hash.clone()])),
        }
    }
    accounts.sort_by(|a, b| compare_ids(&a.0, &b.0));
    let accounts: Vec<(String, Vec<String>)> = match &options.resume {
        Some(cursor) => accounts
            .into_iter()
            .filter(|(id, _)| compare_ids(id, &cursor.parent_id) != Ordering::Less)
            .collect(),
        None => accounts,
    };
    let total = accounts.len();
    log::info!(
        "Enriching {} creatives across {total} accounts (job {})",
        pending.len(),
        options.job_id
    );
    ctx.progress.on_parents_resolved(ENRICHMENT_ENTITY, total);

    let mut tally = Tally::default();
    let mut last_done: Option<String> = None;
    let mut timeout = None;

    for (index, (account_id, hashes)) in accounts.iter().enumerate() {
        if !budget.has_remaining() {
            budget.mark_resume_point(account_id.clone());
            ctx.progress.on_budget_exhausted(ENRICHMENT_ENTITY, account_id);
            timeout = Some(TimeoutInfo {
                occurred: true,
                last_processed_id: last_done.clone(),
                elapsed_ms: budget.elapsed_ms(),
                units_processed: index as u64,
                units_remaining: (total - index) as u64,
                resume_from: account_id.clone(),
                resume_child: None,
                resume_chunk_from: None,
            });
            break;
        }

        let hashes_json = Value::from(hashes.clone()).to_string();
        let request = PageRequest::new(format!("{}/adimages", account_node(account_id)))
            .fields("hash,url,permalink_url")
            .param("hashes", hashes_json);
        let (items, fetch_error) = fetch_pages(ctx.upstream, request, budget).await;
        if let Some(e) = fetch_error {
            tally.fail(account_id.clone(), &e);
        }

        for item in items {
            tally.total_count += 1;
            let image: AdImagePayload = match serde_json::from_value(item) {
                Ok(image) => image,
                Err(e) => {
                    tally.fail(account_id.clone(), &Error::from(e));
                    continue;
                }
            };
            let Some(url) = image.url.or(image.permalink_url).filter(|u| !u.is_empty()) else {
                log::debug!("Image {} in account {account_id} has no URL", image.hash);
                continue;
            };
            match ctx
                .store
                .set_creative_image_url(account_id, &image.hash, &url)
                .await
            {
                Ok(updated) => tally.processed += updated as u64,
                Err(e) => tally.fail(format!("{account_id}:{}", image.hash), &e),
            }
        }

        last_done = Some(account_id.clone());
        ctx.progress.on_parent_done(ENRICHMENT_ENTITY, account_id, index + 1, total);
    }

    Ok(SyncReport::from_counts(
        ENRICHMENT_ENTITY,
        &options.job_id,
        tally.total_count,
        tally.processed,
        tally.errors,
        timeout,
        budget.elapsed_ms(),
    ))
}
