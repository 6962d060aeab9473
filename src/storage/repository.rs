use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::date_util::format_ymd;
use crate::model::{
    Ad, AdAccount, AdCreative, AdInsight, AdSet, Campaign, LeadCampaign, LeadRecord, ParentRef,
    Record,
};
use crate::storage::store::{ParentQuery, ParentSource};
use crate::sync::SyncCursor;

// ── Ad accounts ────────────────────────────────────────────────────

pub fn upsert_account(conn: &Connection, a: &AdAccount) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO ad_accounts (id, name, currency, timezone, status, created_time, synced_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            currency = excluded.currency,
            timezone = excluded.timezone,
            status = excluded.status,
            created_time = excluded.created_time,
            synced_at = excluded.synced_at",
        params![a.id, a.name, a.currency, a.timezone, a.status, a.created_time],
    )?;
    Ok(())
}

// ── Campaigns ──────────────────────────────────────────────────────

/// Upsert a campaign. `customer_id` is owned by manual assignment and is
/// never written here.
pub fn upsert_campaign(conn: &Connection, c: &Campaign) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO campaigns (
            id, account_id, name, status, objective, daily_budget,
            start_time, stop_time, created_time, updated_time, synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, datetime('now'))
        ON CONFLICT(id) DO UPDATE SET
            account_id = excluded.account_id,
            name = excluded.name,
            status = excluded.status,
            objective = excluded.objective,
            daily_budget = excluded.daily_budget,
            start_time = excluded.start_time,
            stop_time = excluded.stop_time,
            created_time = excluded.created_time,
            updated_time = excluded.updated_time,
            synced_at = excluded.synced_at",
        params![
            c.id,
            c.account_id,
            c.name,
            c.status,
            c.objective,
            c.daily_budget,
            c.start_time,
            c.stop_time,
            c.created_time,
            c.updated_time,
        ],
    )?;
    Ok(())
}

// ── Ad sets ────────────────────────────────────────────────────────

pub fn upsert_ad_set(conn: &Connection, s: &AdSet) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO ad_sets (
            id, campaign_id, name, status, optimization_goal, bid_strategy,
            daily_budget, start_time, end_time, synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, datetime('now'))
        ON CONFLICT(id) DO UPDATE SET
            campaign_id = excluded.campaign_id,
            name = excluded.name,
            status = excluded.status,
            optimization_goal = excluded.optimization_goal,
            bid_strategy = excluded.bid_strategy,
            daily_budget = excluded.daily_budget,
            start_time = excluded.start_time,
            end_time = excluded.end_time,
            synced_at = excluded.synced_at",
        params![
            s.id,
            s.campaign_id,
            s.name,
            s.status,
            s.optimization_goal,
            s.bid_strategy,
            s.daily_budget,
            s.start_time,
            s.end_time,
        ],
    )?;
    Ok(())
}

// ── Ads ────────────────────────────────────────────────────────────

pub fn upsert_ad(conn: &Connection, ad: &Ad) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO ads (
            id, adset_id, campaign_id, name, status, effective_status,
            creative_id, created_time, updated_time, synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, datetime('now'))
        ON CONFLICT(id) DO UPDATE SET
            adset_id = excluded.adset_id,
            campaign_id = excluded.campaign_id,
            name = excluded.name,
            status = excluded.status,
            effective_status = excluded.effective_status,
            creative_id = excluded.creative_id,
            created_time = excluded.created_time,
            updated_time = excluded.updated_time,
            synced_at = excluded.synced_at",
        params![
            ad.id,
            ad.adset_id,
            ad.campaign_id,
            ad.name,
            ad.status,
            ad.effective_status,
            ad.creative_id,
            ad.created_time,
            ad.updated_time,
        ],
    )?;
    Ok(())
}

// ── Creatives ──────────────────────────────────────────────────────

/// Upsert a creative. An image URL filled in by the enrichment pass is kept
/// when the primary sync has none to offer.
pub fn upsert_creative(conn: &Connection, c: &AdCreative) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO ad_creatives (
            id, account_id, name, title, body, image_url, image_hash, video_id,
            thumbnail_url, object_story_spec, asset_feed_spec, created_time, synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, datetime('now'))
        ON CONFLICT(id) DO UPDATE SET
            account_id = excluded.account_id,
            name = excluded.name,
            title = excluded.title,
            body = excluded.body,
            image_url = COALESCE(excluded.image_url, ad_creatives.image_url),
            image_hash = excluded.image_hash,
            video_id = excluded.video_id,
            thumbnail_url = excluded.thumbnail_url,
            object_story_spec = excluded.object_story_spec,
            asset_feed_spec = excluded.asset_feed_spec,
            created_time = excluded.created_time,
            synced_at = excluded.synced_at",
        params![
            c.id,
            c.account_id,
            c.name,
            c.title,
            c.body,
            c.image_url,
            c.image_hash,
            c.video_id,
            c.thumbnail_url,
            c.object_story_spec,
            c.asset_feed_spec,
            c.created_time,
        ],
    )?;
    Ok(())
}

/// A creative waiting for its image URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCreativeImage {
    pub creative_id: String,
    pub account_id: String,
    pub image_hash: String,
}

pub fn list_creatives_missing_images(
    conn: &Connection,
    account_id: Option<&str>,
    creative_ids: &[String],
) -> Result<Vec<PendingCreativeImage>, rusqlite::Error> {
    let mut sql = String::from(
        "SELECT id, account_id, image_hash FROM ad_creatives
         WHERE image_hash IS NOT NULL AND image_hash != '' AND image_url IS NULL",
    );
    let mut values: Vec<String> = Vec::new();
    if let Some(account) = account_id {
        values.push(account.to_string());
        sql.push_str(&format!(" AND account_id = ?{}", values.len()));
    }
    if !creative_ids.is_empty() {
        let start = values.len() + 1;
        let placeholders = (start..start + creative_ids.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(",");
        sql.push_str(&format!(" AND id IN ({placeholders})"));
        values.extend(creative_ids.iter().cloned());
    }
    sql.push_str(" ORDER BY account_id, id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
        Ok(PendingCreativeImage {
            creative_id: row.get(0)?,
            account_id: row.get(1)?,
            image_hash: row.get(2)?,
        })
    })?;
    rows.collect()
}

/// Set the image URL on every creative in the account sharing `image_hash`.
/// Touches no other column.
pub fn set_creative_image_url(
    conn: &Connection,
    account_id: &str,
    image_hash: &str,
    image_url: &str,
) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "UPDATE ad_creatives SET image_url = ?3
         WHERE account_id = ?1 AND image_hash = ?2",
        params![account_id, image_hash, image_url],
    )
}

// ── Insights ───────────────────────────────────────────────────────

pub fn upsert_insight(conn: &Connection, i: &AdInsight) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO ad_insights (
            ad_id, date, adset_id, campaign_id, account_id, impressions, clicks,
            spend, reach, frequency, ctr, cpm, cpc, cpp, conversions, synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, datetime('now'))
        ON CONFLICT(ad_id, date) DO UPDATE SET
            adset_id = excluded.adset_id,
            campaign_id = excluded.campaign_id,
            account_id = excluded.account_id,
            impressions = excluded.impressions,
            clicks = excluded.clicks,
            spend = excluded.spend,
            reach = excluded.reach,
            frequency = excluded.frequency,
            ctr = excluded.ctr,
            cpm = excluded.cpm,
            cpc = excluded.cpc,
            cpp = excluded.cpp,
            conversions = excluded.conversions,
            synced_at = excluded.synced_at",
        params![
            i.ad_id,
            format_ymd(i.date),
            i.adset_id,
            i.campaign_id,
            i.account_id,
            i.impressions,
            i.clicks,
            i.spend,
            i.reach,
            i.frequency,
            i.ctr,
            i.cpm,
            i.cpc,
            i.cpp,
            i.conversions,
        ],
    )?;
    Ok(())
}

// ── Lead platform ──────────────────────────────────────────────────

pub fn upsert_lead_campaign(conn: &Connection, c: &LeadCampaign) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO lead_campaigns (id, name, status, created_at, synced_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            status = excluded.status,
            created_at = excluded.created_at,
            synced_at = excluded.synced_at",
        params![c.id, c.name, c.status, c.created_at],
    )?;
    Ok(())
}

/// Upsert a lead. Both flags are overwritten from the current history
/// snapshot every time.
pub fn upsert_lead(conn: &Connection, l: &LeadRecord) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO lead_records (
            id, lead_campaign_id, full_name, email, phone, status, created_at,
            updated_at, history, qualified, customer_denied, synced_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, datetime('now'))
        ON CONFLICT(id) DO UPDATE SET
            lead_campaign_id = excluded.lead_campaign_id,
            full_name = excluded.full_name,
            email = excluded.email,
            phone = excluded.phone,
            status = excluded.status,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            history = excluded.history,
            qualified = excluded.qualified,
            customer_denied = excluded.customer_denied,
            synced_at = excluded.synced_at",
        params![
            l.id,
            l.lead_campaign_id,
            l.full_name,
            l.email,
            l.phone,
            l.status,
            l.created_at,
            l.updated_at,
            l.history,
            l.qualified.as_str(),
            l.customer_denied.as_str(),
        ],
    )?;
    Ok(())
}

/// Route a transformed record to its table's upsert.
pub fn upsert_record(conn: &Connection, record: &Record) -> Result<(), rusqlite::Error> {
    match record {
        Record::Account(r) => upsert_account(conn, r),
        Record::Campaign(r) => upsert_campaign(conn, r),
        Record::AdSet(r) => upsert_ad_set(conn, r),
        Record::Ad(r) => upsert_ad(conn, r),
        Record::Creative(r) => upsert_creative(conn, r),
        Record::Insight(r) => upsert_insight(conn, r),
        Record::LeadCampaign(r) => upsert_lead_campaign(conn, r),
        Record::Lead(r) => upsert_lead(conn, r),
    }
}

// ── Customers ──────────────────────────────────────────────────────

pub fn upsert_customer(conn: &Connection, id: &str, name: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO customers (id, name) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        params![id, name],
    )?;
    Ok(())
}

/// Record which customer owns a campaign. Returns false if the campaign
/// is unknown.
pub fn assign_campaign_customer(
    conn: &Connection,
    campaign_id: &str,
    customer_id: Option<&str>,
) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "UPDATE campaigns SET customer_id = ?2 WHERE id = ?1",
        params![campaign_id, customer_id],
    )?;
    Ok(count > 0)
}

pub fn map_lead_campaign(
    conn: &Connection,
    customer_id: &str,
    lead_campaign_id: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR IGNORE INTO customer_lead_campaigns (customer_id, lead_campaign_id)
         VALUES (?1, ?2)",
        params![customer_id, lead_campaign_id],
    )?;
    Ok(())
}

// ── Parents ────────────────────────────────────────────────────────

/// Read candidate parents for a sync job. Ordering is left to the caller,
/// which applies the id ordering used for resumption.
pub fn read_parents(conn: &Connection, query: &ParentQuery) -> Result<Vec<ParentRef>, rusqlite::Error> {
    let (select, account_col, status_col) = match &query.source {
        ParentSource::Root(id) => {
            return Ok(vec![ParentRef::new(id.clone())]);
        }
        ParentSource::AdAccounts => (
            "SELECT a.id, a.status, a.id, NULL, NULL FROM ad_accounts a",
            "a.id",
            "a.status",
        ),
        ParentSource::Campaigns => (
            "SELECT c.id, c.status, c.account_id, NULL, NULL FROM campaigns c",
            "c.account_id",
            "c.status",
        ),
        ParentSource::AdSets => (
            "SELECT s.id, s.status, c.account_id, NULL, s.campaign_id FROM ad_sets s
             JOIN campaigns c ON c.id = s.campaign_id",
            "c.account_id",
            "s.status",
        ),
        ParentSource::Ads => (
            "SELECT ad.id, ad.effective_status, c.account_id, ad.adset_id, s.campaign_id FROM ads ad
             JOIN ad_sets s ON s.id = ad.adset_id
             JOIN campaigns c ON c.id = s.campaign_id",
            "c.account_id",
            "ad.effective_status",
        ),
        ParentSource::LeadCampaigns => (
            "SELECT lc.id, lc.status, NULL, NULL, NULL FROM lead_campaigns lc",
            "NULL",
            "lc.status",
        ),
    };

    let mut wheres: Vec<String> = Vec::new();
    let mut values: Vec<String> = Vec::new();

    if query.active_only {
        wheres.push(format!("UPPER({status_col}) = 'ACTIVE'"));
    }
    push_in_clause(&mut wheres, &mut values, account_col, &query.account_ids);
    if !query.customer_ids.is_empty() {
        let owner_sql = match query.source {
            ParentSource::LeadCampaigns => {
                "lc.id IN (SELECT lead_campaign_id FROM customer_lead_campaigns WHERE customer_id IN ({}))"
            }
            ParentSource::AdAccounts => {
                "a.id IN (SELECT account_id FROM campaigns WHERE customer_id IN ({}))"
            }
            _ => "c.customer_id IN ({})",
        };
        let start = values.len() + 1;
        let placeholders = (start..start + query.customer_ids.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(",");
        wheres.push(owner_sql.replace("{}", &placeholders));
        values.extend(query.customer_ids.iter().cloned());
    }

    let mut sql = select.to_string();
    if !wheres.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&wheres.join(" AND "));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
        Ok(ParentRef {
            id: row.get(0)?,
            status: row.get(1)?,
            account_id: row.get(2)?,
            adset_id: row.get(3)?,
            campaign_id: row.get(4)?,
        })
    })?;
    rows.collect()
}

fn push_in_clause(wheres: &mut Vec<String>, values: &mut Vec<String>, column: &str, ids: &[String]) {
    if ids.is_empty() {
        return;
    }
    let start = values.len() + 1;
    let placeholders = (start..start + ids.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(",");
    wheres.push(format!("{column} IN ({placeholders})"));
    values.extend(ids.iter().cloned());
}

// ── Sync runs ──────────────────────────────────────────────────────

pub fn insert_sync_run(conn: &Connection, job_id: &str, entity: &str) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO sync_runs (job_id, entity, status, started_at)
         VALUES (?1, ?2, 'running', datetime('now'))",
        params![job_id, entity],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Final bookkeeping for one run.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome<'a> {
    pub status: &'a str,
    pub total_count: u64,
    pub processed: u64,
    pub failed: u64,
    pub resume: Option<&'a SyncCursor>,
    pub elapsed_ms: u64,
    pub error_message: Option<&'a str>,
}

pub fn finish_sync_run(conn: &Connection, run_id: i64, outcome: &RunOutcome<'_>) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE sync_runs SET
            status = ?2, completed_at = datetime('now'),
            total_count = ?3, processed = ?4, failed = ?5,
            resume_parent_id = ?6, resume_child_id = ?7, resume_chunk_from = ?8,
            elapsed_ms = ?9, error_message = ?10
         WHERE id = ?1",
        params![
            run_id,
            outcome.status,
            outcome.total_count as i64,
            outcome.processed as i64,
            outcome.failed as i64,
            outcome.resume.map(|c| c.parent_id.as_str()),
            outcome.resume.and_then(|c| c.child_id.as_deref()),
            outcome.resume.and_then(|c| c.chunk_from).map(format_ymd),
            outcome.elapsed_ms as i64,
            outcome.error_message,
        ],
    )?;
    Ok(())
}

/// The resume cursor left by the latest run of `entity` under `job_id`,
/// if that run stopped on its budget.
pub fn latest_resume_cursor(
    conn: &Connection,
    job_id: &str,
    entity: &str,
) -> Result<Option<SyncCursor>, rusqlite::Error> {
    conn.query_row(
        "SELECT status, resume_parent_id, resume_child_id, resume_chunk_from FROM sync_runs
         WHERE job_id = ?1 AND entity = ?2
         ORDER BY id DESC LIMIT 1",
        params![job_id, entity],
        |row| {
            let status: String = row.get(0)?;
            let parent: Option<String> = row.get(1)?;
            let child: Option<String> = row.get(2)?;
            let chunk_from: Option<String> = row.get(3)?;
            Ok((status, parent, child, chunk_from))
        },
    )
    .optional()
    .map(|found| match found {
        Some((status, Some(parent_id), child_id, chunk_from)) if status == "partial" => Some(SyncCursor {
            parent_id,
            child_id,
            chunk_from: chunk_from.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        }),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncRunRow {
    pub job_id: String,
    pub entity: String,
    pub status: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub processed: i64,
    pub failed: i64,
}

/// Latest run per entity, newest first.
pub fn latest_runs(conn: &Connection) -> Result<Vec<SyncRunRow>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT job_id, entity, status, started_at, completed_at, processed, failed
         FROM sync_runs r
         WHERE id = (SELECT MAX(id) FROM sync_runs WHERE entity = r.entity)
         ORDER BY id DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(SyncRunRow {
            job_id: row.get(0)?,
            entity: row.get(1)?,
            status: row.get(2)?,
            started_at: row.get(3)?,
            completed_at: row.get(4)?,
            processed: row.get(5)?,
            failed: row.get(6)?,
        })
    })?;
    rows.collect()
}

pub fn table_counts(conn: &Connection) -> Result<Vec<(&'static str, i64)>, rusqlite::Error> {
    const TABLES: &[&str] = &[
        "ad_accounts",
        "campaigns",
        "ad_sets",
        "ads",
        "ad_creatives",
        "ad_insights",
        "lead_campaigns",
        "lead_records",
    ];
    TABLES
        .iter()
        .map(|table| {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok((*table, count))
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::model::Flag;
    use crate::storage::Database;
    use chrono::NaiveDate;

    fn insight(ad_id: &str, day: u32, clicks: Option<i64>) -> AdInsight {
        AdInsight {
            ad_id: ad_id.into(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            adset_id: Some("100".into()),
            campaign_id: Some("10".into()),
            account_id: Some("1".into()),
            impressions: Some(100),
            clicks,
            spend: Some(1.5),
            reach: Some(80),
            frequency: Some(1.25),
            ctr: Some(5.0),
            cpm: Some(15.0),
            cpc: Some(0.3),
            cpp: None,
            conversions: None,
        }
    }

    #[tokio::test]
    async fn test_insight_upsert_overwrites_on_natural_key() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                seed_hierarchy(conn)?;
                upsert_insight(conn, &insight("1000", 1, Some(5)))?;
                upsert_insight(conn, &insight("1000", 1, Some(9)))?;
                upsert_insight(conn, &insight("1000", 2, None))?;

                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM ad_insights", [], |row| row.get(0))?;
                assert_eq!(count, 2);

                let clicks: i64 = conn.query_row(
                    "SELECT clicks FROM ad_insights WHERE ad_id = '1000' AND date = '2024-01-01'",
                    [],
                    |row| row.get(0),
                )?;
                assert_eq!(clicks, 9);

                // Unknown stays NULL, never zero.
                let missing: Option<i64> = conn.query_row(
                    "SELECT clicks FROM ad_insights WHERE date = '2024-01-02'",
                    [],
                    |row| row.get(0),
                )?;
                assert_eq!(missing, None);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_insight_for_unknown_ad_is_rejected() {
        let db = Database::open_memory().await.unwrap();

        let result = db
            .writer()
            .call(|conn| upsert_insight(conn, &insight("4040", 1, Some(1))))
            .await;
        assert!(result.is_err(), "foreign key on ad_id should reject orphans");
    }

    #[tokio::test]
    async fn test_campaign_upsert_preserves_customer_assignment() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                seed_hierarchy(conn)?;
                upsert_customer(conn, "cust-1", "Bäckerei Schmidt")?;
                assert!(assign_campaign_customer(conn, "10", Some("cust-1"))?);
                assert!(!assign_campaign_customer(conn, "999", Some("cust-1"))?);

                let mut renamed = campaign("10", "1");
                renamed.name = Some("Renamed".into());
                upsert_campaign(conn, &renamed)?;

                let (name, customer): (String, Option<String>) = conn.query_row(
                    "SELECT name, customer_id FROM campaigns WHERE id = '10'",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                assert_eq!(name, "Renamed");
                assert_eq!(customer.as_deref(), Some("cust-1"));
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_creative_upsert_keeps_enriched_image() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                upsert_account(conn, &account("1", "ACTIVE"))?;
                let creative = AdCreative {
                    id: "c1".into(),
                    account_id: "1".into(),
                    name: Some("Spring".into()),
                    title: None,
                    body: None,
                    image_url: None,
                    image_hash: Some("abc".into()),
                    video_id: None,
                    thumbnail_url: None,
                    object_story_spec: None,
                    asset_feed_spec: None,
                    created_time: None,
                };
                upsert_creative(conn, &creative)?;

                let pending = list_creatives_missing_images(conn, Some("1"), &[])?;
                assert_eq!(pending.len(), 1);
                assert_eq!(pending[0].image_hash, "abc");

                assert_eq!(set_creative_image_url(conn, "1", "abc", "https://cdn/img.jpg")?, 1);
                upsert_creative(conn, &creative)?;

                let url: Option<String> = conn.query_row(
                    "SELECT image_url FROM ad_creatives WHERE id = 'c1'",
                    [],
                    |row| row.get(0),
                )?;
                assert_eq!(url.as_deref(), Some("https://cdn/img.jpg"));
                assert!(list_creatives_missing_images(conn, None, &[])?.is_empty());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_read_parents_filters() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                upsert_account(conn, &account("1", "ACTIVE"))?;
                upsert_account(conn, &account("2", "DISABLED"))?;
                upsert_campaign(conn, &campaign("10", "1"))?;
                let mut paused = campaign("20", "2");
                paused.status = Some("PAUSED".into());
                upsert_campaign(conn, &paused)?;

                let all = read_parents(conn, &ParentQuery::new(ParentSource::AdAccounts))?;
                assert_eq!(all.len(), 2);

                let active = read_parents(
                    conn,
                    &ParentQuery::new(ParentSource::AdAccounts).active_only(true),
                )?;
                assert_eq!(active.len(), 1);
                assert_eq!(active[0].id, "1");

                let scoped = read_parents(
                    conn,
                    &ParentQuery::new(ParentSource::Campaigns).accounts(vec!["2".into()]),
                )?;
                assert_eq!(scoped.len(), 1);
                assert_eq!(scoped[0].id, "20");
                assert_eq!(scoped[0].account_id.as_deref(), Some("2"));

                let root = read_parents(conn, &ParentQuery::new(ParentSource::Root("me".into())))?;
                assert_eq!(root, vec![ParentRef::new("me")]);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_read_lead_campaigns_by_customer() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                for id in ["lc-a", "lc-b"] {
                    upsert_lead_campaign(
                        conn,
                        &LeadCampaign {
                            id: id.into(),
                            name: None,
                            status: Some("active".into()),
                            created_at: None,
                        },
                    )?;
                }
                upsert_customer(conn, "cust-1", "Kunde 1")?;
                map_lead_campaign(conn, "cust-1", "lc-b")?;

                let parents = read_parents(
                    conn,
                    &ParentQuery::new(ParentSource::LeadCampaigns)
                        .customers(vec!["cust-1".into()])
                        .active_only(true),
                )?;
                assert_eq!(parents.len(), 1);
                assert_eq!(parents[0].id, "lc-b");
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_lead_flags_are_replaced() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                upsert_lead_campaign(
                    conn,
                    &LeadCampaign {
                        id: "lc".into(),
                        name: None,
                        status: None,
                        created_at: None,
                    },
                )?;
                let mut lead = LeadRecord {
                    id: "l1".into(),
                    lead_campaign_id: "lc".into(),
                    full_name: Some("Erika Mustermann".into()),
                    email: None,
                    phone: None,
                    status: Some("Qualifiziert".into()),
                    created_at: None,
                    updated_at: None,
                    history: "[]".into(),
                    qualified: Flag::Yes,
                    customer_denied: Flag::No,
                };
                upsert_lead(conn, &lead)?;
                lead.qualified = Flag::No;
                upsert_lead(conn, &lead)?;

                let qualified: String = conn.query_row(
                    "SELECT qualified FROM lead_records WHERE id = 'l1'",
                    [],
                    |row| row.get(0),
                )?;
                assert_eq!(qualified, "NO");
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sync_run_resume_cursor() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let run = insert_sync_run(conn, "job-1", "campaigns")?;
                let cursor = SyncCursor {
                    parent_id: "42".into(),
                    child_id: Some("4200".into()),
                    chunk_from: NaiveDate::from_ymd_opt(2024, 3, 8),
                };
                finish_sync_run(
                    conn,
                    run,
                    &RunOutcome {
                        status: "partial",
                        processed: 3,
                        resume: Some(&cursor),
                        ..Default::default()
                    },
                )?;
                assert_eq!(latest_resume_cursor(conn, "job-1", "campaigns")?, Some(cursor));
                assert_eq!(latest_resume_cursor(conn, "job-1", "ads")?, None);

                let run = insert_sync_run(conn, "job-1", "campaigns")?;
                finish_sync_run(
                    conn,
                    run,
                    &RunOutcome {
                        status: "completed",
                        ..Default::default()
                    },
                )?;
                assert_eq!(latest_resume_cursor(conn, "job-1", "campaigns")?, None);

                let runs = latest_runs(conn)?;
                assert_eq!(runs.len(), 1);
                assert_eq!(runs[0].status, "completed");
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }
}
