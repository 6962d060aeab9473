//! Payload to row mapping.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::config::LeadStatusLabels;
use crate::error::{Error, Result};
use crate::ids::normalize_account_id;
use crate::model::{
    Ad, AdAccount, AdCreative, AdInsight, AdSet, Campaign, Flag, LeadCampaign, LeadRecord,
};
use crate::sync::payloads::{
    AccountPayload, AdPayload, AdSetPayload, CampaignPayload, CreativePayload, InsightPayload,
    LeadCampaignPayload, LeadPayload, StatusChange,
};

/// Action types counted as conversions, in priority order. The first one
/// present wins so that grouped and raw lead actions are not double counted.
const CONVERSION_ACTIONS: &[&str] = &[
    "lead",
    "onsite_conversion.lead_grouped",
    "offsite_conversion.fb_pixel_lead",
];

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Decode(e.to_string()))
}

/// Best-effort id of a raw item, for error reporting.
pub fn item_id(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Normalize an upstream timestamp to RFC 3339 UTC.
///
/// Accepts RFC 3339, the Graph form `2024-01-05T10:00:00+0100`, naive
/// date-times (taken as UTC) and bare dates (midnight UTC).
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let utc: DateTime<Utc> = if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        dt.with_timezone(&Utc)
    } else if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        dt.with_timezone(&Utc)
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        dt.and_utc()
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        dt.and_utc()
    } else if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        d.and_hms_opt(0, 0, 0)?.and_utc()
    } else {
        log::debug!("Unparseable timestamp {raw:?}");
        return None;
    };
    Some(utc.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn ts(raw: Option<String>) -> Option<String> {
    raw.as_deref().and_then(normalize_timestamp)
}

pub fn account_status_label(code: i64) -> String {
    match code {
        1 => "ACTIVE",
        2 => "DISABLED",
        3 => "UNSETTLED",
        7 => "PENDING_RISK_REVIEW",
        8 => "PENDING_SETTLEMENT",
        9 => "IN_GRACE_PERIOD",
        100 => "PENDING_CLOSURE",
        101 => "CLOSED",
        201 => "ANY_ACTIVE",
        202 => "ANY_CLOSED",
        _ => return format!("UNKNOWN_{code}"),
    }
    .to_string()
}

pub fn to_account(value: Value) -> Result<AdAccount> {
    let p: AccountPayload = decode(value)?;
    let id = match p.account_id {
        Some(id) => normalize_account_id(&id)?,
        None => normalize_account_id(&p.id)?,
    };
    Ok(AdAccount {
        id,
        name: p.name,
        currency: p.currency,
        timezone: p.timezone_name,
        status: p.account_status.map(account_status_label),
        created_time: ts(p.created_time),
    })
}

pub fn to_campaign(value: Value, account_id: &str) -> Result<Campaign> {
    let p: CampaignPayload = decode(value)?;
    Ok(Campaign {
        id: p.id,
        account_id: account_id.to_string(),
        customer_id: None,
        name: p.name,
        status: p.status,
        objective: p.objective,
        daily_budget: p.daily_budget,
        start_time: ts(p.start_time),
        stop_time: ts(p.stop_time),
        created_time: ts(p.created_time),
        updated_time: ts(p.updated_time),
    })
}

pub fn to_ad_set(value: Value, campaign_id: &str) -> Result<AdSet> {
    let p: AdSetPayload = decode(value)?;
    Ok(AdSet {
        id: p.id,
        campaign_id: p.campaign_id.unwrap_or_else(|| campaign_id.to_string()),
        name: p.name,
        status: p.status,
        optimization_goal: p.optimization_goal,
        bid_strategy: p.bid_strategy,
        daily_budget: p.daily_budget,
        start_time: ts(p.start_time),
        end_time: ts(p.end_time),
    })
}

pub fn to_ad(value: Value, adset_id: &str) -> Result<Ad> {
    let p: AdPayload = decode(value)?;
    Ok(Ad {
        id: p.id,
        adset_id: p.adset_id.unwrap_or_else(|| adset_id.to_string()),
        campaign_id: p.campaign_id,
        name: p.name,
        status: p.status,
        effective_status: p.effective_status,
        creative_id: p.creative.map(|c| c.id),
        created_time: ts(p.created_time),
        updated_time: ts(p.updated_time),
    })
}

pub fn to_creative(value: Value, account_id: &str) -> Result<AdCreative> {
    let p: CreativePayload = decode(value)?;
    let opaque = |v: Option<Value>| v.filter(|v| !v.is_null()).map(|v| v.to_string());
    Ok(AdCreative {
        id: p.id,
        account_id: account_id.to_string(),
        name: p.name,
        title: p.title,
        body: p.body,
        image_url: p.image_url.filter(|u| !u.is_empty()),
        image_hash: p.image_hash.filter(|h| !h.is_empty()),
        video_id: p.video_id,
        thumbnail_url: p.thumbnail_url,
        object_story_spec: opaque(p.object_story_spec),
        asset_feed_spec: opaque(p.asset_feed_spec),
        created_time: ts(p.created_time),
    })
}

/// Map one daily insight row. Lineage ids missing from the payload are
/// filled from the ad being synced.
pub fn to_insight(
    value: Value,
    ad_id: &str,
    adset_id: &str,
    campaign_id: &str,
    account_id: &str,
) -> Result<AdInsight> {
    let p: InsightPayload = decode(value)?;
    let date = NaiveDate::parse_from_str(&p.date_start, "%Y-%m-%d")
        .map_err(|e| Error::Decode(format!("invalid date_start {:?}: {e}", p.date_start)))?;
    let conversions = CONVERSION_ACTIONS
        .iter()
        .find_map(|t| p.actions.iter().find(|a| a.action_type == *t))
        .and_then(|a| a.value);
    Ok(AdInsight {
        ad_id: p.ad_id.unwrap_or_else(|| ad_id.to_string()),
        date,
        adset_id: Some(p.adset_id.unwrap_or_else(|| adset_id.to_string())),
        campaign_id: Some(p.campaign_id.unwrap_or_else(|| campaign_id.to_string())),
        account_id: Some(account_id.to_string()),
        impressions: p.impressions,
        clicks: p.clicks,
        spend: p.spend,
        reach: p.reach,
        frequency: p.frequency,
        ctr: p.ctr,
        cpm: p.cpm,
        cpc: p.cpc,
        cpp: p.cpp,
        conversions,
    })
}

pub fn to_lead_campaign(value: Value) -> Result<LeadCampaign> {
    let p: LeadCampaignPayload = decode(value)?;
    Ok(LeadCampaign {
        id: p.id,
        name: p.name,
        status: p.status,
        created_at: ts(p.created_at),
    })
}

pub fn to_lead(value: Value, lead_campaign_id: &str, labels: &LeadStatusLabels) -> Result<LeadRecord> {
    let p: LeadPayload = decode(value)?;
    let (qualified, customer_denied) = derive_lead_flags(&p.history, labels);
    Ok(LeadRecord {
        id: p.id,
        lead_campaign_id: p
            .campaign_id
            .unwrap_or_else(|| lead_campaign_id.to_string()),
        full_name: p.full_name,
        email: p.email,
        phone: p.phone,
        status: p.status,
        created_at: ts(p.created_at),
        updated_at: ts(p.updated_at),
        history: Value::Array(p.history).to_string(),
        qualified,
        customer_denied,
    })
}

/// Derive `(qualified, customer_denied)` from a full status history.
///
/// Each flag is YES if any transition's `newStatus` is in its label set.
/// The flags are independent. Entries without a readable `newStatus` are
/// ignored.
pub fn derive_lead_flags(history: &[Value], labels: &LeadStatusLabels) -> (Flag, Flag) {
    let statuses: Vec<String> = history
        .iter()
        .filter_map(|event| serde_json::from_value::<StatusChange>(event.clone()).ok())
        .filter_map(|change| change.new_status)
        .map(|s| s.trim().to_string())
        .collect();
    let any_in = |set: &[String]| statuses.iter().any(|s| set.iter().any(|l| l == s));
    (
        Flag::from_bool(any_in(&labels.qualified)),
        Flag::from_bool(any_in(&labels.denied)),
    )
}
