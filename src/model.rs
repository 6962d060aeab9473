//! Stored row types. Every upstream payload is converted into one of these
//! before it reaches the store; the store never sees raw JSON maps.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Boolean-like flag persisted as `YES` / `NO`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Flag {
    Yes,
    #[default]
    No,
}

impl Flag {
    pub fn as_str(self) -> &'static str {
        match self {
            Flag::Yes => "YES",
            Flag::No => "NO",
        }
    }

    pub fn from_bool(value: bool) -> Self {
        if value {
            Flag::Yes
        } else {
            Flag::No
        }
    }

    pub fn is_yes(self) -> bool {
        self == Flag::Yes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdAccount {
    pub id: String,
    pub name: Option<String>,
    pub currency: Option<String>,
    pub timezone: Option<String>,
    pub status: Option<String>,
    pub created_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Campaign {
    pub id: String,
    pub account_id: String,
    /// Assigned manually; sync never writes it.
    pub customer_id: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub objective: Option<String>,
    pub daily_budget: Option<f64>,
    pub start_time: Option<String>,
    pub stop_time: Option<String>,
    pub created_time: Option<String>,
    pub updated_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdSet {
    pub id: String,
    pub campaign_id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub optimization_goal: Option<String>,
    pub bid_strategy: Option<String>,
    pub daily_budget: Option<f64>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ad {
    pub id: String,
    pub adset_id: String,
    pub campaign_id: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub effective_status: Option<String>,
    pub creative_id: Option<String>,
    pub created_time: Option<String>,
    pub updated_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdCreative {
    pub id: String,
    pub account_id: String,
    pub name: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub image_hash: Option<String>,
    pub video_id: Option<String>,
    pub thumbnail_url: Option<String>,
    /// Serialized JSON, stored opaque.
    pub object_story_spec: Option<String>,
    pub asset_feed_spec: Option<String>,
    pub created_time: Option<String>,
}

/// One row per ad per calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdInsight {
    pub ad_id: String,
    pub date: NaiveDate,
    pub adset_id: Option<String>,
    pub campaign_id: Option<String>,
    pub account_id: Option<String>,
    pub impressions: Option<i64>,
    pub clicks: Option<i64>,
    pub spend: Option<f64>,
    pub reach: Option<i64>,
    pub frequency: Option<f64>,
    pub ctr: Option<f64>,
    pub cpm: Option<f64>,
    pub cpc: Option<f64>,
    pub cpp: Option<f64>,
    pub conversions: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadCampaign {
    pub id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadRecord {
    pub id: String,
    pub lead_campaign_id: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    /// Serialized status-transition history as received.
    pub history: String,
    pub qualified: Flag,
    pub customer_denied: Flag,
}

/// A transformed row ready for upsert, tagged with its table.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Account(AdAccount),
    Campaign(Campaign),
    AdSet(AdSet),
    Ad(Ad),
    Creative(AdCreative),
    Insight(AdInsight),
    LeadCampaign(LeadCampaign),
    Lead(LeadRecord),
}

impl Record {
    pub fn table(&self) -> &'static str {
        match self {
            Record::Account(_) => "ad_accounts",
            Record::Campaign(_) => "campaigns",
            Record::AdSet(_) => "ad_sets",
            Record::Ad(_) => "ads",
            Record::Creative(_) => "ad_creatives",
            Record::Insight(_) => "ad_insights",
            Record::LeadCampaign(_) => "lead_campaigns",
            Record::Lead(_) => "lead_records",
        }
    }

    /// Natural key used for conflict resolution and error reporting.
    pub fn key(&self) -> String {
        match self {
            Record::Account(r) => r.id.clone(),
            Record::Campaign(r) => r.id.clone(),
            Record::AdSet(r) => r.id.clone(),
            Record::Ad(r) => r.id.clone(),
            Record::Creative(r) => r.id.clone(),
            Record::Insight(r) => format!("{}:{}", r.ad_id, r.date.format("%Y-%m-%d")),
            Record::LeadCampaign(r) => r.id.clone(),
            Record::Lead(r) => r.id.clone(),
        }
    }
}

/// A parent row as seen by a sync job: its id plus the attributes
/// parent predicates filter on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    pub id: String,
    pub status: Option<String>,
    pub account_id: Option<String>,
    /// Lineage, filled for ads and ad sets.
    pub adset_id: Option<String>,
    pub campaign_id: Option<String>,
}

impl ParentRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: None,
            account_id: None,
            adset_id: None,
            campaign_id: None,
        }
    }
}
