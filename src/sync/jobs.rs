use serde_json::Value;

use crate::config::LeadStatusLabels;
use crate::date_util::format_ymd;
use crate::error::Result;
use crate::ids::account_node;
use crate::model::{ParentRef, Record};
use crate::query::period::DateRange;
use crate::storage::{ParentQuery, ParentSource};
use crate::sync::transform;
use crate::sync::upstream::PageRequest;
use crate::sync::SyncOptions;

const ACCOUNT_FIELDS: &str = "id,account_id,name,currency,timezone_name,account_status,created_time";
const CAMPAIGN_FIELDS: &str =
    "id,name,status,objective,daily_budget,start_time,stop_time,created_time,updated_time";
const AD_SET_FIELDS: &str =
    "id,campaign_id,name,status,optimization_goal,bid_strategy,daily_budget,start_time,end_time";
const AD_FIELDS: &str =
    "id,adset_id,campaign_id,name,status,effective_status,creative{id},created_time,updated_time";
const CREATIVE_FIELDS: &str = "id,name,title,body,image_url,image_hash,video_id,thumbnail_url,object_story_spec,asset_feed_spec";
pub const INSIGHT_FIELDS: &str = "ad_id,adset_id,campaign_id,account_id,date_start,impressions,clicks,spend,reach,frequency,ctr,cpm,cpc,cpp,actions";

/// Which upstream a job talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Ads,
    Leads,
}

/// One resource type's sync: where its parents come from, what to request
/// per parent, and how an item becomes a row.
pub trait EntityJob: Send + Sync {
    fn entity(&self) -> &'static str;

    fn platform(&self) -> Platform {
        Platform::Ads
    }

    fn parent_query(&self, options: &SyncOptions) -> ParentQuery;

    fn request(&self, parent: &ParentRef) -> PageRequest;

    fn transform(&self, parent: &ParentRef, item: Value) -> Result<Record>;
}

/// Ad accounts visible to the token owner.
pub struct AccountsJob;

impl EntityJob for AccountsJob {
    fn entity(&self) -> &'static str {
        "ad_accounts"
    }

    fn parent_query(&self, _options: &SyncOptions) -> ParentQuery {
        ParentQuery::new(ParentSource::Root("me".into()))
    }

    fn request(&self, parent: &ParentRef) -> PageRequest {
        PageRequest::new(format!("{}/adaccounts", parent.id)).fields(ACCOUNT_FIELDS)
    }

    fn transform(&self, _parent: &ParentRef, item: Value) -> Result<Record> {
        transform::to_account(item).map(Record::Account)
    }
}

pub struct CampaignsJob;

impl EntityJob for CampaignsJob {
    fn entity(&self) -> &'static str {
        "campaigns"
    }

    fn parent_query(&self, options: &SyncOptions) -> ParentQuery {
        ParentQuery::new(ParentSource::AdAccounts)
            .active_only(options.active_only)
            .accounts(options.account_ids.clone())
    }

    fn request(&self, parent: &ParentRef) -> PageRequest {
        PageRequest::new(format!("{}/campaigns", account_node(&parent.id))).fields(CAMPAIGN_FIELDS)
    }

    fn transform(&self, parent: &ParentRef, item: Value) -> Result<Record> {
        transform::to_campaign(item, &parent.id).map(Record::Campaign)
    }
}

pub struct AdSetsJob;

impl EntityJob for AdSetsJob {
    fn entity(&self) -> &'static str {
        "ad_sets"
    }

    fn parent_query(&self, options: &SyncOptions) -> ParentQuery {
        ParentQuery::new(ParentSource::Campaigns)
            .active_only(options.active_only)
            .accounts(options.account_ids.clone())
            .customers(options.customer_ids.clone())
    }

    fn request(&self, parent: &ParentRef) -> PageRequest {
        PageRequest::new(format!("{}/adsets", parent.id)).fields(AD_SET_FIELDS)
    }

    fn transform(&self, parent: &ParentRef, item: Value) -> Result<Record> {
        transform::to_ad_set(item, &parent.id).map(Record::AdSet)
    }
}

pub struct AdsJob;

impl EntityJob for AdsJob {
    fn entity(&self) -> &'static str {
        "ads"
    }

    fn parent_query(&self, options: &SyncOptions) -> ParentQuery {
        ParentQuery::new(ParentSource::AdSets)
            .active_only(options.active_only)
            .accounts(options.account_ids.clone())
            .customers(options.customer_ids.clone())
    }

    fn request(&self, parent: &ParentRef) -> PageRequest {
        PageRequest::new(format!("{}/ads", parent.id)).fields(AD_FIELDS)
    }

    fn transform(&self, parent: &ParentRef, item: Value) -> Result<Record> {
        transform::to_ad(item, &parent.id).map(Record::Ad)
    }
}

/// Creatives are listed per ad account rather than per ad.
pub struct CreativesJob;

impl EntityJob for CreativesJob {
    fn entity(&self) -> &'static str {
        "ad_creatives"
    }

    fn parent_query(&self, options: &SyncOptions) -> ParentQuery {
        ParentQuery::new(ParentSource::AdAccounts)
            .active_only(options.active_only)
            .accounts(options.account_ids.clone())
    }

    fn request(&self, parent: &ParentRef) -> PageRequest {
        PageRequest::new(format!("{}/adcreatives", account_node(&parent.id)))
            .fields(CREATIVE_FIELDS)
    }

    fn transform(&self, parent: &ParentRef, item: Value) -> Result<Record> {
        transform::to_creative(item, &parent.id).map(Record::Creative)
    }
}

/// Lead campaigns live at the root of the lead platform.
pub struct LeadCampaignsJob;

impl EntityJob for LeadCampaignsJob {
    fn entity(&self) -> &'static str {
        "lead_campaigns"
    }

    fn platform(&self) -> Platform {
        Platform::Leads
    }

    fn parent_query(&self, _options: &SyncOptions) -> ParentQuery {
        ParentQuery::new(ParentSource::Root("campaigns".into()))
    }

    fn request(&self, parent: &ParentRef) -> PageRequest {
        PageRequest::new(parent.id.clone())
    }

    fn transform(&self, _parent: &ParentRef, item: Value) -> Result<Record> {
        transform::to_lead_campaign(item).map(Record::LeadCampaign)
    }
}

pub struct LeadsJob {
    pub labels: LeadStatusLabels,
}

impl EntityJob for LeadsJob {
    fn entity(&self) -> &'static str {
        "lead_records"
    }

    fn platform(&self) -> Platform {
        Platform::Leads
    }

    fn parent_query(&self, options: &SyncOptions) -> ParentQuery {
        ParentQuery::new(ParentSource::LeadCampaigns)
            .active_only(options.active_only)
            .customers(options.customer_ids.clone())
    }

    fn request(&self, parent: &ParentRef) -> PageRequest {
        PageRequest::new(format!("campaigns/{}/leads", parent.id))
    }

    fn transform(&self, parent: &ParentRef, item: Value) -> Result<Record> {
        transform::to_lead(item, &parent.id, &self.labels).map(Record::Lead)
    }
}

/// Daily insights per ad, fetched one date chunk at a time.
#[derive(Debug, Clone)]
pub struct InsightsJob {
    pub range: DateRange,
    pub chunk_days: u32,
}

impl InsightsJob {
    pub const ENTITY: &'static str = "ad_insights";

    pub fn parent_query(&self, options: &SyncOptions) -> ParentQuery {
        ParentQuery::new(ParentSource::AdAccounts)
            .active_only(options.active_only)
            .accounts(options.account_ids.clone())
    }

    pub fn request(&self, ad_id: &str, chunk: &DateRange) -> PageRequest {
        let time_range = serde_json::json!({
            "since": format_ymd(chunk.start),
            "until": format_ymd(chunk.end),
        });
        PageRequest::new(format!("{ad_id}/insights"))
            .fields(INSIGHT_FIELDS)
            .param("level", "ad")
            .param("time_increment", "1")
            .param("time_range", time_range.to_string())
    }
}

/// Look up a generic job by the entity name used on the wire and the CLI.
pub fn job_for(entity: &str, labels: &LeadStatusLabels) -> Option<Box<dyn EntityJob>> {
    let job: Box<dyn EntityJob> = match entity {
        "ad-accounts" | "ad_accounts" | "accounts" => Box::new(AccountsJob),
        "campaigns" => Box::new(CampaignsJob),
        "ad-sets" | "ad_sets" | "adsets" => Box::new(AdSetsJob),
        "ads" => Box::new(AdsJob),
        "creatives" | "ad_creatives" => Box::new(CreativesJob),
        "lead-campaigns" | "lead_campaigns" => Box::new(LeadCampaignsJob),
        "leads" | "lead_records" => Box::new(LeadsJob {
            labels: labels.clone(),
        }),
        _ => return None,
    };
    Some(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_campaign_request_uses_account_node() {
        let request = CampaignsJob.request(&ParentRef::new("123"));
        assert_eq!(request.path, "act_123/campaigns");
        assert!(request.params.iter().any(|(k, v)| k == "fields" && v.contains("objective")));
    }

    #[test]
    fn test_parent_query_carries_filters() {
        let options = SyncOptions {
            active_only: true,
            account_ids: vec!["1".into()],
            customer_ids: vec!["c".into()],
            ..Default::default()
        };
        let query = AdsJob.parent_query(&options);
        assert_eq!(query.source, ParentSource::AdSets);
        assert!(query.active_only);
        assert_eq!(query.account_ids, vec!["1".to_string()]);
        assert_eq!(query.customer_ids, vec!["c".to_string()]);

        let root = AccountsJob.parent_query(&options);
        assert_eq!(root.source, ParentSource::Root("me".into()));
    }

    #[test]
    fn test_insight_request_time_range() {
        let job = InsightsJob {
            range: DateRange::new(
                chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                chrono::NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            ),
            chunk_days: 7,
        };
        let request = job.request("1000", &job.range);
        assert_eq!(request.path, "1000/insights");
        let (_, range) = request.params.iter().find(|(k, _)| k == "time_range").unwrap();
        let range: Value = serde_json::from_str(range).unwrap();
        assert_eq!(range, json!({"since": "2024-01-01", "until": "2024-01-31"}));
    }

    #[test]
    fn test_job_lookup() {
        let labels = LeadStatusLabels::default();
        assert_eq!(job_for("ad-sets", &labels).unwrap().entity(), "ad_sets");
        assert_eq!(job_for("leads", &labels).unwrap().entity(), "lead_records");
        assert_eq!(job_for("leads", &labels).unwrap().platform(), Platform::Leads);
        assert_eq!(job_for("ads", &labels).unwrap().platform(), Platform::Ads);
        assert!(job_for("insights", &labels).is_none());
    }

    #[test]
    fn test_lead_transform_uses_parent() {
        let job = LeadsJob {
            labels: LeadStatusLabels::default(),
        };
        let record = job
            .transform(
                &ParentRef::new("lc-1"),
                json!({"id": "l1", "history": [{"newStatus": "Absage"}]}),
            )
            .unwrap();
        match record {
            Record::Lead(lead) => {
                assert_eq!(lead.lead_campaign_id, "lc-1");
                assert!(lead.customer_denied.is_yes());
                assert!(!lead.qualified.is_yes());
            }
            other => panic!("unexpected record {other:?}"),
        }
    }
}
