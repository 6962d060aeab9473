//! Upstream payload schemas, one per resource.
//!
//! The ad platform sends most numbers as strings and omits fields freely.
//! Numeric fields decode leniently: a number or a numeric string yields a
//! value, anything else (absent, empty, garbage) yields `None`. Integer
//! fields also take `12.0` or `1e3`, but a fractional value such as `12.7`
//! is treated as garbage rather than truncated.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn lenient_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

pub fn de_opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(value.as_ref().and_then(lenient_f64))
}

fn lenient_i64(value: &Value) -> Option<i64> {
    let exact = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    exact.or_else(|| {
        lenient_f64(value)
            .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

pub fn de_opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(value.as_ref().and_then(lenient_i64))
}

/// Identifiers may arrive as numbers or strings.
pub fn de_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) if !s.is_empty() => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid id: {other}"))),
    }
}

pub fn de_opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
pub struct AccountPayload {
    /// `act_<id>`
    pub id: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub account_id: Option<String>,
    pub name: Option<String>,
    pub currency: Option<String>,
    pub timezone_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub account_status: Option<i64>,
    pub created_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CampaignPayload {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub objective: Option<String>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub daily_budget: Option<f64>,
    pub start_time: Option<String>,
    pub stop_time: Option<String>,
    pub created_time: Option<String>,
    pub updated_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdSetPayload {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub campaign_id: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub optimization_goal: Option<String>,
    pub bid_strategy: Option<String>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub daily_budget: Option<f64>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IdRef {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct AdPayload {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub adset_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub campaign_id: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub effective_status: Option<String>,
    pub creative: Option<IdRef>,
    pub created_time: Option<String>,
    pub updated_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreativePayload {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub image_hash: Option<String>,
    pub video_id: Option<String>,
    pub thumbnail_url: Option<String>,
    pub object_story_spec: Option<Value>,
    pub asset_feed_spec: Option<Value>,
    pub created_time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActionValue {
    pub action_type: String,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub value: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct InsightPayload {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub ad_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub adset_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub campaign_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub account_id: Option<String>,
    pub date_start: String,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub impressions: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub clicks: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub spend: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub reach: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub frequency: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub ctr: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub cpm: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub cpc: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub cpp: Option<f64>,
    #[serde(default)]
    pub actions: Vec<ActionValue>,
}

#[derive(Debug, Deserialize)]
pub struct AdImagePayload {
    pub hash: String,
    pub url: Option<String>,
    pub permalink_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadCampaignPayload {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    #[serde(alias = "created_at")]
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    #[serde(alias = "new_status")]
    pub new_status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadPayload {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, alias = "campaign_id", deserialize_with = "de_opt_id")]
    pub campaign_id: Option<String>,
    #[serde(alias = "full_name", alias = "name")]
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    #[serde(alias = "created_at")]
    pub created_at: Option<String>,
    #[serde(alias = "updated_at")]
    pub updated_at: Option<String>,
    #[serde(default, alias = "status_history")]
    pub history: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_strings_parse() {
        let insight: InsightPayload = serde_json::from_value(json!({
            "ad_id": "1",
            "date_start": "2024-01-01",
            "impressions": "1200",
            "clicks": 34,
            "spend": "12.50",
            "ctr": "2.83",
        }))
        .unwrap();
        assert_eq!(insight.impressions, Some(1200));
        assert_eq!(insight.clicks, Some(34));
        assert_eq!(insight.spend, Some(12.5));
        assert_eq!(insight.ctr, Some(2.83));
    }

    #[test]
    fn test_unparseable_is_null_not_zero() {
        let insight: InsightPayload = serde_json::from_value(json!({
            "date_start": "2024-01-01",
            "impressions": "",
            "spend": "n/a",
            "cpm": null,
        }))
        .unwrap();
        assert_eq!(insight.impressions, None);
        assert_eq!(insight.spend, None);
        assert_eq!(insight.cpm, None);
        assert_eq!(insight.reach, None);
    }

    #[test]
    fn test_counts_must_be_integral() {
        let insight: InsightPayload = serde_json::from_value(json!({
            "date_start": "2024-01-01",
            "impressions": "12.7",
            "clicks": "4.0",
            "reach": 3.5,
        }))
        .unwrap();
        assert_eq!(insight.impressions, None);
        assert_eq!(insight.clicks, Some(4));
        assert_eq!(insight.reach, None);

        let insight: InsightPayload = serde_json::from_value(json!({
            "date_start": "2024-01-01",
            "impressions": "1e3",
            "clicks": 2.0,
        }))
        .unwrap();
        assert_eq!(insight.impressions, Some(1000));
        assert_eq!(insight.clicks, Some(2));
    }

    #[test]
    fn test_numeric_ids() {
        let lead: LeadPayload = serde_json::from_value(json!({
            "id": 981,
            "campaign_id": 12,
            "name": "Max",
            "history": [{"newStatus": "Qualifiziert"}]
        }))
        .unwrap();
        assert_eq!(lead.id, "981");
        assert_eq!(lead.campaign_id.as_deref(), Some("12"));
        assert_eq!(lead.full_name.as_deref(), Some("Max"));
        assert_eq!(lead.history.len(), 1);
    }

    #[test]
    fn test_missing_id_fails() {
        assert!(serde_json::from_value::<CampaignPayload>(json!({"name": "x"})).is_err());
    }
}
