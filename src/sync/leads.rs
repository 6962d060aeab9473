use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::sync::upstream::{Page, PageRequest, UpstreamClient};

/// Client for the lead-tracking platform's REST API.
///
/// Collections answer either a bare array or `{data, nextCursor}`.
pub struct LeadsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    page_size: u32,
}

impl LeadsClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let api_key = config.require_leads_key()?.to_string();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.leads_api_base_url.clone(),
            api_key,
            page_size: config.page_size,
        })
    }
}

#[async_trait]
impl UpstreamClient for LeadsClient {
    async fn fetch(&self, request: &PageRequest) -> Result<Page> {
        let url = format!("{}/{}", self.base_url, request.path.trim_start_matches('/'));
        let mut query: Vec<(&str, String)> = request
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();
        query.push(("limit", self.page_size.to_string()));
        if let Some(cursor) = &request.after {
            query.push(("cursor", cursor.clone()));
        }

        log::debug!("GET {url} (cursor={:?})", request.after);
        let response = self
            .http
            .get(&url)
            .query(&query)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }
        parse_leads_page(&body)
    }
}

pub fn parse_leads_page(body: &str) -> Result<Page> {
    match serde_json::from_str::<Value>(body)? {
        Value::Array(items) => Ok(Page { items, next: None }),
        Value::Object(mut map) => {
            let items = match map.remove("data") {
                Some(Value::Array(items)) => items,
                Some(other) => {
                    return Err(Error::Decode(format!("expected array in data, got {other}")))
                }
                None => Vec::new(),
            };
            let next = ["nextCursor", "next_cursor"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            Ok(Page { items, next })
        }
        other => Err(Error::Decode(format!("unexpected lead payload: {other}"))),
    }
}
