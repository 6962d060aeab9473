use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::sync::upstream::{Page, PageRequest, UpstreamClient};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the advertising platform's Graph API.
pub struct GraphClient {
    http: reqwest::Client,
    api_root: String,
    access_token: String,
    page_size: u32,
}

impl GraphClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let access_token = config.require_graph_token()?.to_string();
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_root: format!("{}/{}", config.graph_api_base_url, config.graph_api_version),
            access_token,
            page_size: config.page_size,
        })
    }
}

#[async_trait]
impl UpstreamClient for GraphClient {
    async fn fetch(&self, request: &PageRequest) -> Result<Page> {
        let url = format!("{}/{}", self.api_root, request.path.trim_start_matches('/'));
        let mut query: Vec<(&str, String)> = request
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();
        if !request.params.iter().any(|(k, _)| k == "limit") {
            query.push(("limit", self.page_size.to_string()));
        }
        if let Some(after) = &request.after {
            query.push(("after", after.clone()));
        }
        query.push(("access_token", self.access_token.clone()));

        log::debug!("GET {url} (after={:?})", request.after);
        let response = self.http.get(&url).query(&query).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }
        parse_graph_page(&body)
    }
}

#[derive(Deserialize)]
struct GraphEnvelope {
    #[serde(default)]
    data: Vec<Value>,
    paging: Option<GraphPaging>,
}

#[derive(Deserialize)]
struct GraphPaging {
    cursors: Option<GraphCursors>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct GraphCursors {
    after: Option<String>,
}

/// Decode a `{data, paging}` envelope. A cursor is only followed when the
/// platform also announces a `next` page.
pub fn parse_graph_page(body: &str) -> Result<Page> {
    let envelope: GraphEnvelope = serde_json::from_str(body)?;
    let next = envelope.paging.and_then(|paging| {
        paging.next.as_ref()?;
        paging.cursors.and_then(|c| c.after)
    });
    Ok(Page {
        items: envelope.data,
        next,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_with_next() {
        let page = parse_graph_page(
            r#"{"data":[{"id":"1"},{"id":"2"}],
                "paging":{"cursors":{"before":"a","after":"b"},"next":"https://graph/next"}}"#,
        )
        .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next.as_deref(), Some("b"));
    }

    #[test]
    fn test_parse_last_page() {
        let page =
            parse_graph_page(r#"{"data":[{"id":"1"}],"paging":{"cursors":{"after":"b"}}}"#).unwrap();
        assert_eq!(page.next, None);

        let empty = parse_graph_page(r#"{"data":[]}"#).unwrap();
        assert!(empty.items.is_empty());
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(parse_graph_page("<html>"), Err(Error::Decode(_))));
    }

    #[test]
    fn test_new_requires_token() {
        let config = AppConfig::default();
        assert!(matches!(GraphClient::new(&config), Err(Error::Config(_))));
    }
}
