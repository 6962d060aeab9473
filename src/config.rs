use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, Result};

pub const DEFAULT_QUALIFIED_STATUSES: &[&str] =
    &["Qualifiziert", "Termin vereinbart", "Termin wahrgenommen"];
pub const DEFAULT_DENIED_STATUSES: &[&str] = &["Absage", "Kunde abgesagt"];

/// Process-wide configuration, built once at startup and passed down by
/// reference. Nothing below the binary reads the environment.
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: Option<PathBuf>,
    pub graph_api_base_url: String,
    pub graph_api_version: String,
    pub graph_access_token: Option<String>,
    pub leads_api_base_url: String,
    pub leads_api_key: Option<String>,
    pub budget_ms: u64,
    pub page_size: u32,
    pub insight_chunk_days: u32,
    pub lead_status_labels: LeadStatusLabels,
}

/// Status labels that mark a lead as progressed or rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadStatusLabels {
    pub qualified: Vec<String>,
    pub denied: Vec<String>,
}

impl Default for LeadStatusLabels {
    fn default() -> Self {
        Self {
            qualified: DEFAULT_QUALIFIED_STATUSES.iter().map(|s| s.to_string()).collect(),
            denied: DEFAULT_DENIED_STATUSES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("db_path", &self.db_path)
            .field("graph_api_base_url", &self.graph_api_base_url)
            .field("graph_api_version", &self.graph_api_version)
            .field("graph_access_token", &redacted(&self.graph_access_token))
            .field("leads_api_base_url", &self.leads_api_base_url)
            .field("leads_api_key", &redacted(&self.leads_api_key))
            .field("budget_ms", &self.budget_ms)
            .field("page_size", &self.page_size)
            .field("insight_chunk_days", &self.insight_chunk_days)
            .field("lead_status_labels", &self.lead_status_labels)
            .finish()
    }
}

fn redacted(value: &Option<String>) -> &'static str {
    if value.is_some() {
        "[REDACTED]"
    } else {
        "<unset>"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".to_string(),
            db_path: None,
            graph_api_base_url: "https://graph.facebook.com".to_string(),
            graph_api_version: "v19.0".to_string(),
            graph_access_token: None,
            leads_api_base_url: "https://api.leads.example".to_string(),
            leads_api_key: None,
            budget_ms: 50_000,
            page_size: 100,
            insight_chunk_days: 7,
            lead_status_labels: LeadStatusLabels::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let bind_addr = value_or_default(&lookup, "ADSYNC_BIND_ADDR", &defaults.bind_addr);
        let db_path = optional_trimmed(&lookup, "ADSYNC_DB_PATH").map(PathBuf::from);

        let graph_api_base_url = trim_trailing(&value_or_default(
            &lookup,
            "GRAPH_API_BASE_URL",
            &defaults.graph_api_base_url,
        ))
        .to_string();
        if !is_http_url(&graph_api_base_url) {
            return Err(Error::Config(
                "GRAPH_API_BASE_URL must start with http:// or https://".to_string(),
            ));
        }
        let graph_api_version =
            value_or_default(&lookup, "GRAPH_API_VERSION", &defaults.graph_api_version);
        let graph_access_token = optional_trimmed(&lookup, "GRAPH_ACCESS_TOKEN");

        let leads_api_base_url = trim_trailing(&value_or_default(
            &lookup,
            "LEADS_API_BASE_URL",
            &defaults.leads_api_base_url,
        ))
        .to_string();
        if !is_http_url(&leads_api_base_url) {
            return Err(Error::Config(
                "LEADS_API_BASE_URL must start with http:// or https://".to_string(),
            ));
        }
        let leads_api_key = optional_trimmed(&lookup, "LEADS_API_KEY");

        let budget_ms = parse_in_range(&lookup, "SYNC_BUDGET_MS", defaults.budget_ms, 1_000, 900_000)?;
        let page_size =
            parse_in_range(&lookup, "SYNC_PAGE_SIZE", u64::from(defaults.page_size), 1, 500)? as u32;
        let insight_chunk_days = parse_in_range(
            &lookup,
            "INSIGHT_CHUNK_DAYS",
            u64::from(defaults.insight_chunk_days),
            1,
            90,
        )? as u32;

        let lead_status_labels = LeadStatusLabels {
            qualified: optional_trimmed(&lookup, "LEAD_QUALIFIED_STATUSES")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.lead_status_labels.qualified),
            denied: optional_trimmed(&lookup, "LEAD_DENIED_STATUSES")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.lead_status_labels.denied),
        };

        Ok(Self {
            bind_addr,
            db_path,
            graph_api_base_url,
            graph_api_version,
            graph_access_token,
            leads_api_base_url,
            leads_api_key,
            budget_ms,
            page_size,
            insight_chunk_days,
            lead_status_labels,
        })
    }

    /// The ad platform token, or a configuration error when unset.
    pub fn require_graph_token(&self) -> Result<&str> {
        self.graph_access_token
            .as_deref()
            .ok_or_else(|| Error::Config("GRAPH_ACCESS_TOKEN is not configured".to_string()))
    }

    pub fn require_leads_key(&self) -> Result<&str> {
        self.leads_api_key
            .as_deref()
            .ok_or_else(|| Error::Config("LEADS_API_KEY is not configured".to_string()))
    }
}

fn optional_trimmed(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn value_or_default(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn parse_in_range(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    min: u64,
    max: u64,
) -> Result<u64> {
    let value = match optional_trimmed(lookup, name) {
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            Error::Config(format!("{name} must be an integer in [{min}, {max}]"))
        })?,
        None => default,
    };
    if !(min..=max).contains(&value) {
        return Err(Error::Config(format!("{name} must be in [{min}, {max}]")));
    }
    Ok(value)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn trim_trailing(value: &str) -> &str {
    value.trim_end_matches('/')
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| values.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.budget_ms, 50_000);
        assert_eq!(config.page_size, 100);
        assert_eq!(config.insight_chunk_days, 7);
        assert!(config.graph_access_token.is_none());
        assert!(config.require_graph_token().is_err());
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let config = config_from(&[("GRAPH_API_BASE_URL", "http://localhost:9000/")]).unwrap();
        assert_eq!(config.graph_api_base_url, "http://localhost:9000");
    }

    #[test]
    fn rejects_out_of_range_budget() {
        let err = config_from(&[("SYNC_BUDGET_MS", "10")]).unwrap_err();
        assert!(err.to_string().contains("SYNC_BUDGET_MS"));
        assert!(config_from(&[("SYNC_BUDGET_MS", "soon")]).is_err());
    }

    #[test]
    fn rejects_non_http_base_url() {
        assert!(config_from(&[("LEADS_API_BASE_URL", "ftp://leads")]).is_err());
    }

    #[test]
    fn status_labels_parse_from_list() {
        let config = config_from(&[("LEAD_DENIED_STATUSES", "Absage, Storniert ,")]).unwrap();
        assert_eq!(config.lead_status_labels.denied, vec!["Absage", "Storniert"]);
        assert_eq!(
            config.lead_status_labels.qualified,
            LeadStatusLabels::default().qualified
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = config_from(&[("GRAPH_ACCESS_TOKEN", "secret-token")]).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
