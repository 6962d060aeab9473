use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// One page request against an upstream collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Resource path relative to the API root, e.g. `act_1/campaigns`.
    pub path: String,
    pub params: Vec<(String, String)>,
    /// Opaque cursor returned by the previous page.
    pub after: Option<String>,
}

impl PageRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: Vec::new(),
            after: None,
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.push((key.to_string(), value.into()));
        self
    }

    pub fn fields(self, fields: &str) -> Self {
        self.param("fields", fields)
    }

    pub fn after(mut self, cursor: Option<String>) -> Self {
        self.after = cursor;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Value>,
    /// Cursor for the next page, absent on the last one.
    pub next: Option<String>,
}

/// Fetches single pages of a named collection from an upstream platform.
///
/// Non-2xx answers surface as `Error::Api { status, body }`, unreachable
/// hosts as `Error::Transport`.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn fetch(&self, request: &PageRequest) -> Result<Page>;
}
