//! Scripted upstream for sync tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::sync::budget::Clock;
use crate::sync::upstream::{Page, PageRequest, UpstreamClient};

/// Serves canned pages per path. Cursors are `page-<n>`.
///
/// When a request carries a Graph-style `time_range`, items whose
/// `date_start` falls outside it are left out, as the platform does.
#[derive(Default)]
pub struct ScriptedUpstream {
    pages: HashMap<String, Vec<Vec<Value>>>,
    failures: HashMap<String, Error>,
    /// Paths failing only their first `n` calls.
    flaky: HashMap<String, (usize, Error)>,
    calls: Mutex<Vec<PageRequest>>,
}

impl ScriptedUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(self, path: &str, items: Vec<Value>) -> Self {
        self.with_pages(path, vec![items])
    }

    pub fn with_pages(mut self, path: &str, pages: Vec<Vec<Value>>) -> Self {
        self.pages.insert(path.to_string(), pages);
        self
    }

    pub fn fail_path(mut self, path: &str, error: Error) -> Self {
        self.failures.insert(path.to_string(), error);
        self
    }

    /// Fail the first `times` calls to `path`, then serve its pages.
    pub fn fail_times(mut self, path: &str, times: usize, error: Error) -> Self {
        self.flaky.insert(path.to_string(), (times, error));
        self
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamClient for ScriptedUpstream {
    async fn fetch(&self, request: &PageRequest) -> Result<Page> {
        let seen = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(request.clone());
            calls.iter().filter(|r| r.path == request.path).count()
        };

        if let Some(error) = self.failures.get(&request.path) {
            return Err(error.clone());
        }
        if let Some((times, error)) = self.flaky.get(&request.path) {
            if seen <= *times {
                return Err(error.clone());
            }
        }

        let index = request
            .after
            .as_deref()
            .and_then(|c| c.strip_prefix("page-"))
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0);
        let Some(pages) = self.pages.get(&request.path) else {
            return Ok(Page::default());
        };
        let mut items = pages.get(index).cloned().unwrap_or_default();

        if let Some((_, range)) = request.params.iter().find(|(k, _)| k == "time_range") {
            let range: Value = serde_json::from_str(range).unwrap();
            let since = range["since"].as_str().unwrap().to_string();
            let until = range["until"].as_str().unwrap().to_string();
            items.retain(|item| {
                item["date_start"]
                    .as_str()
                    .is_some_and(|d| d >= since.as_str() && d <= until.as_str())
            });
        }

        let next = (index + 1 < pages.len()).then(|| format!("page-{}", index + 1));
        Ok(Page { items, next })
    }
}

/// Clock that only moves when told to.
#[derive(Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Wraps an upstream so that every fetch costs `step_ms` on `clock`.
pub struct SlowUpstream {
    pub inner: ScriptedUpstream,
    pub clock: Arc<ManualClock>,
    pub step_ms: u64,
}

#[async_trait]
impl UpstreamClient for SlowUpstream {
    async fn fetch(&self, request: &PageRequest) -> Result<Page> {
        self.clock.advance(self.step_ms);
        self.inner.fetch(request).await
    }
}
