use std::time::Duration;

use crate::error::{Error, Result};
use crate::sync::budget::ExecutionBudget;
use crate::sync::upstream::{Page, PageRequest, UpstreamClient};

const MAX_RETRIES: u32 = 3;
const BACKOFF_SECONDS: &[u64] = &[2, 4, 8];

/// Graph error codes signalling throttling (app, user, and ad-account level).
const RATE_LIMIT_CODES: &[i64] = &[4, 17, 32, 613];

/// Check if an upstream error is a rate-limit response.
pub fn is_rate_limited(e: &Error) -> bool {
    match e {
        Error::Api { status: 429, .. } => true,
        Error::Api { body, .. } => serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.pointer("/error/code").and_then(|c| c.as_i64()))
            .is_some_and(|code| RATE_LIMIT_CODES.contains(&code)),
        _ => false,
    }
}

fn backoff(attempt: u32) -> Duration {
    let secs = BACKOFF_SECONDS
        .get(attempt as usize)
        .copied()
        .unwrap_or(8);
    Duration::from_secs(secs)
}

/// Fetch one page, backing off on rate limits while the budget can
/// absorb the wait. Any other error is returned immediately.
pub async fn fetch_with_retry(
    client: &dyn UpstreamClient,
    request: &PageRequest,
    budget: &ExecutionBudget,
) -> Result<Page> {
    let mut attempt: u32 = 0;
    loop {
        match client.fetch(request).await {
            Ok(page) => return Ok(page),
            Err(e) if is_rate_limited(&e) && attempt < MAX_RETRIES => {
                let wait = backoff(attempt);
                if budget.remaining_ms() <= wait.as_millis() as u64 {
                    log::warn!("Rate limited on {}; no budget left to wait", request.path);
                    return Err(e);
                }
                log::warn!(
                    "Rate limited on {}. Waiting {}s before retry {}/{MAX_RETRIES}",
                    request.path,
                    wait.as_secs(),
                    attempt + 1
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
