use chrono::Duration;

use crate::error::{Error, Result};
use crate::query::period::DateRange;

/// Split `[range.start, range.end]` into consecutive chunks of at most
/// `chunk_days` days. The chunks cover the range exactly, in order.
pub fn chunk_date_range(range: &DateRange, chunk_days: u32) -> Result<Vec<DateRange>> {
    if range.start > range.end {
        return Err(Error::InvalidInput(format!(
            "start date {} is after end date {}",
            range.start, range.end
        )));
    }
    if chunk_days == 0 {
        return Err(Error::InvalidInput("chunk size must be at least one day".into()));
    }

    let mut chunks = Vec::new();
    let mut cursor = range.start;

    while cursor <= range.end {
        let chunk_end = (cursor + Duration::days(i64::from(chunk_days) - 1)).min(range.end);
        chunks.push(DateRange {
            start: cursor,
            end: chunk_end,
        });
        cursor = chunk_end + Duration::days(1);
    }

    Ok(chunks)
}
