use chrono::NaiveDate;
use serde::Serialize;

use crate::query::period::DateRange;

/// Aggregated KPIs for a set of insight rows.
///
/// Volumetric fields are sums. Rate fields are the unweighted mean of the
/// per-row values over the matching row count, with missing rates counted
/// as zero. They are therefore not derivable from the summed volumetrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodTotals {
    pub impressions: i64,
    pub clicks: i64,
    pub spend: f64,
    pub reach: i64,
    pub conversions: f64,
    pub ctr: f64,
    pub cpm: f64,
    pub cpc: f64,
    pub frequency: f64,
    pub row_count: usize,
}

/// One day of the series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPoint {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub totals: PeriodTotals,
}

/// Relative change per field, in percent. `None` where the previous value
/// is zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsChange {
    pub impressions: Option<f64>,
    pub clicks: Option<f64>,
    pub spend: Option<f64>,
    pub reach: Option<f64>,
    pub conversions: Option<f64>,
    pub ctr: Option<f64>,
    pub cpm: Option<f64>,
    pub cpc: Option<f64>,
    pub frequency: Option<f64>,
}

/// Dashboard overview: a period, its predecessor, and the daily series.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub range: DateRange,
    pub previous_range: DateRange,
    pub current: PeriodTotals,
    pub previous: PeriodTotals,
    pub change: TotalsChange,
    pub daily: Vec<DailyPoint>,
}
