pub mod types;

pub use types::*;

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use crate::error::Result;
use crate::model::AdInsight;
use crate::query::insights::{load_campaign_owners, InsightQuery};
use crate::query::period::DateRange;
use crate::storage::Database;

/// The dashboard's customer → campaign → ad set → ad selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyFilter {
    pub customer_id: Option<String>,
    pub campaign_ids: Vec<String>,
    pub adset_ids: Vec<String>,
    pub ad_ids: Vec<String>,
}

/// The single level a `HierarchyFilter` restricts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedFilter {
    All,
    Ads(HashSet<String>),
    AdSets(HashSet<String>),
    Campaigns(HashSet<String>),
}

impl HierarchyFilter {
    /// Resolve to the most specific non-empty level: ads, then ad sets,
    /// then campaigns, then the customer's campaigns. Less specific
    /// selections are ignored, not intersected. A customer owning no
    /// campaigns matches nothing.
    ///
    /// `owners` maps campaign id to owning customer id.
    pub fn resolve(&self, owners: &HashMap<String, String>) -> ResolvedFilter {
        let set = |ids: &[String]| ids.iter().cloned().collect::<HashSet<_>>();
        if !self.ad_ids.is_empty() {
            ResolvedFilter::Ads(set(&self.ad_ids))
        } else if !self.adset_ids.is_empty() {
            ResolvedFilter::AdSets(set(&self.adset_ids))
        } else if !self.campaign_ids.is_empty() {
            ResolvedFilter::Campaigns(set(&self.campaign_ids))
        } else if let Some(customer) = &self.customer_id {
            ResolvedFilter::Campaigns(
                owners
                    .iter()
                    .filter(|(_, owner)| *owner == customer)
                    .map(|(campaign, _)| campaign.clone())
                    .collect(),
            )
        } else {
            ResolvedFilter::All
        }
    }
}

impl ResolvedFilter {
    pub fn matches(&self, row: &AdInsight) -> bool {
        let within = |set: &HashSet<String>, id: &Option<String>| {
            id.as_ref().is_some_and(|id| set.contains(id))
        };
        match self {
            ResolvedFilter::All => true,
            ResolvedFilter::Ads(ads) => ads.contains(&row.ad_id),
            ResolvedFilter::AdSets(sets) => within(sets, &row.adset_id),
            ResolvedFilter::Campaigns(campaigns) => within(campaigns, &row.campaign_id),
        }
    }
}

fn aggregate<'a>(rows: impl IntoIterator<Item = &'a AdInsight>) -> PeriodTotals {
    let mut totals = PeriodTotals::default();
    let (mut ctr, mut cpm, mut cpc, mut frequency) = (0.0, 0.0, 0.0, 0.0);
    for row in rows {
        totals.row_count += 1;
        totals.impressions += row.impressions.unwrap_or(0);
        totals.clicks += row.clicks.unwrap_or(0);
        totals.spend += row.spend.unwrap_or(0.0);
        totals.reach += row.reach.unwrap_or(0);
        totals.conversions += row.conversions.unwrap_or(0.0);
        ctr += row.ctr.unwrap_or(0.0);
        cpm += row.cpm.unwrap_or(0.0);
        cpc += row.cpc.unwrap_or(0.0);
        frequency += row.frequency.unwrap_or(0.0);
    }
    if totals.row_count > 0 {
        let n = totals.row_count as f64;
        totals.ctr = ctr / n;
        totals.cpm = cpm / n;
        totals.cpc = cpc / n;
        totals.frequency = frequency / n;
    }
    totals
}

/// Totals over rows dated within `range` that pass `filter`.
pub fn period_totals(rows: &[AdInsight], range: &DateRange, filter: &ResolvedFilter) -> PeriodTotals {
    aggregate(
        rows.iter()
            .filter(|row| range.contains(row.date) && filter.matches(row)),
    )
}

/// One entry per date in `dates`, in that order. Dates without matching
/// rows yield zeroed entries.
pub fn daily_series(rows: &[AdInsight], dates: &[NaiveDate], filter: &ResolvedFilter) -> Vec<DailyPoint> {
    let mut by_day: HashMap<NaiveDate, Vec<&AdInsight>> = HashMap::new();
    for row in rows.iter().filter(|row| filter.matches(row)) {
        by_day.entry(row.date).or_default().push(row);
    }
    dates
        .iter()
        .map(|date| DailyPoint {
            date: *date,
            totals: by_day
                .get(date)
                .map(|day| aggregate(day.iter().copied()))
                .unwrap_or_default(),
        })
        .collect()
}

/// Percentage change from `previous` to `current`.
pub fn percent_change(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        None
    } else {
        Some((current - previous) / previous * 100.0)
    }
}

pub fn totals_change(current: &PeriodTotals, previous: &PeriodTotals) -> TotalsChange {
    TotalsChange {
        impressions: percent_change(current.impressions as f64, previous.impressions as f64),
        clicks: percent_change(current.clicks as f64, previous.clicks as f64),
        spend: percent_change(current.spend, previous.spend),
        reach: percent_change(current.reach as f64, previous.reach as f64),
        conversions: percent_change(current.conversions, previous.conversions),
        ctr: percent_change(current.ctr, previous.ctr),
        cpm: percent_change(current.cpm, previous.cpm),
        cpc: percent_change(current.cpc, previous.cpc),
        frequency: percent_change(current.frequency, previous.frequency),
    }
}

/// Current period, previous period of equal length, their change, and the
/// current period's daily series. Pure; `rows` must cover both periods.
pub fn build_overview(
    rows: &[AdInsight],
    range: DateRange,
    filter: &ResolvedFilter,
) -> Result<Overview> {
    let previous_range = range.previous()?;
    let current = period_totals(rows, &range, filter);
    let previous = period_totals(rows, &previous_range, filter);
    let change = totals_change(&current, &previous);
    let daily = daily_series(rows, &range.days(), filter);
    Ok(Overview {
        range,
        previous_range,
        current,
        previous,
        change,
        daily,
    })
}

/// Load the rows for `range` and its predecessor and build the overview.
pub async fn compute_overview(
    db: &Database,
    range: DateRange,
    filter: &HierarchyFilter,
) -> Result<Overview> {
    range.validate()?;
    let loaded = DateRange::new(range.previous()?.start, range.end);
    let query = InsightQuery::new().range(loaded);
    let (rows, owners) = db
        .reader()
        .call(move |conn| {
            let rows = query.fetch(conn)?;
            let owners = load_campaign_owners(conn)?;
            Ok::<_, rusqlite::Error>((rows, owners))
        })
        .await?;
    let resolved = filter.resolve(&owners);
    log::debug!(
        "Overview {range}: {} rows loaded, filter {resolved:?}",
        rows.len()
    );
    build_overview(&rows, range, &resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn row(ad: &str, adset: &str, campaign: &str, day: u32) -> AdInsight {
        AdInsight {
            ad_id: ad.into(),
            date: d(day),
            adset_id: Some(adset.into()),
            campaign_id: Some(campaign.into()),
            account_id: Some("1".into()),
            impressions: Some(100),
            clicks: Some(5),
            spend: Some(10.0),
            reach: Some(90),
            frequency: Some(1.1),
            ctr: Some(5.0),
            cpm: Some(100.0),
            cpc: Some(2.0),
            cpp: None,
            conversions: None,
        }
    }

    #[test]
    fn test_period_totals_sums_volumes() {
        let mut second = row("1", "s", "c", 2);
        second.impressions = Some(200);
        second.clicks = Some(10);
        let rows = vec![row("1", "s", "c", 1), second];

        let totals = period_totals(&rows, &DateRange::new(d(1), d(2)), &ResolvedFilter::All);
        assert_eq!(totals.impressions, 300);
        assert_eq!(totals.clicks, 15);
        assert_eq!(totals.row_count, 2);
    }

    #[test]
    fn test_rate_fields_are_unweighted_mean() {
        let mut a = row("1", "s", "c", 1);
        a.ctr = Some(2.0);
        a.impressions = Some(10);
        let mut b = row("2", "s", "c", 1);
        b.ctr = Some(4.0);
        b.impressions = Some(10_000);

        let totals = period_totals(&[a, b], &DateRange::new(d(1), d(1)), &ResolvedFilter::All);
        assert_eq!(totals.ctr, 3.0);
    }

    #[test]
    fn test_missing_rate_counts_as_zero_in_mean() {
        let a = row("1", "s", "c", 1);
        let mut b = row("2", "s", "c", 1);
        b.cpc = None;
        let totals = period_totals(&[a, b], &DateRange::new(d(1), d(1)), &ResolvedFilter::All);
        assert_eq!(totals.cpc, 1.0);
    }

    #[test]
    fn test_empty_totals_are_zero() {
        let totals = period_totals(&[], &DateRange::new(d(1), d(5)), &ResolvedFilter::All);
        assert_eq!(totals, PeriodTotals::default());
    }

    #[test]
    fn test_date_bounds_inclusive() {
        let rows: Vec<AdInsight> = (1..=5).map(|day| row("1", "s", "c", day)).collect();
        let totals = period_totals(&rows, &DateRange::new(d(2), d(4)), &ResolvedFilter::All);
        assert_eq!(totals.row_count, 3);
    }

    #[test]
    fn test_adset_selection_overrides_campaigns() {
        let rows = vec![
            row("1", "s1", "c1", 1),
            row("2", "s2", "c1", 1),
            row("3", "s3", "c2", 1),
        ];
        let owners = HashMap::new();
        let both = HierarchyFilter {
            campaign_ids: vec!["c2".into()],
            adset_ids: vec!["s1".into(), "s2".into()],
            ..Default::default()
        };
        let adsets_only = HierarchyFilter {
            adset_ids: vec!["s1".into(), "s2".into()],
            ..Default::default()
        };
        let range = DateRange::new(d(1), d(1));
        let with_campaigns = period_totals(&rows, &range, &both.resolve(&owners));
        let direct = period_totals(&rows, &range, &adsets_only.resolve(&owners));
        assert_eq!(with_campaigns, direct);
        assert_eq!(direct.row_count, 2);
    }

    #[test]
    fn test_ads_take_precedence() {
        let filter = HierarchyFilter {
            customer_id: Some("x".into()),
            campaign_ids: vec!["c".into()],
            adset_ids: vec!["s".into()],
            ad_ids: vec!["9".into()],
        };
        assert_eq!(
            filter.resolve(&HashMap::new()),
            ResolvedFilter::Ads(HashSet::from(["9".to_string()]))
        );
    }

    #[test]
    fn test_customer_resolves_to_owned_campaigns() {
        let rows = vec![row("1", "s1", "c1", 1), row("2", "s2", "c2", 1)];
        let owners = HashMap::from([
            ("c1".to_string(), "acme".to_string()),
            ("c2".to_string(), "other".to_string()),
        ]);
        let filter = HierarchyFilter {
            customer_id: Some("acme".into()),
            ..Default::default()
        };
        let totals = period_totals(&rows, &DateRange::new(d(1), d(1)), &filter.resolve(&owners));
        assert_eq!(totals.row_count, 1);

        let nobody = HierarchyFilter {
            customer_id: Some("ghost".into()),
            ..Default::default()
        };
        let totals = period_totals(&rows, &DateRange::new(d(1), d(1)), &nobody.resolve(&owners));
        assert_eq!(totals.row_count, 0);
    }

    #[test]
    fn test_daily_series_follows_date_list() {
        let rows = vec![row("1", "s", "c", 1), row("2", "s", "c", 1), row("1", "s", "c", 3)];
        let dates = vec![d(3), d(2), d(1)];
        let series = daily_series(&rows, &dates, &ResolvedFilter::All);
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].date, d(3));
        assert_eq!(series[0].totals.impressions, 100);
        assert_eq!(series[1].totals, PeriodTotals::default());
        assert_eq!(series[2].totals.impressions, 200);
        assert_eq!(series[2].totals.ctr, 5.0);
    }

    #[test]
    fn test_overview_compares_previous_period() {
        let rows: Vec<AdInsight> = (1..=4).map(|day| row("1", "s", "c", day)).collect();
        let mut rows = rows;
        rows[3].clicks = Some(15);

        let overview = build_overview(&rows, DateRange::new(d(3), d(4)), &ResolvedFilter::All).unwrap();
        assert_eq!(overview.previous_range, DateRange::new(d(1), d(2)));
        assert_eq!(overview.current.clicks, 20);
        assert_eq!(overview.previous.clicks, 10);
        assert_eq!(overview.change.clicks, Some(100.0));
        assert_eq!(overview.change.impressions, Some(0.0));
        assert_eq!(overview.daily.len(), 2);
    }

    #[test]
    fn test_percent_change_zero_base() {
        assert_eq!(percent_change(5.0, 0.0), None);
        assert_eq!(percent_change(50.0, 100.0), Some(-50.0));
    }
}
