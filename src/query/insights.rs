use std::collections::HashMap;

use chrono::NaiveDate;
use rusqlite::Connection;

use crate::date_util::format_ymd;
use crate::error::Result;
use crate::model::AdInsight;
use crate::query::period::DateRange;
use crate::storage::Database;

/// Builder for insight row queries with optional filters.
#[derive(Debug, Clone, Default)]
pub struct InsightQuery {
    range: Option<DateRange>,
    account_ids: Vec<String>,
    campaign_ids: Vec<String>,
    ad_ids: Vec<String>,
    limit: Option<u32>,
}

impl InsightQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn range(mut self, range: DateRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn accounts(mut self, ids: Vec<String>) -> Self {
        self.account_ids = ids;
        self
    }

    pub fn campaigns(mut self, ids: Vec<String>) -> Self {
        self.campaign_ids = ids;
        self
    }

    pub fn ads(mut self, ids: Vec<String>) -> Self {
        self.ad_ids = ids;
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    /// Execute on an open connection, rows ordered by date then ad.
    pub fn fetch(&self, conn: &Connection) -> std::result::Result<Vec<AdInsight>, rusqlite::Error> {
        let (sql, params) = self.build_sql();
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            let date: String = row.get(1)?;
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
            })?;
            Ok(AdInsight {
                ad_id: row.get(0)?,
                date,
                adset_id: row.get(2)?,
                campaign_id: row.get(3)?,
                account_id: row.get(4)?,
                impressions: row.get(5)?,
                clicks: row.get(6)?,
                spend: row.get(7)?,
                reach: row.get(8)?,
                frequency: row.get(9)?,
                ctr: row.get(10)?,
                cpm: row.get(11)?,
                cpc: row.get(12)?,
                cpp: row.get(13)?,
                conversions: row.get(14)?,
            })
        })?;
        rows.collect()
    }

    pub async fn rows(self, db: &Database) -> Result<Vec<AdInsight>> {
        Ok(db.reader().call(move |conn| self.fetch(conn)).await?)
    }

    /// Rows rendered as CSV with a header line.
    pub async fn to_csv(self, db: &Database) -> Result<String> {
        let rows = self.rows(db).await?;
        let mut out = String::from(
            "date,ad_id,adset_id,campaign_id,account_id,impressions,clicks,spend,reach,frequency,ctr,cpm,cpc,cpp,conversions\n",
        );
        let opt = |v: Option<String>| v.map(|s| csv_escape(&s)).unwrap_or_default();
        for row in &rows {
            out.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
                row.date,
                csv_escape(&row.ad_id),
                opt(row.adset_id.clone()),
                opt(row.campaign_id.clone()),
                opt(row.account_id.clone()),
                opt(row.impressions.map(|v| v.to_string())),
                opt(row.clicks.map(|v| v.to_string())),
                opt(row.spend.map(|v| v.to_string())),
                opt(row.reach.map(|v| v.to_string())),
                opt(row.frequency.map(|v| v.to_string())),
                opt(row.ctr.map(|v| v.to_string())),
                opt(row.cpm.map(|v| v.to_string())),
                opt(row.cpc.map(|v| v.to_string())),
                opt(row.cpp.map(|v| v.to_string())),
                opt(row.conversions.map(|v| v.to_string())),
            ));
        }
        Ok(out)
    }

    fn build_sql(&self) -> (String, Vec<Box<dyn rusqlite::types::ToSql>>) {
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut wheres = Vec::new();

        let mut sql = String::from(
            "SELECT ad_id, date, adset_id, campaign_id, account_id, impressions, clicks,
                spend, reach, frequency, ctr, cpm, cpc, cpp, conversions
            FROM ad_insights",
        );

        if let Some(range) = &self.range {
            params.push(Box::new(format_ymd(range.start)));
            wheres.push(format!("date >= ?{}", params.len()));
            params.push(Box::new(format_ymd(range.end)));
            wheres.push(format!("date <= ?{}", params.len()));
        }

        for (column, ids) in [
            ("account_id", &self.account_ids),
            ("campaign_id", &self.campaign_ids),
            ("ad_id", &self.ad_ids),
        ] {
            if ids.is_empty() {
                continue;
            }
            let mut placeholders = Vec::with_capacity(ids.len());
            for id in ids {
                params.push(Box::new(id.clone()));
                placeholders.push(format!("?{}", params.len()));
            }
            wheres.push(format!("{column} IN ({})", placeholders.join(", ")));
        }

        if !wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&wheres.join(" AND "));
        }
        sql.push_str(" ORDER BY date ASC, ad_id ASC");

        if let Some(limit) = self.limit {
            params.push(Box::new(limit));
            sql.push_str(&format!(" LIMIT ?{}", params.len()));
        }

        (sql, params)
    }
}

/// Campaign id to owning customer id, for campaigns that have one.
pub fn load_campaign_owners(
    conn: &Connection,
) -> std::result::Result<HashMap<String, String>, rusqlite::Error> {
    let mut stmt =
        conn.prepare("SELECT id, customer_id FROM campaigns WHERE customer_id IS NOT NULL")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
