use async_trait::async_trait;

use crate::error::Result;
use crate::ids::compare_ids;
use crate::model::{ParentRef, Record};
use crate::storage::repository::{self, PendingCreativeImage};
use crate::storage::Database;

/// Where a job's parents come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentSource {
    /// A single synthetic parent that is not stored, e.g. the token owner.
    Root(String),
    AdAccounts,
    Campaigns,
    AdSets,
    Ads,
    LeadCampaigns,
}

/// Parent predicate. Empty id lists mean "no restriction".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentQuery {
    pub source: ParentSource,
    pub active_only: bool,
    pub account_ids: Vec<String>,
    pub customer_ids: Vec<String>,
}

impl ParentQuery {
    pub fn new(source: ParentSource) -> Self {
        Self {
            source,
            active_only: false,
            account_ids: Vec::new(),
            customer_ids: Vec::new(),
        }
    }

    pub fn active_only(mut self, active_only: bool) -> Self {
        self.active_only = active_only;
        self
    }

    pub fn accounts(mut self, account_ids: Vec<String>) -> Self {
        self.account_ids = account_ids;
        self
    }

    pub fn customers(mut self, customer_ids: Vec<String>) -> Self {
        self.customer_ids = customer_ids;
        self
    }
}

/// Persistence capability used by sync jobs.
#[async_trait]
pub trait Store: Send + Sync {
    /// Parents matching the query, in ascending id order.
    async fn read_parents(&self, query: &ParentQuery) -> Result<Vec<ParentRef>>;

    /// Merge one row on its natural key.
    async fn upsert(&self, record: &Record) -> Result<()>;

    /// Creatives with an image hash but no image URL, ordered by account.
    async fn pending_creative_images(
        &self,
        account_id: Option<&str>,
        creative_ids: &[String],
    ) -> Result<Vec<PendingCreativeImage>>;

    /// Fill the image URL of every creative in the account with this hash.
    async fn set_creative_image_url(
        &self,
        account_id: &str,
        image_hash: &str,
        image_url: &str,
    ) -> Result<usize>;
}

/// `Store` backed by the SQLite warehouse.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn read_parents(&self, query: &ParentQuery) -> Result<Vec<ParentRef>> {
        let mut parents = self
            .db
            .reader()
            .call({
                let query = query.clone();
                move |conn| repository::read_parents(conn, &query)
            })
            .await?;
        parents.sort_by(|a, b| compare_ids(&a.id, &b.id));
        Ok(parents)
    }

    async fn upsert(&self, record: &Record) -> Result<()> {
        self.db
            .writer()
            .call({
                let record = record.clone();
                move |conn| repository::upsert_record(conn, &record)
            })
            .await?;
        Ok(())
    }

    async fn pending_creative_images(
        &self,
        account_id: Option<&str>,
        creative_ids: &[String],
    ) -> Result<Vec<PendingCreativeImage>> {
        let account_id = account_id.map(str::to_string);
        let creative_ids = creative_ids.to_vec();
        Ok(self
            .db
            .reader()
            .call(move |conn| {
                repository::list_creatives_missing_images(conn, account_id.as_deref(), &creative_ids)
            })
            .await?)
    }

    async fn set_creative_image_url(
        &self,
        account_id: &str,
        image_hash: &str,
        image_url: &str,
    ) -> Result<usize> {
        let (account_id, image_hash, image_url) =
            (account_id.to_string(), image_hash.to_string(), image_url.to_string());
        Ok(self
            .db
            .writer()
            .call(move |conn| {
                repository::set_creative_image_url(conn, &account_id, &image_hash, &image_url)
            })
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::fixtures;

    #[tokio::test]
    async fn test_parents_sorted_numerically() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                for id in ["100", "9", "25"] {
                    repository::upsert_account(conn, &fixtures::account(id, "ACTIVE"))?;
                }
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();

        let store = SqliteStore::new(db);
        let parents = store
            .read_parents(&ParentQuery::new(ParentSource::AdAccounts))
            .await
            .unwrap();
        let ids: Vec<&str> = parents.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["9", "25", "100"]);
    }

    #[tokio::test]
    async fn test_upsert_twice_is_stable() {
        let db = Database::open_memory().await.unwrap();
        let store = SqliteStore::new(db.clone());
        let record = Record::Account(fixtures::account("1", "ACTIVE"));

        store.upsert(&record).await.unwrap();
        store.upsert(&record).await.unwrap();

        let count: i64 = db
            .reader()
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM ad_accounts", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_orphan_child_surfaces_error() {
        let db = Database::open_memory().await.unwrap();
        let store = SqliteStore::new(db);
        let err = store
            .upsert(&Record::Campaign(fixtures::campaign("10", "404")))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::Database(_)));
    }
}
