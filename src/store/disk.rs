use crate::core::rates::{ConsensusResult, ValidatedFact};
use crate::store::{FactQuery, FactStore, consensus_key, date_prefix, fact_key};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use fjall::{Batch, Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

const FACTS_PARTITION: &str = "facts";
const CONSENSUS_PARTITION: &str = "consensus";

/// Fact store persisted in a fjall keyspace. Keys start with the ISO rate
/// date, so a date window maps to a key range.
pub struct DiskFactStore {
    keyspace: Keyspace,
    facts: PartitionHandle,
    consensus: PartitionHandle,
}

impl DiskFactStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create store directory: {}", path.display()))?;

        let keyspace = Config::new(path.join("facts_db"))
            .open()
            .with_context(|| format!("Failed to open fact store at {}", path.display()))?;
        let facts = keyspace.open_partition(FACTS_PARTITION, PartitionCreateOptions::default())?;
        let consensus =
            keyspace.open_partition(CONSENSUS_PARTITION, PartitionCreateOptions::default())?;
        debug!(path = %path.display(), "Opened fact store");

        Ok(Self {
            keyspace,
            facts,
            consensus,
        })
    }

    fn put_all<T: Serialize>(
        &self,
        partition: &PartitionHandle,
        rows: &[T],
        key: impl Fn(&T) -> String,
    ) -> Result<()> {
        for row in rows {
            partition.insert(key(row), serde_json::to_vec(row)?)?;
        }
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    /// Queues the rows of `rate_date` for insertion and the removal of every
    /// other key of that date. Batch items share one sequence number, so a
    /// key is never both removed and inserted.
    fn stage_date<T: Serialize>(
        batch: &mut Batch,
        partition: &PartitionHandle,
        rate_date: NaiveDate,
        rows: &[T],
        key: impl Fn(&T) -> String,
    ) -> Result<()> {
        let prefix = date_prefix(rate_date);
        let mut fresh = BTreeMap::new();
        for row in rows {
            let row_key = key(row);
            if row_key.starts_with(&prefix) {
                fresh.insert(row_key, serde_json::to_vec(row)?);
            }
        }
        for item in partition.prefix(&prefix) {
            let (stored, _) = item?;
            let rewritten = std::str::from_utf8(&stored).is_ok_and(|k| fresh.contains_key(k));
            if !rewritten {
                batch.remove(partition, stored);
            }
        }
        for (row_key, value) in fresh {
            batch.insert(partition, row_key, value);
        }
        Ok(())
    }

    fn scan<T: DeserializeOwned>(
        partition: &PartitionHandle,
        query: &FactQuery,
        date_and_currency: impl Fn(&T) -> (NaiveDate, &str),
    ) -> Result<Vec<T>> {
        // "~" sorts after every key suffix of a date.
        let start = query.from.map(|d| d.to_string()).unwrap_or_default();
        let end = query
            .to
            .map(|d| format!("{d}~"))
            .unwrap_or_else(|| "~".to_string());

        let mut rows = Vec::new();
        for item in partition.range(start..=end) {
            let (_, value) = item?;
            let row: T = serde_json::from_slice(&value)?;
            let (rate_date, currency) = date_and_currency(&row);
            if query.matches(rate_date, currency) {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl FactStore for DiskFactStore {
    async fn put_facts(&self, facts: &[ValidatedFact]) -> Result<()> {
        self.put_all(&self.facts, facts, fact_key)?;
        debug!(count = facts.len(), "Persisted facts");
        Ok(())
    }

    async fn put_consensus(&self, results: &[ConsensusResult]) -> Result<()> {
        self.put_all(&self.consensus, results, consensus_key)?;
        debug!(count = results.len(), "Persisted consensus results");
        Ok(())
    }

    async fn replace_date(
        &self,
        rate_date: NaiveDate,
        facts: &[ValidatedFact],
        consensus: &[ConsensusResult],
    ) -> Result<()> {
        let mut batch = self.keyspace.batch();
        Self::stage_date(&mut batch, &self.facts, rate_date, facts, fact_key)?;
        Self::stage_date(&mut batch, &self.consensus, rate_date, consensus, consensus_key)?;
        batch
            .commit()
            .with_context(|| format!("Failed to replace rows of {rate_date}"))?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!(%rate_date, facts = facts.len(), "Replaced date");
        Ok(())
    }

    async fn facts(&self, query: &FactQuery) -> Result<Vec<ValidatedFact>> {
        Self::scan(&self.facts, query, |f: &ValidatedFact| {
            (f.rate_date, f.target_currency.as_str())
        })
    }

    async fn consensus(&self, query: &FactQuery) -> Result<Vec<ConsensusResult>> {
        Self::scan(&self.consensus, query, |r: &ConsensusResult| {
            (r.rate_date, r.target_currency.as_str())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rates::ValidationStatus;
    use crate::store::fixtures::{consensus, date, fact};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_disk_store_range_and_currency() {
        let dir = tempdir().unwrap();
        let store = DiskFactStore::open(dir.path()).unwrap();
        store
            .put_facts(&[
                fact(1, "USD", 1.09, ValidationStatus::Validated),
                fact(2, "USD", 1.10, ValidationStatus::Validated),
                fact(2, "GBP", 0.86, ValidationStatus::Flagged),
                fact(3, "USD", 1.11, ValidationStatus::Validated),
            ])
            .await
            .unwrap();

        let window = store
            .facts(&FactQuery::between(date(2), date(3)))
            .await
            .unwrap();
        let usd = store
            .published(&FactQuery::default().with_currency("USD"))
            .await
            .unwrap();

        assert_eq!(window.len(), 3);
        assert!(window.iter().all(|f| f.rate_date >= date(2)));
        assert_eq!(usd.len(), 3);
        assert!(usd.windows(2).all(|w| w[0].rate_date <= w[1].rate_date));
    }

    #[tokio::test]
    async fn test_disk_store_survives_reopen_and_supersedes() {
        let dir = tempdir().unwrap();
        {
            let store = DiskFactStore::open(dir.path()).unwrap();
            store
                .put_facts(&[fact(2, "USD", 1.10, ValidationStatus::Flagged)])
                .await
                .unwrap();
            store.put_consensus(&[consensus(2, "USD", 1.10)]).await.unwrap();
        }

        let store = DiskFactStore::open(dir.path()).unwrap();
        store
            .put_facts(&[fact(2, "USD", 1.12, ValidationStatus::Validated)])
            .await
            .unwrap();

        let facts = store.facts(&FactQuery::default()).await.unwrap();
        let results = store.consensus(&FactQuery::default()).await.unwrap();

        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].exchange_rate, 1.12);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].consensus_rate, 1.10);
    }

    #[tokio::test]
    async fn test_replace_date_removes_stale_pairs() {
        let dir = tempdir().unwrap();
        let store = DiskFactStore::open(dir.path()).unwrap();
        store
            .put_facts(&[
                fact(1, "USD", 1.09, ValidationStatus::Validated),
                fact(2, "USD", 1.10, ValidationStatus::Validated),
                fact(2, "GBP", 0.86, ValidationStatus::Validated),
            ])
            .await
            .unwrap();
        store
            .put_consensus(&[consensus(1, "USD", 1.09), consensus(2, "USD", 1.10)])
            .await
            .unwrap();

        // USD lost its primary row on the rerun: a consensus result but no fact.
        store
            .replace_date(
                date(2),
                &[fact(2, "GBP", 0.87, ValidationStatus::Validated)],
                &[consensus(2, "USD", 1.20), consensus(2, "GBP", 0.87)],
            )
            .await
            .unwrap();
        drop(store);

        let store = DiskFactStore::open(dir.path()).unwrap();
        let day_two = store
            .published(&FactQuery::between(date(2), date(2)))
            .await
            .unwrap();
        let day_one = store
            .facts(&FactQuery::between(date(1), date(1)))
            .await
            .unwrap();
        let results = store
            .consensus(&FactQuery::between(date(2), date(2)).with_currency("USD"))
            .await
            .unwrap();

        assert_eq!(day_two.len(), 1);
        assert_eq!(day_two[0].target_currency, "GBP");
        assert_eq!(day_two[0].exchange_rate, 0.87);
        assert_eq!(day_one.len(), 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].consensus_rate, 1.20);
    }
}
