use crate::core::rates::{ConsensusResult, ValidatedFact};
use crate::store::{FactQuery, FactStore, consensus_key, fact_key};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory fact store, used for plan runs and tests.
#[derive(Default, Clone)]
pub struct MemoryFactStore {
    facts: Arc<Mutex<BTreeMap<String, ValidatedFact>>>,
    consensus: Arc<Mutex<BTreeMap<String, ConsensusResult>>>,
}

impl MemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FactStore for MemoryFactStore {
    async fn put_facts(&self, facts: &[ValidatedFact]) -> Result<()> {
        let mut stored = self.facts.lock().await;
        for fact in facts {
            stored.insert(fact_key(fact), fact.clone());
        }
        debug!(count = facts.len(), "Stored facts in memory");
        Ok(())
    }

    async fn put_consensus(&self, results: &[ConsensusResult]) -> Result<()> {
        let mut stored = self.consensus.lock().await;
        for result in results {
            stored.insert(consensus_key(result), result.clone());
        }
        Ok(())
    }

    async fn replace_date(
        &self,
        rate_date: NaiveDate,
        facts: &[ValidatedFact],
        consensus: &[ConsensusResult],
    ) -> Result<()> {
        {
            let mut stored = self.facts.lock().await;
            stored.retain(|_, f| f.rate_date != rate_date);
            for fact in facts.iter().filter(|f| f.rate_date == rate_date) {
                stored.insert(fact_key(fact), fact.clone());
            }
        }
        let mut stored = self.consensus.lock().await;
        stored.retain(|_, r| r.rate_date != rate_date);
        for result in consensus.iter().filter(|r| r.rate_date == rate_date) {
            stored.insert(consensus_key(result), result.clone());
        }
        debug!(%rate_date, facts = facts.len(), "Replaced date in memory");
        Ok(())
    }

    async fn facts(&self, query: &FactQuery) -> Result<Vec<ValidatedFact>> {
        let stored = self.facts.lock().await;
        Ok(stored
            .values()
            .filter(|f| query.matches(f.rate_date, &f.target_currency))
            .cloned()
            .collect())
    }

    async fn consensus(&self, query: &FactQuery) -> Result<Vec<ConsensusResult>> {
        let stored = self.consensus.lock().await;
        Ok(stored
            .values()
            .filter(|r| query.matches(r.rate_date, &r.target_currency))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rates::ValidationStatus;
    use crate::store::fixtures::{consensus, date, fact};

    #[tokio::test]
    async fn test_published_excludes_flagged() {
        let store = MemoryFactStore::new();
        store
            .put_facts(&[
                fact(2, "USD", 1.10, ValidationStatus::Validated),
                fact(2, "GBP", 0.86, ValidationStatus::Flagged),
            ])
            .await
            .unwrap();

        let all = store.facts(&FactQuery::default()).await.unwrap();
        let published = store.published(&FactQuery::default()).await.unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].target_currency, "USD");
    }

    #[tokio::test]
    async fn test_rewrite_supersedes() {
        let store = MemoryFactStore::new();
        store
            .put_facts(&[fact(2, "USD", 1.10, ValidationStatus::Flagged)])
            .await
            .unwrap();
        store
            .put_facts(&[fact(2, "USD", 1.11, ValidationStatus::Validated)])
            .await
            .unwrap();
        store.put_consensus(&[consensus(2, "USD", 1.10)]).await.unwrap();
        store.put_consensus(&[consensus(2, "USD", 1.11)]).await.unwrap();

        let facts = store.facts(&FactQuery::default()).await.unwrap();
        let results = store
            .consensus(&FactQuery::between(date(2), date(2)))
            .await
            .unwrap();

        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].exchange_rate, 1.11);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].consensus_rate, 1.11);
    }

    #[tokio::test]
    async fn test_replace_date_drops_pairs_missing_from_rerun() {
        let store = MemoryFactStore::new();
        store
            .replace_date(
                date(2),
                &[
                    fact(2, "USD", 1.10, ValidationStatus::Validated),
                    fact(2, "GBP", 0.86, ValidationStatus::Validated),
                ],
                &[consensus(2, "USD", 1.10), consensus(2, "GBP", 0.86)],
            )
            .await
            .unwrap();
        store
            .replace_date(
                date(3),
                &[fact(3, "USD", 1.11, ValidationStatus::Validated)],
                &[consensus(3, "USD", 1.11)],
            )
            .await
            .unwrap();

        // Rerun of day 2 where USD no longer has a primary row.
        store
            .replace_date(
                date(2),
                &[fact(2, "GBP", 0.86, ValidationStatus::Validated)],
                &[consensus(2, "GBP", 0.86)],
            )
            .await
            .unwrap();

        let usd = store
            .published(&FactQuery::between(date(2), date(2)).with_currency("USD"))
            .await
            .unwrap();
        assert!(usd.is_empty());
        assert_eq!(store.facts(&FactQuery::default()).await.unwrap().len(), 2);
        assert_eq!(store.consensus(&FactQuery::default()).await.unwrap().len(), 2);
    }
}
