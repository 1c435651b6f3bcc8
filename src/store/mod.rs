//! Persistence for validated facts and consensus results.
//!
//! Facts are keyed by `(rate_date, target_currency, base_currency)` and
//! consensus results by `(rate_date, target_currency)`. Writing an existing
//! key replaces the stored value. Re-running a date goes through
//! [`FactStore::replace_date`], which drops every row of the date first.

pub mod disk;
pub mod memory;

use crate::core::rates::{ConsensusResult, ValidatedFact};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

pub use disk::DiskFactStore;
pub use memory::MemoryFactStore;

/// Query window over stored rows.
#[derive(Debug, Clone, Default)]
pub struct FactQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub currency: Option<String>,
}

impl FactQuery {
    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            currency: None,
        }
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = Some(currency.trim().to_uppercase());
        self
    }

    pub fn matches(&self, rate_date: NaiveDate, currency: &str) -> bool {
        self.from.is_none_or(|from| rate_date >= from)
            && self.to.is_none_or(|to| rate_date <= to)
            && self.currency.as_deref().is_none_or(|c| c == currency)
    }
}

#[async_trait]
pub trait FactStore: Send + Sync {
    async fn put_facts(&self, facts: &[ValidatedFact]) -> Result<()>;

    async fn put_consensus(&self, results: &[ConsensusResult]) -> Result<()>;

    /// Replaces every fact and consensus row of `rate_date` with the given
    /// ones. Pairs absent from the new rows are removed.
    async fn replace_date(
        &self,
        rate_date: NaiveDate,
        facts: &[ValidatedFact],
        consensus: &[ConsensusResult],
    ) -> Result<()>;

    /// All stored facts, flagged ones included, ordered by key.
    async fn facts(&self, query: &FactQuery) -> Result<Vec<ValidatedFact>>;

    async fn consensus(&self, query: &FactQuery) -> Result<Vec<ConsensusResult>>;

    /// The consumer view: VALIDATED facts only.
    async fn published(&self, query: &FactQuery) -> Result<Vec<ValidatedFact>> {
        let mut facts = self.facts(query).await?;
        facts.retain(ValidatedFact::is_published);
        Ok(facts)
    }
}

pub(crate) fn fact_key(fact: &ValidatedFact) -> String {
    format!(
        "{}|{}|{}",
        fact.rate_date, fact.target_currency, fact.base_currency
    )
}

pub(crate) fn consensus_key(result: &ConsensusResult) -> String {
    format!("{}|{}", result.rate_date, result.target_currency)
}

/// Common key prefix of every row stored for `rate_date`.
pub(crate) fn date_prefix(rate_date: NaiveDate) -> String {
    format!("{rate_date}|")
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::core::rates::{
        ConsensusResult, ConsensusStatus, Severity, Source, SourceDeviation, ValidatedFact,
        ValidationStatus,
    };
    use chrono::{NaiveDate, TimeZone, Utc};

    pub fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    pub fn fact(day: u32, currency: &str, rate: f64, status: ValidationStatus) -> ValidatedFact {
        ValidatedFact {
            currency_pair: format!("EUR/{currency}"),
            rate_date: date(day),
            base_currency: "EUR".to_string(),
            target_currency: currency.to_string(),
            exchange_rate: rate,
            inverse_rate: 1.0 / rate,
            extraction_id: format!("run-{day}"),
            extraction_timestamp: Utc.with_ymd_and_hms(2024, 1, day, 16, 0, 0).unwrap(),
            source: "frankfurter".to_string(),
            validation_status: status,
            severity: match status {
                ValidationStatus::Validated => Severity::Ok,
                ValidationStatus::Flagged => Severity::Warning,
            },
            consensus_rate: rate,
            consensus_variance: 0.0,
            source_count: 3,
        }
    }

    pub fn consensus(day: u32, currency: &str, rate: f64) -> ConsensusResult {
        ConsensusResult {
            rate_date: date(day),
            target_currency: currency.to_string(),
            consensus_rate: rate,
            source_count: 1,
            sources: vec![SourceDeviation {
                source: Source::Primary,
                rate_in_eur: rate,
                deviation_pct: 0.0,
            }],
            status: ConsensusStatus::Ok,
            severity: Severity::Ok,
        }
    }
}
