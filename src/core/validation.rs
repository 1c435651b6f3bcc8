//! Turns consensus results into published facts backed by the primary provider.

use crate::core::rates::{
    ConsensusResult, ConsensusStatus, EUR, NormalizedRate, ValidatedFact, ValidationStatus,
};
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::debug;

pub struct ValidationGate {
    primary_name: String,
}

impl ValidationGate {
    /// `primary_name` is recorded as the `source` of every fact.
    pub fn new(primary_name: &str) -> Self {
        Self {
            primary_name: primary_name.to_string(),
        }
    }

    /// Joins each consensus result with the primary provider's own row for the
    /// same (rate_date, target_currency). Pairs without a primary row cannot be
    /// published and are skipped.
    pub fn validate(
        &self,
        consensus: &[ConsensusResult],
        primary_rows: &[NormalizedRate],
    ) -> Vec<ValidatedFact> {
        let primary: HashMap<(NaiveDate, &str), &NormalizedRate> = primary_rows
            .iter()
            .map(|row| ((row.rate_date(), row.target_currency()), row))
            .collect();

        let mut facts = Vec::with_capacity(consensus.len());
        for result in consensus {
            let Some(row) = primary.get(&(result.rate_date, result.target_currency.as_str())) else {
                debug!(
                    date = %result.rate_date,
                    currency = %result.target_currency,
                    "No primary rate, skipping publication"
                );
                continue;
            };

            let validation_status = match result.status {
                ConsensusStatus::Ok => ValidationStatus::Validated,
                ConsensusStatus::Flagged => ValidationStatus::Flagged,
            };
            let rate = row.rate_in_eur;

            facts.push(ValidatedFact {
                currency_pair: format!("{EUR}/{}", result.target_currency),
                rate_date: result.rate_date,
                base_currency: EUR.to_string(),
                target_currency: result.target_currency.clone(),
                exchange_rate: rate,
                inverse_rate: 1.0 / rate,
                extraction_id: row.record.extraction_id.clone(),
                extraction_timestamp: row.record.extraction_timestamp,
                source: self.primary_name.clone(),
                validation_status,
                severity: result.severity,
                consensus_rate: result.consensus_rate,
                consensus_variance: result.max_deviation(),
                source_count: result.source_count,
            });
        }
        facts
    }
}

/// The default read view: VALIDATED facts only.
pub fn published(facts: &[ValidatedFact]) -> Vec<&ValidatedFact> {
    facts.iter().filter(|f| f.is_published()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::consensus::ConsensusEngine;
    use crate::core::rates::{RateRecord, Severity, Source};
    use chrono::{TimeZone, Utc};

    fn row(source: Source, currency: &str, rate: f64) -> NormalizedRate {
        NormalizedRate {
            record: RateRecord {
                extraction_id: format!("{source}-run"),
                extraction_timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 16, 0, 0).unwrap(),
                source,
                base_currency: "EUR".to_string(),
                target_currency: currency.to_string(),
                exchange_rate: rate,
                rate_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            },
            rate_in_eur: rate,
        }
    }

    fn run(rows: &[NormalizedRate]) -> Vec<ValidatedFact> {
        let consensus = ConsensusEngine::default().consensus(rows).unwrap();
        let primary: Vec<NormalizedRate> = rows
            .iter()
            .filter(|r| r.source() == Source::Primary)
            .cloned()
            .collect();
        ValidationGate::new("frankfurter").validate(&consensus, &primary)
    }

    #[test]
    fn test_agreement_publishes_primary_rate() {
        let facts = run(&[
            row(Source::Primary, "USD", 1.10),
            row(Source::Secondary, "USD", 1.101),
            row(Source::Tertiary, "USD", 1.1003),
        ]);

        assert_eq!(facts.len(), 1);
        let fact = &facts[0];
        assert_eq!(fact.validation_status, ValidationStatus::Validated);
        assert_eq!(fact.exchange_rate, 1.10);
        assert_eq!(fact.inverse_rate, 1.0 / 1.10);
        assert_eq!(fact.currency_pair, "EUR/USD");
        assert_eq!(fact.source, "frankfurter");
        assert_eq!(fact.extraction_id, "primary-run");
        assert_eq!(fact.severity, Severity::Ok);
        assert_eq!(fact.source_count, 3);
        assert_eq!(published(&facts).len(), 1);
    }

    #[test]
    fn test_flagged_consensus_is_kept_but_not_published() {
        let facts = run(&[
            row(Source::Primary, "USD", 1.10),
            row(Source::Secondary, "USD", 1.101),
            row(Source::Tertiary, "USD", 1.144),
        ]);

        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].validation_status, ValidationStatus::Flagged);
        assert_eq!(facts[0].severity, Severity::Warning);
        assert!(facts[0].consensus_variance > 0.005);
        assert!(published(&facts).is_empty());
    }

    #[test]
    fn test_pair_without_primary_is_not_published() {
        let facts = run(&[
            row(Source::Secondary, "NOK", 11.5),
            row(Source::Tertiary, "NOK", 11.5),
            row(Source::Primary, "USD", 1.10),
        ]);

        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].target_currency, "USD");
    }
}
