//! Data-quality metrics for a processed date.

use crate::core::rates::{ConsensusResult, NormalizedRate, Severity, Source, ValidatedFact};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub rate_date: NaiveDate,
    pub rows_per_source: BTreeMap<Source, usize>,
    pub validated_rows: usize,
    pub flagged_rows: usize,
    /// `validated / (validated + flagged)`, 0.0 when nothing was evaluated.
    pub validation_rate: f64,
    pub currency_count: usize,
    pub severity_breakdown: BTreeMap<Severity, usize>,
}

impl QualityReport {
    pub fn build(
        rate_date: NaiveDate,
        normalized: &[NormalizedRate],
        consensus: &[ConsensusResult],
        facts: &[ValidatedFact],
    ) -> Self {
        let mut rows_per_source = BTreeMap::new();
        for row in normalized.iter().filter(|r| r.rate_date() == rate_date) {
            *rows_per_source.entry(row.source()).or_insert(0) += 1;
        }
        Self::from_results(rate_date, rows_per_source, consensus, facts)
    }

    /// Builds a report from persisted results, where per-source row counts
    /// come from the consensus provenance.
    pub fn from_stored(
        rate_date: NaiveDate,
        consensus: &[ConsensusResult],
        facts: &[ValidatedFact],
    ) -> Self {
        let mut rows_per_source = BTreeMap::new();
        for result in consensus.iter().filter(|r| r.rate_date == rate_date) {
            for source in &result.sources {
                *rows_per_source.entry(source.source).or_insert(0) += 1;
            }
        }
        Self::from_results(rate_date, rows_per_source, consensus, facts)
    }

    fn from_results(
        rate_date: NaiveDate,
        rows_per_source: BTreeMap<Source, usize>,
        consensus: &[ConsensusResult],
        facts: &[ValidatedFact],
    ) -> Self {
        let day_facts: Vec<&ValidatedFact> =
            facts.iter().filter(|f| f.rate_date == rate_date).collect();
        let validated_rows = day_facts.iter().filter(|f| f.is_published()).count();
        let flagged_rows = day_facts.len() - validated_rows;
        let evaluated = validated_rows + flagged_rows;
        let validation_rate = if evaluated > 0 {
            validated_rows as f64 / evaluated as f64
        } else {
            0.0
        };

        let currency_count = day_facts
            .iter()
            .filter(|f| f.is_published())
            .map(|f| f.target_currency.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        let mut severity_breakdown = BTreeMap::new();
        for result in consensus
            .iter()
            .filter(|r| r.rate_date == rate_date && r.severity != Severity::Ok)
        {
            *severity_breakdown.entry(result.severity).or_insert(0) += 1;
        }

        Self {
            rate_date,
            rows_per_source,
            validated_rows,
            flagged_rows,
            validation_rate,
            currency_count,
            severity_breakdown,
        }
    }

    pub fn total_rows(&self) -> usize {
        self.rows_per_source.values().sum()
    }
}
