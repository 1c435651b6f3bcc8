//! Median-based consensus across providers.

use crate::core::error::{RatesError, Result};
use crate::core::rates::{
    ConsensusResult, ConsensusStatus, NormalizedRate, Severity, SourceDeviation,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

pub const DEFAULT_FLAG_THRESHOLD: f64 = 0.005;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConsensusConfig {
    /// Relative deviation above which a group is flagged.
    #[serde(default = "default_flag_threshold")]
    pub flag_threshold: f64,
    /// Enables the CRITICAL severity tier.
    #[serde(default)]
    pub critical_threshold: Option<f64>,
}

fn default_flag_threshold() -> f64 {
    DEFAULT_FLAG_THRESHOLD
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            flag_threshold: DEFAULT_FLAG_THRESHOLD,
            critical_threshold: None,
        }
    }
}

/// Median of `values`; the mean of the two central values for even counts.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConsensusEngine {
    config: ConsensusConfig,
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    /// Groups deduplicated rows by (rate_date, target_currency) and scores
    /// every source against the group median. Results are ordered by key.
    pub fn consensus(&self, rows: &[NormalizedRate]) -> Result<Vec<ConsensusResult>> {
        let mut groups: BTreeMap<(NaiveDate, &str), Vec<&NormalizedRate>> = BTreeMap::new();
        for row in rows {
            groups
                .entry((row.rate_date(), row.target_currency()))
                .or_default()
                .push(row);
        }

        groups
            .into_iter()
            .map(|((date, currency), members)| self.score(date, currency, &members))
            .collect()
    }

    fn score(
        &self,
        rate_date: NaiveDate,
        currency: &str,
        members: &[&NormalizedRate],
    ) -> Result<ConsensusResult> {
        let values: Vec<f64> = members.iter().map(|m| m.rate_in_eur).collect();
        let consensus_rate = median(&values)
            .filter(|rate| *rate > 0.0)
            .ok_or_else(|| RatesError::ConsensusUndefined {
                date: rate_date,
                currency: currency.to_string(),
            })?;

        let mut sources: Vec<SourceDeviation> = Vec::with_capacity(members.len());
        for member in members {
            if sources.iter().any(|s| s.source == member.source()) {
                return Err(RatesError::DuplicateObservation {
                    tier: member.source(),
                    date: rate_date,
                    currency: currency.to_string(),
                });
            }
            sources.push(SourceDeviation {
                source: member.source(),
                rate_in_eur: member.rate_in_eur,
                deviation_pct: (member.rate_in_eur - consensus_rate).abs() / consensus_rate,
            });
        }
        sources.sort_by_key(|s| s.source);

        let max_deviation = sources.iter().map(|s| s.deviation_pct).fold(0.0, f64::max);
        let status = if max_deviation > self.config.flag_threshold {
            ConsensusStatus::Flagged
        } else {
            ConsensusStatus::Ok
        };
        let severity = match (status, self.config.critical_threshold) {
            (_, Some(critical)) if max_deviation > critical => Severity::Critical,
            (ConsensusStatus::Flagged, _) => Severity::Warning,
            (ConsensusStatus::Ok, _) => Severity::Ok,
        };

        if status == ConsensusStatus::Flagged {
            debug!(%rate_date, %currency, max_deviation, %severity, "Consensus flagged");
        }

        Ok(ConsensusResult {
            rate_date,
            target_currency: currency.to_string(),
            consensus_rate,
            source_count: sources.len(),
            sources,
            status,
            severity,
        })
    }
}
