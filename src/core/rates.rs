//! Exchange-rate records as they move through the validation pipeline.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Reference currency every provider is normalized to.
pub const EUR: &str = "EUR";

/// Priority ranking of a data provider. The primary provider's value is the
/// one published when validation passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Primary,
    Secondary,
    Tertiary,
}

impl Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Source::Primary => "primary",
                Source::Secondary => "secondary",
                Source::Tertiary => "tertiary",
            }
        )
    }
}

impl FromStr for Source {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "primary" => Ok(Source::Primary),
            "secondary" => Ok(Source::Secondary),
            "tertiary" => Ok(Source::Tertiary),
            _ => Err(anyhow::anyhow!("Invalid source tier: {}", s)),
        }
    }
}

/// One observed exchange rate, as extracted from a provider snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub extraction_id: String,
    pub extraction_timestamp: DateTime<Utc>,
    pub source: Source,
    pub base_currency: String,
    pub target_currency: String,
    pub exchange_rate: f64,
    pub rate_date: NaiveDate,
}

impl AsRef<RateRecord> for RateRecord {
    fn as_ref(&self) -> &RateRecord {
        self
    }
}

/// A [`RateRecord`] re-expressed with EUR as the implicit base.
///
/// The contributing record is kept verbatim so every normalized value traces
/// back to exactly one observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRate {
    pub record: RateRecord,
    pub rate_in_eur: f64,
}

impl NormalizedRate {
    pub fn source(&self) -> Source {
        self.record.source
    }

    pub fn rate_date(&self) -> NaiveDate {
        self.record.rate_date
    }

    pub fn target_currency(&self) -> &str {
        &self.record.target_currency
    }
}

impl AsRef<RateRecord> for NormalizedRate {
    fn as_ref(&self) -> &RateRecord {
        &self.record
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConsensusStatus {
    Ok,
    Flagged,
}

/// Escalation tier of a consensus result. Tracks `ConsensusStatus` unless a
/// critical threshold is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Ok,
    Warning,
    Critical,
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Severity::Ok => "OK",
                Severity::Warning => "WARNING",
                Severity::Critical => "CRITICAL",
            }
        )
    }
}

impl Display for ConsensusStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsensusStatus::Ok => write!(f, "OK"),
            ConsensusStatus::Flagged => write!(f, "FLAGGED"),
        }
    }
}

/// How far one source sits from the consensus rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDeviation {
    pub source: Source,
    pub rate_in_eur: f64,
    pub deviation_pct: f64,
}

/// Consensus over every provider for one (rate_date, target_currency).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub rate_date: NaiveDate,
    pub target_currency: String,
    pub consensus_rate: f64,
    pub source_count: usize,
    pub sources: Vec<SourceDeviation>,
    pub status: ConsensusStatus,
    pub severity: Severity,
}

impl ConsensusResult {
    /// Largest deviation among contributing sources.
    pub fn max_deviation(&self) -> f64 {
        self.sources
            .iter()
            .map(|s| s.deviation_pct)
            .fold(0.0, f64::max)
    }

    pub fn deviation_for(&self, source: Source) -> Option<f64> {
        self.sources
            .iter()
            .find(|s| s.source == source)
            .map(|s| s.deviation_pct)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Validated,
    Flagged,
}

impl Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationStatus::Validated => write!(f, "VALIDATED"),
            ValidationStatus::Flagged => write!(f, "FLAGGED"),
        }
    }
}

/// A published rate backed by the primary provider, with consensus provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedFact {
    pub currency_pair: String,
    pub rate_date: NaiveDate,
    pub base_currency: String,
    pub target_currency: String,
    pub exchange_rate: f64,
    pub inverse_rate: f64,
    pub extraction_id: String,
    pub extraction_timestamp: DateTime<Utc>,
    pub source: String,
    pub validation_status: ValidationStatus,
    pub severity: Severity,
    pub consensus_rate: f64,
    pub consensus_variance: f64,
    pub source_count: usize,
}

impl ValidatedFact {
    pub fn is_published(&self) -> bool {
        self.validation_status == ValidationStatus::Validated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_round_trips_through_str() {
        for source in [Source::Primary, Source::Secondary, Source::Tertiary] {
            assert_eq!(source.to_string().parse::<Source>().unwrap(), source);
        }
        assert!("quaternary".parse::<Source>().is_err());
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&ValidationStatus::Validated).unwrap();
        assert_eq!(json, "\"VALIDATED\"");
        let json = serde_json::to_string(&Severity::Warning).unwrap();
        assert_eq!(json, "\"WARNING\"");
    }

    #[test]
    fn test_max_deviation_of_consensus() {
        let result = ConsensusResult {
            rate_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            target_currency: "USD".to_string(),
            consensus_rate: 1.1,
            source_count: 2,
            sources: vec![
                SourceDeviation {
                    source: Source::Primary,
                    rate_in_eur: 1.1,
                    deviation_pct: 0.0,
                },
                SourceDeviation {
                    source: Source::Tertiary,
                    rate_in_eur: 1.2,
                    deviation_pct: 0.09,
                },
            ],
            status: ConsensusStatus::Flagged,
            severity: Severity::Warning,
        };
        assert_eq!(result.max_deviation(), 0.09);
        assert_eq!(result.deviation_for(Source::Primary), Some(0.0));
        assert_eq!(result.deviation_for(Source::Secondary), None);
    }
}
