//! Converts raw provider extracts into EUR-based rates.
//!
//! Extracts arrive either long (`"rates": {"USD": 1.1}`) or wide, with one
//! column per target currency (`"rates__usd": 1.1`). Both shapes are exploded
//! into one [`RateRecord`] per target currency before normalization.

use crate::core::config::ProviderConfig;
use crate::core::rates::{EUR, NormalizedRate, RateRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// One row of a provider's raw snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct RawExtract {
    pub extraction_id: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub extraction_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub base_currency: Option<String>,
    pub rate_date: NaiveDate,
    #[serde(default)]
    pub rates: Option<BTreeMap<String, Value>>,
    /// Every other column, including wide per-currency rate columns.
    #[serde(flatten)]
    pub columns: Map<String, Value>,
}

/// Accepts RFC 3339 timestamps and naive ones, which are taken as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

impl RawExtract {
    /// All `(target_currency, rate)` pairs in the row, long and wide.
    fn rate_pairs(&self, column_prefix: &str) -> Vec<(String, Option<f64>)> {
        let long = self
            .rates
            .iter()
            .flatten()
            .map(|(code, value)| (code.trim().to_uppercase(), value.as_f64()));

        let prefix = column_prefix.to_lowercase();
        let wide = self.columns.iter().filter_map(|(name, value)| {
            let lowered = name.to_lowercase();
            let code = lowered.strip_prefix(prefix.as_str())?;
            if code.is_empty() {
                return None;
            }
            Some((code.to_uppercase(), value.as_f64()))
        });

        long.chain(wide).collect()
    }
}

/// Explodes extracts into one record per (extraction, target currency).
///
/// Non-numeric and non-positive rates are dropped.
pub fn explode(provider: &ProviderConfig, extracts: &[RawExtract]) -> Vec<RateRecord> {
    let mut records = Vec::new();
    for extract in extracts {
        let base_currency = extract
            .base_currency
            .as_deref()
            .map(|b| b.trim().to_uppercase())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| provider.base_currency.to_uppercase());

        for (target_currency, rate) in extract.rate_pairs(&provider.column_prefix) {
            match rate {
                Some(rate) if rate.is_finite() && rate > 0.0 => records.push(RateRecord {
                    extraction_id: extract.extraction_id.clone(),
                    extraction_timestamp: extract.extraction_timestamp,
                    source: provider.source,
                    base_currency: base_currency.clone(),
                    target_currency,
                    exchange_rate: rate,
                    rate_date: extract.rate_date,
                }),
                _ => warn!(
                    provider = %provider.name,
                    extraction_id = %extract.extraction_id,
                    currency = %target_currency,
                    ?rate,
                    "Dropping non-positive or non-numeric rate"
                ),
            }
        }
    }
    records
}

/// Normalizes one provider's extracts for `rate_date` to EUR terms.
///
/// A non-EUR base needs the provider's own base->EUR observation for the same
/// date. Without it the rows are dropped, never filled in.
pub fn normalize(
    provider: &ProviderConfig,
    extracts: &[RawExtract],
    rate_date: NaiveDate,
) -> Vec<NormalizedRate> {
    let records: Vec<RateRecord> = explode(provider, extracts)
        .into_iter()
        .filter(|r| r.rate_date == rate_date)
        .collect();
    normalize_records(&provider.name, records)
}

/// Normalizes already exploded records. Records are expected to share a
/// provider and a rate date.
pub fn normalize_records(provider: &str, records: Vec<RateRecord>) -> Vec<NormalizedRate> {
    if records.is_empty() {
        debug!(%provider, "No records to normalize");
        return Vec::new();
    }

    let anchors = cross_rate_anchors(&records);
    let mut missing_anchor: BTreeMap<(NaiveDate, String), usize> = BTreeMap::new();
    let mut normalized = Vec::with_capacity(records.len());

    for record in records {
        if record.target_currency == EUR {
            continue;
        }
        let rate_in_eur = if record.base_currency == EUR {
            record.exchange_rate
        } else {
            match anchors.get(&(record.rate_date, record.base_currency.clone())) {
                Some(anchor) => record.exchange_rate / anchor,
                None => {
                    *missing_anchor
                        .entry((record.rate_date, record.base_currency.clone()))
                        .or_default() += 1;
                    continue;
                }
            }
        };
        normalized.push(NormalizedRate {
            record,
            rate_in_eur,
        });
    }

    for ((date, base), dropped) in missing_anchor {
        warn!(
            %provider,
            %date,
            base_currency = %base,
            dropped,
            "Missing {base}->EUR cross rate, dropping rows"
        );
    }

    debug!(%provider, count = normalized.len(), "Normalized rates");
    normalized
}

/// The base->EUR rate per (date, base), taken from the most recent extraction
/// that carries one.
fn cross_rate_anchors(records: &[RateRecord]) -> HashMap<(NaiveDate, String), f64> {
    let mut latest: HashMap<(NaiveDate, String), &RateRecord> = HashMap::new();
    for record in records
        .iter()
        .filter(|r| r.target_currency == EUR && r.base_currency != EUR)
    {
        latest
            .entry((record.rate_date, record.base_currency.clone()))
            .and_modify(|current| {
                let newer = (record.extraction_timestamp, &record.extraction_id)
                    > (current.extraction_timestamp, &current.extraction_id);
                if newer {
                    *current = record;
                }
            })
            .or_insert(record);
    }
    latest
        .into_iter()
        .map(|(key, record)| (key, record.exchange_rate))
        .collect()
}
