//! Collapses repeated extractions of the same observation.

use crate::core::rates::{RateRecord, Source};
use chrono::NaiveDate;
use std::collections::BTreeMap;

type GroupKey = (NaiveDate, String, Source);

/// Keeps, per (source, rate_date, target_currency), the row with the latest
/// `extraction_timestamp`. Ties go to the greatest `extraction_id` so replays
/// pick the same row. Output is ordered by (rate_date, target_currency, source).
pub fn dedupe<T>(rows: Vec<T>) -> Vec<T>
where
    T: AsRef<RateRecord>,
{
    let mut latest: BTreeMap<GroupKey, T> = BTreeMap::new();
    for row in rows {
        let record = row.as_ref();
        let key = (
            record.rate_date,
            record.target_currency.clone(),
            record.source,
        );
        let replace = latest
            .get(&key)
            .is_none_or(|current| supersedes(record, current.as_ref()));
        if replace {
            latest.insert(key, row);
        }
    }
    latest.into_values().collect()
}

fn supersedes(candidate: &RateRecord, current: &RateRecord) -> bool {
    (candidate.extraction_timestamp, &candidate.extraction_id)
        > (current.extraction_timestamp, &current.extraction_id)
}
