//! Command implementations and terminal rendering.

pub mod audit;
pub mod facts;
pub mod quality;
pub mod resolve;
pub mod run;
pub mod setup;
pub mod ui;

use chrono::{NaiveDate, Utc};

/// Resolves optional CLI bounds into a window; both default to today (UTC)
/// and a single bound yields a one-day window.
pub(crate) fn date_window(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> (NaiveDate, NaiveDate) {
    match (from, to) {
        (Some(from), Some(to)) => (from, to),
        (Some(day), None) | (None, Some(day)) => (day, day),
        (None, None) => {
            let today = Utc::now().date_naive();
            (today, today)
        }
    }
}
