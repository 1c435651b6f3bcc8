//! Runs normalization, dedupe, consensus and validation over loaded batches.
//!
//! Every stage is a pure transformation. Dates are processed as independent
//! partitions, so the output only depends on the input batches.

use crate::core::consensus::ConsensusEngine;
use crate::core::dedupe::dedupe;
use crate::core::error::Result;
use crate::core::normalize::normalize;
use crate::core::quality::QualityReport;
use crate::core::rates::{ConsensusResult, NormalizedRate, Source, ValidatedFact};
use crate::core::validation::ValidationGate;
use crate::providers::ProviderBatch;
use chrono::NaiveDate;
use tracing::{debug, info};

/// Inclusive range of rate dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if end < start {
            Self {
                start: end,
                end: start,
            }
        } else {
            Self { start, end }
        }
    }

    pub fn single(date: NaiveDate) -> Self {
        Self::new(date, date)
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

#[derive(Debug, Default, Clone)]
pub struct PipelineOutput {
    pub normalized: Vec<NormalizedRate>,
    pub consensus: Vec<ConsensusResult>,
    pub facts: Vec<ValidatedFact>,
    pub reports: Vec<QualityReport>,
}

impl PipelineOutput {
    pub fn published(&self) -> impl Iterator<Item = &ValidatedFact> {
        self.facts.iter().filter(|f| f.is_published())
    }
}

/// Processes one date partition.
pub fn process_date(
    batches: &[ProviderBatch],
    rate_date: NaiveDate,
    engine: &ConsensusEngine,
    gate: &ValidationGate,
) -> Result<PipelineOutput> {
    let mut normalized = Vec::new();
    for batch in batches {
        let rows = normalize(&batch.provider, &batch.extracts, rate_date);
        debug!(provider = %batch.provider.name, %rate_date, rows = rows.len(), "Normalized batch");
        normalized.extend(rows);
    }

    let normalized = dedupe(normalized);
    let consensus = engine.consensus(&normalized)?;
    let primary: Vec<NormalizedRate> = normalized
        .iter()
        .filter(|r| r.source() == Source::Primary)
        .cloned()
        .collect();
    let facts = gate.validate(&consensus, &primary);
    let report = QualityReport::build(rate_date, &normalized, &consensus, &facts);

    info!(
        %rate_date,
        consensus = consensus.len(),
        validated = report.validated_rows,
        flagged = report.flagged_rows,
        "Processed date"
    );

    Ok(PipelineOutput {
        normalized,
        consensus,
        facts,
        reports: vec![report],
    })
}

/// Processes every date in `dates`. A failing partition aborts the run
/// without emitting partial results.
pub fn process(
    batches: &[ProviderBatch],
    dates: DateRange,
    engine: &ConsensusEngine,
    gate: &ValidationGate,
) -> Result<PipelineOutput> {
    let mut output = PipelineOutput::default();
    for date in dates.days() {
        let day = process_date(batches, date, engine, gate)?;
        output.normalized.extend(day.normalized);
        output.consensus.extend(day.consensus);
        output.facts.extend(day.facts);
        output.reports.extend(day.reports);
    }
    Ok(output)
}
