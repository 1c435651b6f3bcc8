use super::ui;
use crate::AppContext;
use crate::core::quality::QualityReport;
use crate::store::FactQuery;
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::Cell;
use std::collections::BTreeSet;

/// Recomputes data-quality metrics for each stored date in the window.
pub async fn run(ctx: &AppContext, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<()> {
    let query = FactQuery {
        from,
        to,
        currency: None,
    };
    let store = ctx.fact_store(false)?;
    let consensus = store.consensus(&query).await?;
    let facts = store.facts(&query).await?;

    let dates: BTreeSet<NaiveDate> = consensus.iter().map(|r| r.rate_date).collect();
    if dates.is_empty() {
        println!("No stored results in the requested window.");
        return Ok(());
    }

    let reports: Vec<QualityReport> = dates
        .into_iter()
        .map(|date| QualityReport::from_stored(date, &consensus, &facts))
        .collect();

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Rows"),
        ui::header_cell("Per source"),
        ui::header_cell("Validated"),
        ui::header_cell("Flagged"),
        ui::header_cell("Validation rate"),
        ui::header_cell("Currencies"),
        ui::header_cell("Severity"),
    ]);
    for report in &reports {
        let per_source = report
            .rows_per_source
            .iter()
            .map(|(source, count)| format!("{source}: {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        let severity = report
            .severity_breakdown
            .iter()
            .map(|(severity, count)| format!("{severity}: {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            Cell::new(report.rate_date),
            Cell::new(report.total_rows()),
            Cell::new(per_source),
            Cell::new(report.validated_rows),
            Cell::new(report.flagged_rows),
            Cell::new(format!("{:.1}%", report.validation_rate * 100.0)),
            Cell::new(report.currency_count),
            Cell::new(if severity.is_empty() {
                "-".to_string()
            } else {
                severity
            }),
        ]);
    }
    println!("{table}");
    Ok(())
}
