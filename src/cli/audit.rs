use super::ui;
use crate::AppContext;
use crate::core::rates::{ConsensusStatus, Source};
use crate::store::FactQuery;
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::Cell;

const TIERS: [Source; 3] = [Source::Primary, Source::Secondary, Source::Tertiary];

/// Shows per-source deviations behind each stored consensus result.
pub async fn run(
    ctx: &AppContext,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    currency: Option<&str>,
    flagged_only: bool,
) -> Result<()> {
    let mut query = FactQuery {
        from,
        to,
        currency: None,
    };
    if let Some(currency) = currency {
        query = query.with_currency(currency);
    }

    let store = ctx.fact_store(false)?;
    let mut results = store.consensus(&query).await?;
    if flagged_only {
        results.retain(|r| r.status == ConsensusStatus::Flagged);
    }
    if results.is_empty() {
        println!("No consensus results found.");
        return Ok(());
    }

    let threshold = ctx.config.validation.flag_threshold;
    let mut header = vec![
        ui::header_cell("Date"),
        ui::header_cell("Currency"),
        ui::header_cell("Median"),
    ];
    for tier in TIERS {
        header.push(ui::header_cell(&tier.to_string()));
    }
    header.push(ui::header_cell("Status"));
    header.push(ui::header_cell("Severity"));

    let mut table = ui::new_styled_table();
    table.set_header(header);
    for result in &results {
        let mut row = vec![
            Cell::new(result.rate_date),
            Cell::new(&result.target_currency),
            ui::rate_cell(result.consensus_rate),
        ];
        for tier in TIERS {
            row.push(match result.sources.iter().find(|s| s.source == tier) {
                Some(s) => ui::deviation_cell(s.deviation_pct, threshold),
                None => ui::format_optional_cell(None::<f64>, |d| d.to_string()),
            });
        }
        row.push(ui::consensus_cell(result.status));
        row.push(ui::severity_cell(result.severity));
        table.add_row(row);
    }

    println!("{table}");
    let flagged = results
        .iter()
        .filter(|r| r.status == ConsensusStatus::Flagged)
        .count();
    println!(
        "\n{} {} of {} groups flagged (threshold {:.2}%)",
        ui::style_text("Audit:", ui::StyleType::TotalLabel),
        flagged,
        results.len(),
        threshold * 100.0
    );
    Ok(())
}
