use super::ui;
use crate::AppContext;
use crate::core::rates::ValidatedFact;
use crate::store::FactQuery;
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::Cell;

/// Lists stored facts. Only VALIDATED facts are shown unless `all` is set.
pub async fn run(
    ctx: &AppContext,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    currency: Option<&str>,
    all: bool,
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
    let facts = if all {
        store.facts(&query).await?
    } else {
        store.published(&query).await?
    };

    if facts.is_empty() {
        println!("No facts found.");
        return Ok(());
    }
    println!("{}", facts_table(&facts));
    Ok(())
}

pub fn facts_table(facts: &[ValidatedFact]) -> comfy_table::Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Pair"),
        ui::header_cell("Rate"),
        ui::header_cell("Inverse"),
        ui::header_cell("Consensus"),
        ui::header_cell("Variance"),
        ui::header_cell("Sources"),
        ui::header_cell("Status"),
        ui::header_cell("Extraction"),
    ]);
    for fact in facts {
        table.add_row(vec![
            Cell::new(fact.rate_date),
            Cell::new(&fact.currency_pair),
            ui::rate_cell(fact.exchange_rate),
            ui::rate_cell(fact.inverse_rate),
            ui::rate_cell(fact.consensus_rate),
            Cell::new(format!("{:.3}%", fact.consensus_variance * 100.0)),
            Cell::new(fact.source_count),
            ui::validation_cell(fact.validation_status),
            Cell::new(format!(
                "{} @ {}",
                fact.extraction_id,
                fact.extraction_timestamp.format("%Y-%m-%d %H:%M")
            )),
        ]);
    }
    table
}
