use super::{date_window, ui};
use crate::AppContext;
use crate::core::consensus::ConsensusEngine;
use crate::core::pipeline::{self, DateRange, PipelineOutput};
use crate::core::resolver::ResolveMode;
use crate::core::validation::ValidationGate;
use crate::providers::ProviderBatch;
use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use comfy_table::Cell;
use futures::future::join_all;
use std::collections::HashMap;
use tracing::info;

pub async fn run(
    ctx: &AppContext,
    date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    plan: bool,
) -> Result<()> {
    let (start, end) = date_window(date, end_date);
    let range = DateRange::new(start, end);
    let mode = if plan {
        ResolveMode::Plan
    } else {
        ResolveMode::Execute
    };

    let primary = ctx
        .config
        .primary()
        .ok_or_else(|| anyhow!("No primary provider configured"))?;
    let reader = ctx.reader(mode)?;

    let pb = ui::new_progress_bar(ctx.config.providers.len() as u64, true);
    pb.set_message("Reading snapshots...");
    let reads = ctx.config.providers.iter().map(|provider| {
        let pb_clone = pb.clone();
        let reader = &reader;
        async move {
            let batch = reader
                .read_provider(provider)
                .await
                .with_context(|| format!("Failed to read snapshot for {}", provider.name));
            pb_clone.inc(1);
            batch
        }
    });
    let batches: Vec<ProviderBatch> = join_all(reads)
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;
    pb.finish_and_clear();

    let engine = ConsensusEngine::new(ctx.config.validation.clone());
    let gate = ValidationGate::new(&primary.name);
    let output = pipeline::process(&batches, range, &engine, &gate)?;

    let store = ctx.fact_store(plan)?;
    for rate_date in range.days() {
        let facts: Vec<_> = output
            .facts
            .iter()
            .filter(|f| f.rate_date == rate_date)
            .cloned()
            .collect();
        let consensus: Vec<_> = output
            .consensus
            .iter()
            .filter(|r| r.rate_date == rate_date)
            .cloned()
            .collect();
        store.replace_date(rate_date, &facts, &consensus).await?;
    }
    info!(
        consensus = output.consensus.len(),
        facts = output.facts.len(),
        published = output.published().count(),
        plan,
        "Stored run results"
    );

    print_snapshots(&batches);
    print_results(&output, &batches, ctx.config.validation.flag_threshold);
    if plan {
        println!(
            "\n{}",
            ui::style_text("Plan run: nothing was persisted.", ui::StyleType::Subtle)
        );
    }
    Ok(())
}

fn print_snapshots(batches: &[ProviderBatch]) {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Provider"),
        ui::header_cell("Tier"),
        ui::header_cell("Path"),
        ui::header_cell("Location"),
        ui::header_cell("Rows"),
    ]);
    for batch in batches {
        let (path, uri) = batch.location.as_ref().map_or(
            ("not_found".to_string(), "N/A".to_string()),
            |l| (l.origin.to_string(), l.uri.clone()),
        );
        table.add_row(vec![
            Cell::new(&batch.provider.name),
            Cell::new(batch.provider.source.to_string()),
            Cell::new(path),
            Cell::new(uri),
            Cell::new(batch.extracts.len()),
        ]);
    }
    println!("{}", ui::style_text("Snapshots", ui::StyleType::Title));
    println!("{table}");
}

fn print_results(output: &PipelineOutput, batches: &[ProviderBatch], threshold: f64) {
    if output.consensus.is_empty() {
        println!("\nNo rates found for the requested dates.");
        return;
    }

    let tier_names: HashMap<_, _> = batches
        .iter()
        .map(|b| (b.provider.source, b.provider.name.as_str()))
        .collect();
    let facts: HashMap<_, _> = output
        .facts
        .iter()
        .map(|f| ((f.rate_date, f.target_currency.as_str()), f))
        .collect();

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Pair"),
        ui::header_cell("Consensus"),
        ui::header_cell("Primary"),
        ui::header_cell("Max deviation"),
        ui::header_cell("Sources"),
        ui::header_cell("Status"),
        ui::header_cell("Severity"),
    ]);
    for result in &output.consensus {
        let fact = facts.get(&(result.rate_date, result.target_currency.as_str()));
        let sources = result
            .sources
            .iter()
            .map(|s| tier_names.get(&s.source).copied().unwrap_or("?"))
            .collect::<Vec<_>>()
            .join(", ");
        let status = match fact {
            Some(fact) => ui::validation_cell(fact.validation_status),
            None => Cell::new("UNPUBLISHED"),
        };
        table.add_row(vec![
            Cell::new(result.rate_date),
            Cell::new(format!("EUR/{}", result.target_currency)),
            ui::rate_cell(result.consensus_rate),
            ui::format_optional_cell(fact.map(|f| f.exchange_rate), |r| format!("{r:.6}")),
            ui::deviation_cell(result.max_deviation(), threshold),
            Cell::new(sources),
            status,
            ui::severity_cell(result.severity),
        ]);
    }
    println!("\n{}", ui::style_text("Consensus", ui::StyleType::Title));
    println!("{table}");

    for report in &output.reports {
        println!(
            "{} {}: {} validated, {} flagged ({:.1}%)",
            ui::style_text("Quality", ui::StyleType::TotalLabel),
            report.rate_date,
            ui::style_text(&report.validated_rows.to_string(), ui::StyleType::TotalValue),
            report.flagged_rows,
            report.validation_rate * 100.0
        );
    }
}
