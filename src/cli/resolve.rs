use super::ui;
use crate::AppContext;
use crate::core::resolver::ResolveMode;
use anyhow::Result;
use comfy_table::Cell;

/// Shows where the newest snapshot of `table` lives and how it was found.
pub async fn run(ctx: &AppContext, table: &str, plan: bool) -> Result<()> {
    let mode = if plan {
        ResolveMode::Plan
    } else {
        ResolveMode::Execute
    };
    let resolver = ctx.resolver(mode)?;
    let layout = resolver.layout();

    let mut output = ui::new_styled_table();
    output.set_header(vec![ui::header_cell("Field"), ui::header_cell("Value")]);
    output.add_row(vec![Cell::new("Table"), Cell::new(table)]);
    output.add_row(vec![
        Cell::new("Override key"),
        Cell::new(layout.override_key(table)),
    ]);
    output.add_row(vec![
        Cell::new("Metadata prefix"),
        Cell::new(format!("s3://{}/{}", layout.bucket, layout.metadata_prefix(table))),
    ]);

    match resolver.resolve(table).await? {
        Some(location) => {
            output.add_row(vec![Cell::new("Path"), Cell::new(location.origin)]);
            output.add_row(vec![Cell::new("Location"), Cell::new(&location.uri)]);
        }
        None => {
            output.add_row(vec![
                Cell::new("Path"),
                Cell::new(ui::style_text("not_found", ui::StyleType::Error)),
            ]);
        }
    }

    println!("{output}");
    Ok(())
}
