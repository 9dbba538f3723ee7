//! Operator inspection.

use anyhow::{Context, Result};
use remap_cli::OutputFormat;
use remap_core::OperatorSummary;
use remap_io::load_operator;
use std::io::{self, Write};
use std::path::Path;
use tabwriter::TabWriter;

pub fn handle(input: &Path, format: OutputFormat) -> Result<()> {
    let op = load_operator(input).with_context(|| format!("reading operator {}", input.display()))?;
    let summary = OperatorSummary::of(&op);

    match format {
        OutputFormat::Plain => print_summary(input, &summary),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

fn print_summary(input: &Path, summary: &OperatorSummary) -> Result<()> {
    println!("Operator summary for {}:", input.display());

    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "  Source cells\t{}", summary.source_count)?;
    writeln!(writer, "  Target cells\t{}", summary.target_count)?;
    writeln!(writer, "  Entries\t{}", summary.nnz)?;
    writeln!(writer, "  Density\t{:.6}", summary.density)?;
    match (summary.min_weight, summary.max_weight) {
        (Some(min), Some(max)) => writeln!(writer, "  Weights [min/max]\t{min:.6}/{max:.6}")?,
        _ => writeln!(writer, "  Weights [min/max]\t-")?,
    }
    writeln!(writer, "  Source area\t{:.6}", summary.source_area)?;
    writeln!(writer, "  Target area\t{:.6}", summary.target_area)?;
    writeln!(writer, "  Empty rows\t{}", summary.empty_rows)?;
    writeln!(writer, "  Empty columns\t{}", summary.empty_columns)?;
    match summary.fill_value {
        Some(fill) => writeln!(writer, "  Fill value\t{fill:e}")?,
        None => writeln!(writer, "  Fill value\t-")?,
    }
    writer.flush()?;
    Ok(())
}
