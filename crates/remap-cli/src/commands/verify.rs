use anyhow::{bail, Context, Result};
use remap_algo::{Check, CheckSummary, ValidationReport};
use remap_cli::{OutputFormat, RemapConfig};
use remap_io::load_operator;
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;
use tabwriter::TabWriter;
use tracing::info;

#[derive(Serialize)]
struct CheckRow {
    check: Check,
    passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<CheckSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn rows(report: &ValidationReport) -> Vec<CheckRow> {
    report
        .outcomes()
        .iter()
        .map(|outcome| CheckRow {
            check: outcome.check,
            passed: outcome.result.is_ok(),
            summary: outcome.result.as_ref().ok().cloned(),
            error: outcome.result.as_ref().err().map(ToString::to_string),
        })
        .collect()
}

pub fn handle(
    input: &Path,
    checkmono: bool,
    format: OutputFormat,
    config: &RemapConfig,
) -> Result<()> {
    info!("Verifying operator {}", input.display());
    let op = load_operator(input).with_context(|| format!("reading operator {}", input.display()))?;

    let report = super::validator(config, checkmono).run(&op);
    let rows = rows(&report);

    match format {
        OutputFormat::Plain => print_table(&rows)?,
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
    }

    let failed = rows.iter().filter(|row| !row.passed).count();
    if failed > 0 {
        bail!("{} of {} checks failed for {}", failed, rows.len(), input.display());
    }
    Ok(())
}

fn print_table(rows: &[CheckRow]) -> Result<()> {
    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "CHECK\tSTATUS\tCHECKED\tEXEMPT\tMAX DEVIATION\tTOLERANCE")?;
    for row in rows {
        match &row.summary {
            Some(summary) => writeln!(
                writer,
                "{}\tok\t{}\t{}\t{:.3e}\t{:.0e}",
                row.check,
                summary.checked,
                summary.exempt,
                summary.max_deviation,
                summary.tolerance
            )?,
            None => writeln!(writer, "{}\tFAILED\t-\t-\t-\t-", row.check)?,
        }
    }
    writer.flush()?;

    for row in rows {
        if let Some(error) = &row.error {
            println!("{}: {}", row.check, error);
        }
    }
    Ok(())
}
