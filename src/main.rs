// Command-line entry point.
//
// `report` loads an order export, prints a short load summary and the KPI
// table, and writes the flattened KPIs (and optionally the nested JSON).
// `clean` writes the normalized dataset back out as CSV.
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dropship_kpi::types::Field;
use dropship_kpi::util::format_int;
use dropship_kpi::{kpi_report, load_path, output, Config, LoadReport, OrderTable};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "dropship-kpi")]
#[command(about = "Logistics KPIs for dropshipping order exports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Order export (CSV with a header row)
    csv: PathBuf,

    /// TOML config file (defaults are embedded)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read a canonical field from a differently named column, e.g. contacts_count=tickets
    #[arg(long = "map", value_name = "FIELD=HEADER")]
    mappings: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the KPI report
    Report {
        #[command(flatten)]
        source: SourceArgs,

        /// Promised delivery window for the SLA KPI, in days
        #[arg(long)]
        promised_days: Option<u32>,

        /// Flat one-row CSV output
        #[arg(short, long, default_value = "kpis_summary.csv")]
        out: PathBuf,

        /// Also write the nested report as JSON
        #[arg(long)]
        json: Option<PathBuf>,

        /// Skip the console table
        #[arg(long)]
        no_preview: bool,
    },
    /// Write the normalized dataset
    Clean {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(short, long, default_value = "cleaned_data.csv")]
        out: PathBuf,
    },
}

fn load(
    source: &SourceArgs,
    promised_days: Option<u32>,
) -> Result<(Config, OrderTable, LoadReport)> {
    let mut config = Config::load(source.config.as_deref()).context("failed to load config")?;
    config.apply_mappings(source.mappings.as_slice())?;
    if let Some(days) = promised_days {
        config.set_promised_days(days)?;
    }
    let (table, report) = load_path(&source.csv, &config.load)
        .with_context(|| format!("failed to load {}", source.csv.display()))?;
    print_load_summary(&table, &report);
    Ok((config, table, report))
}

fn print_load_summary(table: &OrderTable, report: &LoadReport) {
    println!(
        "Processing dataset... ({} rows loaded, {} of {} columns recognised)",
        format_int(report.total_rows),
        table.columns.len(),
        Field::ALL.len()
    );
    if report.coerced_cells() > 0 {
        println!(
            "Note: {} unreadable cells treated as missing.",
            format_int(report.coerced_cells())
        );
    }
    println!();
}

fn handle_report(
    source: &SourceArgs,
    promised_days: Option<u32>,
    out: &Path,
    json: Option<&Path>,
    no_preview: bool,
) -> Result<()> {
    let (config, table, _) = load(source, promised_days)?;
    let report = kpi_report(&table, &config.kpi);
    let flat = report.flatten();

    if !no_preview {
        println!("Logistics KPIs (SLA window: {} days)\n", config.kpi.promised_days);
        println!("{}\n", output::render_kpi_table(&flat));
    }

    output::write_flat_row(out, &flat)
        .with_context(|| format!("failed to write {}", out.display()))?;
    info!("Wrote {} KPI columns to {}", flat.len(), out.display());
    println!("(KPIs exported to {})", out.display());

    if let Some(path) = json {
        output::write_json(path, &report)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("(Nested report exported to {})", path.display());
    }
    Ok(())
}

fn handle_clean(source: &SourceArgs, out: &Path) -> Result<()> {
    let (_, table, _) = load(source, None)?;
    output::write_cleaned(out, &table)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!("(Cleaned data exported to {})", out.display());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Report { source, promised_days, out, json, no_preview } => {
            handle_report(source, *promised_days, out, json.as_deref(), *no_preview)
        }
        Commands::Clean { source, out } => handle_clean(source, out),
    }
}
