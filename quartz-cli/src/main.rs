//! Quartz CLI — compute indexes, warm snapshots and inspect the snapshot store.
//!
//! Commands:
//! - `index` — compute a blend index for a preset and print or save it (JSON or CSV)
//! - `fetch` — load-or-fetch today's snapshot for symbols (default: both legs)
//! - `snapshot status` — list stored snapshots with their metadata
//! - `presets` — list the configured blend presets
//!
//! Configuration comes from the same environment variables as the server.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use quartz_core::data::{DataSource, SnapshotStore};
use quartz_core::domain::IndexPoint;
use quartz_core::{IndexService, ServiceConfig};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "quartz",
    about = "Quartz CLI — equity/crypto blend index from daily snapshots"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the blend index for a preset (e.g. QUARTZ9).
    Index {
        /// Preset token, case-insensitive.
        token: String,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Snapshot directory. Defaults to the configured root.
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Load or fetch today's snapshot for each symbol.
    Fetch {
        /// Symbols to fetch. Defaults to the configured equity and crypto legs.
        symbols: Vec<String>,

        /// Snapshot directory. Defaults to the configured root.
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Snapshot store commands.
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },
    /// List the configured blend presets.
    Presets,
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// List stored snapshots with date ranges and sizes.
    Status {
        /// Snapshot directory. Defaults to the configured root.
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServiceConfig::from_env().context("invalid configuration")?;

    match cli.command {
        Commands::Index {
            token,
            format,
            output,
            root,
        } => run_index(with_root(config, root), &token, format, output.as_deref()),
        Commands::Fetch { symbols, root } => run_fetch(with_root(config, root), symbols),
        Commands::Snapshot { action } => match action {
            SnapshotAction::Status { root } => {
                run_snapshot_status(&with_root(config, root).snapshot_dir)
            }
        },
        Commands::Presets => run_presets(&config),
    }
}

fn with_root(mut config: ServiceConfig, root: Option<PathBuf>) -> ServiceConfig {
    if let Some(root) = root {
        config.snapshot_dir = root;
    }
    config
}

fn run_index(
    config: ServiceConfig,
    token: &str,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<()> {
    let service = IndexService::from_config(&config)?;
    let points = service.handle(token)?;

    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };

    match format {
        OutputFormat::Json => {
            serde_json::to_writer(&mut out, &points)?;
            writeln!(out)?;
        }
        OutputFormat::Csv => write_csv(&mut out, &points)?,
    }
    out.flush()?;

    if let Some(path) = output {
        if let (Some(first), Some(last)) = (points.first(), points.last()) {
            println!(
                "{} points ({} to {}, last {:.2}) written to {}",
                points.len(),
                first.date,
                last.date,
                last.value,
                path.display()
            );
        }
    }
    Ok(())
}

fn write_csv<W: Write>(out: W, points: &[IndexPoint]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for point in points {
        writer.serialize(point)?;
    }
    writer.flush()?;
    Ok(())
}

fn run_fetch(config: ServiceConfig, symbols: Vec<String>) -> Result<()> {
    let symbols = if symbols.is_empty() {
        vec![config.equity_symbol.clone(), config.crypto_symbol.clone()]
    } else {
        symbols
    };
    let service = IndexService::from_config(&config)?;

    let mut failed = 0;
    for report in service.warm(&symbols) {
        match report.result {
            Ok(warmed) => {
                let source = match warmed.source {
                    DataSource::Snapshot => "snapshot",
                    DataSource::Upstream => "fetched",
                };
                let range = match (warmed.first_date, warmed.last_date) {
                    (Some(first), Some(last)) => format!("{first} to {last}"),
                    _ => "(empty)".to_string(),
                };
                println!(
                    "{:<12} {:<9} {:>6} bars  {}",
                    report.symbol, source, warmed.bars, range
                );
            }
            Err(e) => {
                eprintln!("Error for {}: {e}", report.symbol);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn run_snapshot_status(root: &Path) -> Result<()> {
    if !root.exists() {
        println!("Snapshot directory does not exist: {}", root.display());
        return Ok(());
    }

    let rows = SnapshotStore::new(root).status()?;
    if rows.is_empty() {
        println!("Snapshot store is empty: {}", root.display());
        return Ok(());
    }

    let total_size: u64 = rows.iter().map(|r| r.bytes).sum();
    println!("Snapshots: {}", root.display());
    println!("Files: {}", rows.len());
    println!("Total size: {}", format_size(total_size));
    println!();
    println!(
        "{:<12} {:<11} {:<25} {:<12} {:>10}",
        "Symbol", "Captured", "Date Range", "Bars", "Size"
    );
    println!("{}", "-".repeat(74));
    for row in &rows {
        let (range, bars) = match &row.meta {
            Some(meta) => (
                format!("{} to {}", meta.first_date, meta.last_date),
                format!("{} bars", meta.bar_count),
            ),
            None => ("(no meta)".to_string(), "-".to_string()),
        };
        println!(
            "{:<12} {:<11} {:<25} {:<12} {:>10}",
            row.symbol,
            row.capture_date.to_string(),
            range,
            bars,
            format_size(row.bytes)
        );
    }
    Ok(())
}

fn run_presets(config: &ServiceConfig) -> Result<()> {
    println!(
        "{:<10} {:>6} {:>6}   equity = {}, crypto = {}",
        "Preset", "Equity", "Crypto", config.equity_symbol, config.crypto_symbol
    );
    for (name, preset) in config.presets.iter() {
        let total = f64::from(preset.equity) + f64::from(preset.crypto);
        println!(
            "{:<10} {:>6} {:>6}   ({:.0}% / {:.0}%)",
            name,
            preset.equity,
            preset.crypto,
            f64::from(preset.equity) / total * 100.0,
            f64::from(preset.crypto) / total * 100.0
        );
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
