use std::{io::Write, path::PathBuf};

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use stock::{generate_report, Inventory, Query};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Consolidates inventory CSV files, searches them, and reports on stock."
)]
struct Args {
    /// Directory containing the inventory CSV files.
    input_dir: PathBuf,

    /// Command to run.
    #[arg(value_enum)]
    command: Command,

    /// Only show products whose name contains this text (ignoring case).
    #[arg(long)]
    name: Option<String>,

    /// Only show products with at least this quantity.
    #[arg(long)]
    quantity: Option<i64>,

    /// Only show products with at least this unit price.
    #[arg(long = "unit_price")]
    unit_price: Option<f64>,

    /// Write search results to this CSV file instead of printing them.
    #[arg(long)]
    export: Option<PathBuf>,

    /// Report destination: a `.xlsx` workbook, or a stem for two CSV files.
    #[arg(long, required_if_eq("command", "report"))]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Command {
    /// Filter the consolidated inventory.
    Search,
    /// Write a summary report of the consolidated inventory.
    Report,
}

fn main() -> Result<()> {
    init_tracing();
    run(Args::parse(), &mut std::io::stdout().lock())
}

fn run(args: Args, out: &mut impl Write) -> Result<()> {
    let inventory = Inventory::from_dir(&args.input_dir)?;
    match args.command {
        Command::Search => {
            let results = inventory.search(&Query {
                name: args.name,
                quantity: args.quantity,
                unit_price: args.unit_price,
            });
            if let Some(path) = args.export {
                results.write_csv(&path)?;
                writeln!(out, "Results exported to {}", path.display())?;
            } else {
                write!(out, "{results}")?;
            }
        }
        Command::Report => {
            if let Some(output) = args.output {
                if generate_report(&inventory, &output) {
                    writeln!(out, "Report generated: {}", output.display())?;
                }
            }
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
