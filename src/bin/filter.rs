//! Schema Filter CLI
//!
//! Filters a JSON record (or array of records) through a schema document and
//! prints the result.

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use schema_filter::{FilterConfig, FilterSchema, SchemaFilter, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-filter")]
#[command(about = "Filter JSON records through a declarative schema")]
struct Cli {
    /// Schema document (.json or .toml)
    #[arg(short, long)]
    schema: PathBuf,

    /// JSON input file (defaults to stdin)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Config file layered over the default locations
    #[arg(short, long)]
    config: Option<String>,

    /// Emit dates as epoch milliseconds
    #[arg(long)]
    wire: bool,

    /// Override the maximum nesting depth
    #[arg(long)]
    max_depth: Option<usize>,

    /// Print compact JSON instead of pretty JSON
    #[arg(long)]
    compact: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut options = FilterConfig::load_from(cli.config.as_deref())
        .context("failed to load configuration")?
        .filter;
    if cli.wire {
        options.serialize_dates_as_wire_values = true;
    }
    if let Some(max_depth) = cli.max_depth {
        options.max_depth = max_depth;
    }

    let schema = FilterSchema::load(&cli.schema)
        .with_context(|| format!("failed to load schema {:?}", cli.schema))?;
    tracing::debug!(fields = schema.len(), "loaded schema");

    let raw = match &cli.input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input {:?}", path))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };
    let input = Value::from_json_str(&raw).context("input is not valid JSON")?;

    let filter = SchemaFilter::new(schema).with_options(options);
    let output = filter.filter_value(&input)?.to_json();

    let rendered = if cli.compact {
        serde_json::to_string(&output)?
    } else {
        serde_json::to_string_pretty(&output)?
    };
    println!("{}", rendered);

    Ok(())
}
