//! Bulk geocoding CLI.
//!
//! Thin surface over the batch engine: parse flags, validate, run,
//! report. Exit code 0 on a completed run, non-zero on an abort.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use tamarack::{BatchProcessor, ColumnMapping, Provider, ProviderKind, RunConfig};

#[derive(Parser, Debug)]
#[command(name = "geocode")]
#[command(about = "Bulk geocode a CSV file with checkpoint/resume support")]
struct Args {
    /// Input CSV file (first row is the header)
    input: PathBuf,

    /// Output CSV file (input columns plus latitude, longitude,
    /// geocode_status, geocode_address)
    output: PathBuf,

    /// Geocoding provider
    #[arg(short, long, value_enum, default_value = "nominatim")]
    provider: ProviderKind,

    /// API key or access token (required for google/mapbox)
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Override the provider's default endpoint
    #[arg(long)]
    endpoint: Option<String>,

    /// Column holding the full address
    #[arg(short, long)]
    address: Option<String>,

    /// Street column name (component mode)
    #[arg(long)]
    street: Option<String>,

    /// City column name (component mode)
    #[arg(long)]
    city: Option<String>,

    /// State column name (component mode)
    #[arg(long)]
    state: Option<String>,

    /// Zip code column name (component mode)
    #[arg(long)]
    zip: Option<String>,

    /// Resume from the existing output instead of starting over
    #[arg(short, long)]
    resume: bool,

    /// Rows per checkpoint commit
    #[arg(short, long, default_value_t = RunConfig::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
}

impl Args {
    fn column_mapping(&self) -> ColumnMapping {
        match &self.address {
            Some(address) => ColumnMapping::Single {
                address: address.clone(),
            },
            None => ColumnMapping::Components {
                street: self.street.clone(),
                city: self.city.clone(),
                state: self.state.clone(),
                zip: self.zip.clone(),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let config = RunConfig {
        input: args.input.clone(),
        output: args.output.clone(),
        provider: args.provider,
        api_key: args.api_key.clone(),
        endpoint: args.endpoint.clone(),
        columns: args.column_mapping(),
        resume: args.resume,
        chunk_size: args.chunk_size,
    };
    config.validate().context("Invalid configuration")?;

    let provider = Provider::from_config(&config).context("Failed to initialize provider")?;

    let mut processor = BatchProcessor::new(config, provider);
    let report = processor.run().await?;

    info!("Output saved to {}", args.output.display());
    if let Some(index) = report.last_committed {
        info!("Checkpoint covers rows 0..={}", index);
    }

    Ok(())
}
