use anyhow::{Context, Result};
use approx_query_engine::{Record, RecordStore};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::time::Instant;

/// Generate a synthetic sales dataset
#[derive(Parser, Debug)]
#[command(name = "create_db")]
#[command(about = "Create a synthetic sales store for the approximate query engine")]
struct Args {
    /// Number of records
    #[arg(short = 'n', long, default_value_t = 1_000_000)]
    records: usize,

    /// Output file
    #[arg(short = 'o', long, default_value = "sales.db")]
    out: PathBuf,

    /// RNG seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Write CSV instead of the native store format
    #[arg(long)]
    csv: bool,

    /// Table name recorded in the store
    #[arg(long, default_value = "sales")]
    table: String,
}

/// Amount uniform in [10, 1000), region in 0..5, product in 1..=100,
/// timestamps one second apart
fn generate(count: usize, seed: u64) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(seed);
    let start_ts: i64 = 1_700_000_000;
    (0..count)
        .map(|i| {
            Record::new(
                i as i64 + 1,
                rng.gen_range(10.0..1000.0),
                rng.gen_range(0..5),
                rng.gen_range(1..=100),
                start_ts + i as i64,
            )
        })
        .collect()
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .ok();

    let start = Instant::now();
    let store = RecordStore::from_records(args.table.clone(), generate(args.records, args.seed));

    if args.csv {
        store
            .export_csv(&args.out)
            .with_context(|| format!("Failed to write {}", args.out.display()))?;
    } else {
        store
            .save(&args.out)
            .with_context(|| format!("Failed to write {}", args.out.display()))?;
    }

    tracing::info!(
        "Wrote {} records to {} in {:.2}s",
        store.len(),
        args.out.display(),
        start.elapsed().as_secs_f64()
    );
    println!("Created {} with {} records", args.out.display(), store.len());
    Ok(())
}
