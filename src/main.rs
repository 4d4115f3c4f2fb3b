use anyhow::{Context, Result};
use approx_query_engine::result_format::{render_method_catalogue, render_outcome, to_json};
use approx_query_engine::{ApproxQueryEngine, EngineConfig, FileStorageEngine, QueryOptions, SamplingMethod};
use clap::Parser;
use std::path::PathBuf;

/// Approximate query engine CLI
#[derive(Parser, Debug)]
#[command(name = "aqe")]
#[command(version)]
#[command(about = "Approximate SUM/COUNT/AVG queries with confidence intervals")]
#[command(
    after_help = "QUERY SYNTAX:\n\
  Embedded:  aqe \"SELECT APPROX(SUM(amount)) FROM sales\"\n\
  Random:    aqe \"SELECT SUM(amount) FROM sales\" -s 10\n\
  CLT:       aqe \"SELECT SUM(amount) FROM sales\" -e 2\n\
  Block:     aqe \"SELECT AVG(amount) FROM sales\" --block 1000\n\
  Grouped:   aqe \"SELECT SUM(amount) FROM sales GROUP BY region\" -s 10\n\
  Exact:     aqe \"SELECT SUM(amount) FROM sales\""
)]
struct Args {
    /// SQL aggregate query
    #[arg(required_unless_present = "explain")]
    query: Option<String>,

    /// Database file (native store, or CSV loaded on the fly)
    #[arg(long, default_value = "sales.db")]
    db: PathBuf,

    /// Random sample percentage
    #[arg(short = 's', long = "sample", value_name = "PERCENT")]
    sample: Option<f64>,

    /// Error threshold percentage for CLT approximation
    #[arg(short = 'e', long = "error", value_name = "THRESHOLD")]
    error: Option<f64>,

    /// Block sampling with blocks of SIZE records
    #[arg(long = "block", value_name = "SIZE")]
    block: Option<usize>,

    /// Override automatic method selection
    /// (random, clt, block, adaptive, parallel, revolutionary)
    #[arg(long)]
    method: Option<SamplingMethod>,

    /// Compare with the exact result
    #[arg(long)]
    compare: bool,

    /// Show the method catalogue and exit
    #[arg(long)]
    explain: bool,

    /// Threads for parallel and CLT methods
    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// Confidence level for statistical methods
    #[arg(long, value_name = "LEVEL")]
    confidence: Option<f64>,

    /// Always show the confidence interval line
    #[arg(long)]
    ci: bool,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.explain {
        print!("{}", render_method_catalogue());
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let query = args.query.context("A query is required unless --explain is given")?;
    let options = QueryOptions {
        sample_percent: args.sample,
        error_threshold: args.error,
        block_size: args.block,
        method: args.method,
        confidence_level: args.confidence,
        thread_count: args.threads,
        compare: args.compare,
    };

    let engine = ApproxQueryEngine::new(FileStorageEngine::new(), config);
    let outcome = engine
        .execute(&query, &args.db, &options)
        .with_context(|| format!("Query failed against {}", args.db.display()))?;

    if args.json {
        println!("{}", to_json(&outcome)?);
    } else {
        print!("{}", render_outcome(&outcome, args.ci));
        println!("Query completed successfully");
    }
    Ok(())
}
