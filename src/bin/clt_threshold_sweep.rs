use anyhow::{Context, Result};
use approx_query_engine::execution::{
    sample_percent_for_error_threshold, CltExecutor, ExactExecutor, ExecutionParameters,
};
use approx_query_engine::query::parse_query;
use approx_query_engine::result_format::{format_number, format_time};
use approx_query_engine::{EngineConfig, ExecutionRequest, FileStorageEngine, Strategy};
use clap::Parser;
use std::path::PathBuf;

/// Sweep CLT error thresholds against the exact answer
#[derive(Parser, Debug)]
#[command(name = "clt_threshold_sweep")]
#[command(about = "Benchmark the CLT path across error thresholds")]
struct Args {
    /// Database file
    #[arg(long, default_value = "sales.db")]
    db: PathBuf,

    /// Query to run
    #[arg(long, default_value = "SELECT SUM(amount) FROM sales")]
    query: String,

    /// Comma-separated error thresholds in percent
    #[arg(long, value_delimiter = ',', default_values_t = vec![0.1, 1.0, 2.0, 5.0, 10.0])]
    thresholds: Vec<f64>,

    /// Worker threads of the dual-pointer scan
    #[arg(long, default_value_t = 4)]
    threads: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init()
        .ok();

    let storage = FileStorageEngine::new();
    let config = EngineConfig::default();
    let query = parse_query(&args.query).context("Unsupported sweep query")?;

    let exact_request = ExecutionRequest::new(query.clone(), &args.db, Strategy::Exact);
    let exact = ExactExecutor::new()
        .execute(&storage, &exact_request)
        .with_context(|| format!("Exact run failed on {}", args.db.display()))?;
    let exact_value = exact.value().unwrap_or(0.0);

    println!("CLT Error Threshold Sweep");
    println!("Query: {}", args.query);
    println!(
        "Exact: {} in {}",
        format_number(exact_value, 4),
        format_time(exact.execution_time)
    );
    println!("{}", "=".repeat(110));
    println!(
        "{:>10} {:>9} {:>22} {:>12} {:>40} {:>10}",
        "Threshold", "Sample", "Estimate", "Actual err", "Interval", "Time"
    );
    println!("{}", "-".repeat(110));

    let clt = CltExecutor::new(config.clt.clone());
    for threshold in &args.thresholds {
        let request = ExecutionRequest::new(query.clone(), &args.db, Strategy::Clt)
            .with_parameters(ExecutionParameters {
                error_threshold: Some(*threshold),
                confidence_level: config.clt.confidence_level,
                thread_count: args.threads,
                ..ExecutionParameters::default()
            });

        let result = match clt.execute(&storage, &request) {
            Ok(result) => result,
            Err(e) => {
                println!("{:>9}% failed: {}", threshold, e);
                continue;
            }
        };

        let value = result.value().unwrap_or(0.0);
        let actual_error = if exact_value != 0.0 {
            format!("{:.3}%", (value - exact_value).abs() / exact_value.abs() * 100.0)
        } else {
            "n/a".to_string()
        };
        let interval = result
            .ci
            .map(|ci| format!("({} - {})", format_number(ci.lower, 2), format_number(ci.upper, 2)))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:>9}% {:>8}% {:>22} {:>12} {:>40} {:>10}",
            threshold,
            sample_percent_for_error_threshold(*threshold),
            format_number(value, 4),
            actual_error,
            interval,
            format_time(result.execution_time)
        );
    }
    Ok(())
}
