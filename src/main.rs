use absscraper::{
    config::Config,
    fetch::{HttpFetcher, TokioSleeper},
    pipeline::{Pipeline, Status},
    schema::catalog,
};
use anyhow::{bail, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "absscraper")]
#[command(about = "Fetch ABS building activity and approvals tables, reshape them and add year-end sums")]
struct Args {
    /// Config file (default: ./absscraper.yaml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only run these datasets (repeatable)
    #[arg(short, long = "dataset")]
    datasets: Vec<String>,

    /// Output directory, overrides the config
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write Parquet copies
    #[arg(long)]
    parquet: bool,

    /// Reference date for release labels (YYYY-MM-DD, default today)
    #[arg(long)]
    today: Option<NaiveDate>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) config + CLI overrides ───────────────────────────────────
    let args = Args::parse();
    let mut config = Config::resolve(args.config.as_deref())?;
    if !args.datasets.is_empty() {
        config.datasets = args.datasets;
    }
    if let Some(dir) = args.output {
        config.output_dir = dir;
    }
    config.parquet |= args.parquet;

    let specs = config.select(catalog::builtin())?;
    let vocab = config.vocabulary()?;
    let fetcher = HttpFetcher::new(config.timeout())?;
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    info!(datasets = specs.len(), out = %config.output_dir.display(), %today, "running");

    // ─── 3) run every dataset ────────────────────────────────────────
    let pipeline = Pipeline {
        config: &config,
        vocab: &vocab,
        fetcher: &fetcher,
        sleeper: &TokioSleeper,
        today,
    };
    let report = pipeline.run(&specs).await?;

    // ─── 4) summary ──────────────────────────────────────────────────
    for d in &report.datasets {
        match d.status {
            Status::Ok => info!(dataset = %d.dataset, rows = d.rows, "ok"),
            Status::Warning => warn!(dataset = %d.dataset, rows = d.rows, rejected = ?d.rejected, "completed with warnings"),
            Status::Failed => error!(dataset = %d.dataset, errors = ?d.errors, "failed"),
        }
    }
    if report.failed() {
        bail!("one or more datasets failed");
    }
    info!("done");
    Ok(())
}
