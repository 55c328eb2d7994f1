use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use bar_ingestor::{
    cli::{
        commands::{BatchArgs, GapsArgs, IngestArgs, ValidateArgs},
        params::load_batch_params,
    },
    config::PipelineConfig,
    ingest::{
        pipeline::{IngestionPipeline, IngestionReport},
        progress::{ChannelProgress, ProgressUpdate},
    },
    models::{
        asset::AssetClass,
        bucket::{expected_bars, next_bucket_start},
        request_params::IngestRequest,
        timeframe::TimeFrame,
    },
    providers::{DataProvider, bitunix::BitunixProvider, static_provider::StaticProvider},
    quality::post_hoc::PostHocValidator,
};
use bar_store::{bars::SqliteBarStore, db::migrate};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use shared_utils::env::get_env_var;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Historical bar ingestion with OHLC and bad-tick validation")]
struct Cli {
    /// Pipeline configuration (TOML); built-in defaults when omitted
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database path; defaults to $DATABASE_URL
    #[arg(long, global = true, value_name = "URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Apply pending schema migrations
    Migrate,
    Ingest(IngestArgs),
    Batch(BatchArgs),
    Import(ImportArgs),
    Validate(ValidateArgs),
    Gaps(GapsArgs),
}

/// Run bars from a JSON file through the same corrections and store them.
#[derive(Args)]
struct ImportArgs {
    /// JSON array of bars ({timestamp, open, high, low, close, volume})
    #[arg(long, value_name = "FILE")]
    file: PathBuf,

    /// Provider code to store the bars under
    #[arg(long, default_value = "manual")]
    source: String,

    #[arg(long)]
    symbol: String,

    #[arg(long, default_value = "1m")]
    timeframe: TimeFrame,

    #[arg(long, default_value = "crypto")]
    asset_class: AssetClass,
}

#[tokio::main]
async fn main() -> Result<()> {
    // a missing .env is fine; the environment may already be set
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let database_url = match cli.database_url {
        Some(url) => url,
        None => get_env_var("DATABASE_URL")?,
    };

    match cli.cmd {
        Cmd::Migrate => migrate::run_all(&database_url)?,
        Cmd::Ingest(args) => {
            let request = args.to_request(Utc::now())?;
            let provider = Arc::new(BitunixProvider::new()?);
            let pipeline = pipeline(provider, &database_url, config)?;
            let report = ingest_one(&pipeline, &request).await?;
            print_report(&report);
        }
        Cmd::Batch(args) => {
            let requests = load_batch_params(args.source, args.input.as_deref(), Utc::now())?;
            if requests.is_empty() {
                bail!("batch input holds no requests");
            }
            let provider = Arc::new(BitunixProvider::new()?);
            let pipeline = pipeline(provider, &database_url, config)?;
            let (progress, printer) = spawn_progress_printer();
            let cancel = cancel_on_ctrl_c();
            let results = pipeline.ingest_many(&requests, &progress, &cancel).await;
            drop(progress);
            let _ = printer.await;

            let mut failed = 0;
            for (label, outcome) in &results {
                match outcome {
                    Ok(report) => {
                        println!("{label}: ok");
                        print_report(report);
                    }
                    Err(e) => {
                        failed += 1;
                        println!("{label}: FAILED: {e}");
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} of {} requests failed", results.len());
            }
        }
        Cmd::Import(args) => {
            let text = fs::read_to_string(&args.file)
                .with_context(|| format!("failed to read {}", args.file.display()))?;
            let provider = StaticProvider::from_json(args.source.trim(), &text)
                .with_context(|| format!("failed to parse bars in {}", args.file.display()))?;
            let request = import_request(&args, &provider)?;
            let pipeline = pipeline(Arc::new(provider), &database_url, config)?;
            let report = ingest_one(&pipeline, &request).await?;
            print_report(&report);
        }
        Cmd::Validate(args) => {
            let store = open_store(&database_url)?;
            let locks = Arc::new(store.lock_table(config.lock_ttl()));
            let validator = PostHocValidator::new(store, locks, config.post_hoc_batch_size);
            let report = validator.run(&args.filter()).await?;
            println!(
                "scanned {} bars, corrected {}, series touched {}",
                report.bars_scanned, report.bars_corrected, report.series_touched
            );
        }
        Cmd::Gaps(args) => {
            let (key, start, end) = args.to_window(Utc::now())?;
            let store = open_store(&database_url)?;
            let gaps = store.missing_ranges(&key, start, end).await?;
            let expected = expected_bars(key.timeframe, start, end);
            let missing: u64 = gaps
                .iter()
                .map(|(lo, hi)| expected_bars(key.timeframe, *lo, *hi))
                .sum();
            for (lo, hi) in &gaps {
                println!("{lo} .. {hi}");
            }
            println!("{key}: {missing} of {expected} bars missing in {} gap(s)", gaps.len());
        }
    }
    Ok(())
}

fn open_store(database_url: &str) -> Result<Arc<SqliteBarStore>> {
    migrate::run_all(database_url)?;
    Ok(Arc::new(SqliteBarStore::open(database_url)?))
}

fn pipeline(
    provider: Arc<dyn DataProvider>,
    database_url: &str,
    config: PipelineConfig,
) -> Result<IngestionPipeline> {
    let store = open_store(database_url)?;
    // persisted locks, so a `validate` in another process sees this run
    let locks = Arc::new(store.lock_table(config.lock_ttl()));
    Ok(IngestionPipeline::new(provider, store, config, locks))
}

async fn ingest_one(pipeline: &IngestionPipeline, request: &IngestRequest) -> Result<IngestionReport> {
    let (progress, printer) = spawn_progress_printer();
    let cancel = cancel_on_ctrl_c();
    let outcome = pipeline.ingest(request, &progress, &cancel).await;
    drop(progress);
    let _ = printer.await;
    Ok(outcome?)
}

/// Range covering every bar in the file, so nothing is dropped as out of range.
fn import_request(args: &ImportArgs, provider: &StaticProvider) -> Result<IngestRequest> {
    let Some((first, last)) = provider.span() else {
        bail!("{} holds no bars", args.file.display());
    };
    let end = next_bucket_start(last, args.timeframe);
    Ok(
        IngestRequest::new(args.symbol.trim(), args.timeframe, first, end)
            .with_asset_class(args.asset_class),
    )
}

/// Progress goes through a channel so a slow terminal never stalls a batch.
fn spawn_progress_printer() -> (ChannelProgress, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressUpdate>();
    let printer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            eprintln!(
                "[{:>3}%] {} {}",
                update.percent, update.symbol, update.message
            );
        }
    });
    (ChannelProgress(tx), printer)
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current batch");
            on_signal.cancel();
        }
    });
    token
}

fn print_report(report: &IngestionReport) {
    let series = report
        .key
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    info!(%series, persisted = report.bars_persisted, "run complete");
    println!(
        "{series}: fetched {}, persisted {} of {} expected in {} batch(es)",
        report.bars_fetched, report.bars_persisted, report.expected_bars, report.batches
    );
    println!(
        "  ohlc corrected {}, negative volume clamped {}, bad ticks flagged {} (repaired {}, excluded {})",
        report.ohlc_corrected,
        report.volume_clamped,
        report.bad_ticks_flagged,
        report.bad_ticks_repaired,
        report.bad_ticks_excluded
    );
    if let (Some(first), Some(last)) = (report.first_bar, report.last_bar) {
        println!("  bars {first} .. {last}");
    }
    if let Some(post) = &report.post_hoc {
        println!(
            "  post-hoc: scanned {}, corrected {}",
            post.bars_scanned, post.bars_corrected
        );
    }
}
