use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, eyre};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use stickerconv::application::{ConversionPipeline, StickerConverter};
use stickerconv::infrastructure::{
    AppConfig, CliArgs, Command, ConfigStore, ContentAddressedCache, ExternalMediaTools,
    HttpDownloader,
};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    let file_layer = match config.effective_log_path() {
        Some(log_path) => {
            if let Some(parent) = log_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)?;

            Some(
                fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .init();

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let store = ConfigStore::locate(args.config.as_deref())?;
    let mut config = store.load()?;
    config.merge_with_args(args);
    config.validate()?;
    Ok(config)
}

async fn create_converter(config: &AppConfig) -> Result<StickerConverter> {
    let cache_dir = config
        .effective_cache_dir()
        .ok_or_else(|| eyre!("could not determine a cache directory; pass --cache-dir"))?;
    let cache = ContentAddressedCache::open(cache_dir).await?;
    let pipeline = Arc::new(ConversionPipeline::new(
        Arc::new(cache),
        config.workspace.root(),
    ));

    let downloader = Arc::new(HttpDownloader::new(&config.http.downloader())?);
    let tools = Arc::new(ExternalMediaTools::new(config.tools.tools()));

    Ok(StickerConverter::new(
        downloader,
        tools,
        config.conversion.settings(),
        pipeline,
    ))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!(version = stickerconv::VERSION, "Starting stickerconv");

    let converter = create_converter(&config).await?;

    match args.command {
        Command::Convert { url, stable_id } => {
            let artifact = converter
                .convert(&url, stable_id.as_deref())
                .await
                .wrap_err_with(|| format!("failed to convert {url}"))?;
            match artifact {
                Some(path) => println!("{}", path.display()),
                None => {
                    println!("no artifact");
                    return Ok(ExitCode::from(2));
                }
            }
        }
        Command::Sweep => {
            let report = converter.sweeper(config.cache.sweeper()).sweep_once().await?;
            println!(
                "scanned {} artifacts, {} -> {} bytes, evicted {} ({} bytes freed), skipped {}",
                report.scanned,
                report.total_before,
                report.total_after,
                report.evicted.len(),
                report.freed_bytes,
                report.skipped,
            );
            for path in &report.evicted {
                println!("evicted {}", path.display());
            }
        }
        Command::Watch => {
            let sweeper = Arc::new(converter.sweeper(config.cache.sweeper()));
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let handle = sweeper.spawn(shutdown_rx);

            tokio::signal::ctrl_c().await?;
            info!("Interrupt received, stopping sweeper");
            shutdown_tx.send_replace(true);
            handle.await?;
        }
        Command::Stats => {
            let stats = converter.cache().stats().await?;
            println!(
                "{} artifacts, {} bytes in {}",
                stats.entries,
                stats.total_bytes,
                converter.cache().dir().display()
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}
