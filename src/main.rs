//! signal_feed - Main Entry Point
//!
//! Streams trading signals from the signal server and logs each one.

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use signal_feed::common::channels::queued;
use signal_feed::config::{apply_flat_env, load_config, load_from_env};
use signal_feed::feed::{FeedController, LoggingConsumer};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "SIGNAL_FEED_CONFIG", default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Signal server base URL, e.g. http://127.0.0.1:8000
    #[arg(long)]
    server_url: Option<String>,

    /// Hand signals to a worker task through a bounded queue of this size
    #[arg(long)]
    queue_capacity: Option<usize>,
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let mut config = load_config(Some(&args.config))?;
    apply_flat_env(&mut config, load_from_env()?.feed);
    if let Some(url) = args.server_url {
        config.feed.server_url = url;
    }
    if args.queue_capacity.is_some() {
        config.settings.queue_capacity = args.queue_capacity;
    }

    let level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.settings.log_level);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(level))
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting signal_feed");
    info!("Configuration file: {}", args.config);
    info!("Signal server: {}", config.feed.server_url);

    let mut controller = FeedController::from_config(&config)?;

    let running = controller.running_flag();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal, cleaning up...");
                running.stop();
            }
            Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
        }
    });

    let reason = match config.settings.queue_capacity {
        Some(capacity) => {
            let (mut consumer, worker) = queued(capacity, LoggingConsumer);
            let reason = controller.listen(&mut consumer).await;
            drop(consumer);
            if let Err(e) = worker.await {
                warn!("Consumer worker ended abnormally: {}", e);
            }
            reason
        }
        None => controller.listen(&mut LoggingConsumer).await,
    };

    controller.shutdown().await;

    let stats = controller.dispatch_stats();
    info!(
        delivered = stats.delivered,
        malformed = stats.malformed,
        consumer_failures = stats.consumer_failures,
        "Signal feed stopped: {}",
        reason
    );

    if reason.is_fatal() {
        error!("Client stopped on a fatal error: {}", reason);
        anyhow::bail!("client stopped: {}", reason);
    }
    Ok(())
}
