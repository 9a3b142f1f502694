use std::sync::Arc;

use clap::Parser;
use guardia_monitor::api::{self, ApiState};
use guardia_monitor::cleaner::Cleaner;
use guardia_monitor::config::{read_config_file, Config};
use guardia_monitor::id::CompactIdGenerator;
use guardia_monitor::notification::NotificationEngine;
use guardia_monitor::recorder::Recorder;
use guardia_monitor::repository::sqlite::SqliteRepository;
use guardia_monitor::repository::MonitorRepository;
use guardia_monitor::scheduler::SchedulerHandle;
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long = "config")]
    file: String,
}

fn init_logging() {
    let filter = filter::Targets::new().with_targets(vec![
        ("guardia_monitor", LevelFilter::TRACE),
        ("guardia_hub", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_logging();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;
    if let Err(e) = config.validate() {
        error!("invalid configuration: {e}");
        return Err(anyhow::anyhow!("configuration validation failed: {e}"));
    }

    run(config).await
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!("opening repository at {}", config.database_path);
    let repository: Arc<dyn MonitorRepository> =
        Arc::new(SqliteRepository::new(&config.database_path).await?);

    let recorder = Arc::new(Recorder::new(
        Arc::clone(&repository),
        Arc::new(CompactIdGenerator::new()),
    ));
    let notifier = Arc::new(NotificationEngine::new(Arc::clone(&repository)));
    let scheduler = Arc::new(SchedulerHandle::new(Arc::clone(&repository), notifier));

    info!("starting scheduler");
    scheduler.start().await;

    let cleaner = Cleaner::new(
        Arc::clone(&repository),
        std::time::Duration::from_secs(config.cleanup_interval_hours * 3600),
        config.retention_days,
    )
    .spawn();

    let api_state = ApiState::new(Arc::clone(&repository), recorder);
    let api_addr = api::spawn(config.bind_addr, api_state).await?;
    info!("push/health API listening on http://{api_addr}");

    info!("press Ctrl+C to shutdown gracefully");
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal, stopping"),
        Err(err) => error!("unable to listen for shutdown signal: {err}"),
    }

    scheduler.stop();
    cleaner.stop().await;

    info!("shutdown complete");
    Ok(())
}
