use lss_mirror::cli::Cli;
use lss_mirror::config::Settings;
use lss_mirror::fab::client::FabClient;
use lss_mirror::scheduler::{JobProcess, Scheduler, Watcher};
use lss_mirror::storage::RedisCache;

use clap::Parser;
use itertools::Itertools;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Bad or missing configuration is fatal.
    let settings = Settings::load(&Cli::parse())?;

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(settings.get_trace_level()).into())
        .from_env_lossy();
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Setting default subscriber failed");

    info!(
        "Mirroring leaderboards for {}",
        settings.countries.iter().join(", ")
    );

    let source = Arc::new(FabClient::new(&settings)?);
    let store = Arc::new(RedisCache::connect(&settings.cache_url).await?);
    let watcher = Arc::new(Watcher::new(
        store,
        source,
        settings.page_depths(),
        settings.watch_config(),
    ));

    let mut sched = Scheduler::new(watcher).await?;

    let jobs = vec![
        JobProcess::Bootstrap, // only ran once, at startup.
        JobProcess::WatchLeaderboard(settings.refresh_interval()),
    ];
    for job in jobs {
        sched.add_job(job).await?;
    }

    info!("Starting scheduler.");
    sched.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down.");
    sched.shutdown().await?;

    Ok(())
}
