use tokio_cron_scheduler::{Job, JobScheduler};

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{error, info, warn};

use std::sync::Arc;

use crate::error::MirrorResult;
use crate::fab::client::LeaderboardSource;
use crate::fab::leaderboard::Country;
use crate::mirror::probe::StalenessProbe;
use crate::mirror::refresh::{PageDepths, RefreshReport, Refresher};
use crate::storage::LeaderboardStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum WatchState {
    Bootstrap,
    Idle,
    Refreshing,
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub countries: Vec<Country>,
    // country whose cached table is sampled to detect upstream changes
    pub probe_country: Country,
    pub sample_size: usize,
}

#[derive(Debug)]
pub enum TickOutcome {
    Refreshed(RefreshReport),
    UpToDate,
    // another bootstrap or tick is still running
    Busy,
}

/// Decides when the mirror gets refreshed. Only one bootstrap or tick runs at a time;
/// a tick that finds one in progress is dropped.
pub struct Watcher<S, F> {
    store: Arc<S>,
    probe: StalenessProbe<S, F>,
    refresher: Refresher<S, F>,
    config: WatchConfig,
    state: Mutex<WatchState>,
    running: tokio::sync::Mutex<()>,
}

impl<S, F> Watcher<S, F>
where
    S: LeaderboardStore,
    F: LeaderboardSource,
{
    pub fn new(store: Arc<S>, source: Arc<F>, depths: PageDepths, config: WatchConfig) -> Self {
        Watcher {
            probe: StalenessProbe::new(store.clone(), source.clone()),
            refresher: Refresher::new(store.clone(), source, depths),
            store,
            config,
            state: Mutex::new(WatchState::Bootstrap),
            running: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> WatchState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: WatchState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Initial scrape when nothing at all is cached yet. The staleness probe is not consulted.
    pub async fn bootstrap(&self) -> Option<RefreshReport> {
        let _running = self.running.lock().await;

        if self.all_countries_empty().await {
            info!("Cache is empty, bootstrapping all leaderboards");
            Some(self.refresh().await)
        } else {
            info!("Cached leaderboards found, skipping bootstrap scrape");
            self.set_state(WatchState::Idle);
            None
        }
    }

    pub async fn tick(&self) -> TickOutcome {
        let _running = match self.running.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!("Previous run still in progress ({}), skipping tick", self.state());
                return TickOutcome::Busy;
            }
        };
        if self.state() != WatchState::Idle {
            info!("Watcher is in {} state, skipping tick", self.state());
            return TickOutcome::Busy;
        }

        if self.any_country_empty().await
            || self
                .probe
                .is_stale(&self.config.probe_country, self.config.sample_size)
                .await
        {
            TickOutcome::Refreshed(self.refresh().await)
        } else {
            info!("Not time to update");
            TickOutcome::UpToDate
        }
    }

    async fn refresh(&self) -> RefreshReport {
        self.set_state(WatchState::Refreshing);
        let report = self.refresher.refresh_all(&self.config.countries).await;
        self.set_state(WatchState::Idle);
        report
    }

    // Cache errors count as "not empty": an unreachable cache must not trigger scrapes.
    async fn all_countries_empty(&self) -> bool {
        for country in &self.config.countries {
            match self.store.is_empty(country).await {
                Ok(true) => continue,
                Ok(false) => return false,
                Err(e) => {
                    warn!("Could not check cache for {country}. {e}");
                    return false;
                }
            }
        }
        true
    }

    async fn any_country_empty(&self) -> bool {
        for country in &self.config.countries {
            match self.store.is_empty(country).await {
                Ok(true) => {
                    info!("No cached leaderboard for {country}");
                    return true;
                }
                Ok(false) => {}
                Err(e) => warn!("Could not check cache for {country}. {e}"),
            }
        }
        false
    }
}

pub struct Scheduler<S, F> {
    scheduler: JobScheduler,
    watcher: Arc<Watcher<S, F>>,
}

pub enum JobProcess {
    Bootstrap,
    WatchLeaderboard(Duration),
}

impl<S, F> Scheduler<S, F>
where
    S: LeaderboardStore + 'static,
    F: LeaderboardSource + 'static,
{
    pub async fn new(watcher: Arc<Watcher<S, F>>) -> MirrorResult<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Scheduler { scheduler, watcher })
    }

    pub async fn add_job(&self, job_process: JobProcess) -> MirrorResult<uuid::Uuid> {
        let job = match job_process {
            JobProcess::Bootstrap => bootstrap_job(self.watcher.clone())?,
            JobProcess::WatchLeaderboard(interval) => {
                watch_leaderboard_job(interval, self.watcher.clone())?
            }
        };
        Ok(self.scheduler.add(job).await?)
    }

    pub async fn start(&self) -> MirrorResult<()> {
        Ok(self.scheduler.start().await?)
    }

    pub async fn shutdown(&mut self) -> MirrorResult<()> {
        Ok(self.scheduler.shutdown().await?)
    }
}

//////////////////
// Jobs definition
//////////////////

fn bootstrap_job<S, F>(watcher: Arc<Watcher<S, F>>) -> MirrorResult<Job>
where
    S: LeaderboardStore + 'static,
    F: LeaderboardSource + 'static,
{
    let job = Job::new_one_shot_async(Duration::from_secs(0), move |_uuid, _l| {
        let watcher = watcher.clone();
        Box::pin(async move {
            if let Some(report) = watcher.bootstrap().await {
                if !report.is_complete() {
                    error!("Bootstrap scrape was incomplete, missing pages will be retried on the next refresh");
                }
            }
        })
    })?;
    Ok(job)
}

// Fires on a fixed cadence; a tick landing while a refresh is still running is dropped
// rather than queued, so slow refreshes do not shift later ticks.
fn watch_leaderboard_job<S, F>(interval: Duration, watcher: Arc<Watcher<S, F>>) -> MirrorResult<Job>
where
    S: LeaderboardStore + 'static,
    F: LeaderboardSource + 'static,
{
    let job = Job::new_repeated_async(interval, move |uuid, mut l| {
        let watcher = watcher.clone();
        Box::pin(async move {
            if let TickOutcome::Refreshed(report) = watcher.tick().await {
                info!(
                    "Leaderboards refreshed for {} countries",
                    report.countries.len()
                );
            }

            // Query the next execution time for this job
            let next_tick = l.next_tick_for_job(uuid).await;
            match next_tick {
                Ok(Some(ts)) => info!("Next leaderboard check at {:?}", ts),
                _ => warn!("Could not get next tick for leaderboard watch job"),
            }
        })
    })?;
    Ok(job)
}
