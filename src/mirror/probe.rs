use crate::fab::client::LeaderboardSource;
use crate::fab::leaderboard::{Country, Rank};
use crate::storage::LeaderboardStore;
use rand::{seq::index, Rng};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub name: String,
    pub cached: Rank,
    pub live: Rank,
}

/// What a probe looked at before reaching its verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub cached: usize,
    pub sampled: usize,
    pub fetched: usize,
    pub unresolved: usize,
    pub mismatch: Option<Mismatch>,
}

impl ProbeReport {
    pub fn is_stale(&self) -> bool {
        self.mismatch.is_some()
    }
}

/// Draws `size` distinct members of `population`, or all of them if it is smaller.
/// `None` when there is nothing to draw from.
pub fn draw_sample<'a, T, R>(population: &'a [T], size: usize, rng: &mut R) -> Option<Vec<&'a T>>
where
    R: Rng + ?Sized,
{
    if population.is_empty() {
        return None;
    }
    let amount = size.min(population.len());
    Some(
        index::sample(rng, population.len(), amount)
            .into_iter()
            .map(|idx| &population[idx])
            .collect(),
    )
}

/// Cheap upstream change detection: compares the live rank of a few cached players
/// against the cache, instead of scraping every page again.
pub struct StalenessProbe<S, F> {
    store: Arc<S>,
    source: Arc<F>,
}

impl<S, F> StalenessProbe<S, F>
where
    S: LeaderboardStore,
    F: LeaderboardSource,
{
    pub fn new(store: Arc<S>, source: Arc<F>) -> Self {
        StalenessProbe { store, source }
    }

    pub async fn is_stale(&self, country: &Country, sample_size: usize) -> bool {
        self.probe(country, sample_size).await.is_stale()
    }

    pub async fn probe(&self, country: &Country, sample_size: usize) -> ProbeReport {
        // An unreachable cache must not trigger a full refresh of every country.
        let snapshot = match self.store.get_all(country).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Could not read {country} leaderboard from cache, assuming up to date. {e}");
                return ProbeReport::default();
            }
        };

        let mut report = ProbeReport {
            cached: snapshot.len(),
            ..ProbeReport::default()
        };

        let names = snapshot.keys().cloned().collect::<Vec<String>>();
        let sample = {
            let mut rng = rand::thread_rng();
            match draw_sample(&names, sample_size, &mut rng) {
                Some(sample) => sample.into_iter().cloned().collect::<Vec<String>>(),
                None => {
                    debug!("Nothing cached for {country}, nothing to probe");
                    return report;
                }
            }
        };
        report.sampled = sample.len();

        for name in sample {
            // snapshot keys are exactly the sampled names
            let cached = snapshot[&name];
            report.fetched += 1;
            match self.source.fetch_live_rank(country, &name).await {
                Ok(Some(live)) if live != cached => {
                    info!("Rank of {name} in {country} moved from {cached} to {live}, cache needs updating");
                    report.mismatch = Some(Mismatch { name, cached, live });
                    return report;
                }
                Ok(Some(_)) => debug!("Live rank of {name} in {country} matches cache ({cached})"),
                Ok(None) => {
                    debug!("Live rank of {name} in {country} could not be resolved, skipping");
                    report.unresolved += 1;
                }
                Err(e) => {
                    warn!("Could not check live rank of {name} in {country}, skipping. {e}");
                    report.unresolved += 1;
                }
            }
        }

        report
    }
}
