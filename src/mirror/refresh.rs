use crate::fab::client::LeaderboardSource;
use crate::fab::leaderboard::Country;
use crate::storage::LeaderboardStore;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Number of listing pages scraped per country.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDepths {
    default: u32,
    overrides: HashMap<Country, u32>,
}

impl PageDepths {
    pub fn new(default: u32, overrides: HashMap<Country, u32>) -> Self {
        PageDepths { default, overrides }
    }

    pub fn depth_of(&self, country: &Country) -> u32 {
        self.overrides.get(country).copied().unwrap_or(self.default)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountryRefresh {
    pub pages_fetched: u32,
    pub pages_failed: u32,
    pub entries_written: usize,
    // a cache write failed and the remaining pages were not scraped
    pub aborted: bool,
}

#[derive(Debug, Clone)]
pub struct RefreshReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub countries: Vec<(Country, CountryRefresh)>,
}

impl RefreshReport {
    pub fn entries_written(&self) -> usize {
        self.countries.iter().map(|(_, r)| r.entries_written).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.countries
            .iter()
            .all(|(_, r)| !r.aborted && r.pages_failed == 0)
    }

    pub fn for_country(&self, country: &Country) -> Option<&CountryRefresh> {
        self.countries
            .iter()
            .find(|(c, _)| c == country)
            .map(|(_, r)| r)
    }
}

/// Full scrape of every configured country into the store. Not atomic: whatever
/// pages were written before a failure stay written.
pub struct Refresher<S, F> {
    store: Arc<S>,
    source: Arc<F>,
    depths: PageDepths,
}

impl<S, F> Refresher<S, F>
where
    S: LeaderboardStore,
    F: LeaderboardSource,
{
    pub fn new(store: Arc<S>, source: Arc<F>, depths: PageDepths) -> Self {
        Refresher {
            store,
            source,
            depths,
        }
    }

    pub async fn refresh_all(&self, countries: &[Country]) -> RefreshReport {
        let started_at = Utc::now();
        let mut results = Vec::with_capacity(countries.len());
        for country in countries {
            let result = self.refresh_country(country).await;
            results.push((country.clone(), result));
        }
        let report = RefreshReport {
            started_at,
            finished_at: Utc::now(),
            countries: results,
        };
        info!(
            "Refresh finished in {}s, {} entries written",
            (report.finished_at - report.started_at).num_seconds(),
            report.entries_written()
        );
        report
    }

    pub async fn refresh_country(&self, country: &Country) -> CountryRefresh {
        let depth = self.depths.depth_of(country);
        let mut result = CountryRefresh::default();
        info!("Scraping {depth} pages for {country}");

        for page in 1..=depth {
            let entries = match self.source.fetch_page(country, page).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Skipping page {page} of {country}. {e}");
                    result.pages_failed += 1;
                    continue;
                }
            };
            result.pages_fetched += 1;

            if let Err(e) = self.store.set_many(country, &entries).await {
                error!("Could not cache page {page} of {country}, abandoning {country} for this pass. {e}");
                result.aborted = true;
                break;
            }
            result.entries_written += entries.len();
        }

        info!(
            "Caching complete for {country}: {} pages, {} entries",
            result.pages_fetched, result.entries_written
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fab::leaderboard::Rank;
    use crate::mirror::testing::{entry, BrokenStore, ScriptedSource};
    use crate::storage::MemoryCache;

    fn depths(default: u32, overrides: &[(&str, u32)]) -> PageDepths {
        PageDepths::new(
            default,
            overrides
                .iter()
                .map(|(c, d)| (Country::from(*c), *d))
                .collect(),
        )
    }

    fn ranks(pairs: &[(&str, Rank)]) -> HashMap<String, Rank> {
        pairs.iter().map(|(n, r)| (n.to_string(), *r)).collect()
    }

    #[test]
    fn overrides_take_precedence_over_default() {
        let depths = depths(3, &[("US", 12)]);
        assert_eq!(depths.depth_of(&Country::from("US")), 12);
        assert_eq!(depths.depth_of(&Country::from("GB")), 3);
    }

    #[tokio::test]
    async fn pages_are_merged_and_later_pages_win() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_page("GB", 1, vec![entry("GB", "Carol", 1), entry("GB", "Dan", 2)])
                .with_page("GB", 2, vec![entry("GB", "Dan", 3), entry("GB", "Eve", 4)]),
        );
        let store = Arc::new(MemoryCache::new());
        let refresher = Refresher::new(store.clone(), source.clone(), depths(2, &[]));

        let report = refresher.refresh_all(&[Country::from("GB")]).await;

        assert!(report.is_complete());
        assert_eq!(
            store.get_all(&Country::from("GB")).await.unwrap(),
            ranks(&[("Carol", 1), ("Dan", 3), ("Eve", 4)])
        );
        assert_eq!(source.page_calls(), 2);
    }

    #[tokio::test]
    async fn repeated_refresh_is_idempotent() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_page("GB", 1, vec![entry("GB", "Carol", 1)])
                .with_page("US", 1, vec![entry("US", "Sam", 1)])
                .with_page("US", 2, vec![entry("US", "Tia", 51)]),
        );
        let store = Arc::new(MemoryCache::new());
        let refresher = Refresher::new(store.clone(), source, depths(1, &[("US", 2)]));
        let countries = [Country::from("GB"), Country::from("US")];

        refresher.refresh_all(&countries).await;
        let first = store.data.lock().unwrap().clone();
        refresher.refresh_all(&countries).await;
        let second = store.data.lock().unwrap().clone();

        assert_eq!(first, second);
        assert_eq!(second[&Country::from("US")].len(), 2);
    }

    #[tokio::test]
    async fn failed_page_is_skipped_and_old_entries_kept() {
        // page 2 is not scripted and fails
        let source = Arc::new(
            ScriptedSource::new()
                .with_page("GB", 1, vec![entry("GB", "Carol", 1)])
                .with_page("GB", 3, vec![entry("GB", "Zed", 101)]),
        );
        let store = Arc::new(MemoryCache::new());
        store
            .set_many(&Country::from("GB"), &[entry("GB", "Old", 60)])
            .await
            .unwrap();
        let refresher = Refresher::new(store.clone(), source.clone(), depths(3, &[]));

        let report = refresher.refresh_all(&[Country::from("GB")]).await;

        let gb = report.for_country(&Country::from("GB")).unwrap();
        assert_eq!(gb.pages_fetched, 2);
        assert_eq!(gb.pages_failed, 1);
        assert!(!report.is_complete());
        assert_eq!(source.page_calls(), 3);
        assert_eq!(
            store.get_all(&Country::from("GB")).await.unwrap(),
            ranks(&[("Carol", 1), ("Old", 60), ("Zed", 101)])
        );
    }

    #[tokio::test]
    async fn write_failure_abandons_only_that_country() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_page("GB", 1, vec![entry("GB", "Carol", 1)])
                .with_page("GB", 2, vec![entry("GB", "Dan", 51)])
                .with_page("US", 1, vec![entry("US", "Sam", 1)])
                .with_page("US", 2, vec![entry("US", "Tia", 51)]),
        );
        let inner = MemoryCache::new();
        let store = Arc::new(BrokenStore {
            reads_fail: false,
            writes_fail_for: Some(Country::from("GB")),
            inner: inner.clone(),
        });
        let refresher = Refresher::new(store, source.clone(), depths(2, &[]));

        let report = refresher
            .refresh_all(&[Country::from("GB"), Country::from("US")])
            .await;

        let gb = report.for_country(&Country::from("GB")).unwrap();
        assert!(gb.aborted);
        assert_eq!(gb.pages_fetched, 1);
        // GB stopped after its first page, US still ran both
        assert_eq!(source.page_calls(), 3);
        assert_eq!(
            inner.get_all(&Country::from("US")).await.unwrap(),
            ranks(&[("Sam", 1), ("Tia", 51)])
        );
        assert!(inner.is_empty(&Country::from("GB")).await.unwrap());
    }
}
