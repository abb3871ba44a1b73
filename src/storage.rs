use crate::error::{MirrorError, MirrorResult};
use crate::fab::leaderboard::{Country, LeaderboardEntry, Rank};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub mod redis_cache;

pub use redis_cache::RedisCache;

/// Cached name => rank tables, one per country.
///
/// Writes are upserts: a name absent from a write keeps whatever rank it had before, so a
/// partial scrape never shrinks a country's table.
#[async_trait]
pub trait LeaderboardStore: Send + Sync {
    /// Full snapshot for `country`, empty if the country was never written.
    async fn get_all(&self, country: &Country) -> MirrorResult<HashMap<String, Rank>>;

    async fn get(&self, country: &Country, name: &str) -> MirrorResult<Option<Rank>>;

    async fn set_many(&self, country: &Country, entries: &[LeaderboardEntry]) -> MirrorResult<()>;

    async fn is_empty(&self, country: &Country) -> MirrorResult<bool>;
}

type Tables = HashMap<Country, HashMap<String, Rank>>;
type SharedTables = Arc<Mutex<Tables>>;

/// In-process store, mostly useful for tests and dry runs.
#[derive(Clone, Default)]
pub struct MemoryCache {
    pub data: SharedTables,
}

impl MemoryCache {
    pub fn new() -> MemoryCache {
        MemoryCache {
            data: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn tables(&self) -> MirrorResult<MutexGuard<'_, Tables>> {
        self.data
            .lock()
            .map_err(|_| MirrorError::Cache("memory cache lock poisoned".to_string()))
    }
}

#[async_trait]
impl LeaderboardStore for MemoryCache {
    async fn get_all(&self, country: &Country) -> MirrorResult<HashMap<String, Rank>> {
        Ok(self.tables()?.get(country).cloned().unwrap_or_default())
    }

    async fn get(&self, country: &Country, name: &str) -> MirrorResult<Option<Rank>> {
        Ok(self
            .tables()?
            .get(country)
            .and_then(|table| table.get(name).copied()))
    }

    async fn set_many(&self, country: &Country, entries: &[LeaderboardEntry]) -> MirrorResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut tables = self.tables()?;
        let table = tables.entry(country.clone()).or_default();
        for entry in entries {
            table.insert(entry.name.clone(), entry.rank);
        }
        Ok(())
    }

    async fn is_empty(&self, country: &Country) -> MirrorResult<bool> {
        Ok(self
            .tables()?
            .get(country)
            .map_or(true, |table| table.is_empty()))
    }
}
