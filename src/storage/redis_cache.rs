use crate::error::{MirrorError, MirrorResult};
use crate::fab::leaderboard::{Country, LeaderboardEntry, Rank};
use crate::storage::LeaderboardStore;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

const CONNECT_MAX_RETRIES: u32 = 5;

/// One Redis hash per country code: field = player name, value = rank as decimal text.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> MirrorResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| MirrorError::Config(format!("Invalid cache url '{url}'. {e}")))?;

        let mut attempt = 0;
        loop {
            match ConnectionManager::new(client.clone()).await {
                Ok(connection) => {
                    info!("Connected to Redis");
                    return Ok(RedisCache { connection });
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= CONNECT_MAX_RETRIES {
                        return Err(MirrorError::Cache(format!(
                            "Failed to connect to Redis after {} attempts: {}",
                            CONNECT_MAX_RETRIES, e
                        )));
                    }
                    warn!("Redis connection attempt {} failed: {}. Retrying...", attempt, e);
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                }
            }
        }
    }
}

fn parse_rank(country: &Country, name: &str, raw: &str) -> Option<Rank> {
    match raw.parse::<Rank>() {
        Ok(rank) => Some(rank),
        Err(_) => {
            warn!("Ignoring cached rank '{raw}' for {name} in {country}");
            None
        }
    }
}

#[async_trait]
impl LeaderboardStore for RedisCache {
    async fn get_all(&self, country: &Country) -> MirrorResult<HashMap<String, Rank>> {
        let mut conn = self.connection.clone();
        let raw: HashMap<String, String> = conn.hgetall(country.as_str()).await?;
        Ok(raw
            .into_iter()
            .filter_map(|(name, rank)| parse_rank(country, &name, &rank).map(|rank| (name, rank)))
            .collect())
    }

    async fn get(&self, country: &Country, name: &str) -> MirrorResult<Option<Rank>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.hget(country.as_str(), name).await?;
        Ok(raw.and_then(|rank| parse_rank(country, name, &rank)))
    }

    async fn set_many(&self, country: &Country, entries: &[LeaderboardEntry]) -> MirrorResult<()> {
        // HSET with no field/value pairs is a Redis error
        if entries.is_empty() {
            return Ok(());
        }
        let items = entries
            .iter()
            .map(|entry| (entry.name.as_str(), entry.rank.to_string()))
            .collect::<Vec<(&str, String)>>();

        let mut conn = self.connection.clone();
        conn.hset_multiple::<_, _, _, ()>(country.as_str(), &items)
            .await?;
        Ok(())
    }

    async fn is_empty(&self, country: &Country) -> MirrorResult<bool> {
        let mut conn = self.connection.clone();
        let len: usize = conn.hlen(country.as_str()).await?;
        Ok(len == 0)
    }
}
