use crate::{
    config::Settings,
    error::{MirrorError, MirrorResult},
    fab::leaderboard::{parse_listing, parse_live_rank, Country, LeaderboardEntry, Rank},
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::{fmt, future::Future, time::Duration};
use tracing::{debug, warn};

/// Upstream view of the leaderboard: one listing page at a time, or one player's live rank.
#[async_trait]
pub trait LeaderboardSource: Send + Sync {
    async fn fetch_page(&self, country: &Country, page: u32) -> MirrorResult<Vec<LeaderboardEntry>>;

    async fn fetch_live_rank(&self, country: &Country, name: &str) -> MirrorResult<Option<Rank>>;
}

enum Endpoint<'a> {
    Listing(&'a Country, u32),
    Search(&'a Country, &'a str, &'a str),
}

impl<'a> Endpoint<'a> {
    fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            Endpoint::Listing(country, page) => vec![
                ("country", country.to_string()),
                ("page", page.to_string()),
            ],
            Endpoint::Search(country, name, mode) => vec![
                ("query", name.to_string()),
                ("mode", mode.to_string()),
                ("country", country.to_string()),
            ],
        }
    }
}

impl<'a> fmt::Display for Endpoint<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Endpoint::Listing(country, page) => write!(f, "listing {} page {}", country, page),
            Endpoint::Search(country, name, _) => write!(f, "search '{}' in {}", name, country),
        }
    }
}

pub struct FabClient {
    http_client: Client,
    leaderboard_url: String,
    ranking_mode: String,
    retry: RetryPolicy,
}

impl FabClient {
    pub fn new(settings: &Settings) -> MirrorResult<Self> {
        let http_client = Client::builder()
            .timeout(settings.http_timeout())
            .build()
            .map_err(|e| MirrorError::Config(format!("Could not build HTTP client. {e}")))?;
        Ok(Self {
            http_client,
            leaderboard_url: format!(
                "{}{}",
                settings.base_url.trim_end_matches('/'),
                settings.leaderboard_path
            ),
            ranking_mode: settings.ranking_mode.clone(),
            retry: RetryPolicy {
                max_retries: settings.fetch_max_retries,
                base_backoff: settings.fetch_retry_backoff(),
            },
        })
    }

    async fn get(&self, endpoint: &Endpoint<'_>) -> MirrorResult<String> {
        self.retry
            .run(&endpoint.to_string(), || self.get_once(endpoint))
            .await
    }

    async fn get_once(&self, endpoint: &Endpoint<'_>) -> MirrorResult<String> {
        let request = self
            .http_client
            .get(&self.leaderboard_url)
            .query(&endpoint.query());
        debug!("Requesting {endpoint}");
        let response = request.send().await?;

        check_status(response.status(), endpoint)?;
        Ok(response.text().await?)
    }
}

fn check_status(status: StatusCode, endpoint: &Endpoint<'_>) -> MirrorResult<()> {
    match status {
        StatusCode::OK => Ok(()),
        status => Err(MirrorError::Fetch(format!("{} for {}", status, endpoint))),
    }
}

/// Bounded retries for transient errors, with exponential backoff capped at `MAX_BACKOFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

    /// Delay before retry number `attempt + 1`: `base * 2^attempt`, never above `MAX_BACKOFF`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_backoff
            .saturating_mul(factor)
            .min(Self::MAX_BACKOFF)
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or retries run out.
    pub async fn run<T, Op, Fut>(&self, label: &str, mut op: Op) -> MirrorResult<T>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = MirrorResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let backoff = self.backoff(attempt);
                    attempt += 1;
                    warn!(
                        "Request for {label} failed (attempt {attempt}). {e}. Retrying in {:?}",
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl LeaderboardSource for FabClient {
    async fn fetch_page(
        &self,
        country: &Country,
        page: u32,
    ) -> MirrorResult<Vec<LeaderboardEntry>> {
        let endpoint = Endpoint::Listing(country, page);
        let resp = self.get(&endpoint).await?;
        parse_listing(&resp, country)
    }

    async fn fetch_live_rank(&self, country: &Country, name: &str) -> MirrorResult<Option<Rank>> {
        let endpoint = Endpoint::Search(country, name, &self.ranking_mode);
        let resp = self.get(&endpoint).await?;
        parse_live_rank(&resp, country, name)
    }
}
