pub mod config;
pub mod deduplication;
pub mod endpoint;
mod error;
pub mod request_key;
mod surf_fetcher;


use async_trait::async_trait;
use getset::Getters;
use serde_json::Value;
use std::sync::Arc;

pub use config::{DeduplicationConfig, FeedConfig};
pub use deduplication::{
    DeduplicationError, DeduplicationResult, DeduplicationStats, ExecuteOptions, PendingRequest,
    RequestDeduplicator,
};
pub use endpoint::FeedEndpoint;
pub use error::FeedError;
pub use request_key::RequestKey;
pub use surf_fetcher::SurfFetcher;

/// Decoded upstream payload, shared between coalesced callers
pub type FeedResponse = Arc<Value>;

pub type FeedDeduplicator = RequestDeduplicator<FeedResponse, FeedError>;

/// Source of football data the client forwards requests to
#[async_trait]
pub trait UpstreamFetcher: Send + Sync + 'static {
    async fn fetch(
        &self,
        endpoint: FeedEndpoint,
        params: &[(String, String)],
    ) -> Result<Value, FeedError>;
}

/// Client for the football data backend.
///
/// Concurrent requests for the same endpoint and query are coalesced into a
/// single upstream call.
#[derive(Clone, Getters)]
pub struct MatchFeedClient {
    fetcher: Arc<dyn UpstreamFetcher>,
    #[get = "pub"]
    deduplicator: FeedDeduplicator,
}

impl MatchFeedClient {
    /// Create a new MatchFeedClient with default deduplication settings
    pub fn new(fetcher: impl UpstreamFetcher) -> Self {
        Self::with_config(fetcher, DeduplicationConfig::default())
    }

    pub fn with_config(fetcher: impl UpstreamFetcher, config: DeduplicationConfig) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            deduplicator: RequestDeduplicator::new(config),
        }
    }

    /// Create a client talking HTTP to the configured backend
    pub fn from_config(config: &FeedConfig) -> Result<Self, FeedError> {
        let fetcher = SurfFetcher::new(&config.backend_url)?;
        log::info!(
            "Initialized MatchFeedClient for {} (deduplication timeout: {}ms)",
            config.backend_url,
            config.deduplication.timeout_ms
        );
        Ok(Self::with_config(fetcher, config.deduplication.clone()))
    }

    /// Fetch `endpoint`, sharing the upstream call with identical requests in flight
    pub async fn fetch(
        &self,
        endpoint: FeedEndpoint,
        params: &[(&str, &str)],
    ) -> Result<FeedResponse, FeedError> {
        let key = RequestKey::for_endpoint(endpoint, params);
        let params: Vec<(String, String)> = params
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        let fetcher = Arc::clone(&self.fetcher);

        let response = self
            .deduplicator
            .execute(
                key,
                move || async move { fetcher.fetch(endpoint, &params).await.map(Arc::new) },
                ExecuteOptions::default(),
            )
            .await?;

        Ok(response)
    }

    pub async fn dashboard(&self, timezone: &str) -> Result<FeedResponse, FeedError> {
        self.fetch(FeedEndpoint::Dashboard, &[("timezone", timezone)])
            .await
    }

    pub async fn live_matches(&self, timezone: &str) -> Result<FeedResponse, FeedError> {
        self.fetch(FeedEndpoint::LiveMatches, &[("timezone", timezone)])
            .await
    }

    pub async fn fixtures(&self, date: &str, timezone: &str) -> Result<FeedResponse, FeedError> {
        self.fetch(
            FeedEndpoint::Fixtures,
            &[("date", date), ("timezone", timezone)],
        )
        .await
    }

    pub async fn standings(&self, league: u32, season: u16) -> Result<FeedResponse, FeedError> {
        let league = league.to_string();
        let season = season.to_string();
        self.fetch(
            FeedEndpoint::Standings,
            &[("league", league.as_str()), ("season", season.as_str())],
        )
        .await
    }

    pub async fn match_details(&self, fixture_id: u64) -> Result<FeedResponse, FeedError> {
        let fixture_id = fixture_id.to_string();
        self.fetch(FeedEndpoint::MatchDetails, &[("fixture", fixture_id.as_str())])
            .await
    }

    /// Get deduplication statistics
    pub fn dedup_stats(&self) -> DeduplicationStats {
        self.deduplicator.stats()
    }

    /// Forget requests in flight (they keep running upstream)
    pub fn clear_pending(&self) {
        self.deduplicator.clear_all();
    }
}
