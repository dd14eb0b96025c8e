use crate::{endpoint::FeedEndpoint, error::FeedError, UpstreamFetcher};
use async_trait::async_trait;
use serde_json::Value;
use surf::{middleware::Logger, Client, Url};

/// Fetches feed resources from the football data backend over HTTP
#[derive(Clone, Debug)]
pub struct SurfFetcher {
    http: Client,
    base_url: Url,
}

impl SurfFetcher {
    /// `base_url` should end with a slash, endpoint paths are joined onto it
    pub fn new(base_url: &str) -> Result<Self, FeedError> {
        let base_url = Url::parse(base_url).map_err(|e| FeedError::InvalidUrl {
            url: base_url.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            http: Client::new().with(Logger::new()),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn endpoint_url(
        &self,
        endpoint: FeedEndpoint,
        params: &[(String, String)],
    ) -> Result<Url, FeedError> {
        let mut url = self
            .base_url
            .join(&endpoint.path())
            .map_err(|e| FeedError::InvalidUrl {
                url: format!("{}{}", self.base_url, endpoint.path()),
                message: e.to_string(),
            })?;

        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }
}

#[async_trait]
impl UpstreamFetcher for SurfFetcher {
    async fn fetch(
        &self,
        endpoint: FeedEndpoint,
        params: &[(String, String)],
    ) -> Result<Value, FeedError> {
        let url = self.endpoint_url(endpoint, params)?;
        log::debug!("Fetching {} from {}", endpoint, url);

        let mut response = self
            .http
            .get(url.as_str())
            .await
            .map_err(|e| FeedError::Http {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            log::warn!("Upstream answered {} for {}", status, url);
            return Err(FeedError::Status {
                url: url.to_string(),
                status: u16::from(status),
            });
        }

        let body = response.body_string().await.map_err(|e| FeedError::Http {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        serde_json::from_str(&body).map_err(|e| FeedError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}
