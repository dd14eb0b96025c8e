use chrono::Duration;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Upstream resources exposed by the football data backend.
///
/// The kebab-case name doubles as the request key scope and as the last
/// segment of the request path.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum FeedEndpoint {
    Dashboard,
    LiveMatches,
    Fixtures,
    MatchDetails,
    Lineups,
    Standings,
    TeamStats,
    PlayerStats,
}

impl FeedEndpoint {
    /// Path of this resource relative to the backend base URL
    pub fn path(&self) -> String {
        format!("api/{}", self.as_ref())
    }

    /// How long a response may be cached downstream.
    ///
    /// Live data turns over within seconds, season aggregates barely move
    /// during a matchday.
    pub fn max_age(&self) -> Duration {
        let seconds = match self {
            FeedEndpoint::LiveMatches => 15,
            FeedEndpoint::MatchDetails => 30,
            FeedEndpoint::Dashboard => 60,
            FeedEndpoint::Lineups => 120,
            FeedEndpoint::Fixtures => 300,
            FeedEndpoint::Standings | FeedEndpoint::TeamStats | FeedEndpoint::PlayerStats => 600,
        };
        Duration::seconds(seconds)
    }

    /// `Cache-Control` value for responses of this resource
    pub fn cache_control(&self) -> String {
        format!("public, max-age={}", self.max_age().num_seconds())
    }
}
