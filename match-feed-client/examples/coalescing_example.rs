use async_trait::async_trait;
use futures::future::join_all;
use match_feed_client::{FeedEndpoint, FeedError, MatchFeedClient, UpstreamFetcher};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Stand-in for the football backend: slow, and counts its calls
#[derive(Clone, Default)]
struct SlowBackend {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl UpstreamFetcher for SlowBackend {
    async fn fetch(
        &self,
        endpoint: FeedEndpoint,
        params: &[(String, String)],
    ) -> Result<Value, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(250)).await;
        Ok(json!({ "endpoint": endpoint.to_string(), "params": params }))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let backend = SlowBackend::default();
    let calls = backend.calls.clone();
    let client = MatchFeedClient::new(backend);

    // Example 1: many widgets asking for the same dashboard at once
    println!("=== Concurrent dashboard requests ===");
    let start = std::time::Instant::now();
    let requests = (0..10).map(|_| client.dashboard("America/Sao_Paulo"));
    let results = join_all(requests).await;
    println!("10 requests took: {:?}", start.elapsed());
    println!("Upstream calls: {}", calls.load(Ordering::SeqCst));
    println!("Failures: {}", results.iter().filter(|r| r.is_err()).count());
    println!("Stats: {:?}", client.dedup_stats());

    // Example 2: once settled, the next request goes upstream again
    println!("\n=== Request after settlement ===");
    client.dashboard("America/Sao_Paulo").await?;
    println!("Upstream calls: {}", calls.load(Ordering::SeqCst));

    // Example 3: different queries are never merged
    println!("\n=== Distinct queries ===");
    let (today, tomorrow) = tokio::join!(
        client.fixtures("2026-06-11", "UTC"),
        client.fixtures("2026-06-12", "UTC"),
    );
    today?;
    tomorrow?;
    println!("Upstream calls: {}", calls.load(Ordering::SeqCst));
    println!(
        "Suggested Cache-Control for fixtures: {}",
        FeedEndpoint::Fixtures.cache_control()
    );

    Ok(())
}
