use crate::models::Rate;
use anyhow::{Context, Result};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

const RATE_LIMIT_RPM: u32 = 60;
const MAX_RETRIES: u32 = 3;
/// Quote endpoint accepts at most this many markets per call.
const CHUNK: usize = 5;

// Type alias for the rate limiter to simplify signatures
type FeedRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Source of live quotes for a set of markets.
pub trait MarketFeed: Send + Sync {
    fn rates(
        &self,
        markets: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<Rate>>> + Send;
}

/// Wire form of one quoted market.
#[derive(Debug, Deserialize)]
struct QuoteEntry {
    /// Unix seconds.
    last_updated: i64,
    ask: f64,
    bid: f64,
}

/// REST quote client with rate limiting and retry.
///
/// Cloneable for sharing across tasks; clones share the rate limiter.
#[derive(Clone)]
pub struct RestFeed {
    client: Client,
    base_url: String,
    api_key: String,
    rate_limiter: Arc<FeedRateLimiter>,
}

impl RestFeed {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap());
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Make a rate-limited API request with retry logic
    async fn make_request(&self, url: &str) -> Result<reqwest::Response> {
        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            match self
                .client
                .get(url)
                .bearer_auth(&self.api_key)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let backoff_secs = 2u64.pow(attempt);
                        tracing::warn!(
                            "Feed returned {}, backing off for {}s (attempt {}/{})",
                            status,
                            backoff_secs,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                        continue;
                    }

                    // Other errors (4xx) - don't retry
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    anyhow::bail!("Feed API error ({}): {}", status, error_text);
                }
                Err(e) if attempt < MAX_RETRIES => {
                    let backoff_secs = 2u64.pow(attempt);
                    tracing::warn!(
                        "Network error: {}, retrying in {}s (attempt {}/{})",
                        e,
                        backoff_secs,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                }
                Err(e) => anyhow::bail!("Network error after {} retries: {}", MAX_RETRIES, e),
            }
        }

        anyhow::bail!("Failed after {} retries", MAX_RETRIES)
    }
}

impl MarketFeed for RestFeed {
    /// Fetch current quotes, batching markets into chunks the endpoint
    /// accepts.
    async fn rates(&self, markets: &[String]) -> Result<Vec<Rate>> {
        let mut result = Vec::with_capacity(markets.len());

        for chunk in markets.chunks(CHUNK) {
            let url = format!("{}/price/{}", self.base_url, chunk.join(","));
            let response = self.make_request(&url).await?;
            let quotes: HashMap<String, QuoteEntry> =
                response.json().await.context("Failed to parse quotes")?;

            for (market, quote) in quotes {
                result.push(Rate::new(
                    market,
                    quote.last_updated * 1000,
                    quote.ask,
                    quote.bid,
                ));
            }
        }

        tracing::debug!("Fetched {} quotes for {} markets", result.len(), markets.len());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rates_parses_quote_map() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/price/EUR_USD,BTC_USD")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "EUR_USD": {"last_updated": 1700000000, "ask": 1.0932, "bid": 1.0930},
                    "BTC_USD": {"last_updated": 1700000001, "ask": 37012.5, "bid": 37008.0}
                }"#,
            )
            .create_async()
            .await;

        let feed = RestFeed::new(server.url(), "test-key").unwrap();
        let mut rates = feed
            .rates(&["EUR_USD".to_string(), "BTC_USD".to_string()])
            .await
            .unwrap();
        rates.sort_by(|a, b| a.market.cmp(&b.market));

        mock.assert_async().await;
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].market, "BTC_USD");
        assert_eq!(rates[0].time, 1_700_000_001_000);
        assert_eq!(rates[1].ask, 1.0932);
        assert_eq!(rates[1].bid, 1.0930);
    }

    #[tokio::test]
    async fn test_rates_rejects_client_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/price/EUR_USD")
            .with_status(401)
            .with_body("bad token")
            .create_async()
            .await;

        let feed = RestFeed::new(server.url(), "wrong-key").unwrap();
        let result = feed.rates(&["EUR_USD".to_string()]).await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_empty_market_list_makes_no_calls() {
        let feed = RestFeed::new("http://localhost:1", "key").unwrap();
        let rates = feed.rates(&[]).await.unwrap();
        assert!(rates.is_empty());
    }
}
