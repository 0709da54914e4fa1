use crate::models::Rate;
use crate::Result;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{timeout, Duration};

/// Redis cache for raw quotes
///
/// Uses sorted sets with millisecond timestamps as scores so a restart can
/// rebuild the curves from recent history with a single range query.
pub struct RateCache {
    conn: ConnectionManager,
}

impl RateCache {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        // Add 5 second timeout to connection attempt
        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| "Redis connection timeout after 5 seconds")??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    fn key(market: &str) -> String {
        format!("rates:{}", market)
    }

    /// Save quotes to the market's sorted set
    pub async fn save_rates(&mut self, market: &str, rates: &[Rate]) -> Result<()> {
        let key = Self::key(market);

        for rate in rates {
            let value = serde_json::to_string(rate)?;
            self.conn
                .zadd::<_, _, _, ()>(&key, value, rate.time as f64)
                .await?;
        }

        tracing::debug!("Saved {} quotes for {} to Redis", rates.len(), market);

        Ok(())
    }

    /// Load recent quotes, oldest first
    ///
    /// # Arguments
    /// * `market` - Market symbol
    /// * `hours_back` - How many hours of history to load
    pub async fn load_rates(&mut self, market: &str, hours_back: u64) -> Result<Vec<Rate>> {
        let key = Self::key(market);

        let cutoff = Utc::now() - chrono::Duration::hours(hours_back as i64);
        let min_score = cutoff.timestamp_millis() as f64;

        let results: Vec<String> = self.conn.zrangebyscore(&key, min_score, "+inf").await?;

        let mut rates = Vec::with_capacity(results.len());
        for json_str in results {
            rates.push(serde_json::from_str(&json_str)?);
        }

        tracing::info!(
            "Loaded {} historical quotes for {} from Redis",
            rates.len(),
            market
        );

        Ok(rates)
    }

    /// Remove quotes older than the given horizon to prevent unbounded growth
    pub async fn cleanup_old(&mut self, market: &str, keep_hours: u64) -> Result<usize> {
        let key = Self::key(market);

        let cutoff = Utc::now() - chrono::Duration::hours(keep_hours as i64);
        let max_score = cutoff.timestamp_millis() as f64;

        let removed: usize = self.conn.zrembyscore(&key, "-inf", max_score).await?;

        if removed > 0 {
            tracing::debug!("Cleaned up {} old quotes for {}", removed, market);
        }

        Ok(removed)
    }

    /// Count of cached quotes for a market
    pub async fn count_rates(&mut self, market: &str) -> Result<usize> {
        let count: usize = self.conn.zcard(Self::key(market)).await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rate(market: &str, hours_ago: i64, ask: f64) -> Rate {
        let time = (Utc::now() - chrono::Duration::hours(hours_ago)).timestamp_millis();
        Rate::new(market, time, ask, ask - 0.5)
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_connection_timeout() {
        let result = RateCache::new("redis://192.0.2.1:6379").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_save_and_load_rates() {
        let mut cache = RateCache::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");

        let _ = cache.cleanup_old("TEST_SAVE", 0).await;

        let rates = vec![
            test_rate("TEST_SAVE", 3, 100.0),
            test_rate("TEST_SAVE", 2, 101.0),
            test_rate("TEST_SAVE", 1, 102.0),
        ];
        cache.save_rates("TEST_SAVE", &rates).await.unwrap();

        let loaded = cache.load_rates("TEST_SAVE", 24).await.unwrap();

        assert_eq!(loaded.len(), 3);
        // Sorted oldest first
        assert_eq!(loaded[0].ask, 100.0);
        assert_eq!(loaded[2].ask, 102.0);

        let _ = cache.cleanup_old("TEST_SAVE", 0).await;
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_load_with_time_filter() {
        let mut cache = RateCache::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");

        let _ = cache.cleanup_old("TEST_FILTER", 0).await;

        let rates = vec![
            test_rate("TEST_FILTER", 48, 100.0),
            test_rate("TEST_FILTER", 12, 101.0),
            test_rate("TEST_FILTER", 1, 102.0),
        ];
        cache.save_rates("TEST_FILTER", &rates).await.unwrap();

        let loaded = cache.load_rates("TEST_FILTER", 24).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].ask, 101.0);

        let _ = cache.cleanup_old("TEST_FILTER", 0).await;
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_cleanup_old_data() {
        let mut cache = RateCache::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");

        let _ = cache.cleanup_old("TEST_CLEANUP", 0).await;

        let rates = vec![
            test_rate("TEST_CLEANUP", 72, 100.0),
            test_rate("TEST_CLEANUP", 12, 101.0),
        ];
        cache.save_rates("TEST_CLEANUP", &rates).await.unwrap();

        let removed = cache.cleanup_old("TEST_CLEANUP", 24).await.unwrap();
        assert_eq!(removed, 1);

        let count = cache.count_rates("TEST_CLEANUP").await.unwrap();
        assert_eq!(count, 1);

        let _ = cache.cleanup_old("TEST_CLEANUP", 0).await;
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_empty_market() {
        let mut cache = RateCache::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to connect to Redis");

        let loaded = cache.load_rates("NONEXISTENT_MARKET", 24).await.unwrap();
        assert_eq!(loaded.len(), 0);

        let count = cache.count_rates("NONEXISTENT_MARKET").await.unwrap();
        assert_eq!(count, 0);
    }
}
