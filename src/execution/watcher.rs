use super::Hub;
use crate::api::MarketFeed;
use crate::db::PostgresStore;
use crate::models::Rate;
use crate::persistence::RateCache;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Hours of quote history kept warm in Redis.
const CACHE_HOURS: u64 = 48;

/// Polls the market feed, de-duplicates against the last seen timestamp per
/// market, persists the fresh ticks and diffuses them to the timelines.
pub struct Watcher<F: MarketFeed> {
    feed: F,
    markets: Vec<String>,
    hub: Arc<Hub>,
    store: Arc<PostgresStore>,
    cache: RateCache,
    last_seen: HashMap<String, i64>,
}

impl<F: MarketFeed> Watcher<F> {
    pub fn new(
        feed: F,
        markets: Vec<String>,
        hub: Arc<Hub>,
        store: Arc<PostgresStore>,
        cache: RateCache,
    ) -> Self {
        Self {
            feed,
            markets,
            hub,
            store,
            cache,
            last_seen: HashMap::new(),
        }
    }

    /// Seed the de-duplication state and the hub from cached history, so a
    /// restart does not re-diffuse ticks the curves already integrated.
    pub async fn warm_start(&mut self) -> Result<()> {
        for market in self.markets.clone() {
            let cached = self.cache.load_rates(&market, CACHE_HOURS).await?;
            if let Some(last) = cached.last() {
                self.last_seen.insert(market.clone(), last.time);
            }
            self.hub.publish_rates(&market, cached);
        }
        Ok(())
    }

    pub async fn cycle(&mut self) -> Result<()> {
        let rates = self.feed.rates(&self.markets).await?;
        let fresh = fresh_only(rates, &self.last_seen);

        for (market, batch) in fresh {
            let newest = batch.last().map(|rate| rate.time);
            if let Some(newest) = newest {
                self.last_seen.insert(market.clone(), newest);
            }

            self.store.save_rates(&batch).await?;
            self.cache.save_rates(&market, &batch).await?;
            self.cache.cleanup_old(&market, CACHE_HOURS).await?;
            self.hub.publish_rates(&market, batch);
        }

        Ok(())
    }
}

/// Keep only ticks strictly newer than the last seen timestamp of their
/// market, grouped per market and sorted by time. The feed is at-least-once
/// and may deliver out of order; both are absorbed here.
fn fresh_only(rates: Vec<Rate>, last_seen: &HashMap<String, i64>) -> HashMap<String, Vec<Rate>> {
    let mut fresh: HashMap<String, Vec<Rate>> = HashMap::new();
    for rate in rates {
        let stale = last_seen
            .get(&rate.market)
            .map_or(false, |last| rate.time <= *last);
        if !stale {
            fresh.entry(rate.market.clone()).or_default().push(rate);
        }
    }
    for batch in fresh.values_mut() {
        batch.sort_by_key(|rate| rate.time);
        batch.dedup_by_key(|rate| rate.time);
    }
    fresh
}
