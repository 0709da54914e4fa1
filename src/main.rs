use clap::Parser;
use tickmixer::api::{Broker, MarketFeed, PaperBroker, RestBroker, RestFeed};
use tickmixer::config::Settings;
use tickmixer::db::PostgresStore;
use tickmixer::execution::{
    Consolidator, Evaluator, Follower, Hub, MixingWorker, Placeholder, TimelineWorker, Watcher,
};
use tickmixer::mixer::Mixer;
use tickmixer::persistence::RateCache;
use tickmixer::Result;
use std::sync::Arc;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

/// Largest blend the mixer cross-products.
const MIX_SIZE: usize = 5;
/// A cycle slower than this gets flagged.
const SLOW_CYCLE_MS: u128 = 3000;

#[derive(Parser, Debug)]
#[command(name = "tickmixer", about = "Self-selecting signal population trader")]
struct Args {
    /// Settings file (TOML); environment variables override it.
    #[arg(long)]
    config: Option<String>,
    /// Route virtual and real positions through the in-process paper broker
    /// instead of the configured REST broker.
    #[arg(long)]
    paper: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tickmixer=info".to_string()),
        )
        .init();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;
    tracing::info!(
        "Starting on {} markets, {}s cells",
        settings.markets.len(),
        settings.cell_seconds
    );

    let feed = RestFeed::new(settings.feed_url.clone(), settings.feed_key.clone())?;

    if args.paper {
        tracing::info!("Paper broker engaged, no orders leave the process");
        run(settings, feed, PaperBroker::new()).await
    } else {
        let broker = RestBroker::new(settings.broker_url.clone(), settings.broker_key.clone())?;
        run(settings, feed, broker).await
    }
}

async fn run<F, B>(settings: Settings, feed: F, broker: B) -> Result<()>
where
    F: MarketFeed + Send + 'static,
    B: Broker + 'static,
{
    let store = Arc::new(PostgresStore::new(&settings.database_url).await?);
    let cache = RateCache::new(&settings.redis_url).await?;
    let hub = Arc::new(Hub::new());
    let broker = Arc::new(broker);
    let wallet = settings.wallet.clone();

    // Reload open positions so the follower picks them straight back up.
    let open = store.load_open_positions().await?;
    if !open.is_empty() {
        tracing::info!("Resuming {} open positions", open.len());
        for position in open {
            hub.insert_position(position);
        }
    }

    let mut watcher = Watcher::new(feed, settings.markets.clone(), hub.clone(), store.clone(), cache);
    watcher.warm_start().await?;

    let watcher_task = tokio::spawn({
        async move {
            let mut ticker = pacer(5);
            loop {
                ticker.tick().await;
                let started = Instant::now();
                if let Err(error) = watcher.cycle().await {
                    tracing::error!("Watcher cycle failed: {}", error);
                }
                flag_slow("watcher", started);
            }
        }
    });

    let timeline_task = tokio::spawn({
        let mut worker = TimelineWorker::new(hub.clone(), settings.cell_seconds);
        async move {
            let mut ticker = pacer(5);
            loop {
                ticker.tick().await;
                let started = Instant::now();
                if let Err(error) = worker.cycle() {
                    tracing::error!("Timeline cycle failed: {}", error);
                }
                flag_slow("timelines", started);
            }
        }
    });

    let evaluator_task = tokio::spawn({
        let worker = Evaluator::new(hub.clone(), wallet.sample_size);
        async move {
            let mut ticker = pacer(10);
            loop {
                ticker.tick().await;
                let started = Instant::now();
                if let Err(error) = worker.cycle() {
                    tracing::error!("Evaluator cycle failed: {}", error);
                }
                flag_slow("evaluator", started);
            }
        }
    });

    let mixing_task = tokio::spawn({
        let mixer = Mixer::new(
            wallet.mixer_grain,
            wallet.mixer_depth,
            wallet.barrier_entry,
            wallet.barrier_exit,
            MIX_SIZE,
        );
        let worker = MixingWorker::new(hub.clone(), mixer);
        async move {
            let mut ticker = pacer(15);
            loop {
                ticker.tick().await;
                let started = Instant::now();
                if let Err(error) = worker.cycle() {
                    tracing::error!("Mixing cycle failed: {}", error);
                }
                flag_slow("mixing", started);
            }
        }
    });

    let placeholder_task = tokio::spawn({
        let mut worker = Placeholder::new(hub.clone(), store.clone(), wallet.clone());
        async move {
            let mut ticker = pacer(5);
            loop {
                ticker.tick().await;
                let started = Instant::now();
                if let Err(error) = worker.cycle().await {
                    tracing::error!("Placeholder cycle failed: {}", error);
                }
                flag_slow("placeholder", started);
            }
        }
    });

    let follower_task = tokio::spawn({
        let worker = Follower::new(hub.clone(), store.clone(), broker.clone(), wallet.clone());
        async move {
            let mut ticker = pacer(5);
            loop {
                ticker.tick().await;
                let started = Instant::now();
                if let Err(error) = worker.cycle().await {
                    tracing::error!("Follower cycle failed: {}", error);
                }
                flag_slow("follower", started);
            }
        }
    });

    let consolidator_task = tokio::spawn({
        let worker = Consolidator::new(hub.clone(), store.clone(), broker.clone(), wallet.clone());
        async move {
            let mut ticker = pacer(30);
            loop {
                ticker.tick().await;
                let started = Instant::now();
                if let Err(error) = worker.cycle().await {
                    tracing::error!("Consolidator cycle failed: {}", error);
                }
                flag_slow("consolidator", started);
            }
        }
    });

    tracing::info!("All workers running, press Ctrl+C to stop");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
        result = watcher_task => tracing::error!("Watcher exited: {:?}", result),
        result = timeline_task => tracing::error!("Timelines exited: {:?}", result),
        result = evaluator_task => tracing::error!("Evaluator exited: {:?}", result),
        result = mixing_task => tracing::error!("Mixing exited: {:?}", result),
        result = placeholder_task => tracing::error!("Placeholder exited: {:?}", result),
        result = follower_task => tracing::error!("Follower exited: {:?}", result),
        result = consolidator_task => tracing::error!("Consolidator exited: {:?}", result),
    }

    Ok(())
}

fn pacer(seconds: u64) -> tokio::time::Interval {
    let mut ticker = interval(Duration::from_secs(seconds));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

fn flag_slow(worker: &str, started: Instant) {
    let elapsed = started.elapsed().as_millis();
    if elapsed > SLOW_CYCLE_MS {
        tracing::warn!("{} cycle took {}ms", worker, elapsed);
    }
}
