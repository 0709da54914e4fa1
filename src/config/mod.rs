use serde::Deserialize;

/// Trading wallet: barriers, pools and lifecycle thresholds. Every field
/// has a production default so a bare config file still runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Wallet {
    /// Maximum position lifetime in milliseconds.
    pub timeout: i64,
    /// How long a mixin stays eligible after its last profitable showing,
    /// in milliseconds.
    pub retention_delay: i64,
    /// Daily-profit floor below which aged positions are purged.
    pub retention_profit: f64,
    pub retention_confirmations: i64,
    pub barrier_entry: f64,
    pub barrier_exit: f64,
    /// Cap on the strategy instances sampled per family each cycle.
    pub sample_size: usize,
    pub mixer_grain: u32,
    pub mixer_depth: usize,
    pub simulation_pool: usize,
    pub simulation_grain: usize,
    pub test_pool: usize,
    pub test_grain: usize,
    /// Aggregation window for test graduation, in milliseconds.
    pub test_period: i64,
    pub test_limit: usize,
    pub prod_pool: usize,
    pub prod_grain: usize,
    pub prod_period: i64,
    /// Minimum average daily profit (percent) for production graduation.
    pub prod_percent: f64,
    pub prod_balancing: usize,
    /// Required wins-over-losses ratio.
    pub prod_risk: f64,
    /// Stop-gap divisor: higher values place stops closer to the entry.
    pub prod_security: f64,
    pub prod_confirmations: i64,
    pub prod_size: f64,
    /// Fee estimate subtracted from every relative profit, in percent.
    pub fee_spread: f64,
}

impl Default for Wallet {
    fn default() -> Self {
        Self {
            timeout: 4 * 3600 * 1000,
            retention_delay: 36 * 3600 * 1000,
            retention_profit: -1.0,
            retention_confirmations: 16,
            barrier_entry: 75.0,
            barrier_exit: 75.0,
            sample_size: 1024,
            mixer_grain: 10,
            mixer_depth: 16,
            simulation_pool: 131_072,
            simulation_grain: 320,
            test_pool: 32_768,
            test_grain: 16_384,
            test_period: 36 * 3600 * 1000,
            test_limit: 16,
            prod_pool: 4,
            prod_grain: 2048,
            prod_period: 36 * 3600 * 1000,
            prod_percent: 2.0,
            prod_balancing: 3,
            prod_risk: 3.0,
            prod_security: 200.0,
            prod_confirmations: 8,
            prod_size: 1000.0,
            fee_spread: 0.34,
        }
    }
}

/// Full runtime settings: connectivity plus the wallet.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Markets to watch, e.g. `["EUR_USD", "BTC_USD"]`.
    pub markets: Vec<String>,
    /// Raw curve bucket duration in seconds.
    #[serde(default = "default_cell_seconds")]
    pub cell_seconds: u64,
    pub database_url: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    pub feed_url: String,
    #[serde(default)]
    pub feed_key: String,
    pub broker_url: String,
    #[serde(default)]
    pub broker_key: String,
    #[serde(default)]
    pub wallet: Wallet,
}

fn default_cell_seconds() -> u64 {
    60
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl Settings {
    /// Layered load: optional file first, `TICKMIXER__`-prefixed environment
    /// variables on top (e.g. `TICKMIXER__WALLET__BARRIER_ENTRY=80`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder
            .add_source(
                config::Environment::with_prefix("TICKMIXER")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("markets")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
