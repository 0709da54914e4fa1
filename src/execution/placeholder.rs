use super::Hub;
use crate::config::Wallet;
use crate::db::PostgresStore;
use crate::mixer::{EntryLead, ExitLead};
use crate::models::{Mode, Position, PositionKind};
use crate::strategy::StrategyKind;
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Pairs entry leads with mode-matching exit leads into simulated positions,
/// bounded by the wallet's simulation grain and pool.
pub struct Placeholder {
    hub: Arc<Hub>,
    store: Arc<PostgresStore>,
    wallet: Wallet,
    /// Running sum and count of component weights per family, feeding the
    /// rarity reference.
    weights: HashMap<StrategyKind, (f64, u64)>,
}

impl Placeholder {
    pub fn new(hub: Arc<Hub>, store: Arc<PostgresStore>, wallet: Wallet) -> Self {
        Self {
            hub,
            store,
            wallet,
            weights: HashMap::new(),
        }
    }

    pub async fn cycle(&mut self) -> Result<()> {
        for curve in self.hub.pairable_curves() {
            // Taking the buffers doubles as the end-of-cycle cleanup.
            let mut entries = self.hub.take_entry_leads(&curve);
            let exits = self.hub.take_exit_leads(&curve);

            let Some(rate) = self.hub.current(&curve.market) else {
                continue;
            };

            // Rare blends first, so the pool keeps exploring combinations
            // the population has not already saturated.
            let reference = self.hub.rarity_reference();
            entries.sort_by(|a, b| b.rarity(&reference).total_cmp(&a.rarity(&reference)));

            let available = self
                .wallet
                .simulation_pool
                .saturating_sub(self.hub.count_positions(PositionKind::Simulation));
            let pairs = pair(entries, exits, self.wallet.simulation_grain, available);

            let count = pairs.len();
            for (entry, exit) in pairs {
                let entry_mixin = entry.mixin(curve.market.clone(), curve.smooth);
                let exit_mixin = exit.mixin(curve.market.clone(), curve.smooth);
                let entry_mix = self.store.retrieve_or_persist_mixin(&entry_mixin).await?;
                let exit_mix = self.store.retrieve_or_persist_mixin(&exit_mixin).await?;

                let mode = entry.mode;
                let mut position = Position::open(
                    curve.market.clone(),
                    curve.smooth,
                    mode,
                    PositionKind::Simulation,
                    entry.score_for(mode),
                    match mode {
                        Mode::Long => rate.ask,
                        Mode::Short => rate.bid,
                    },
                    entry_mix,
                    exit_mix,
                );
                position.start = rate.time.max(position.start);

                self.store.save_position(&position).await?;
                self.hub.insert_position(position);
                self.absorb(&entry);
            }

            if count > 0 {
                tracing::info!("Published {} simulations on {}", count, curve);
            }
        }

        Ok(())
    }

    /// Fold one persisted lead's weights into the rarity reference.
    fn absorb(&mut self, lead: &EntryLead) {
        for (weight, artifact) in lead.weights().iter().zip(lead.artifacts()) {
            let entry = self
                .weights
                .entry(artifact.strategy().kind())
                .or_insert((0.0, 0));
            entry.0 += weight;
            entry.1 += 1;
        }

        let reference = self
            .weights
            .iter()
            .map(|(kind, (sum, count))| (*kind, sum / *count as f64))
            .collect();
        self.hub.set_rarity_reference(reference);
    }
}

/// Pair the i-th entry lead with the i-th exit lead of its direction, while
/// the per-cycle grain, the pool headroom and both lead lists allow.
fn pair(
    entries: Vec<EntryLead>,
    exits: Vec<ExitLead>,
    grain: usize,
    available: usize,
) -> Vec<(EntryLead, ExitLead)> {
    let longs: Vec<&ExitLead> = exits.iter().filter(|e| e.mode == Mode::Long).collect();
    let shorts: Vec<&ExitLead> = exits.iter().filter(|e| e.mode == Mode::Short).collect();

    let mut pairs = Vec::new();
    for (i, entry) in entries.into_iter().enumerate() {
        if i >= grain || pairs.len() >= available || i >= longs.len() || i >= shorts.len() {
            break;
        }
        let exit = match entry.mode {
            Mode::Long => longs[i],
            Mode::Short => shorts[i],
        };
        pairs.push((entry, exit.clone()));
    }
    pairs
}
