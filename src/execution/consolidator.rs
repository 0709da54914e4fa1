use super::Hub;
use crate::api::Broker;
use crate::config::Wallet;
use crate::db::PostgresStore;
use crate::mixer::{EntryArtifact, EntryLead, ExitArtifact, ExitLead};
use crate::models::{Combination, Mode, Position, PositionKind, Rate};
use crate::Result;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Accumulated closed outcomes of one combination.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub combination: Combination,
    pub count: usize,
    pub wins: usize,
    pub losses: usize,
    pub timeouts: f64,
    pub relative_profit: f64,
    pub daily_profit: f64,
    /// Trust tier of the latest-ended position.
    pub last_kind: PositionKind,
    pub last_profit: f64,
    pub last_end: i64,
}

/// Graduates combinations up the trust ladder from their accumulated closed
/// outcomes, and purges the ones that stopped earning their keep.
pub struct Consolidator<B: Broker> {
    hub: Arc<Hub>,
    store: Arc<PostgresStore>,
    broker: Arc<B>,
    wallet: Wallet,
}

impl<B: Broker> Consolidator<B> {
    pub fn new(hub: Arc<Hub>, store: Arc<PostgresStore>, broker: Arc<B>, wallet: Wallet) -> Self {
        Self {
            hub,
            store,
            broker,
            wallet,
        }
    }

    pub async fn cycle(&self) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let horizon = (now - self.wallet.test_period).min(now - self.wallet.prod_period);
        let closed = self.store.load_closed_since(horizon).await?;

        // Combinations already represented by an open position skip the
        // ladder this cycle.
        let engaged: HashSet<Combination> = self
            .hub
            .open_positions()
            .iter()
            .filter(|p| p.kind != PositionKind::Simulation)
            .map(|p| p.combination())
            .collect();

        if let Err(error) = self.graduate_tests(now, &closed, &engaged).await {
            tracing::error!("Test graduation failed: {}", error);
        }
        if let Err(error) = self.graduate_production(now, &closed, &engaged).await {
            tracing::error!("Production graduation failed: {}", error);
        }
        self.purge(now, &closed).await?;

        Ok(())
    }

    /// SIMULATION combinations with enough clean confirmations become TEST
    /// positions, re-scored against the live curve first.
    async fn graduate_tests(
        &self,
        now: i64,
        closed: &[Position],
        engaged: &HashSet<Combination>,
    ) -> Result<()> {
        let simulations: Vec<Position> = closed
            .iter()
            .filter(|p| p.kind == PositionKind::Simulation)
            .filter(|p| p.end.map_or(false, |end| end > now - self.wallet.test_period))
            .cloned()
            .collect();

        let mut outcomes = aggregate(&simulations);
        outcomes.retain(|o| !engaged.contains(&o.combination) && test_ready(o, &self.wallet));
        rank(&mut outcomes);

        let mut count = 0;
        for outcome in outcomes.iter().take(self.wallet.test_limit) {
            if self.hub.count_positions(PositionKind::Test) >= self.wallet.test_pool {
                break;
            }
            let Some((score, rate)) = self.rescore(&outcome.combination).await? else {
                continue;
            };

            let mut position = self.place(outcome, PositionKind::Test, score, &rate);
            position.stop_success = success_target(outcome.combination.mode, &rate, outcome.relative_profit);

            self.store.save_position(&position).await?;
            self.hub.insert_position(position);
            count += 1;
        }

        if count > 0 {
            tracing::info!("Created {} tests from {} candidates", count, outcomes.len());
        }
        Ok(())
    }

    /// TEST and broker-backed combinations clearing the production gates
    /// open broker orders: REAL when the latest outcome was profitable past
    /// simulation, VIRTUAL otherwise.
    async fn graduate_production(
        &self,
        now: i64,
        closed: &[Position],
        engaged: &HashSet<Combination>,
    ) -> Result<()> {
        let proven: Vec<Position> = closed
            .iter()
            .filter(|p| p.kind != PositionKind::Simulation)
            .filter(|p| p.end.map_or(false, |end| end > now - self.wallet.prod_period))
            .cloned()
            .collect();

        let mut outcomes = aggregate(&proven);
        outcomes.retain(|o| !engaged.contains(&o.combination) && prod_ready(o, &self.wallet));
        rank(&mut outcomes);

        let mut count = 0;
        for outcome in outcomes.iter().take(self.wallet.prod_grain) {
            let backed = self.hub.count_positions(PositionKind::Virtual)
                + self.hub.count_positions(PositionKind::Real);
            if backed >= self.wallet.prod_pool {
                break;
            }
            let Some((score, rate)) = self.rescore(&outcome.combination).await? else {
                continue;
            };

            let kind = if outcome.last_profit > 0.0 && outcome.last_kind != PositionKind::Simulation
            {
                PositionKind::Real
            } else {
                PositionKind::Virtual
            };

            let opened = self
                .broker
                .open(
                    &outcome.combination.market,
                    outcome.combination.mode,
                    self.wallet.prod_size,
                    &rate,
                )
                .await;
            let broker_position = match opened {
                Ok(position) => position,
                Err(error) => {
                    tracing::error!(
                        "Broker refused {} on {}: {}",
                        kind.as_str(),
                        outcome.combination.market,
                        error
                    );
                    continue;
                }
            };

            let mut position = self.place(outcome, kind, score, &rate);
            let mode = outcome.combination.mode;
            let (stop_loss, stop_gap) = stop_levels(
                mode,
                &rate,
                outcome.relative_profit,
                self.wallet.prod_security,
            );
            position.stop_loss = stop_loss;
            position.stop_gap = stop_gap;
            position.stop_success = success_target(mode, &rate, outcome.relative_profit);
            position.external_id = Some(broker_position.id);

            self.store.save_position(&position).await?;
            self.hub.insert_position(position);
            count += 1;
        }

        if count > 0 {
            tracing::info!(
                "Opened {} broker-backed positions from {} candidates",
                count,
                outcomes.len()
            );
        }
        Ok(())
    }

    /// Drop combinations below the retention floor once their latest outcome
    /// has aged past the position timeout, and everything older than the
    /// retention delay.
    async fn purge(&self, now: i64, closed: &[Position]) -> Result<()> {
        let mut purged = 0;
        for outcome in aggregate(closed) {
            let aged = outcome.last_end < now - self.wallet.timeout;
            if aged && outcome.daily_profit < self.wallet.retention_profit {
                let c = &outcome.combination;
                purged += self
                    .store
                    .purge_combination(&c.market, c.smooth, c.mode, c.entry_mix, c.exit_mix)
                    .await?;
            }
        }

        purged += self
            .store
            .purge_before(now - self.wallet.retention_delay)
            .await?;

        if purged > 0 {
            tracing::debug!("Purged {} stale positions", purged);
        }
        Ok(())
    }

    fn place(&self, outcome: &Outcome, kind: PositionKind, score: f64, rate: &Rate) -> Position {
        let c = &outcome.combination;
        let mut position = Position::open(
            c.market.clone(),
            c.smooth,
            c.mode,
            kind,
            score,
            match c.mode {
                Mode::Long => rate.ask,
                Mode::Short => rate.bid,
            },
            c.entry_mix,
            c.exit_mix,
        );
        position.start = rate.time.max(position.start);
        position
    }

    /// Replay both stored mixins against the live curve: the entry lead must
    /// clear the entry barrier while the exit lead stays quiet. Returns the
    /// entry score and the quote it was taken at.
    async fn rescore(&self, combination: &Combination) -> Result<Option<(f64, Rate)>> {
        let Some(entry_mixin) = self.store.load_mixin(combination.entry_mix).await? else {
            return Ok(None);
        };
        let Some(exit_mixin) = self.store.load_mixin(combination.exit_mix).await? else {
            return Ok(None);
        };
        let curve = crate::models::CurveId {
            market: combination.market.clone(),
            smooth: combination.smooth,
        };
        let Some(snapshot) = self.hub.snapshot(&curve) else {
            return Ok(None);
        };
        let Some(rate) = self.hub.current(&combination.market) else {
            return Ok(None);
        };
        let mode = combination.mode;

        let entries: Vec<EntryArtifact> = entry_mixin
            .strategies()
            .into_iter()
            .map(|mut strategy| {
                strategy.observe(&snapshot.builds);
                EntryArtifact::new(strategy)
            })
            .collect();
        let Ok(mut entry) = EntryLead::new(entry_mixin.weights(), entries, mode) else {
            return Ok(None);
        };
        entry.score(mode);

        let exits: Vec<ExitArtifact> = exit_mixin
            .strategies()
            .into_iter()
            .map(|mut strategy| {
                strategy.observe(&snapshot.builds);
                ExitArtifact::new(strategy)
            })
            .collect();
        let Ok(mut exit) = ExitLead::new(exit_mixin.weights(), exits, mode) else {
            return Ok(None);
        };
        // The live opposite quote stands in for the entry price, as during
        // mixing: a lead already urging an exit would close at open.
        exit.score(
            mode,
            match mode {
                Mode::Long => rate.bid,
                Mode::Short => rate.ask,
            },
        );

        let enter = entry.score_for(mode) > self.wallet.barrier_entry
            && exit.score_for(mode) < self.wallet.barrier_exit;
        Ok(enter.then(|| (entry.score_for(mode), rate)))
    }
}

/// Fold closed positions into per-combination outcomes.
pub fn aggregate(positions: &[Position]) -> Vec<Outcome> {
    let mut map: HashMap<Combination, Outcome> = HashMap::new();

    for position in positions {
        let relative = position.relative_profit.unwrap_or(0.0);
        let daily = position.daily_profit.unwrap_or(0.0);
        let end = position.end.unwrap_or(position.start);

        let outcome = map
            .entry(position.combination())
            .or_insert_with(|| Outcome {
                combination: position.combination(),
                count: 0,
                wins: 0,
                losses: 0,
                timeouts: 0.0,
                relative_profit: 0.0,
                daily_profit: 0.0,
                last_kind: position.kind,
                last_profit: relative,
                last_end: end,
            });

        outcome.count += 1;
        if relative > 0.0 {
            outcome.wins += 1;
        } else {
            outcome.losses += 1;
        }
        outcome.timeouts += position.timeout_score;
        outcome.relative_profit += relative;
        outcome.daily_profit += daily;
        if end >= outcome.last_end {
            outcome.last_end = end;
            outcome.last_kind = position.kind;
            outcome.last_profit = relative;
        }
    }

    let mut outcomes: Vec<Outcome> = map
        .into_values()
        .map(|mut o| {
            o.relative_profit /= o.count as f64;
            o.daily_profit /= o.count as f64;
            o
        })
        .collect();
    outcomes.sort_by(|a, b| a.combination.to_string().cmp(&b.combination.to_string()));
    outcomes
}

/// Best average profits first.
fn rank(outcomes: &mut [Outcome]) {
    outcomes.sort_by(|a, b| {
        b.relative_profit
            .total_cmp(&a.relative_profit)
            .then(b.daily_profit.total_cmp(&a.daily_profit))
    });
}

/// Enough clean confirmations and a positive daily average.
pub fn test_ready(outcome: &Outcome, wallet: &Wallet) -> bool {
    outcome.timeouts == 0.0
        && outcome.daily_profit > 0.0
        && outcome.count as i64 > wallet.retention_confirmations
}

/// Production additionally demands the percentage, the win/loss ratio and
/// more confirmations.
pub fn prod_ready(outcome: &Outcome, wallet: &Wallet) -> bool {
    let risk = if outcome.losses == 0 {
        outcome.wins > 0
    } else {
        outcome.wins as f64 / outcome.losses as f64 > wallet.prod_risk
    };

    outcome.timeouts == 0.0
        && outcome.daily_profit > wallet.prod_percent
        && outcome.count as i64 > wallet.prod_confirmations
        && risk
}

/// Stop levels for a broker-backed position: the gap scales the observed
/// relative profit by the wallet's security factor, the stop starts one gap
/// behind the opposite quote.
fn stop_levels(mode: Mode, rate: &Rate, relative_profit: f64, security: f64) -> (f64, f64) {
    match mode {
        Mode::Long => {
            let gap = (relative_profit / 100.0) * rate.bid * (security / 100.0);
            (rate.bid - gap, gap)
        }
        Mode::Short => {
            let gap = (relative_profit / 100.0) * rate.ask * (security / 100.0);
            (rate.ask + gap, gap)
        }
    }
}

/// Confidence target: the entry-side quote advanced by the observed profit.
fn success_target(mode: Mode, rate: &Rate, relative_profit: f64) -> f64 {
    match mode {
        Mode::Long => rate.ask * (1.0 + relative_profit / 100.0),
        Mode::Short => rate.bid * (1.0 - relative_profit / 100.0),
    }
}
