use super::Hub;
use crate::api::Broker;
use crate::config::Wallet;
use crate::db::PostgresStore;
use crate::mixer::{ExitArtifact, ExitLead};
use crate::models::{Mode, Position, PositionKind, Rate};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;

/// Per-cycle reading of one position against the live quote.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Check {
    timeout: bool,
    /// Trailing stop crossed.
    panick: bool,
    /// Confidence target reached.
    done: bool,
    /// Advanced stop-loss level to carry forward.
    stop_loss: f64,
}

/// Tracks every open position: expires timeouts, advances trailing stops,
/// honors confidence targets and re-scores the stored exit lead against the
/// position's entry price.
pub struct Follower<B: Broker> {
    hub: Arc<Hub>,
    store: Arc<PostgresStore>,
    broker: Arc<B>,
    wallet: Wallet,
}

impl<B: Broker> Follower<B> {
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

        for mut position in self.hub.open_positions() {
            let Some(rate) = self.hub.current(&position.market) else {
                continue;
            };

            let check = check(&position, &rate, now, &self.wallet);
            if check.timeout {
                self.close(&mut position, &rate, -1.0, true).await?;
                continue;
            }

            if check.stop_loss != position.stop_loss {
                position.stop_loss = check.stop_loss;
                self.hub.update_position(&position);
            }

            // The stored exit lead is rebuilt fresh every cycle and only
            // trusted when each component saw a full window.
            let Some(lead) = self.rebuild_exit(&position).await? else {
                if check.panick || check.done {
                    let score = if check.done { -2.0 } else { -1.0 };
                    self.close(&mut position, &rate, score, false).await?;
                }
                continue;
            };

            let mut lead = lead;
            if check.panick || check.done || lead.pertinent() {
                lead.score(position.mode, position.entry);
                let score = lead.score_for(position.mode);

                if check.panick || check.done || score > self.wallet.barrier_exit {
                    let score = if check.done {
                        -2.0
                    } else if check.panick {
                        -1.0
                    } else {
                        score
                    };
                    self.close(&mut position, &rate, score, false).await?;
                }
            }
        }

        Ok(())
    }

    /// Rebuild the exit lead from the persisted mixin against the current
    /// snapshot of the position's curve.
    async fn rebuild_exit(&self, position: &Position) -> Result<Option<ExitLead>> {
        let Some(mixin) = self.store.load_mixin(position.exit_mix).await? else {
            tracing::warn!(
                "Exit mixin {} of position {} is gone",
                position.exit_mix,
                position.id
            );
            return Ok(None);
        };
        let Some(snapshot) = self.hub.snapshot(&position.curve()) else {
            return Ok(None);
        };

        let artifacts: Vec<ExitArtifact> = mixin
            .strategies()
            .into_iter()
            .map(|mut strategy| {
                strategy.observe(&snapshot.builds);
                ExitArtifact::new(strategy)
            })
            .collect();

        match ExitLead::new(mixin.weights(), artifacts, position.mode) {
            Ok(lead) => Ok(Some(lead)),
            Err(error) => {
                tracing::warn!("Stored mixin rebuilt inconsistently: {}", error);
                Ok(None)
            }
        }
    }

    /// Close the position locally, routing through the broker first when it
    /// is broker-backed. A failed broker close leaves the position open for
    /// the next cycle.
    async fn close(
        &self,
        position: &mut Position,
        rate: &Rate,
        score: f64,
        timeout: bool,
    ) -> Result<()> {
        if let Some(external_id) = position.external_id.clone() {
            match self.broker.close(&external_id, rate).await {
                Ok(closed) => {
                    tracing::info!(
                        "Closed broker position {} with profit {}",
                        external_id,
                        closed.profit
                    );
                }
                Err(error) => {
                    tracing::error!(
                        "Failed to close broker position {}: {}. Retrying next cycle",
                        external_id,
                        error
                    );
                    return Ok(());
                }
            }
        }

        position.close(rate, score, timeout, self.wallet.fee_spread);
        self.store.save_position(position).await?;
        self.hub.remove_position(position.id);

        tracing::info!(
            "Closed {} {} on {} at {:.2}% relative profit",
            position.kind.as_str(),
            position.id,
            position.market,
            position.relative_profit.unwrap_or(0.0)
        );
        Ok(())
    }
}

/// Pure per-cycle reading: timeout, trailing stop advance and confidence
/// target. The trailing stop engages only once a stop gap has been set by
/// the consolidator; the confidence target only applies past SIMULATION.
fn check(position: &Position, rate: &Rate, now: i64, wallet: &Wallet) -> Check {
    if position.start < now - wallet.timeout {
        return Check {
            timeout: true,
            panick: false,
            done: false,
            stop_loss: position.stop_loss,
        };
    }

    let mut stop_loss = position.stop_loss;
    let mut panick = false;
    if position.stop_gap > 0.0 {
        match position.mode {
            Mode::Long => {
                let decal = rate.bid - position.stop_gap;
                stop_loss = stop_loss.max(decal);
                panick = stop_loss > rate.bid;
            }
            Mode::Short => {
                let decal = rate.ask + position.stop_gap;
                stop_loss = stop_loss.min(decal);
                panick = stop_loss < rate.ask;
            }
        }
    }

    let confident = position.kind != PositionKind::Simulation && position.stop_success > 0.0;
    let done = confident
        && match position.mode {
            Mode::Long => rate.ask > position.stop_success,
            Mode::Short => rate.bid < position.stop_success,
        };

    Check {
        timeout: false,
        panick,
        done,
        stop_loss,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(mode: Mode, kind: PositionKind) -> Position {
        let mut position = Position::open("EUR_USD", 0, mode, kind, 80.0, 100.0, 1, 2);
        position.start = 0;
        position
    }

    fn wallet() -> Wallet {
        Wallet::default()
    }

    #[test]
    fn test_timeout_fires_after_wallet_horizon() {
        let position = position(Mode::Long, PositionKind::Simulation);
        let rate = Rate::new("EUR_USD", 0, 100.5, 100.0);

        let fresh = check(&position, &rate, wallet().timeout, &wallet());
        assert!(!fresh.timeout);

        let expired = check(&position, &rate, wallet().timeout + 1, &wallet());
        assert!(expired.timeout);
    }

    #[test]
    fn test_trailing_stop_advances_and_fires_long() {
        let mut p = position(Mode::Long, PositionKind::Virtual);
        p.stop_gap = 2.0;
        p.stop_loss = 97.0;

        // Rising bid pulls the stop up.
        let up = check(&p, &Rate::new("EUR_USD", 0, 100.5, 100.0), 0, &wallet());
        assert!(!up.panick);
        assert_eq!(up.stop_loss, 98.0);

        // A later drop below the carried stop panicks without lowering it.
        p.stop_loss = up.stop_loss;
        let down = check(&p, &Rate::new("EUR_USD", 0, 98.0, 97.5), 0, &wallet());
        assert!(down.panick);
        assert_eq!(down.stop_loss, 98.0);
    }

    #[test]
    fn test_trailing_stop_short_mirrors() {
        let mut p = position(Mode::Short, PositionKind::Virtual);
        p.stop_gap = 2.0;
        p.stop_loss = 103.0;

        let calm = check(&p, &Rate::new("EUR_USD", 0, 100.0, 99.5), 0, &wallet());
        assert!(!calm.panick);
        assert_eq!(calm.stop_loss, 102.0);

        p.stop_loss = calm.stop_loss;
        let squeeze = check(&p, &Rate::new("EUR_USD", 0, 102.5, 102.0), 0, &wallet());
        assert!(squeeze.panick);
    }

    #[test]
    fn test_no_gap_no_trailing() {
        let p = position(Mode::Long, PositionKind::Simulation);
        let crash = check(&p, &Rate::new("EUR_USD", 0, 50.5, 50.0), 0, &wallet());
        assert!(!crash.panick);
        assert_eq!(crash.stop_loss, 0.0);
    }

    #[test]
    fn test_confidence_target_past_simulation_only() {
        let mut simulation = position(Mode::Long, PositionKind::Simulation);
        simulation.stop_success = 105.0;
        let rate = Rate::new("EUR_USD", 0, 106.0, 105.5);
        assert!(!check(&simulation, &rate, 0, &wallet()).done);

        let mut test = position(Mode::Long, PositionKind::Test);
        test.stop_success = 105.0;
        assert!(check(&test, &rate, 0, &wallet()).done);

        let mut short = position(Mode::Short, PositionKind::Test);
        short.stop_success = 95.0;
        assert!(!check(&short, &rate, 0, &wallet()).done);
        let low = Rate::new("EUR_USD", 0, 95.0, 94.5);
        assert!(check(&short, &low, 0, &wallet()).done);
    }
}
