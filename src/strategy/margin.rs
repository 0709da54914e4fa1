use super::entity::{MarginConfig, StrategyEntity};
use super::{Strategy, StrategyKind};
use crate::curve::{Cell, Variation};

const PROFIT_GRID: [f64; 4] = [25.0, 50.0, 75.0, 100.0];
const LOSS_GRID: [f64; 4] = [50.0, 100.0, 150.0, 200.0];

/// Pure exit strategy: demands exit once the realized profit or loss,
/// measured in percent of the spread at evaluation time, crosses the
/// configured thresholds.
#[derive(Debug, Clone)]
pub struct MarginStrategy {
    pub profit: f64,
    pub loss: f64,
    pub variation: Variation,
    quote: Option<(f64, f64)>,
    pertinent: bool,
}

impl MarginStrategy {
    pub fn new(profit: f64, loss: f64, variation: Variation) -> Self {
        Self {
            profit,
            loss,
            variation,
            quote: None,
            pertinent: false,
        }
    }

    /// Exhaustive parameter grid.
    pub fn instances() -> Vec<MarginStrategy> {
        let mut all = Vec::new();
        for profit in PROFIT_GRID {
            for loss in LOSS_GRID {
                for variation in Variation::ALL {
                    all.push(MarginStrategy::new(profit, loss, variation));
                }
            }
        }
        all
    }

    fn crossed(&self, win: f64, lose: f64) -> bool {
        let Some((ask, bid)) = self.quote else {
            return false;
        };
        let space = ask - bid;
        if space <= 0.0 {
            return false;
        }
        (win / space) * 100.0 > self.profit || (lose / space) * 100.0 > self.loss
    }
}

impl Strategy for MarginStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Margin
    }

    fn label(&self) -> String {
        format!("MARGIN[{:?}/{}/{}]", self.variation, self.profit, self.loss)
    }

    fn window(&self) -> usize {
        1
    }

    fn exits_long(&self) -> bool {
        true
    }

    fn exits_short(&self) -> bool {
        true
    }

    fn consolidate(&mut self, window: &[Cell]) {
        let last = &window[window.len() - 1];
        self.quote = Some((
            last.ask.rate(self.variation),
            last.bid.rate(self.variation),
        ));
    }

    fn set_pertinent(&mut self, pertinent: bool) {
        self.pertinent = pertinent;
    }

    fn pertinent(&self) -> bool {
        self.pertinent
    }

    fn must_exit_long(&self, entry: f64) -> bool {
        let Some((_, bid)) = self.quote else {
            return false;
        };
        self.crossed(bid - entry, entry - bid)
    }

    fn must_exit_short(&self, entry: f64) -> bool {
        let Some((ask, _)) = self.quote else {
            return false;
        };
        self.crossed(entry - ask, ask - entry)
    }

    fn as_entity(&self) -> StrategyEntity {
        StrategyEntity::Margin(MarginConfig {
            profit: self.profit,
            loss: self.loss,
            variation: self.variation,
        })
    }

    fn clone_box(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }
}
