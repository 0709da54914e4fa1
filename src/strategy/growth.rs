use super::entity::{GrowthConfig, StrategyEntity};
use super::{Strategy, StrategyKind};
use crate::curve::{Cell, Variation};
use crate::models::QuoteSide;

const SIZE_MIN: usize = 2;
const SIZE_MAX: usize = 16;
const SIZE_STEP: usize = 2;
const LEVEL_MIN: u32 = 4;
const LEVEL_MAX: u32 = 100;
const LEVEL_STEP: u32 = 12;

/// Detects sustained moves: every step in the window must clear a target
/// scaled from the window's span by `level`. Enter follows the sustained
/// direction; exit is its negation.
#[derive(Debug, Clone)]
pub struct GrowthStrategy {
    pub size: usize,
    pub level: f64,
    pub side: QuoteSide,
    pub variation: Variation,
    up: bool,
    down: bool,
    pertinent: bool,
}

impl GrowthStrategy {
    pub fn new(size: usize, level: f64, side: QuoteSide, variation: Variation) -> Self {
        Self {
            size,
            level,
            side,
            variation,
            up: false,
            down: false,
            pertinent: false,
        }
    }

    /// Exhaustive parameter grid.
    pub fn instances() -> Vec<GrowthStrategy> {
        let mut all = Vec::new();
        for size in (SIZE_MIN..=SIZE_MAX).step_by(SIZE_STEP) {
            for level in (LEVEL_MIN..=LEVEL_MAX).step_by(LEVEL_STEP as usize) {
                for side in [QuoteSide::Ask, QuoteSide::Bid] {
                    for variation in Variation::ALL {
                        all.push(GrowthStrategy::new(size, level as f64, side, variation));
                    }
                }
            }
        }
        all
    }

    pub fn sustained_up(&self) -> bool {
        self.up
    }

    pub fn sustained_down(&self) -> bool {
        self.down
    }
}

impl Strategy for GrowthStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Growth
    }

    fn label(&self) -> String {
        format!(
            "GROWTH[{:?}/{:?}/{}/{}]",
            self.variation, self.side, self.size, self.level
        )
    }

    fn window(&self) -> usize {
        self.size
    }

    fn enters_long(&self) -> bool {
        true
    }

    fn enters_short(&self) -> bool {
        true
    }

    fn exits_long(&self) -> bool {
        true
    }

    fn exits_short(&self) -> bool {
        true
    }

    fn consolidate(&mut self, window: &[Cell]) {
        let rates: Vec<f64> = window
            .iter()
            .map(|cell| cell.cluster(self.side).rate(self.variation))
            .collect();

        let low = rates.iter().cloned().fold(f64::INFINITY, f64::min);
        let high = rates.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let margin = (high - low) / self.size as f64;
        let target = margin * (self.level / 100.0);

        if margin <= 0.0 {
            self.up = false;
            self.down = false;
            return;
        }

        self.up = rates
            .windows(2)
            .all(|pair| ((pair[1] / pair[0]) - 1.0) * 100.0 >= target);
        self.down = rates
            .windows(2)
            .all(|pair| ((pair[0] / pair[1]) - 1.0) * 100.0 >= target);
    }

    fn set_pertinent(&mut self, pertinent: bool) {
        self.pertinent = pertinent;
    }

    fn pertinent(&self) -> bool {
        self.pertinent
    }

    fn must_enter_long(&self) -> bool {
        self.up
    }

    fn must_enter_short(&self) -> bool {
        self.down
    }

    fn must_exit_long(&self, _entry: f64) -> bool {
        !self.up
    }

    fn must_exit_short(&self, _entry: f64) -> bool {
        !self.down
    }

    fn as_entity(&self) -> StrategyEntity {
        StrategyEntity::Growth(GrowthConfig {
            size: self.size,
            level: self.level,
            side: self.side,
            variation: self.variation,
        })
    }

    fn clone_box(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }
}
