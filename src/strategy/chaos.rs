use super::entity::{ChaosConfig, StrategyEntity};
use super::{Strategy, StrategyKind};
use crate::curve::{Cell, Variation};
use crate::models::QuoteSide;

const SIZE_MIN: usize = 8;
const SIZE_MAX: usize = 120;
const SIZE_STEP: usize = 16;
const FLOOR_MIN: u32 = 40;
const FLOOR_MAX: u32 = 96;
const FLOOR_STEP: u32 = 8;

/// Flags a window as chaotic when any single-step rate delta exceeds
/// `floor` percent of the window's max/min spread. Entering is allowed only
/// on calm windows; chaos demands exit.
#[derive(Debug, Clone)]
pub struct ChaosStrategy {
    pub size: usize,
    pub floor: f64,
    pub side: QuoteSide,
    pub variation: Variation,
    artifact: bool,
    pertinent: bool,
}

impl ChaosStrategy {
    pub fn new(size: usize, floor: f64, side: QuoteSide, variation: Variation) -> Self {
        Self {
            size,
            floor,
            side,
            variation,
            artifact: false,
            pertinent: false,
        }
    }

    /// Exhaustive parameter grid.
    pub fn instances() -> Vec<ChaosStrategy> {
        let mut all = Vec::new();
        for size in (SIZE_MIN..=SIZE_MAX).step_by(SIZE_STEP) {
            for floor in (FLOOR_MIN..=FLOOR_MAX).step_by(FLOOR_STEP as usize) {
                for side in [QuoteSide::Ask, QuoteSide::Bid] {
                    for variation in Variation::ALL {
                        all.push(ChaosStrategy::new(size, floor as f64, side, variation));
                    }
                }
            }
        }
        all
    }

    /// Whether the last observed window was chaotic.
    pub fn chaotic(&self) -> bool {
        self.artifact
    }
}

impl Strategy for ChaosStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Chaos
    }

    fn label(&self) -> String {
        format!(
            "CHAOS[{:?}/{:?}/{}/{}]",
            self.variation, self.side, self.size, self.floor
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
        let spread = high - low;

        self.artifact = rates
            .windows(2)
            .any(|pair| ((pair[1] - pair[0]).abs() / spread) * 100.0 > self.floor);
    }

    fn set_pertinent(&mut self, pertinent: bool) {
        self.pertinent = pertinent;
    }

    fn pertinent(&self) -> bool {
        self.pertinent
    }

    fn must_enter_long(&self) -> bool {
        !self.artifact
    }

    fn must_enter_short(&self) -> bool {
        !self.artifact
    }

    fn must_exit_long(&self, _entry: f64) -> bool {
        self.artifact
    }

    fn must_exit_short(&self, _entry: f64) -> bool {
        self.artifact
    }

    fn as_entity(&self) -> StrategyEntity {
        StrategyEntity::Chaos(ChaosConfig {
            size: self.size,
            floor: self.floor,
            side: self.side,
            variation: self.variation,
        })
    }

    fn clone_box(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }
}
