use super::entity::{ForwardConfig, StrategyEntity};
use super::{Strategy, StrategyKind};
use crate::curve::{Cell, Variation};
use crate::models::QuoteSide;

const SEGMENT_GRID: [usize; 4] = [2, 4, 8, 16];
const OFFSET_GRID: [usize; 4] = [4, 8, 12, 16];
const DIFFERENCE_GRID: [f64; 5] = [-50.0, 0.0, 50.0, 100.0, 150.0];

/// Projects the curve forward by comparing the mean of the newest cells
/// against the mean of the cells `offset` buckets behind them. A projection
/// above `difference` percent reads as growth, below its negation as decline.
#[derive(Debug, Clone)]
pub struct ForwardStrategy {
    pub forward: usize,
    pub backward: usize,
    pub offset: usize,
    pub difference: f64,
    pub side: QuoteSide,
    pub variation: Variation,
    projection: Option<f64>,
    pertinent: bool,
}

impl ForwardStrategy {
    pub fn new(
        forward: usize,
        backward: usize,
        offset: usize,
        difference: f64,
        side: QuoteSide,
        variation: Variation,
    ) -> Self {
        Self {
            forward,
            backward,
            offset,
            difference,
            side,
            variation,
            projection: None,
            pertinent: false,
        }
    }

    /// Exhaustive parameter grid. The projected segment must fit inside the
    /// offset so the two segments never overlap.
    pub fn instances() -> Vec<ForwardStrategy> {
        let mut all = Vec::new();
        for forward in SEGMENT_GRID {
            for backward in SEGMENT_GRID {
                for offset in OFFSET_GRID {
                    if forward > offset {
                        continue;
                    }
                    for difference in DIFFERENCE_GRID {
                        for side in [QuoteSide::Ask, QuoteSide::Bid] {
                            for variation in Variation::ALL {
                                all.push(ForwardStrategy::new(
                                    forward, backward, offset, difference, side, variation,
                                ));
                            }
                        }
                    }
                }
            }
        }
        all
    }

    /// Last computed projection, in percent.
    pub fn projection(&self) -> Option<f64> {
        self.projection
    }

    fn growing(&self) -> bool {
        self.projection.map_or(false, |p| p > self.difference)
    }

    fn declining(&self) -> bool {
        self.projection.map_or(false, |p| p < -self.difference)
    }
}

impl Strategy for ForwardStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Forward
    }

    fn label(&self) -> String {
        format!(
            "FORWARD[{:?}/{:?}/{}/{}/{}/{}]",
            self.variation, self.side, self.forward, self.backward, self.offset, self.difference
        )
    }

    fn window(&self) -> usize {
        self.backward + self.offset
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

        let past = &rates[..self.backward];
        let recent = &rates[rates.len() - self.forward..];
        let past_mean = past.iter().sum::<f64>() / past.len() as f64;
        let recent_mean = recent.iter().sum::<f64>() / recent.len() as f64;

        self.projection = if past_mean == 0.0 {
            None
        } else {
            Some(((recent_mean / past_mean) - 1.0) * 100.0)
        };
    }

    fn set_pertinent(&mut self, pertinent: bool) {
        self.pertinent = pertinent;
    }

    fn pertinent(&self) -> bool {
        self.pertinent
    }

    fn must_enter_long(&self) -> bool {
        self.growing()
    }

    fn must_enter_short(&self) -> bool {
        self.declining()
    }

    fn must_exit_long(&self, _entry: f64) -> bool {
        self.declining()
    }

    fn must_exit_short(&self, _entry: f64) -> bool {
        self.growing()
    }

    fn as_entity(&self) -> StrategyEntity {
        StrategyEntity::Forward(ForwardConfig {
            forward: self.forward,
            backward: self.backward,
            offset: self.offset,
            difference: self.difference,
            side: self.side,
            variation: self.variation,
        })
    }

    fn clone_box(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }
}
