pub mod chaos;
pub mod entity;
pub mod forward;
pub mod growth;
pub mod margin;
pub mod opposites;

pub use chaos::ChaosStrategy;
pub use entity::{
    ChaosConfig, ForwardConfig, GrowthConfig, MarginConfig, Mixin, MixinComponent,
    OppositesConfig, StrategyEntity,
};
pub use forward::ForwardStrategy;
pub use growth::GrowthStrategy;
pub use margin::MarginStrategy;
pub use opposites::OppositesStrategy;

use crate::curve::Cell;
use serde::{Deserialize, Serialize};

/// The concrete strategy families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Chaos,
    Growth,
    Margin,
    Opposites,
    Forward,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::Chaos,
        StrategyKind::Growth,
        StrategyKind::Margin,
        StrategyKind::Opposites,
        StrategyKind::Forward,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Chaos => "chaos",
            StrategyKind::Growth => "growth",
            StrategyKind::Margin => "margin",
            StrategyKind::Opposites => "opposites",
            StrategyKind::Forward => "forward",
        }
    }

    /// Kinds able to answer entry questions.
    pub fn entry_kinds() -> Vec<StrategyKind> {
        vec![
            StrategyKind::Chaos,
            StrategyKind::Growth,
            StrategyKind::Opposites,
            StrategyKind::Forward,
        ]
    }

    /// Kinds able to answer exit questions.
    pub fn exit_kinds() -> Vec<StrategyKind> {
        StrategyKind::ALL.to_vec()
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parametrized evaluator observing a trailing window of finalized cells.
///
/// Strategies are pure configuration plus last-observed derived state, and
/// are cloned before being packaged into artifacts so concurrent batches
/// never alias live observation state. A strategy fed fewer cells than its
/// window is marked not pertinent and skipped for the cycle, never
/// partially evaluated.
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Human-readable configuration summary for logs.
    fn label(&self) -> String;

    /// Number of trailing cells `consolidate` expects.
    fn window(&self) -> usize;

    // ===== Capability tags =====

    fn observer(&self) -> bool {
        true
    }

    fn enters_long(&self) -> bool {
        false
    }

    fn enters_short(&self) -> bool {
        false
    }

    fn exits_long(&self) -> bool {
        false
    }

    fn exits_short(&self) -> bool {
        false
    }

    // ===== Observation =====

    /// Derive this cycle's state from exactly `window()` cells.
    fn consolidate(&mut self, window: &[Cell]);

    fn set_pertinent(&mut self, pertinent: bool);

    fn pertinent(&self) -> bool;

    /// Feed the trailing sub-window of `builds` through `consolidate`,
    /// marking the strategy not pertinent when history is too short.
    fn observe(&mut self, builds: &[Cell]) {
        if self.observer() && self.window() > 0 && builds.len() >= self.window() {
            let from = builds.len() - self.window();
            self.consolidate(&builds[from..]);
            self.set_pertinent(true);
        } else {
            self.set_pertinent(false);
        }
    }

    // ===== Decisions =====

    fn must_enter_long(&self) -> bool {
        false
    }

    fn must_enter_short(&self) -> bool {
        false
    }

    fn must_exit_long(&self, _entry: f64) -> bool {
        false
    }

    fn must_exit_short(&self, _entry: f64) -> bool {
        false
    }

    // ===== Packaging =====

    fn as_entity(&self) -> StrategyEntity;

    fn clone_box(&self) -> Box<dyn Strategy>;
}

impl Clone for Box<dyn Strategy> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Every instance of one strategy family over its parameter grid.
pub fn instances(kind: StrategyKind) -> Vec<Box<dyn Strategy>> {
    match kind {
        StrategyKind::Chaos => boxed(ChaosStrategy::instances()),
        StrategyKind::Growth => boxed(GrowthStrategy::instances()),
        StrategyKind::Margin => boxed(MarginStrategy::instances()),
        StrategyKind::Opposites => boxed(OppositesStrategy::instances()),
        StrategyKind::Forward => boxed(ForwardStrategy::instances()),
    }
}

fn boxed<S: Strategy + 'static>(all: Vec<S>) -> Vec<Box<dyn Strategy>> {
    all.into_iter()
        .map(|s| Box::new(s) as Box<dyn Strategy>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_kinds_exclude_margin() {
        let kinds = StrategyKind::entry_kinds();
        assert_eq!(kinds.len(), 4);
        assert!(!kinds.contains(&StrategyKind::Margin));
        assert_eq!(StrategyKind::exit_kinds().len(), 5);
    }

    #[test]
    fn test_grids_are_non_empty() {
        for kind in StrategyKind::ALL {
            let pool = instances(kind);
            assert!(!pool.is_empty(), "{} grid is empty", kind);
            for strategy in &pool {
                assert_eq!(strategy.kind(), kind);
                assert!(strategy.window() > 0);
            }
        }
    }

    #[test]
    fn test_short_history_marks_not_pertinent() {
        let mut strategy = instances(StrategyKind::Chaos).remove(0);
        strategy.observe(&[]);
        assert!(!strategy.pertinent());
    }
}
