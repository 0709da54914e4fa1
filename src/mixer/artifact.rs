use crate::strategy::Strategy;

/// Entry-side wrapper around an observed strategy. Authorizations mirror the
/// strategy's capabilities; validations are computed eagerly at wrap time
/// since entry questions need no position context.
#[derive(Clone)]
pub struct EntryArtifact {
    strategy: Box<dyn Strategy>,
    long_authorized: bool,
    short_authorized: bool,
    long_valid: bool,
    short_valid: bool,
}

impl EntryArtifact {
    pub fn new(strategy: Box<dyn Strategy>) -> Self {
        let long_authorized = strategy.enters_long();
        let short_authorized = strategy.enters_short();
        let long_valid = long_authorized && strategy.must_enter_long();
        let short_valid = short_authorized && strategy.must_enter_short();
        Self {
            strategy,
            long_authorized,
            short_authorized,
            long_valid,
            short_valid,
        }
    }

    pub fn strategy(&self) -> &dyn Strategy {
        self.strategy.as_ref()
    }

    pub fn long_authorized(&self) -> bool {
        self.long_authorized
    }

    pub fn short_authorized(&self) -> bool {
        self.short_authorized
    }

    pub fn long_valid(&self) -> bool {
        self.long_valid
    }

    pub fn short_valid(&self) -> bool {
        self.short_valid
    }

    /// One when the artifact points a single direction, zero when it is
    /// ambivalent or silent.
    pub fn coherency(&self) -> f64 {
        if self.long_valid != self.short_valid {
            1.0
        } else {
            0.0
        }
    }
}

impl std::fmt::Debug for EntryArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryArtifact")
            .field("strategy", &self.strategy.label())
            .field("long", &self.long_valid)
            .field("short", &self.short_valid)
            .finish()
    }
}

/// Exit-side wrapper. Validations depend on the entry price of a concrete
/// position and are therefore answered lazily.
#[derive(Clone)]
pub struct ExitArtifact {
    strategy: Box<dyn Strategy>,
    long_authorized: bool,
    short_authorized: bool,
}

impl ExitArtifact {
    pub fn new(strategy: Box<dyn Strategy>) -> Self {
        let long_authorized = strategy.exits_long();
        let short_authorized = strategy.exits_short();
        Self {
            strategy,
            long_authorized,
            short_authorized,
        }
    }

    pub fn strategy(&self) -> &dyn Strategy {
        self.strategy.as_ref()
    }

    pub fn long_authorized(&self) -> bool {
        self.long_authorized
    }

    pub fn short_authorized(&self) -> bool {
        self.short_authorized
    }

    pub fn validate_long(&self, entry: f64) -> bool {
        self.long_authorized && self.strategy.must_exit_long(entry)
    }

    pub fn validate_short(&self, entry: f64) -> bool {
        self.short_authorized && self.strategy.must_exit_short(entry)
    }
}

impl std::fmt::Debug for ExitArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitArtifact")
            .field("strategy", &self.strategy.label())
            .field("long", &self.long_authorized)
            .field("short", &self.short_authorized)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{Cell, Variation};
    use crate::models::QuoteSide;
    use crate::strategy::{GrowthStrategy, MarginStrategy, Strategy};

    fn cells(rates: &[f64]) -> Vec<Cell> {
        rates
            .iter()
            .enumerate()
            .map(|(i, rate)| {
                let mut cell = Cell::open(i as i64 * 60_000, *rate, *rate - 1.0);
                cell.complete();
                cell
            })
            .collect()
    }

    #[test]
    fn test_entry_artifact_captures_decisions() {
        let mut strategy = GrowthStrategy::new(3, 10.0, QuoteSide::Ask, Variation::Average);
        strategy.observe(&cells(&[100.0, 102.0, 104.5]));
        let artifact = EntryArtifact::new(Box::new(strategy));

        assert!(artifact.long_authorized());
        assert!(artifact.long_valid());
        assert!(!artifact.short_valid());
        assert_eq!(artifact.coherency(), 1.0);
    }

    #[test]
    fn test_exit_artifact_answers_lazily() {
        let mut strategy = MarginStrategy::new(50.0, 100.0, Variation::Average);
        strategy.observe(&cells(&[116.0]));
        let artifact = ExitArtifact::new(Box::new(strategy));

        assert!(artifact.long_authorized());
        // bid=115, spread 1: entry at 100 is far past the profit threshold.
        assert!(artifact.validate_long(100.0));
        assert!(!artifact.validate_long(115.0));
    }
}
