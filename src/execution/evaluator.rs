use super::Hub;
use crate::curve::CurveSnapshot;
use crate::mixer::{EntryArtifact, EntryBatch, ExitArtifact, ExitBatch};
use crate::strategy::{instances, StrategyKind};
use crate::Result;
use rand::seq::SliceRandom;
use std::sync::Arc;

/// Runs every strategy family over every published snapshot, wrapping the
/// pertinent instances into entry and exit batches.
pub struct Evaluator {
    hub: Arc<Hub>,
    /// Cap on sampled instances per family and curve.
    sample_size: usize,
}

impl Evaluator {
    pub fn new(hub: Arc<Hub>, sample_size: usize) -> Self {
        Self { hub, sample_size }
    }

    pub fn cycle(&self) -> Result<()> {
        let entry_kinds = StrategyKind::entry_kinds();

        for snapshot in self.hub.snapshots() {
            for kind in StrategyKind::exit_kinds() {
                let (entries, exits) = self.evaluate(&snapshot, kind);

                if entry_kinds.contains(&kind) {
                    self.hub
                        .publish_entry_batch(EntryBatch::new(snapshot.id.clone(), kind, entries));
                }
                self.hub
                    .publish_exit_batch(ExitBatch::new(snapshot.id.clone(), kind, exits));
            }
        }

        Ok(())
    }

    /// Observe a random sample of one family's grid against a snapshot and
    /// wrap the pertinent survivors.
    fn evaluate(
        &self,
        snapshot: &CurveSnapshot,
        kind: StrategyKind,
    ) -> (Vec<EntryArtifact>, Vec<ExitArtifact>) {
        let mut rng = rand::thread_rng();
        let mut pool = instances(kind);
        pool.shuffle(&mut rng);
        pool.truncate(self.sample_size);

        let mut entries = Vec::new();
        let mut exits = Vec::new();
        for mut strategy in pool {
            strategy.observe(&snapshot.builds);
            if !strategy.pertinent() {
                continue;
            }
            entries.push(EntryArtifact::new(strategy.clone_box()));
            exits.push(ExitArtifact::new(strategy));
        }

        (entries, exits)
    }
}
