// Worker coordination and the position lifecycle
pub mod consolidator;
pub mod evaluator;
pub mod follower;
pub mod mixing;
pub mod placeholder;
pub mod timelines;
pub mod watcher;

pub use consolidator::Consolidator;
pub use evaluator::Evaluator;
pub use follower::Follower;
pub use mixing::MixingWorker;
pub use placeholder::Placeholder;
pub use timelines::TimelineWorker;
pub use watcher::Watcher;

use crate::curve::CurveSnapshot;
use crate::mixer::{EntryBatch, EntryLead, ExitBatch, ExitLead};
use crate::models::{CurveId, Position, PositionKind, Rate};
use crate::strategy::StrategyKind;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Shared buffers the workers hand their products through.
///
/// Every accessor copies on read and takes exactly one lock, so no worker
/// ever holds a buffer across an await point. Batches are keyed by curve and
/// strategy kind: publishing the same pair twice replaces the previous batch,
/// which keeps grouping trivially unambiguous.
#[derive(Default)]
pub struct Hub {
    pending: Mutex<HashMap<String, Vec<Rate>>>,
    currents: Mutex<HashMap<String, Rate>>,
    snapshots: Mutex<HashMap<CurveId, CurveSnapshot>>,
    entry_batches: Mutex<HashMap<(CurveId, StrategyKind), EntryBatch>>,
    exit_batches: Mutex<HashMap<(CurveId, StrategyKind), ExitBatch>>,
    entry_leads: Mutex<HashMap<CurveId, Vec<EntryLead>>>,
    exit_leads: Mutex<HashMap<CurveId, Vec<ExitLead>>>,
    positions: Mutex<HashMap<Uuid, Position>>,
    rarity: Mutex<HashMap<StrategyKind, f64>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Rates =====

    /// Queue fresh ticks for the timeline worker and advance the live quote.
    pub fn publish_rates(&self, market: &str, rates: Vec<Rate>) {
        if rates.is_empty() {
            return;
        }

        {
            let mut currents = self.currents.lock().unwrap();
            for rate in &rates {
                let newer = currents
                    .get(market)
                    .map_or(true, |current| rate.time >= current.time);
                if newer {
                    currents.insert(market.to_string(), rate.clone());
                }
            }
        }

        self.pending
            .lock()
            .unwrap()
            .entry(market.to_string())
            .or_default()
            .extend(rates);
    }

    /// Take every queued tick, leaving the queues empty.
    pub fn drain_rates(&self) -> HashMap<String, Vec<Rate>> {
        std::mem::take(&mut *self.pending.lock().unwrap())
    }

    pub fn current(&self, market: &str) -> Option<Rate> {
        self.currents.lock().unwrap().get(market).cloned()
    }

    // ===== Snapshots =====

    pub fn publish_snapshot(&self, snapshot: CurveSnapshot) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(snapshot.id.clone(), snapshot);
    }

    pub fn snapshot(&self, id: &CurveId) -> Option<CurveSnapshot> {
        self.snapshots.lock().unwrap().get(id).cloned()
    }

    pub fn snapshots(&self) -> Vec<CurveSnapshot> {
        self.snapshots.lock().unwrap().values().cloned().collect()
    }

    // ===== Batches =====

    pub fn publish_entry_batch(&self, batch: EntryBatch) {
        self.entry_batches
            .lock()
            .unwrap()
            .insert((batch.curve.clone(), batch.kind), batch);
    }

    pub fn publish_exit_batch(&self, batch: ExitBatch) {
        self.exit_batches
            .lock()
            .unwrap()
            .insert((batch.curve.clone(), batch.kind), batch);
    }

    /// Curves for which at least one batch of either side exists.
    pub fn batched_curves(&self) -> Vec<CurveId> {
        let mut curves: Vec<CurveId> = self
            .entry_batches
            .lock()
            .unwrap()
            .keys()
            .map(|(curve, _)| curve.clone())
            .collect();
        curves.sort_by(|a, b| (&a.market, a.smooth).cmp(&(&b.market, b.smooth)));
        curves.dedup();
        curves
    }

    /// One curve's entry batches, in the given kind order. None unless every
    /// kind is covered.
    pub fn entry_batches(&self, curve: &CurveId, kinds: &[StrategyKind]) -> Option<Vec<EntryBatch>> {
        let batches = self.entry_batches.lock().unwrap();
        kinds
            .iter()
            .map(|kind| batches.get(&(curve.clone(), *kind)).cloned())
            .collect()
    }

    pub fn exit_batches(&self, curve: &CurveId, kinds: &[StrategyKind]) -> Option<Vec<ExitBatch>> {
        let batches = self.exit_batches.lock().unwrap();
        kinds
            .iter()
            .map(|kind| batches.get(&(curve.clone(), *kind)).cloned())
            .collect()
    }

    pub fn clear_batches(&self, curve: &CurveId) {
        self.entry_batches
            .lock()
            .unwrap()
            .retain(|(c, _), _| c != curve);
        self.exit_batches
            .lock()
            .unwrap()
            .retain(|(c, _), _| c != curve);
    }

    // ===== Leads =====

    pub fn publish_entry_leads(&self, curve: CurveId, leads: Vec<EntryLead>) {
        self.entry_leads.lock().unwrap().insert(curve, leads);
    }

    pub fn publish_exit_leads(&self, curve: CurveId, leads: Vec<ExitLead>) {
        self.exit_leads.lock().unwrap().insert(curve, leads);
    }

    /// Curves carrying both an entry and an exit lead buffer.
    pub fn pairable_curves(&self) -> Vec<CurveId> {
        let with_exits: Vec<CurveId> =
            self.exit_leads.lock().unwrap().keys().cloned().collect();
        let mut curves: Vec<CurveId> = self
            .entry_leads
            .lock()
            .unwrap()
            .keys()
            .filter(|curve| with_exits.contains(curve))
            .cloned()
            .collect();
        curves.sort_by(|a, b| (&a.market, a.smooth).cmp(&(&b.market, b.smooth)));
        curves
    }

    pub fn take_entry_leads(&self, curve: &CurveId) -> Vec<EntryLead> {
        self.entry_leads
            .lock()
            .unwrap()
            .remove(curve)
            .unwrap_or_default()
    }

    pub fn take_exit_leads(&self, curve: &CurveId) -> Vec<ExitLead> {
        self.exit_leads
            .lock()
            .unwrap()
            .remove(curve)
            .unwrap_or_default()
    }

    // ===== Positions =====

    pub fn insert_position(&self, position: Position) {
        self.positions
            .lock()
            .unwrap()
            .insert(position.id, position);
    }

    pub fn update_position(&self, position: &Position) {
        self.positions
            .lock()
            .unwrap()
            .insert(position.id, position.clone());
    }

    pub fn remove_position(&self, id: Uuid) -> Option<Position> {
        self.positions.lock().unwrap().remove(&id)
    }

    pub fn open_positions(&self) -> Vec<Position> {
        let mut positions: Vec<Position> =
            self.positions.lock().unwrap().values().cloned().collect();
        positions.sort_by_key(|p| p.start);
        positions
    }

    pub fn count_positions(&self, kind: PositionKind) -> usize {
        self.positions
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.kind == kind)
            .count()
    }

    // ===== Rarity reference =====

    /// Historical average component weight per strategy kind.
    pub fn rarity_reference(&self) -> HashMap<StrategyKind, f64> {
        self.rarity.lock().unwrap().clone()
    }

    pub fn set_rarity_reference(&self, reference: HashMap<StrategyKind, f64>) {
        *self.rarity.lock().unwrap() = reference;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Mode;

    fn rate(time: i64, ask: f64) -> Rate {
        Rate::new("EUR_USD", time, ask, ask - 1.0)
    }

    #[test]
    fn test_publish_rates_tracks_newest_current() {
        let hub = Hub::new();
        hub.publish_rates("EUR_USD", vec![rate(120_000, 101.0), rate(60_000, 100.0)]);

        // Out-of-order tick does not regress the live quote.
        assert_eq!(hub.current("EUR_USD").unwrap().time, 120_000);

        let drained = hub.drain_rates();
        assert_eq!(drained["EUR_USD"].len(), 2);
        assert!(hub.drain_rates().is_empty());
    }

    #[test]
    fn test_batch_coverage_is_all_or_nothing() {
        use crate::mixer::EntryBatch;

        let hub = Hub::new();
        let curve = CurveId::raw("EUR_USD");
        hub.publish_entry_batch(EntryBatch::new(curve.clone(), StrategyKind::Growth, vec![]));

        let kinds = [StrategyKind::Growth, StrategyKind::Chaos];
        assert!(hub.entry_batches(&curve, &kinds).is_none());

        hub.publish_entry_batch(EntryBatch::new(curve.clone(), StrategyKind::Chaos, vec![]));
        let batches = hub.entry_batches(&curve, &kinds).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].kind, StrategyKind::Growth);
    }

    #[test]
    fn test_position_bookkeeping() {
        let hub = Hub::new();
        let position = Position::open(
            "EUR_USD",
            0,
            Mode::Long,
            PositionKind::Simulation,
            80.0,
            100.0,
            1,
            2,
        );
        let id = position.id;

        hub.insert_position(position);
        assert_eq!(hub.count_positions(PositionKind::Simulation), 1);
        assert_eq!(hub.count_positions(PositionKind::Test), 0);

        let removed = hub.remove_position(id).unwrap();
        assert_eq!(removed.id, id);
        assert!(hub.open_positions().is_empty());
    }
}
