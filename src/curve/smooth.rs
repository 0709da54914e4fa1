use super::cell::Cell;
use super::finalize_cell_at;
use std::collections::VecDeque;

/// Bounded curve of smoothed cells at one level: every cell aggregates
/// `level` consecutive raw builds per side.
#[derive(Debug, Clone)]
pub struct SmoothCurve {
    pub market: String,
    pub level: usize,
    /// Raw cell duration in seconds.
    pub seconds: u64,
    width: usize,
    cells: VecDeque<Cell>,
    /// Raw builds produced since the last smooth cell.
    pending: usize,
}

impl SmoothCurve {
    pub fn new(market: impl Into<String>, level: usize, seconds: u64, width: usize) -> Self {
        Self {
            market: market.into(),
            level,
            seconds,
            width,
            cells: VecDeque::new(),
            pending: 0,
        }
    }

    fn span(&self) -> i64 {
        (self.seconds * 1000) as i64 * self.level as i64
    }

    /// Consume newly finalized raw builds, emitting one smooth cell per full
    /// batch of `level` builds. Returns the number of cells emitted.
    pub fn integrate(&mut self, raw_builds: &[Cell], fresh: usize) -> usize {
        self.pending += fresh;
        if self.pending > raw_builds.len() {
            self.pending = raw_builds.len();
        }

        let mut made = 0;
        while self.pending >= self.level {
            let from = raw_builds.len() - self.pending;
            let sources = &raw_builds[from..from + self.level];
            let start = match self.cells.back() {
                Some(last) => last.start + self.span(),
                None => sources[0].start,
            };

            let mut cell = Cell::from_sources(start, sources);
            cell.finalized = true;
            self.cells.push_back(cell);
            let idx = self.cells.len() - 1;
            finalize_cell_at(&mut self.cells, idx);

            self.pending -= self.level;
            made += 1;
        }

        made
    }

    /// Copy of the finalized cells, oldest first.
    pub fn builds(&self) -> Vec<Cell> {
        self.cells.iter().cloned().collect()
    }

    pub fn cells(&self) -> &VecDeque<Cell> {
        &self.cells
    }

    pub(crate) fn trim(&mut self) -> usize {
        let mut evicted = 0;
        while self.cells.len() > self.width {
            self.cells.pop_front();
            evicted += 1;
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::cluster::Variation;

    fn build(start: i64, rate: f64) -> Cell {
        let mut cell = Cell::open(start, rate, rate - 1.0);
        cell.complete();
        cell
    }

    #[test]
    fn test_constant_rate_smooths_to_constant() {
        // Level 4 over four raw cells of constant rate R: min = avg = max = R.
        let mut smooth = SmoothCurve::new("EUR_USD", 4, 60, 320);
        let builds: Vec<Cell> = (0..4).map(|i| build(i * 60_000, 100.0)).collect();

        let made = smooth.integrate(&builds, 4);
        assert_eq!(made, 1);

        let cell = &smooth.builds()[0];
        assert_eq!(cell.ask.minimum, 100.0);
        assert_eq!(cell.ask.average, 100.0);
        assert_eq!(cell.ask.maximum, 100.0);
        assert_eq!(cell.start, 0);
        // Seed case for the first smooth cell.
        assert!(cell.ask.top(Variation::Average));
        assert!(cell.ask.bottom(Variation::Average));
    }

    #[test]
    fn test_subsequent_cells_advance_by_level_span() {
        let mut smooth = SmoothCurve::new("EUR_USD", 2, 60, 320);
        let builds: Vec<Cell> = (0..4)
            .map(|i| build(i * 60_000, 100.0 + i as f64))
            .collect();

        // Two fresh builds at a time.
        assert_eq!(smooth.integrate(&builds[..2], 2), 1);
        assert_eq!(smooth.integrate(&builds, 2), 1);

        let cells = smooth.builds();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].start, 0);
        assert_eq!(cells[1].start, 120_000);
        // Rising averages: the second cell takes the top run.
        assert!(cells[1].ask.top(Variation::Average));
        assert!(!cells[0].ask.top(Variation::Average));
    }

    #[test]
    fn test_partial_batch_waits() {
        let mut smooth = SmoothCurve::new("EUR_USD", 4, 60, 320);
        let builds: Vec<Cell> = (0..3).map(|i| build(i * 60_000, 100.0)).collect();

        assert_eq!(smooth.integrate(&builds, 3), 0);
        assert!(smooth.builds().is_empty());
    }

    #[test]
    fn test_catch_up_emits_multiple_cells() {
        let mut smooth = SmoothCurve::new("EUR_USD", 2, 60, 320);
        let builds: Vec<Cell> = (0..6)
            .map(|i| build(i * 60_000, 100.0 + i as f64))
            .collect();

        // A backfilled gap can finalize many raw cells in one pass.
        assert_eq!(smooth.integrate(&builds, 6), 3);
        assert_eq!(smooth.builds().len(), 3);
    }
}
