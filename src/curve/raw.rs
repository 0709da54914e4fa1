use super::cell::Cell;
use super::finalize_cell_at;
use crate::models::Rate;
use std::collections::VecDeque;

/// Bounded curve of raw cells for one market at a fixed bucket duration.
///
/// A tick inside the open cell's window integrates into it; a tick past the
/// window completes the open cell, backfills fully-skipped buckets with
/// synthetic carry-forward cells and opens a new cell on the boundary
/// containing the tick.
#[derive(Debug, Clone)]
pub struct RawCurve {
    pub market: String,
    /// Cell duration in seconds.
    pub seconds: u64,
    width: usize,
    cells: VecDeque<Cell>,
    last_tick: Option<(f64, f64)>,
}

impl RawCurve {
    pub fn new(market: impl Into<String>, seconds: u64, width: usize) -> Self {
        Self {
            market: market.into(),
            seconds,
            width,
            cells: VecDeque::new(),
            last_tick: None,
        }
    }

    fn span(&self) -> i64 {
        (self.seconds * 1000) as i64
    }

    /// Integrate a batch of ticks, returning the number of cells finalized
    /// by this pass.
    pub fn integrate(&mut self, rates: &[Rate]) -> usize {
        let span = self.span();
        let mut finalized = 0;

        for rate in rates {
            match self.cells.back().map(|open| open.start) {
                None => {
                    self.cells.push_back(Cell::open(rate.time, rate.ask, rate.bid));
                }
                Some(start) if rate.time < start + span => {
                    self.cells
                        .back_mut()
                        .expect("open cell")
                        .integrate(rate.ask, rate.bid);
                }
                Some(start) => {
                    let mut next = start + span;
                    self.complete_last();
                    finalized += 1;

                    // Carry the latest quote through fully-skipped buckets,
                    // tagged synthetic.
                    let (ask, bid) = self.last_tick.unwrap_or((rate.ask, rate.bid));
                    while rate.time >= next + span {
                        self.cells.push_back(Cell::open_synthetic(next, ask, bid));
                        self.complete_last();
                        finalized += 1;
                        next += span;
                    }

                    self.cells.push_back(Cell::open(next, rate.ask, rate.bid));
                }
            }
            self.last_tick = Some((rate.ask, rate.bid));
        }

        finalized
    }

    fn complete_last(&mut self) {
        let idx = self.cells.len() - 1;
        self.cells[idx].complete();
        finalize_cell_at(&mut self.cells, idx);
    }

    /// Copy of the finalized cells, oldest first.
    pub fn builds(&self) -> Vec<Cell> {
        self.cells.iter().filter(|c| c.finalized).cloned().collect()
    }

    pub fn last_build(&self) -> Option<&Cell> {
        self.cells.iter().rev().find(|c| c.finalized)
    }

    pub fn cells(&self) -> &VecDeque<Cell> {
        &self.cells
    }

    /// Evict the oldest cells beyond the configured width. Called after
    /// dependent smoothing has consumed the current builds.
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

    fn rate(time: i64, ask: f64, bid: f64) -> Rate {
        Rate::new("EUR_USD", time, ask, bid)
    }

    #[test]
    fn test_first_cell_scenario() {
        // 60s buckets; ticks at t=0, t=30s, t=70s. The third tick closes the
        // first bucket.
        let mut curve = RawCurve::new("EUR_USD", 60, 320);
        let finalized = curve.integrate(&[
            rate(0, 100.0, 99.0),
            rate(30_000, 102.0, 100.0),
            rate(70_000, 101.0, 99.0),
        ]);

        assert_eq!(finalized, 1);
        let builds = curve.builds();
        assert_eq!(builds.len(), 1);
        let first = &builds[0];
        assert_eq!(first.start, 0);
        assert_eq!(first.ask.average, 101.0);
        assert_eq!(first.bid.average, 99.5);

        // Seed case: both top and bottom for every variation mode.
        for variation in Variation::ALL {
            assert!(first.ask.top(variation));
            assert!(first.ask.bottom(variation));
            assert!(first.bid.top(variation));
            assert!(first.bid.bottom(variation));
        }

        // The open cell sits on the next bucket boundary.
        assert_eq!(curve.cells().back().unwrap().start, 60_000);
    }

    #[test]
    fn test_gap_backfills_synthetic_cells() {
        let mut curve = RawCurve::new("EUR_USD", 60, 320);
        curve.integrate(&[rate(0, 100.0, 99.0)]);
        let finalized = curve.integrate(&[rate(185_000, 104.0, 103.0)]);

        // First bucket plus two skipped buckets.
        assert_eq!(finalized, 3);
        let builds = curve.builds();
        assert_eq!(builds.len(), 3);
        assert!(!builds[0].synthetic);
        assert!(builds[1].synthetic);
        assert!(builds[2].synthetic);
        assert_eq!(builds[1].start, 60_000);
        assert_eq!(builds[2].start, 120_000);
        // Carried-forward quote.
        assert_eq!(builds[2].ask.average, 100.0);
        assert_eq!(curve.cells().back().unwrap().start, 180_000);
    }

    #[test]
    fn test_extrema_rise_then_reversal() {
        // Rising averages then a reversal: within the ascent only its newest
        // cell keeps the top flag; the seed bottom survives because no
        // decline run ever reaches it.
        let mut curve = RawCurve::new("EUR_USD", 60, 320);
        let mut feed = Vec::new();
        for (i, price) in [100.0, 102.0, 104.0, 103.0, 101.0].iter().enumerate() {
            feed.push(rate(i as i64 * 60_000, *price, *price - 1.0));
        }
        // One more tick to close the fifth bucket.
        feed.push(rate(5 * 60_000, 101.0, 100.0));
        curve.integrate(&feed);

        let builds = curve.builds();
        assert_eq!(builds.len(), 5);
        for variation in Variation::ALL {
            let tops: Vec<usize> = (0..5).filter(|&i| builds[i].ask.top(variation)).collect();
            let bottoms: Vec<usize> = (0..5).filter(|&i| builds[i].ask.bottom(variation)).collect();
            assert_eq!(tops, vec![2], "peak holds the top for {:?}", variation);
            assert_eq!(bottoms, vec![0, 4], "seed and trough for {:?}", variation);
        }
    }

    #[test]
    fn test_extrema_alternate_on_zigzag() {
        // Alternating reversals leave a flag on every turning point; each
        // new record only clears the contiguous run it extends.
        let mut curve = RawCurve::new("EUR_USD", 60, 320);
        let mut feed = Vec::new();
        for (i, price) in [100.0, 110.0, 100.0, 110.0, 100.0].iter().enumerate() {
            feed.push(rate(i as i64 * 60_000, *price, *price - 1.0));
        }
        feed.push(rate(5 * 60_000, 100.0, 99.0));
        curve.integrate(&feed);

        let builds = curve.builds();
        let tops: Vec<usize> = (0..5)
            .filter(|&i| builds[i].ask.top(Variation::Average))
            .collect();
        let bottoms: Vec<usize> = (0..5)
            .filter(|&i| builds[i].ask.bottom(Variation::Average))
            .collect();
        assert_eq!(tops, vec![1, 3]);
        assert_eq!(bottoms, vec![0, 2, 4]);
    }

    #[test]
    fn test_plateau_copies_predecessor_flag() {
        let mut curve = RawCurve::new("EUR_USD", 60, 320);
        let mut feed = Vec::new();
        for (i, price) in [100.0, 102.0, 102.0].iter().enumerate() {
            feed.push(rate(i as i64 * 60_000, *price, *price - 1.0));
        }
        feed.push(rate(3 * 60_000, 102.0, 101.0));
        curve.integrate(&feed);

        let builds = curve.builds();
        assert_eq!(builds.len(), 3);
        // The plateau continues the record run.
        assert!(builds[1].ask.top(Variation::Average));
        assert!(builds[2].ask.top(Variation::Average));
        assert!(!builds[2].ask.bottom(Variation::Average));
    }

    #[test]
    fn test_direction_inheritance() {
        let mut curve = RawCurve::new("EUR_USD", 60, 320);
        let mut feed = Vec::new();
        for (i, price) in [100.0, 102.0, 102.0, 99.0].iter().enumerate() {
            feed.push(rate(i as i64 * 60_000, *price, *price - 1.0));
        }
        feed.push(rate(4 * 60_000, 99.0, 98.0));
        curve.integrate(&feed);

        let builds = curve.builds();
        assert!(builds[1].ask.direction);
        // Equal averages inherit the predecessor's direction.
        assert!(builds[2].ask.direction);
        assert!(!builds[3].ask.direction);
    }

    #[test]
    fn test_width_eviction() {
        let mut curve = RawCurve::new("EUR_USD", 60, 4);
        let feed: Vec<Rate> = (0..8)
            .map(|i| rate(i * 60_000, 100.0 + i as f64, 99.0 + i as f64))
            .collect();
        curve.integrate(&feed);
        curve.trim();

        assert!(curve.cells().len() <= 4);
        // The newest cells survive.
        assert_eq!(curve.cells().back().unwrap().start, 7 * 60_000);
    }
}
