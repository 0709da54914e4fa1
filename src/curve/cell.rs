use super::cluster::Cluster;
use crate::models::QuoteSide;

/// One time bucket holding an ask cluster and a bid cluster.
///
/// Raw cells buffer their ticks and average them at completion; smooth cells
/// are computed from their source cells at construction. Cells created to
/// fill a quote gap carry the `synthetic` marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Bucket start, milliseconds.
    pub start: i64,
    pub ask: Cluster,
    pub bid: Cluster,
    pub finalized: bool,
    pub synthetic: bool,
    history: Vec<(f64, f64)>,
}

impl Cell {
    /// Open a raw cell on its first tick.
    pub fn open(start: i64, ask: f64, bid: f64) -> Self {
        Self {
            start,
            ask: Cluster::seed(ask),
            bid: Cluster::seed(bid),
            finalized: false,
            synthetic: false,
            history: vec![(ask, bid)],
        }
    }

    /// Open a gap-filling cell carrying the latest known quote forward.
    pub fn open_synthetic(start: i64, ask: f64, bid: f64) -> Self {
        let mut cell = Cell::open(start, ask, bid);
        cell.synthetic = true;
        cell
    }

    /// Build a smooth cell by averaging the readings of `sources` per side.
    pub fn from_sources(start: i64, sources: &[Cell]) -> Self {
        let count = sources.len() as f64;
        let mean = |pick: fn(&Cell) -> f64| sources.iter().map(pick).sum::<f64>() / count;

        Self {
            start,
            ask: Cluster::consolidated(
                mean(|c| c.ask.minimum),
                mean(|c| c.ask.average),
                mean(|c| c.ask.maximum),
            ),
            bid: Cluster::consolidated(
                mean(|c| c.bid.minimum),
                mean(|c| c.bid.average),
                mean(|c| c.bid.maximum),
            ),
            finalized: false,
            synthetic: sources.iter().any(|c| c.synthetic),
            history: Vec::new(),
        }
    }

    /// Fold one tick into the open cell.
    pub fn integrate(&mut self, ask: f64, bid: f64) {
        self.ask.integrate(ask);
        self.bid.integrate(bid);
        self.history.push((ask, bid));
    }

    /// Compute the averages from the buffered ticks and freeze the cell.
    /// Direction and extrema are finalized by the owning curve, which has
    /// access to the predecessor chain.
    pub(crate) fn complete(&mut self) {
        if !self.history.is_empty() {
            let count = self.history.len() as f64;
            self.ask.average = self.history.iter().map(|(a, _)| a).sum::<f64>() / count;
            self.bid.average = self.history.iter().map(|(_, b)| b).sum::<f64>() / count;
        }
        self.finalized = true;
        self.history.clear();
    }

    pub fn cluster(&self, side: QuoteSide) -> &Cluster {
        match side {
            QuoteSide::Ask => &self.ask,
            QuoteSide::Bid => &self.bid,
        }
    }

    pub fn cluster_mut(&mut self, side: QuoteSide) -> &mut Cluster {
        match side {
            QuoteSide::Ask => &mut self.ask,
            QuoteSide::Bid => &mut self.bid,
        }
    }

    pub fn tick_count(&self) -> usize {
        self.history.len()
    }
}
