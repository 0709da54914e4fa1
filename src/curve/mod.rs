pub mod cell;
pub mod cluster;
pub mod raw;
pub mod smooth;

pub use cell::Cell;
pub use cluster::{Cluster, Variation};
pub use raw::RawCurve;
pub use smooth::SmoothCurve;

use crate::models::{CurveId, QuoteSide, Rate};
use std::collections::VecDeque;

/// Maximum number of cells a curve retains.
pub const CURVE_WIDTH: usize = 320;

/// Smoothing ladder applied to every raw curve.
pub const SMOOTH_LEVELS: [usize; 5] = [2, 4, 8, 16, 32];

/// Finalize direction and extrema for the cell at `idx` against its
/// predecessor chain, for both quote sides.
///
/// Record case: mark the new extremum, then walk backward un-marking the run
/// it extends. Each cell is marked and un-marked at most once per extremum,
/// so the walk is amortized O(1) per insertion.
pub(crate) fn finalize_cell_at(cells: &mut VecDeque<Cell>, idx: usize) {
    for side in [QuoteSide::Ask, QuoteSide::Bid] {
        if idx == 0 {
            cells[0].cluster_mut(side).mark_seed();
            continue;
        }

        let previous_average = cells[idx - 1].cluster(side).average;
        let previous_direction = cells[idx - 1].cluster(side).direction;
        let current_average = cells[idx].cluster(side).average;
        cells[idx].cluster_mut(side).direction = if current_average > previous_average {
            true
        } else if current_average < previous_average {
            false
        } else {
            previous_direction
        };

        for variation in Variation::ALL {
            let previous = cells[idx - 1].cluster(side).rate(variation);
            let current = cells[idx].cluster(side).rate(variation);

            // Tops: a plateau continues the previous classification, a
            // record takes over the live run, a reversal drops out.
            if current == previous {
                let flag = cells[idx - 1].cluster(side).top(variation);
                cells[idx].cluster_mut(side).set_top(variation, flag);
            } else if current > previous {
                cells[idx].cluster_mut(side).set_top(variation, true);
                let mut walk = idx;
                while walk > 0 && cells[walk - 1].cluster(side).top(variation) {
                    cells[walk - 1].cluster_mut(side).set_top(variation, false);
                    walk -= 1;
                }
            } else {
                cells[idx].cluster_mut(side).set_top(variation, false);
            }

            // Bottoms, mirrored.
            if current == previous {
                let flag = cells[idx - 1].cluster(side).bottom(variation);
                cells[idx].cluster_mut(side).set_bottom(variation, flag);
            } else if current < previous {
                cells[idx].cluster_mut(side).set_bottom(variation, true);
                let mut walk = idx;
                while walk > 0 && cells[walk - 1].cluster(side).bottom(variation) {
                    cells[walk - 1].cluster_mut(side).set_bottom(variation, false);
                    walk -= 1;
                }
            } else {
                cells[idx].cluster_mut(side).set_bottom(variation, false);
            }
        }
    }
}

/// Copy-on-read view of one curve handed to the strategy layer: finalized
/// cells plus the quote the scores are evaluated against.
#[derive(Debug, Clone)]
pub struct CurveSnapshot {
    pub id: CurveId,
    pub builds: Vec<Cell>,
    pub current: Rate,
}

/// One market's raw curve plus its ladder of smooth curves.
pub struct Timeline {
    pub market: String,
    pub raw: RawCurve,
    pub smooth: Vec<SmoothCurve>,
    pub current: Option<Rate>,
}

impl Timeline {
    pub fn new(market: impl Into<String>, seconds: u64) -> Self {
        let market = market.into();
        let smooth = SMOOTH_LEVELS
            .iter()
            .map(|&level| SmoothCurve::new(market.clone(), level, seconds, CURVE_WIDTH))
            .collect();

        Self {
            raw: RawCurve::new(market.clone(), seconds, CURVE_WIDTH),
            smooth,
            market,
            current: None,
        }
    }

    /// Integrate a batch of ticks through the raw curve and the smoothing
    /// ladder, returning the ids of curves that gained builds. Eviction runs
    /// last so smoothing always sees the cells it depends on.
    pub fn integrate(&mut self, rates: &[Rate]) -> Vec<CurveId> {
        let mut changed = Vec::new();
        if rates.is_empty() {
            return changed;
        }

        for rate in rates {
            let newer = self.current.as_ref().map_or(true, |c| rate.time >= c.time);
            if newer {
                self.current = Some(rate.clone());
            }
        }

        let fresh = self.raw.integrate(rates);
        if fresh > 0 {
            changed.push(CurveId::raw(self.market.clone()));

            let builds = self.raw.builds();
            for curve in &mut self.smooth {
                if curve.integrate(&builds, fresh) > 0 {
                    changed.push(CurveId::smooth(self.market.clone(), curve.level));
                }
            }
        }

        self.raw.trim();
        for curve in &mut self.smooth {
            curve.trim();
        }

        changed
    }

    /// Snapshot one curve level (0 = raw) for the strategy layer.
    pub fn snapshot(&self, smooth: usize) -> Option<CurveSnapshot> {
        let current = self.current.clone()?;
        let builds = if smooth == 0 {
            self.raw.builds()
        } else {
            self.smooth.iter().find(|c| c.level == smooth)?.builds()
        };
        if builds.is_empty() {
            return None;
        }

        Some(CurveSnapshot {
            id: CurveId {
                market: self.market.clone(),
                smooth,
            },
            builds,
            current,
        })
    }

    /// Snapshots of every level that has at least one build.
    pub fn snapshots(&self) -> Vec<CurveSnapshot> {
        let mut levels = vec![0];
        levels.extend(self.smooth.iter().map(|c| c.level));
        levels
            .into_iter()
            .filter_map(|level| self.snapshot(level))
            .collect()
    }
}
