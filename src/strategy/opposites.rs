use super::entity::{OppositesConfig, StrategyEntity};
use super::{Strategy, StrategyKind};
use crate::curve::{Cell, Cluster, Variation};
use crate::models::QuoteSide;

const SIZE_MIN: usize = 4;
const SIZE_MAX: usize = 124;
const SIZE_STEP: usize = 12;
const PROXIMITY_MIN: u32 = 0;
const PROXIMITY_MAX: u32 = 40;
const PROXIMITY_STEP: u32 = 10;

/// Proximity bands derived from one side's alternating extrema.
///
/// Each flagged top-to-bottom segment yields an entry band near the extremum
/// being approached and an exit band near the extremum being left, scaled by
/// the configured proximity percentages.
#[derive(Debug, Clone, Default)]
struct Bands {
    incoming_tops: Vec<(f64, f64)>,
    incoming_bottoms: Vec<(f64, f64)>,
    exiting_tops: Vec<(f64, f64)>,
    exiting_bottoms: Vec<(f64, f64)>,
}

impl Bands {
    fn in_range(value: f64, ranges: &[(f64, f64)]) -> bool {
        ranges.iter().any(|r| value > r.0 && value < r.1)
    }
}

#[derive(Debug, Clone, Copy)]
struct Quote {
    ask: f64,
    bid: f64,
    /// Growth flags: true when the newest cell carries the live top.
    ask_rising: bool,
    bid_rising: bool,
}

/// Positions against the curve's alternating tops and bottoms: enter long
/// near a bottom, enter short near a top, exits mirrored. `reverse` swaps
/// which side of the book each test reads.
#[derive(Debug, Clone)]
pub struct OppositesStrategy {
    pub size: usize,
    pub incoming: f64,
    pub exiting: f64,
    pub reverse: bool,
    pub variation: Variation,
    ask: Bands,
    bid: Bands,
    quote: Option<Quote>,
    pertinent: bool,
}

impl OppositesStrategy {
    pub fn new(size: usize, incoming: f64, exiting: f64, reverse: bool, variation: Variation) -> Self {
        Self {
            size,
            incoming,
            exiting,
            reverse,
            variation,
            ask: Bands::default(),
            bid: Bands::default(),
            quote: None,
            pertinent: false,
        }
    }

    /// Exhaustive parameter grid.
    pub fn instances() -> Vec<OppositesStrategy> {
        let mut all = Vec::new();
        for size in (SIZE_MIN..=SIZE_MAX).step_by(SIZE_STEP) {
            for incoming in (PROXIMITY_MIN..=PROXIMITY_MAX).step_by(PROXIMITY_STEP as usize) {
                for exiting in (PROXIMITY_MIN..=PROXIMITY_MAX).step_by(PROXIMITY_STEP as usize) {
                    for reverse in [false, true] {
                        for variation in Variation::ALL {
                            all.push(OppositesStrategy::new(
                                size,
                                incoming as f64,
                                exiting as f64,
                                reverse,
                                variation,
                            ));
                        }
                    }
                }
            }
        }
        all
    }

    fn consolidate_one(&self, clusters: &[&Cluster]) -> Bands {
        let mut bands = Bands::default();

        // Skip the leading cells so the walk starts on a flagged extremum.
        let Some(head) = clusters
            .iter()
            .position(|c| c.top(self.variation) || c.bottom(self.variation))
        else {
            return bands;
        };
        let filter = &clusters[head..];

        // Collect the alternating extremum rates. `last` tracks whether the
        // previous extremum was a top, seeded from the first flagged cell.
        let first = filter[0].top(self.variation);
        let mut last = first;
        let mut pre = vec![filter[0].rate(self.variation)];
        let mut previous: Option<f64> = None;
        for cluster in filter {
            let current = cluster.rate(self.variation);
            let different = previous.map_or(false, |p| p != current);
            if last {
                if cluster.bottom(self.variation) && different {
                    pre.push(current);
                    last = !last;
                }
            } else if cluster.top(self.variation) && different {
                pre.push(current);
                last = !last;
            }
            previous = Some(current);
        }

        // Each consecutive pair spans a swing; carve the proximity bands at
        // both of its ends.
        last = first;
        for pair in pre.windows(2) {
            let lowest = pair[0].min(pair[1]);
            let highest = pair[0].max(pair[1]);

            let (top_difference, bottom_difference) = if last {
                (
                    (highest - lowest) * (self.exiting / 100.0),
                    (highest - lowest) * (self.incoming / 100.0),
                )
            } else {
                (
                    (highest - lowest) * (self.incoming / 100.0),
                    (highest - lowest) * (self.exiting / 100.0),
                )
            };
            let low = lowest + bottom_difference;
            let high = highest - top_difference;

            if last {
                bands.exiting_tops.push((high, highest));
                bands.incoming_bottoms.push((lowest, low));
            } else {
                bands.exiting_bottoms.push((lowest, low));
                bands.incoming_tops.push((high, highest));
            }
            last = !last;
        }

        bands
    }
}

impl Strategy for OppositesStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Opposites
    }

    fn label(&self) -> String {
        format!(
            "OPPOSITES[{:?}/{}/{}/{}/{}]",
            self.variation, self.size, self.reverse, self.incoming, self.exiting
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
        let asks: Vec<&Cluster> = window.iter().map(|c| c.cluster(QuoteSide::Ask)).collect();
        let bids: Vec<&Cluster> = window.iter().map(|c| c.cluster(QuoteSide::Bid)).collect();
        self.ask = self.consolidate_one(&asks);
        self.bid = self.consolidate_one(&bids);

        let newest = &window[window.len() - 1];
        self.quote = Some(Quote {
            ask: newest.ask.rate(self.variation),
            bid: newest.bid.rate(self.variation),
            ask_rising: newest.ask.top(self.variation),
            bid_rising: newest.bid.top(self.variation),
        });
    }

    fn set_pertinent(&mut self, pertinent: bool) {
        self.pertinent = pertinent;
    }

    fn pertinent(&self) -> bool {
        self.pertinent
    }

    fn must_enter_long(&self) -> bool {
        let Some(quote) = self.quote else {
            return false;
        };
        if self.reverse {
            if quote.bid_rising {
                Bands::in_range(quote.bid, &self.bid.exiting_bottoms)
            } else {
                Bands::in_range(quote.bid, &self.bid.incoming_bottoms)
            }
        } else if quote.ask_rising {
            Bands::in_range(quote.ask, &self.ask.exiting_bottoms)
        } else {
            Bands::in_range(quote.ask, &self.ask.incoming_bottoms)
        }
    }

    fn must_enter_short(&self) -> bool {
        let Some(quote) = self.quote else {
            return false;
        };
        if self.reverse {
            if quote.ask_rising {
                Bands::in_range(quote.ask, &self.ask.incoming_tops)
            } else {
                Bands::in_range(quote.ask, &self.ask.exiting_tops)
            }
        } else if quote.bid_rising {
            Bands::in_range(quote.bid, &self.bid.incoming_tops)
        } else {
            Bands::in_range(quote.bid, &self.bid.exiting_tops)
        }
    }

    fn must_exit_long(&self, _entry: f64) -> bool {
        let Some(quote) = self.quote else {
            return false;
        };
        if self.reverse {
            if quote.bid_rising {
                Bands::in_range(quote.bid, &self.bid.incoming_tops)
            } else {
                Bands::in_range(quote.bid, &self.bid.exiting_tops)
            }
        } else if quote.ask_rising {
            Bands::in_range(quote.ask, &self.ask.incoming_tops)
        } else {
            Bands::in_range(quote.ask, &self.ask.exiting_tops)
        }
    }

    fn must_exit_short(&self, _entry: f64) -> bool {
        let Some(quote) = self.quote else {
            return false;
        };
        if self.reverse {
            if quote.ask_rising {
                Bands::in_range(quote.ask, &self.ask.exiting_bottoms)
            } else {
                Bands::in_range(quote.ask, &self.ask.incoming_bottoms)
            }
        } else if quote.bid_rising {
            Bands::in_range(quote.bid, &self.bid.exiting_bottoms)
        } else {
            Bands::in_range(quote.bid, &self.bid.incoming_bottoms)
        }
    }

    fn as_entity(&self) -> StrategyEntity {
        StrategyEntity::Opposites(OppositesConfig {
            size: self.size,
            incoming: self.incoming,
            exiting: self.exiting,
            reverse: self.reverse,
            variation: self.variation,
        })
    }

    fn clone_box(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::RawCurve;
    use crate::models::Rate;

    /// Five finalized cells from a zigzag, newest one sitting just above
    /// the lowest trough.
    fn zigzag_builds() -> Vec<Cell> {
        let mut curve = RawCurve::new("EUR_USD", 60, 320);
        let mut feed = Vec::new();
        for (i, price) in [100.0, 110.0, 100.0, 110.0, 101.0].iter().enumerate() {
            feed.push(Rate::new("EUR_USD", i as i64 * 60_000, *price, *price - 1.0));
        }
        feed.push(Rate::new("EUR_USD", 5 * 60_000, 101.0, 100.0));
        curve.integrate(&feed);
        curve.builds()
    }

    #[test]
    fn test_bands_from_alternating_extrema() {
        let mut strategy = OppositesStrategy::new(5, 20.0, 20.0, false, Variation::Average);
        strategy.observe(&zigzag_builds());

        assert!(strategy.pertinent());
        // Two downswings and two upswings carve two bands of each flavor
        // on the ask side.
        assert_eq!(strategy.ask.incoming_bottoms.len(), 2);
        assert_eq!(strategy.ask.incoming_tops.len(), 2);
        assert_eq!(strategy.ask.exiting_tops.len(), 2);
        assert_eq!(strategy.ask.exiting_bottoms.len(), 2);
        // First swing spans 100..110 with 20% proximity.
        assert_eq!(strategy.ask.incoming_tops[0], (108.0, 110.0));
        assert_eq!(strategy.ask.exiting_bottoms[0], (100.0, 102.0));
    }

    #[test]
    fn test_enters_long_near_falling_bottom() {
        // Newest ask sits at 101, falling into the 100..102 bottom band.
        let mut strategy = OppositesStrategy::new(5, 20.0, 20.0, false, Variation::Average);
        strategy.observe(&zigzag_builds());

        assert!(strategy.must_enter_long());
        assert!(!strategy.must_enter_short());
        assert!(!strategy.must_exit_long(100.0));
        // The bid mirrors the ask one unit lower: 100 falls in 99..101.
        assert!(strategy.must_exit_short(100.0));
    }

    #[test]
    fn test_reverse_swaps_sides() {
        let mut strategy = OppositesStrategy::new(5, 20.0, 20.0, true, Variation::Average);
        strategy.observe(&zigzag_builds());

        // Reversed entry reads the bid band instead and still fires here.
        assert!(strategy.must_enter_long());
        assert!(!strategy.must_exit_long(100.0));
    }

    #[test]
    fn test_no_extrema_no_signal() {
        // Completed but never finalized cells carry no flags.
        let cells: Vec<Cell> = (0..5)
            .map(|i| {
                let mut cell = Cell::open(i * 60_000, 100.0, 99.0);
                cell.complete();
                cell
            })
            .collect();

        let mut strategy = OppositesStrategy::new(5, 20.0, 20.0, false, Variation::Average);
        strategy.observe(&cells);

        assert!(!strategy.must_enter_long());
        assert!(!strategy.must_enter_short());
        assert!(!strategy.must_exit_long(100.0));
        assert!(!strategy.must_exit_short(100.0));
    }

    #[test]
    fn test_unobserved_is_silent() {
        let strategy = OppositesStrategy::new(5, 20.0, 20.0, false, Variation::Average);
        assert!(!strategy.must_enter_long());
        assert!(!strategy.must_exit_short(100.0));
    }
}
