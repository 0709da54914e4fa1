use serde::{Deserialize, Serialize};

/// Which consolidated reading of a cluster an observer consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variation {
    Minimum,
    Average,
    Maximum,
}

impl Variation {
    pub const ALL: [Variation; 3] = [Variation::Minimum, Variation::Average, Variation::Maximum];

    pub fn index(&self) -> usize {
        match self {
            Variation::Minimum => 0,
            Variation::Average => 1,
            Variation::Maximum => 2,
        }
    }
}

/// Consolidated min/avg/max reading for one quote side of one cell, with a
/// trend direction and top/bottom extrema flags per variation mode.
///
/// The extrema flags mark local turning points: a new record marks its
/// cluster and un-marks the contiguous run it extends, so each monotone
/// stretch keeps only its newest cluster flagged while flags on older
/// turning points persist.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub minimum: f64,
    pub average: f64,
    pub maximum: f64,
    pub last: f64,
    pub direction: bool,
    top: [bool; 3],
    bottom: [bool; 3],
}

impl Cluster {
    /// Cluster opened on its first tick.
    pub fn seed(rate: f64) -> Self {
        Self {
            minimum: rate,
            average: rate,
            maximum: rate,
            last: rate,
            direction: true,
            top: [false; 3],
            bottom: [false; 3],
        }
    }

    /// Cluster built from precomputed readings (smoothing path).
    pub fn consolidated(minimum: f64, average: f64, maximum: f64) -> Self {
        Self {
            minimum,
            average,
            maximum,
            last: average,
            direction: true,
            top: [false; 3],
            bottom: [false; 3],
        }
    }

    /// Fold one tick into the running min/max/last.
    pub fn integrate(&mut self, rate: f64) {
        if rate < self.minimum {
            self.minimum = rate;
        }
        if rate > self.maximum {
            self.maximum = rate;
        }
        self.last = rate;
    }

    pub fn rate(&self, variation: Variation) -> f64 {
        match variation {
            Variation::Minimum => self.minimum,
            Variation::Average => self.average,
            Variation::Maximum => self.maximum,
        }
    }

    pub fn top(&self, variation: Variation) -> bool {
        self.top[variation.index()]
    }

    pub fn bottom(&self, variation: Variation) -> bool {
        self.bottom[variation.index()]
    }

    pub fn set_top(&mut self, variation: Variation, value: bool) {
        self.top[variation.index()] = value;
    }

    pub fn set_bottom(&mut self, variation: Variation, value: bool) {
        self.bottom[variation.index()] = value;
    }

    /// First cluster of a chain: no history to compare against, so it is
    /// both top and bottom for every variation mode.
    pub fn mark_seed(&mut self) {
        self.top = [true; 3];
        self.bottom = [true; 3];
    }
}
