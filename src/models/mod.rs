use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One quote for one market: a bid/ask pair at a millisecond timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    pub market: String,
    /// Milliseconds since epoch.
    pub time: i64,
    pub ask: f64,
    pub bid: f64,
}

impl Rate {
    pub fn new(market: impl Into<String>, time: i64, ask: f64, bid: f64) -> Self {
        Self {
            market: market.into(),
            time,
            ask,
            bid,
        }
    }

    /// Ask/bid spread at this quote.
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Long,
    Short,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Long => "Long",
            Mode::Short => "Short",
        }
    }

    pub fn parse(value: &str) -> Option<Mode> {
        match value {
            "Long" => Some(Mode::Long),
            "Short" => Some(Mode::Short),
            _ => None,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the quote a strategy reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSide {
    Ask,
    Bid,
}

/// Identity of one curve: a market plus its smoothing level (0 = raw).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurveId {
    pub market: String,
    pub smooth: usize,
}

impl CurveId {
    pub fn raw(market: impl Into<String>) -> Self {
        Self {
            market: market.into(),
            smooth: 0,
        }
    }

    pub fn smooth(market: impl Into<String>, level: usize) -> Self {
        Self {
            market: market.into(),
            smooth: level,
        }
    }
}

impl std::fmt::Display for CurveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.smooth == 0 {
            write!(f, "{}/raw", self.market)
        } else {
            write!(f, "{}/x{}", self.market, self.smooth)
        }
    }
}

/// Trust tier of a position. Each tier is gated on the accumulated
/// performance of the tier below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionKind {
    Simulation,
    Test,
    Virtual,
    Real,
}

impl PositionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionKind::Simulation => "Simulation",
            PositionKind::Test => "Test",
            PositionKind::Virtual => "Virtual",
            PositionKind::Real => "Real",
        }
    }

    pub fn parse(value: &str) -> Option<PositionKind> {
        match value {
            "Simulation" => Some(PositionKind::Simulation),
            "Test" => Some(PositionKind::Test),
            "Virtual" => Some(PositionKind::Virtual),
            "Real" => Some(PositionKind::Real),
            _ => None,
        }
    }
}

/// One tracked position, simulated or broker-backed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub market: String,
    /// Smoothing level of the curve the combination was built on (0 = raw).
    pub smooth: usize,
    pub mode: Mode,
    pub kind: PositionKind,
    /// Entry lead score at open time.
    pub score: f64,
    /// Entry price (ask for long, bid for short).
    pub entry: f64,
    /// Open timestamp, milliseconds.
    pub start: i64,
    pub end: Option<i64>,
    pub open: bool,
    /// 1.0 when the position was closed by timeout, 0.0 otherwise.
    pub timeout_score: f64,
    /// Profit in percent of the entry price, net of the fee spread.
    pub relative_profit: Option<f64>,
    /// Relative profit scaled to a 24h holding period.
    pub daily_profit: Option<f64>,
    pub exit_score: Option<f64>,
    /// Trailing stop level, advanced by the follower.
    pub stop_loss: f64,
    /// Distance maintained between the rate and the trailing stop.
    pub stop_gap: f64,
    /// Confidence target closing TEST and broker-backed positions.
    pub stop_success: f64,
    /// Content hash of the entry mixin.
    pub entry_mix: i64,
    /// Content hash of the exit mixin.
    pub exit_mix: i64,
    /// Broker-side identifier for VIRTUAL/REAL positions.
    pub external_id: Option<String>,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        market: impl Into<String>,
        smooth: usize,
        mode: Mode,
        kind: PositionKind,
        score: f64,
        entry: f64,
        entry_mix: i64,
        exit_mix: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            market: market.into(),
            smooth,
            mode,
            kind,
            score,
            entry,
            start: Utc::now().timestamp_millis(),
            end: None,
            open: true,
            timeout_score: 0.0,
            relative_profit: None,
            daily_profit: None,
            exit_score: None,
            stop_loss: 0.0,
            stop_gap: 0.0,
            stop_success: 0.0,
            entry_mix,
            exit_mix,
            external_id: None,
        }
    }

    /// Curve this position was mixed on.
    pub fn curve(&self) -> CurveId {
        CurveId {
            market: self.market.clone(),
            smooth: self.smooth,
        }
    }

    /// Identity of the (market, smooth, mode, entry mix, exit mix)
    /// combination this position belongs to.
    pub fn combination(&self) -> Combination {
        Combination {
            market: self.market.clone(),
            smooth: self.smooth,
            mode: self.mode,
            entry_mix: self.entry_mix,
            exit_mix: self.exit_mix,
        }
    }

    /// Close at the given rate, recording the exit score and whether the
    /// close was a timeout. Profit is measured against the opposite quote
    /// side and netted of the fee spread.
    pub fn close(&mut self, rate: &Rate, exit_score: f64, timeout: bool, fee_spread: f64) {
        let now = rate.time.max(self.start);
        let gross = match self.mode {
            Mode::Long => (rate.bid - self.entry) / self.entry * 100.0,
            Mode::Short => (self.entry - rate.ask) / self.entry * 100.0,
        };
        let net = gross - fee_spread;
        let held = (now - self.start).max(1) as f64;

        self.end = Some(now);
        self.open = false;
        self.timeout_score = if timeout { 1.0 } else { 0.0 };
        self.relative_profit = Some(net);
        self.daily_profit = Some(net * (86_400_000.0 / held));
        self.exit_score = Some(exit_score);
    }
}

/// Key grouping positions that share the same blended configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Combination {
    pub market: String,
    pub smooth: usize,
    pub mode: Mode,
    pub entry_mix: i64,
    pub exit_mix: i64,
}

impl std::fmt::Display for Combination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/x{}/{}/{:x}/{:x}",
            self.market, self.smooth, self.mode, self.entry_mix, self.exit_mix
        )
    }
}
