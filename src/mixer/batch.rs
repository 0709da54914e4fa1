use super::artifact::{EntryArtifact, ExitArtifact};
use crate::models::CurveId;
use crate::strategy::StrategyKind;
use rand::seq::SliceRandom;
use rand::Rng;

/// One strategy family's observed artifacts for one curve, split by the
/// direction each artifact is authorized to answer.
#[derive(Debug, Clone)]
pub struct EntryBatch {
    pub curve: CurveId,
    pub kind: StrategyKind,
    long: Vec<EntryArtifact>,
    short: Vec<EntryArtifact>,
}

impl EntryBatch {
    pub fn new(curve: CurveId, kind: StrategyKind, source: Vec<EntryArtifact>) -> Self {
        let long = source
            .iter()
            .filter(|a| a.long_authorized())
            .cloned()
            .collect();
        let short = source
            .into_iter()
            .filter(|a| a.short_authorized())
            .collect();
        Self {
            curve,
            kind,
            long,
            short,
        }
    }

    /// Long candidates with the currently-validating artifacts shuffled to
    /// the front, so depth-limited mixing favors them.
    pub fn long_candidates<R: Rng>(&self, rng: &mut R) -> Vec<EntryArtifact> {
        Self::valid_first(&self.long, |a| a.long_valid(), rng)
    }

    pub fn short_candidates<R: Rng>(&self, rng: &mut R) -> Vec<EntryArtifact> {
        Self::valid_first(&self.short, |a| a.short_valid(), rng)
    }

    pub fn len(&self) -> usize {
        self.long.len().max(self.short.len())
    }

    pub fn is_empty(&self) -> bool {
        self.long.is_empty() && self.short.is_empty()
    }

    fn valid_first<R: Rng>(
        source: &[EntryArtifact],
        valid: impl Fn(&EntryArtifact) -> bool,
        rng: &mut R,
    ) -> Vec<EntryArtifact> {
        let mut hits: Vec<EntryArtifact> = source.iter().filter(|a| valid(a)).cloned().collect();
        let mut misses: Vec<EntryArtifact> = source.iter().filter(|a| !valid(a)).cloned().collect();
        hits.shuffle(rng);
        misses.shuffle(rng);
        hits.extend(misses);
        hits
    }
}

/// Exit-side counterpart. No validation ordering here: exit decisions are
/// position-dependent and resolved at scoring time.
#[derive(Debug, Clone)]
pub struct ExitBatch {
    pub curve: CurveId,
    pub kind: StrategyKind,
    long: Vec<ExitArtifact>,
    short: Vec<ExitArtifact>,
}

impl ExitBatch {
    pub fn new(curve: CurveId, kind: StrategyKind, source: Vec<ExitArtifact>) -> Self {
        let long = source
            .iter()
            .filter(|a| a.long_authorized())
            .cloned()
            .collect();
        let short = source
            .into_iter()
            .filter(|a| a.short_authorized())
            .collect();
        Self {
            curve,
            kind,
            long,
            short,
        }
    }

    pub fn long_candidates(&self) -> Vec<ExitArtifact> {
        self.long.clone()
    }

    pub fn short_candidates(&self) -> Vec<ExitArtifact> {
        self.short.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.long.is_empty() && self.short.is_empty()
    }
}
