use super::artifact::{EntryArtifact, ExitArtifact};
use super::MixError;
use crate::models::Mode;
use crate::strategy::{Mixin, MixinComponent, StrategyKind};
use std::collections::HashMap;

/// Weighted combination of entry artifacts, one per strategy family.
///
/// Scoring is all-or-nothing: a component not authorized for the scored
/// direction zeroes the accumulated score for that direction.
#[derive(Debug, Clone)]
pub struct EntryLead {
    weights: Vec<f64>,
    artifacts: Vec<EntryArtifact>,
    pub mode: Mode,
    long_score: f64,
    short_score: f64,
}

impl EntryLead {
    pub fn new(
        weights: Vec<f64>,
        artifacts: Vec<EntryArtifact>,
        mode: Mode,
    ) -> Result<Self, MixError> {
        if weights.len() != artifacts.len() {
            return Err(MixError::LengthMismatch {
                weights: weights.len(),
                artifacts: artifacts.len(),
            });
        }
        Ok(Self {
            weights,
            artifacts,
            mode,
            long_score: 0.0,
            short_score: 0.0,
        })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn artifacts(&self) -> &[EntryArtifact] {
        &self.artifacts
    }

    pub fn long_score(&self) -> f64 {
        self.long_score
    }

    pub fn short_score(&self) -> f64 {
        self.short_score
    }

    pub fn score_for(&self, mode: Mode) -> f64 {
        match mode {
            Mode::Long => self.long_score,
            Mode::Short => self.short_score,
        }
    }

    /// All-or-nothing: one component without the directional capability
    /// zeroes the whole direction, wherever it sits in the lead.
    pub fn score(&mut self, mode: Mode) {
        let authorized = self.artifacts.iter().all(|artifact| match mode {
            Mode::Long => artifact.long_authorized(),
            Mode::Short => artifact.short_authorized(),
        });

        let total = if !authorized {
            0.0
        } else {
            self.weights
                .iter()
                .zip(&self.artifacts)
                .map(|(weight, artifact)| match mode {
                    Mode::Long => weight * artifact.long_valid() as u8 as f64,
                    Mode::Short => weight * artifact.short_valid() as u8 as f64,
                })
                .sum()
        };

        match mode {
            Mode::Long => self.long_score = total,
            Mode::Short => self.short_score = total,
        }
    }

    /// Count of components whose weight exceeds the historical average for
    /// their strategy family.
    pub fn rarity(&self, reference: &HashMap<StrategyKind, f64>) -> f64 {
        rarity(
            &self.weights,
            self.artifacts.iter().map(|a| a.strategy().kind()),
            reference,
        )
    }

    /// Persistable form of this lead's configuration.
    pub fn mixin(&self, market: impl Into<String>, smooth: usize) -> Mixin {
        Mixin::new(
            market,
            smooth,
            self.weights
                .iter()
                .zip(&self.artifacts)
                .map(|(weight, artifact)| MixinComponent {
                    entity: artifact.strategy().as_entity(),
                    weight: *weight,
                })
                .collect(),
        )
    }
}

/// Exit-side lead. Validation happens at scoring time against an entry
/// price: the live opposite quote while mixing, the position's actual entry
/// when following an open position.
#[derive(Debug, Clone)]
pub struct ExitLead {
    weights: Vec<f64>,
    artifacts: Vec<ExitArtifact>,
    pub mode: Mode,
    long_score: f64,
    short_score: f64,
}

impl ExitLead {
    pub fn new(
        weights: Vec<f64>,
        artifacts: Vec<ExitArtifact>,
        mode: Mode,
    ) -> Result<Self, MixError> {
        if weights.len() != artifacts.len() {
            return Err(MixError::LengthMismatch {
                weights: weights.len(),
                artifacts: artifacts.len(),
            });
        }
        Ok(Self {
            weights,
            artifacts,
            mode,
            long_score: 0.0,
            short_score: 0.0,
        })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn artifacts(&self) -> &[ExitArtifact] {
        &self.artifacts
    }

    pub fn long_score(&self) -> f64 {
        self.long_score
    }

    pub fn short_score(&self) -> f64 {
        self.short_score
    }

    pub fn score_for(&self, mode: Mode) -> f64 {
        match mode {
            Mode::Long => self.long_score,
            Mode::Short => self.short_score,
        }
    }

    /// All-or-nothing, like the entry side: one component without the
    /// directional capability zeroes the whole direction.
    pub fn score(&mut self, mode: Mode, entry: f64) {
        let authorized = self.artifacts.iter().all(|artifact| match mode {
            Mode::Long => artifact.long_authorized(),
            Mode::Short => artifact.short_authorized(),
        });

        let total = if !authorized {
            0.0
        } else {
            self.weights
                .iter()
                .zip(&self.artifacts)
                .map(|(weight, artifact)| match mode {
                    Mode::Long => weight * artifact.validate_long(entry) as u8 as f64,
                    Mode::Short => weight * artifact.validate_short(entry) as u8 as f64,
                })
                .sum()
        };

        match mode {
            Mode::Long => self.long_score = total,
            Mode::Short => self.short_score = total,
        }
    }

    /// True only when every component strategy observed a full window this
    /// cycle.
    pub fn pertinent(&self) -> bool {
        self.artifacts.iter().all(|a| a.strategy().pertinent())
    }

    pub fn rarity(&self, reference: &HashMap<StrategyKind, f64>) -> f64 {
        rarity(
            &self.weights,
            self.artifacts.iter().map(|a| a.strategy().kind()),
            reference,
        )
    }

    pub fn mixin(&self, market: impl Into<String>, smooth: usize) -> Mixin {
        Mixin::new(
            market,
            smooth,
            self.weights
                .iter()
                .zip(&self.artifacts)
                .map(|(weight, artifact)| MixinComponent {
                    entity: artifact.strategy().as_entity(),
                    weight: *weight,
                })
                .collect(),
        )
    }
}

fn rarity(
    weights: &[f64],
    kinds: impl Iterator<Item = StrategyKind>,
    reference: &HashMap<StrategyKind, f64>,
) -> f64 {
    let mut result = 0.0;
    for (weight, kind) in weights.iter().zip(kinds) {
        if let Some(average) = reference.get(&kind) {
            if weight > average {
                result += 1.0;
            }
        }
    }
    result
}
