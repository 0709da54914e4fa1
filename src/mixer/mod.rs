pub mod artifact;
pub mod batch;
pub mod lead;
pub mod ponderation;

pub use artifact::{EntryArtifact, ExitArtifact};
pub use batch::{EntryBatch, ExitBatch};
pub use lead::{EntryLead, ExitLead};
pub use ponderation::{Distribution, PonderationSet, WeightVector};

use crate::models::{Mode, Rate};
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MixError {
    #[error("weight vector of {weights} entries cannot drive {artifacts} artifacts")]
    LengthMismatch { weights: usize, artifacts: usize },
}

/// Combinatorial lead generator.
///
/// Weight vectors and their distributions are precomputed per combination
/// size at construction; each mixing pass cross-products a depth-limited
/// sample of artifacts, applies shuffled weight vectors and keeps the first
/// lead per vector that clears (entries) or stays under (exits) the barrier,
/// then levels the per-validation containers down to the least-filled one so
/// no validation level dominates the output.
pub struct Mixer {
    depth: usize,
    barrier_entry: f64,
    barrier_exit: f64,
    sets: Vec<PonderationSet>,
}

impl Mixer {
    pub fn new(
        grain: u32,
        depth: usize,
        barrier_entry: f64,
        barrier_exit: f64,
        max_size: usize,
    ) -> Self {
        let sets = (1..=max_size)
            .map(|len| PonderationSet::build(len, grain, barrier_entry, barrier_exit))
            .collect();
        Self {
            depth,
            barrier_entry,
            barrier_exit,
            sets,
        }
    }

    /// Mix one curve's entry batches into scored entry leads, both modes.
    pub fn mix_entries(&self, batches: &[EntryBatch]) -> Result<Vec<EntryLead>, MixError> {
        let mut rng = rand::thread_rng();
        let mut leads = Vec::new();

        for mode in [Mode::Long, Mode::Short] {
            let candidates: Vec<Vec<EntryArtifact>> = batches
                .iter()
                .map(|b| match mode {
                    Mode::Long => b.long_candidates(&mut rng),
                    Mode::Short => b.short_candidates(&mut rng),
                })
                .collect();

            let premix = self.premix(&candidates, &mut rng);
            let sampled = self.sample(
                batches.len(),
                true,
                premix,
                &mut rng,
                |vector, artifacts| {
                    let mut lead = EntryLead::new(vector.weights.clone(), artifacts, mode)?;
                    lead.score(mode);
                    Ok(lead)
                },
                |lead: &EntryLead| lead.score_for(mode),
            )?;
            leads.extend(sampled);
        }

        leads.shuffle(&mut rng);
        Ok(leads)
    }

    /// Mix one curve's exit batches into exit leads, scored against the live
    /// opposite quote standing in for an entry price. Quiet leads (scoring
    /// under the exit barrier right now) are the keepers: an exit lead that
    /// fires immediately would close its position at open.
    pub fn mix_exits(&self, rate: &Rate, batches: &[ExitBatch]) -> Result<Vec<ExitLead>, MixError> {
        let mut rng = rand::thread_rng();
        let mut leads = Vec::new();

        for mode in [Mode::Long, Mode::Short] {
            let candidates: Vec<Vec<ExitArtifact>> = batches
                .iter()
                .map(|b| match mode {
                    Mode::Long => b.long_candidates(),
                    Mode::Short => b.short_candidates(),
                })
                .collect();
            let entry = match mode {
                Mode::Long => rate.bid,
                Mode::Short => rate.ask,
            };

            let premix = self.premix(&candidates, &mut rng);
            let sampled = self.sample(
                batches.len(),
                false,
                premix,
                &mut rng,
                |vector, artifacts| {
                    let mut lead = ExitLead::new(vector.weights.clone(), artifacts, mode)?;
                    lead.score(mode, entry);
                    Ok(lead)
                },
                |lead: &ExitLead| lead.score_for(mode),
            )?;
            leads.extend(sampled);
        }

        leads.shuffle(&mut rng);
        Ok(leads)
    }

    /// Depth-limited cross product: the full mixer depth of the first
    /// family, halved at each further level. An exhausted level empties the
    /// whole premix.
    fn premix<A: Clone, R: Rng>(&self, batches: &[Vec<A>], rng: &mut R) -> Vec<Vec<A>> {
        if batches.is_empty() || batches[0].is_empty() {
            return Vec::new();
        }

        let take = self.depth.min(batches[0].len());
        let mut state: Vec<Vec<A>> = batches[0][..take].iter().map(|a| vec![a.clone()]).collect();

        for idx in 1..batches.len() {
            let take = (self.depth >> idx).min(batches[idx].len());
            if take == 0 {
                return Vec::new();
            }
            let mut pool = batches[idx].clone();
            let mut next = Vec::with_capacity(state.len() * take);
            for prefix in &state {
                pool.shuffle(rng);
                for add in &pool[..take] {
                    let mut grown = prefix.clone();
                    grown.push(add.clone());
                    next.push(grown);
                }
            }
            state = next;
        }
        state
    }

    /// Quota sampling over the precomputed distribution, then leveling down
    /// to the least-filled validation level.
    #[allow(clippy::too_many_arguments)]
    fn sample<A, L, R, F, G>(
        &self,
        size: usize,
        entries: bool,
        mut premix: Vec<Vec<A>>,
        rng: &mut R,
        mut supply: F,
        score_of: G,
    ) -> Result<Vec<L>, MixError>
    where
        A: Clone,
        R: Rng,
        F: FnMut(&WeightVector, Vec<A>) -> Result<L, MixError>,
        G: Fn(&L) -> f64,
    {
        if size == 0 || premix.is_empty() {
            return Ok(Vec::new());
        }

        let set = &self.sets[size - 1];
        let (distribution, barrier) = if entries {
            (&set.entry, self.barrier_entry)
        } else {
            (&set.exit, self.barrier_exit)
        };
        let population = distribution.total();
        if population == 0.0 {
            return Ok(Vec::new());
        }

        let mut container: Vec<Vec<L>> = (0..size).map(|_| Vec::new()).collect();

        let mut order: Vec<usize> = (0..set.vectors.len()).collect();
        order.shuffle(rng);
        for idx in order {
            let vector = &set.vectors[idx];
            let validations = if entries {
                vector.entry_validations
            } else {
                vector.exit_validations
            };
            let target = distribution.level(validations);
            let objective = premix.len() as f64 * (target / population);
            if (container[validations - 1].len() as f64) >= objective {
                continue;
            }

            premix.shuffle(rng);
            for artifacts in &premix {
                let lead = supply(vector, artifacts.clone())?;
                let score = score_of(&lead);
                let keep = if entries {
                    score > barrier
                } else {
                    score < barrier
                };
                if keep {
                    container[validations - 1].push(lead);
                    break;
                }
            }
        }

        // Fill ratio of the emptiest reachable level.
        let mut lowest = 1.0f64;
        for (level, bucket) in container.iter().enumerate() {
            let maximum = distribution.level(level + 1);
            if maximum != 0.0 {
                lowest = lowest.min(bucket.len() as f64 / maximum);
            }
        }

        let mut result = Vec::new();
        for (level, bucket) in container.into_iter().enumerate() {
            let maximum = distribution.level(level + 1);
            if maximum == 0.0 {
                continue;
            }
            let done = bucket.len() as f64 / maximum;
            let skip = ((done - lowest) * maximum).round() as usize;
            let keep = bucket.len().saturating_sub(skip);
            result.extend(bucket.into_iter().take(keep));
        }

        result.shuffle(rng);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{Cell, Variation};
    use crate::models::{CurveId, QuoteSide};
    use crate::strategy::{ChaosStrategy, GrowthStrategy, MarginStrategy, Strategy, StrategyKind};

    fn cells(rates: &[f64]) -> Vec<Cell> {
        rates
            .iter()
            .enumerate()
            .map(|(i, rate)| {
                let mut cell = Cell::open(i as i64 * 60_000, *rate, *rate - 1.0);
                cell.complete();
                cell
            })
            .collect()
    }

    fn entry_batches() -> Vec<EntryBatch> {
        let window = cells(&[100.0, 102.0, 104.5]);
        let curve = CurveId::raw("EUR_USD");

        let growth: Vec<EntryArtifact> = (0..4)
            .map(|i| {
                let mut s =
                    GrowthStrategy::new(3, 4.0 + i as f64, QuoteSide::Ask, Variation::Average);
                s.observe(&window);
                EntryArtifact::new(Box::new(s))
            })
            .collect();
        let chaos: Vec<EntryArtifact> = (0..4)
            .map(|i| {
                let mut s =
                    ChaosStrategy::new(3, 80.0 + i as f64, QuoteSide::Ask, Variation::Average);
                s.observe(&window);
                EntryArtifact::new(Box::new(s))
            })
            .collect();

        vec![
            EntryBatch::new(curve.clone(), StrategyKind::Growth, growth),
            EntryBatch::new(curve, StrategyKind::Chaos, chaos),
        ]
    }

    #[test]
    fn test_entry_leads_clear_the_barrier() {
        let mixer = Mixer::new(10, 8, 75.0, 75.0, 2);
        let leads = mixer.mix_entries(&entry_batches()).unwrap();

        assert!(!leads.is_empty());
        for lead in &leads {
            assert_eq!(lead.weights().len(), 2);
            assert_eq!(lead.weights().iter().sum::<f64>(), 100.0);
            assert!(lead.score_for(lead.mode) > 75.0);
        }
        // The sustained rise validates long everywhere: long leads must be
        // present.
        assert!(leads.iter().any(|l| l.mode == Mode::Long));
    }

    #[test]
    fn test_exit_mix_keeps_quiet_leads() {
        let mixer = Mixer::new(10, 8, 75.0, 75.0, 1);
        let window = cells(&[116.0]);
        let margins: Vec<ExitArtifact> = (0..4)
            .map(|i| {
                let mut s = MarginStrategy::new(50.0 + i as f64, 100.0, Variation::Average);
                s.observe(&window);
                ExitArtifact::new(Box::new(s))
            })
            .collect();
        let batches = vec![ExitBatch::new(
            CurveId::raw("EUR_USD"),
            StrategyKind::Margin,
            margins,
        )];

        // Entry price equal to the live quote: nothing has been realized,
        // every lead scores zero and is kept.
        let quiet = Rate::new("EUR_USD", 0, 116.0, 115.0);
        let leads = mixer.mix_exits(&quiet, &batches).unwrap();
        assert!(!leads.is_empty());
        for lead in &leads {
            assert!(lead.score_for(lead.mode) < 75.0);
        }
    }

    #[test]
    fn test_empty_batch_empties_the_mix() {
        let mixer = Mixer::new(10, 8, 75.0, 75.0, 2);
        let mut batches = entry_batches();
        batches[1] = EntryBatch::new(CurveId::raw("EUR_USD"), StrategyKind::Chaos, Vec::new());

        let leads = mixer.mix_entries(&batches).unwrap();
        assert!(leads.is_empty());
    }

    #[test]
    fn test_premix_respects_depth() {
        let mixer = Mixer::new(10, 4, 75.0, 75.0, 2);
        let mut rng = rand::thread_rng();
        let batches: Vec<Vec<u32>> = vec![(0..10).collect(), (0..10).collect()];
        let premix = mixer.premix(&batches, &mut rng);

        // 4 first-level picks, 2 second-level picks each.
        assert_eq!(premix.len(), 8);
        for combination in &premix {
            assert_eq!(combination.len(), 2);
        }
    }
}
