/// Weight-vector generation and the exponential distribution targets the
/// mixer samples against.

/// All weight vectors of the given length whose components are multiples of
/// `100 / grain` and sum to exactly 100.
pub fn weight_vectors(len: usize, grain: u32) -> Vec<Vec<f64>> {
    let step = (100 / grain) as f64;
    let mut state: Vec<Vec<f64>> = vec![Vec::new()];
    for _ in 0..len {
        let mut next = Vec::new();
        for prefix in &state {
            for i in 0..=grain {
                let mut grown = prefix.clone();
                grown.push(i as f64 * step);
                next.push(grown);
            }
        }
        state = next;
    }

    state
        .into_iter()
        .filter(|v| (v.iter().sum::<f64>() - 100.0).abs() < f64::EPSILON)
        .collect()
}

/// Minimum number of strategies that must agree before the weighted score
/// can cross `barrier`: take components largest-first until the running sum
/// exceeds it.
pub fn validations_needed(weights: &[f64], barrier: f64) -> usize {
    let mut sorted = weights.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut current = 0.0;
    for (taken, weight) in sorted.iter().rev().enumerate() {
        current += weight;
        if current > barrier {
            return taken + 1;
        }
    }
    sorted.len()
}

/// Population targets per validation level. Vectors needing more agreeing
/// strategies are over-represented exponentially: each vector at level `v`
/// contributes `2^v` to its level and to the total.
#[derive(Debug, Clone)]
pub struct Distribution {
    counts: Vec<f64>,
    total: f64,
}

impl Distribution {
    pub fn build(validations: &[usize], levels: usize) -> Self {
        let mut counts = vec![0.0; levels];
        let mut total = 0.0;
        for &v in validations {
            let add = 2f64.powi(v as i32);
            counts[v - 1] += add;
            total += add;
        }
        Self { counts, total }
    }

    pub fn level(&self, validations: usize) -> f64 {
        self.counts[validations - 1]
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn levels(&self) -> usize {
        self.counts.len()
    }
}

/// One weight vector with its precomputed validation requirements against
/// both barriers.
#[derive(Debug, Clone)]
pub struct WeightVector {
    pub weights: Vec<f64>,
    pub entry_validations: usize,
    pub exit_validations: usize,
}

/// All vectors of one length plus the derived entry and exit distributions.
#[derive(Debug, Clone)]
pub struct PonderationSet {
    pub vectors: Vec<WeightVector>,
    pub entry: Distribution,
    pub exit: Distribution,
}

impl PonderationSet {
    pub fn build(len: usize, grain: u32, barrier_entry: f64, barrier_exit: f64) -> Self {
        let vectors: Vec<WeightVector> = weight_vectors(len, grain)
            .into_iter()
            .map(|weights| WeightVector {
                entry_validations: validations_needed(&weights, barrier_entry),
                exit_validations: validations_needed(&weights, barrier_exit),
                weights,
            })
            .collect();

        let entries: Vec<usize> = vectors.iter().map(|v| v.entry_validations).collect();
        let exits: Vec<usize> = vectors.iter().map(|v| v.exit_validations).collect();

        Self {
            entry: Distribution::build(&entries, len),
            exit: Distribution::build(&exits, len),
            vectors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vectors_sum_to_hundred() {
        let vectors = weight_vectors(3, 10);
        assert!(!vectors.is_empty());
        for v in &vectors {
            assert_eq!(v.len(), 3);
            assert_eq!(v.iter().sum::<f64>(), 100.0);
            assert!(v.iter().all(|w| w % 10.0 == 0.0));
        }
        // Compositions of 100 into 3 parts of step 10: C(12, 2).
        assert_eq!(vectors.len(), 66);
    }

    #[test]
    fn test_validations_take_largest_first() {
        // 80 alone crosses a 75 barrier.
        assert_eq!(validations_needed(&[10.0, 80.0, 10.0], 75.0), 1);
        // 50 + 30 needed.
        assert_eq!(validations_needed(&[30.0, 50.0, 20.0], 75.0), 2);
        // Even split: three components needed.
        assert_eq!(validations_needed(&[40.0, 30.0, 30.0], 75.0), 3);
        // Unreachable barrier falls back to every component.
        assert_eq!(validations_needed(&[50.0, 50.0], 150.0), 2);
    }

    #[test]
    fn test_distribution_weights_levels_exponentially() {
        let distribution = Distribution::build(&[1, 1, 2, 3], 3);
        assert_eq!(distribution.level(1), 4.0);
        assert_eq!(distribution.level(2), 4.0);
        assert_eq!(distribution.level(3), 8.0);
        assert_eq!(distribution.total(), 16.0);
    }

    #[test]
    fn test_set_pairs_vectors_with_distributions() {
        let set = PonderationSet::build(2, 10, 75.0, 75.0);
        // Compositions of 100 into 2 parts: 11 vectors.
        assert_eq!(set.vectors.len(), 11);
        assert_eq!(set.entry.total(), set.exit.total());
        for vector in &set.vectors {
            assert!(vector.entry_validations >= 1 && vector.entry_validations <= 2);
        }
    }
}
