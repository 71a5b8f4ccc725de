//! Weighted running means for deviance and posterior-mean accumulation.

/// A mean together with the number of observations it summarizes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedMean {
    pub mean: f64,
    pub count: u64,
}

impl WeightedMean {
    pub fn new(mean: f64, count: u64) -> Self {
        Self { mean, count }
    }

    /// An empty accumulator; merging anything into it yields the other side.
    pub fn empty() -> Self {
        Self { mean: 0.0, count: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Merge two weighted means: the result summarizes both samples.
    pub fn merge(self, other: Self) -> Self {
        let total = self.count + other.count;
        if total == 0 {
            return Self::empty();
        }
        let mean = (self.mean * self.count as f64 + other.mean * other.count as f64)
            / total as f64;
        Self { mean, count: total }
    }
}

/// Weighted mean of a set of (value, count) pairs.
///
/// Returns the empty accumulator for empty input or zero total weight.
pub fn weighted_mean(pairs: &[(f64, u64)]) -> WeightedMean {
    pairs
        .iter()
        .fold(WeightedMean::empty(), |acc, &(x, n)| acc.merge(WeightedMean::new(x, n)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn merge_with_empty_is_identity() {
        let m = WeightedMean::new(3.5, 7);
        assert_eq!(m.merge(WeightedMean::empty()), m);
        assert_eq!(WeightedMean::empty().merge(m), m);
    }

    #[test]
    fn merge_weights_by_count() {
        let m = WeightedMean::new(0.0, 1).merge(WeightedMean::new(3.0, 3));
        assert_relative_eq!(m.mean, 2.25, epsilon = 1e-12);
        assert_eq!(m.count, 4);
    }

    #[test]
    fn weighted_mean_of_pairs() {
        let m = weighted_mean(&[(1.0, 2), (4.0, 1)]);
        assert_relative_eq!(m.mean, 2.0, epsilon = 1e-12);
        assert_eq!(m.count, 3);
    }

    #[test]
    fn weighted_mean_matches_incremental_merge() {
        let pairs = [(0.5, 10), (-2.0, 3), (7.25, 5)];
        let folded = weighted_mean(&pairs);
        let manual: f64 = pairs.iter().map(|(x, n)| x * *n as f64).sum::<f64>()
            / pairs.iter().map(|(_, n)| *n as f64).sum::<f64>();
        assert_relative_eq!(folded.mean, manual, epsilon = 1e-12);
    }

    #[test]
    fn empty_input_is_empty() {
        assert!(weighted_mean(&[]).is_empty());
    }
}
