//! Band assignment across a batch.
//!
//! A batch of N risks is split 70% low / 28% medium / remainder high, and
//! the labels are shuffled once so band does not follow extraction order.

use crate::models::Band;
use rand::Rng;
use rand::seq::SliceRandom;

/// Number of labels per band for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl BandCounts {
    /// `low = floor(0.70 N)`, `medium = floor(0.28 N)`, high takes the rest.
    pub fn for_batch(n: usize) -> Self {
        let low = n * 70 / 100;
        let medium = n * 28 / 100;
        Self {
            low,
            medium,
            high: n - low - medium,
        }
    }

    pub fn total(&self) -> usize {
        self.low + self.medium + self.high
    }

    /// Labels in low, medium, high order.
    pub fn labels(&self) -> Vec<Band> {
        let mut labels = Vec::with_capacity(self.total());
        labels.extend(std::iter::repeat_n(Band::Low, self.low));
        labels.extend(std::iter::repeat_n(Band::Medium, self.medium));
        labels.extend(std::iter::repeat_n(Band::High, self.high));
        labels
    }
}

/// Band labels for `n` risks, uniformly permuted with `rng`.
pub fn assign_bands<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<Band> {
    let mut labels = BandCounts::for_batch(n).labels();
    labels.shuffle(rng);
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_ten_risks() {
        let counts = BandCounts::for_batch(10);
        assert_eq!((counts.low, counts.medium, counts.high), (7, 2, 1));
    }

    #[test]
    fn test_empty_batch() {
        assert_eq!(BandCounts::for_batch(0).total(), 0);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(assign_bands(0, &mut rng).is_empty());
    }

    #[test]
    fn test_small_batches_land_in_high() {
        // floor(0.7) = floor(0.28) = 0: a single risk is always high.
        assert_eq!(
            BandCounts::for_batch(1),
            BandCounts { low: 0, medium: 0, high: 1 }
        );
        assert_eq!(
            BandCounts::for_batch(200),
            BandCounts { low: 140, medium: 56, high: 4 }
        );
    }

    #[test]
    fn test_same_seed_same_permutation() {
        let a = assign_bands(50, &mut StdRng::seed_from_u64(42));
        let b = assign_bands(50, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_shuffle_decorrelates_order() {
        // Unshuffled labels start with every low; across seeds at least one
        // permutation must differ from that ordering.
        let sorted = BandCounts::for_batch(20).labels();
        let differs = (0..10u64).any(|seed| assign_bands(20, &mut StdRng::seed_from_u64(seed)) != sorted);
        assert!(differs);
    }

    proptest! {
        #[test]
        fn prop_counts_partition_batch(n in 0usize..5000) {
            let counts = BandCounts::for_batch(n);
            prop_assert_eq!(counts.total(), n);
            prop_assert_eq!(counts.low, n * 7 / 10);
            prop_assert_eq!(counts.medium, n * 28 / 100);
        }

        #[test]
        fn prop_assignment_keeps_counts(n in 0usize..300, seed in any::<u64>()) {
            let bands = assign_bands(n, &mut StdRng::seed_from_u64(seed));
            let counts = BandCounts::for_batch(n);
            prop_assert_eq!(bands.len(), n);
            prop_assert_eq!(bands.iter().filter(|b| **b == Band::Low).count(), counts.low);
            prop_assert_eq!(bands.iter().filter(|b| **b == Band::Medium).count(), counts.medium);
            prop_assert_eq!(bands.iter().filter(|b| **b == Band::High).count(), counts.high);
        }
    }
}
