//! # Piece Selector
//!
//! Rarest-first with a uniform random tie-break among the equally rare.

use crate::discovery::RarityHistogram;
use blockswarm_core::types::{BlockIndex, BlockSet};
use rand::seq::SliceRandom;
use rand::Rng;

/// Pick the next block to fetch
///
/// Returns `None` when nothing is needed or no needed block is reported by
/// any peer. Histogram entries with a zero count are treated as absent.
pub fn select_block<R: Rng + ?Sized>(
    histogram: &RarityHistogram,
    owned: &BlockSet,
    total_blocks: u32,
    rng: &mut R,
) -> Option<BlockIndex> {
    let available = histogram
        .iter()
        .filter(|&(&block, &count)| block < total_blocks && count > 0 && !owned.contains(&block));

    let mut rarest: Vec<BlockIndex> = Vec::new();
    let mut min_count = usize::MAX;
    for (&block, &count) in available {
        if count < min_count {
            min_count = count;
            rarest.clear();
        }
        if count == min_count {
            rarest.push(block);
        }
    }

    rarest.choose(rng).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::{BTreeMap, BTreeSet};

    #[test]
    fn test_rarest_block_wins() {
        let histogram = BTreeMap::from([(1, 3), (2, 1), (3, 1)]);
        let owned = BTreeSet::from([0]);
        let mut rng = StdRng::seed_from_u64(42);

        let mut seen = BTreeSet::new();
        for _ in 0..100 {
            let block = select_block(&histogram, &owned, 4, &mut rng).unwrap();
            assert!(block == 2 || block == 3);
            seen.insert(block);
        }
        // Both rarest blocks get picked over enough draws
        assert_eq!(seen, BTreeSet::from([2, 3]));
    }

    #[test]
    fn test_complete_returns_none() {
        let histogram = BTreeMap::from([(0, 2), (1, 1)]);
        let owned = BTreeSet::from([0, 1]);
        assert_eq!(select_block(&histogram, &owned, 2, &mut rand::thread_rng()), None);
    }

    #[test]
    fn test_nothing_fetchable_returns_none() {
        // Only already-owned blocks are on offer
        let histogram = BTreeMap::from([(0, 4)]);
        let owned = BTreeSet::from([0]);
        assert_eq!(select_block(&histogram, &owned, 3, &mut rand::thread_rng()), None);
        assert_eq!(select_block(&BTreeMap::new(), &owned, 3, &mut rand::thread_rng()), None);
    }

    #[test]
    fn test_owned_rare_block_is_skipped() {
        let histogram = BTreeMap::from([(1, 1), (2, 5)]);
        let owned = BTreeSet::from([1]);
        assert_eq!(select_block(&histogram, &owned, 3, &mut rand::thread_rng()), Some(2));
    }

    proptest! {
        #[test]
        fn prop_selection_is_needed_and_minimal(
            total in 1u32..32,
            counts in proptest::collection::btree_map(0u32..40, 1usize..6, 0..32),
            owned in proptest::collection::btree_set(0u32..32, 0..32),
            seed in any::<u64>(),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let choice = select_block(&counts, &owned, total, &mut rng);

            let candidates: Vec<(u32, usize)> = counts
                .iter()
                .filter(|(b, _)| **b < total && !owned.contains(*b))
                .map(|(b, c)| (*b, *c))
                .collect();

            match choice {
                None => prop_assert!(candidates.is_empty()),
                Some(block) => {
                    prop_assert!(block < total);
                    prop_assert!(!owned.contains(&block));
                    let min = candidates.iter().map(|(_, c)| *c).min().unwrap();
                    prop_assert_eq!(counts[&block], min);
                }
            }
        }
    }
}
