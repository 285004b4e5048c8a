use std::ops::Range;

use log::debug;
use piol_error::{PiolResult, piol_bail};

use crate::Context;

/// The contiguous block of units a worker owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decomposition {
    pub offset: u64,
    pub size: u64,
}

impl Decomposition {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub fn range(&self) -> Range<u64> {
        self.offset..self.end()
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// Split `total` units into `num_ranks` contiguous blocks and return the block of `rank`.
///
/// Block sizes differ by at most one; the `total % num_ranks` larger blocks go to the lowest
/// ranks.
pub fn decompose(total: u64, num_ranks: usize, rank: usize) -> PiolResult<Decomposition> {
    if num_ranks == 0 {
        piol_bail!("cannot decompose over zero workers");
    }
    if rank >= num_ranks {
        piol_bail!("rank {rank} outside a group of {num_ranks}");
    }

    let (ranks, rank) = (num_ranks as u64, rank as u64);
    let base = total / ranks;
    let remainder = total % ranks;
    Ok(Decomposition {
        offset: base * rank + rank.min(remainder),
        size: base + u64::from(rank < remainder),
    })
}

/// This worker's block of `total` units.
pub fn block_decomposition(ctx: &Context, total: u64) -> PiolResult<Decomposition> {
    let block = decompose(total, ctx.num_ranks(), ctx.rank())?;
    debug!(
        "rank {} of {} owns [{}, {}) of {total}",
        ctx.rank(),
        ctx.num_ranks(),
        block.offset,
        block.end()
    );
    Ok(block)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, 1)]
    #[case(0, 4)]
    #[case(3, 5)]
    #[case(10, 3)]
    #[case(400, 4)]
    #[case(1001, 7)]
    fn blocks_partition_total(#[case] total: u64, #[case] num_ranks: usize) {
        let blocks = (0..num_ranks)
            .map(|rank| decompose(total, num_ranks, rank).unwrap())
            .collect::<Vec<_>>();

        assert_eq!(blocks.iter().map(|b| b.size).sum::<u64>(), total);
        assert_eq!(blocks[0].offset, 0);
        for pair in blocks.windows(2) {
            assert_eq!(pair[0].end(), pair[1].offset);
            assert!(pair[0].size >= pair[1].size);
            assert!(pair[0].size - pair[1].size <= 1);
        }
    }

    #[test]
    fn extra_units_go_to_low_ranks() {
        assert_eq!(
            decompose(10, 3, 0).unwrap(),
            Decomposition { offset: 0, size: 4 }
        );
        assert_eq!(
            decompose(10, 3, 1).unwrap(),
            Decomposition { offset: 4, size: 3 }
        );
        assert_eq!(decompose(10, 3, 2).unwrap().range(), 7..10);
    }

    #[test]
    fn more_workers_than_units() {
        assert_eq!(decompose(3, 5, 4).unwrap(), Decomposition { offset: 3, size: 0 });
        assert!(decompose(3, 5, 4).unwrap().is_empty());
    }

    #[test]
    fn invalid_ranks() {
        assert!(decompose(10, 0, 0).is_err());
        assert!(decompose(10, 2, 2).is_err());
    }
}
