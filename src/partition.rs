use std::ops::Range;

use crate::error::{Result, SieveError};

/// Smallest seed worth sieving with; range 0 is clamped here so no worker
/// ever tests 0 or 1.
pub const FIRST_SEED: usize = 2;

/// Half-open interval of seed values owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedRange {
    pub start: usize,
    pub end: usize,
}

impl SeedRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn seeds(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Splits `lo..hi` into `parts` contiguous pieces whose sizes differ by at
/// most one. Pieces are empty when there is less work than parts.
pub fn split_range(lo: usize, hi: usize, parts: usize) -> Vec<Range<usize>> {
    let span = hi.saturating_sub(lo);
    (0..parts)
        .map(|i| (lo + span * i / parts)..(lo + span * (i + 1) / parts))
        .collect()
}

/// Seed ranges covering 2..=isqrt(limit), one per worker.
pub fn partition_seeds(limit: usize, workers: usize) -> Result<Vec<SeedRange>> {
    if workers < 1 {
        return Err(SieveError::invalid("workers", workers, "must be at least 1"));
    }

    let total_work = limit.isqrt();
    let hi = (total_work + 1).max(FIRST_SEED);

    Ok(split_range(FIRST_SEED, hi, workers)
        .into_iter()
        .map(|r| SeedRange::new(r.start, r.end))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers(limit: usize, workers: usize) {
        let ranges = partition_seeds(limit, workers).unwrap();
        let total_work = limit.isqrt();

        assert_eq!(ranges.len(), workers);
        assert_eq!(ranges[0].start, FIRST_SEED);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "gap for N={} W={}", limit, workers);
        }
        for range in &ranges {
            assert!(range.start <= range.end);
        }
        for seed in FIRST_SEED..=total_work {
            let owners = ranges.iter().filter(|r| r.seeds().contains(&seed)).count();
            assert_eq!(owners, 1, "seed {} for N={} W={}", seed, limit, workers);
        }
    }

    #[test]
    fn test_single_worker_gets_everything() {
        let ranges = partition_seeds(100, 1).unwrap();
        assert_eq!(ranges, vec![SeedRange::new(2, 11)]);
    }

    #[test]
    fn test_coverage_grid() {
        for limit in 2..300 {
            for workers in 1..25 {
                assert_covers(limit, workers);
            }
        }
        assert_covers(1_000_003, 7);
    }

    #[test]
    fn test_more_workers_than_seeds_leaves_empty_ranges() {
        let ranges = partition_seeds(30, 8).unwrap();
        let busy: Vec<_> = ranges.iter().filter(|r| !r.is_empty()).collect();
        assert_eq!(ranges.iter().map(SeedRange::len).sum::<usize>(), 4);
        assert!(busy.len() <= 4);
        assert!(ranges.iter().any(SeedRange::is_empty));
    }

    #[test]
    fn test_no_seeds_for_tiny_limits() {
        for range in partition_seeds(3, 4).unwrap() {
            assert!(range.is_empty());
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            partition_seeds(30, 0),
            Err(SieveError::InvalidConfiguration { parameter: "workers", .. })
        ));
    }

    #[test]
    fn test_split_range_is_even() {
        let pieces = split_range(2, 31, 4);
        assert_eq!(pieces, vec![2..9, 9..16, 16..23, 23..31]);
    }
}
