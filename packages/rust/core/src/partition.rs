//! Splitting `[0, N)` into contiguous per-worker ranges.

use std::ops::Range;

/// Half-open row range `[start, end)` owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkRange {
    pub start: usize,
    pub end: usize,
}

impl WorkRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Row indices in ascending order.
    pub fn rows(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl std::fmt::Display for WorkRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Split `total` rows across `workers` ranges.
///
/// Every range is `size = max(1, total / workers)` rows wide and the last one
/// absorbs the remainder. With more workers than rows the trailing ranges are
/// empty. Returns no ranges for zero workers.
pub fn partition(total: usize, workers: usize) -> Vec<WorkRange> {
    if workers == 0 {
        return Vec::new();
    }
    let size = (total / workers).max(1);
    (0..workers)
        .map(|t| {
            let start = (t * size).min(total);
            let end = if t + 1 == workers {
                total
            } else {
                ((t + 1) * size).min(total)
            };
            WorkRange { start, end }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(ranges: &[WorkRange]) -> Vec<(usize, usize)> {
        ranges.iter().map(|r| (r.start, r.end)).collect()
    }

    #[test]
    fn balanced_split_puts_remainder_last() {
        assert_eq!(bounds(&partition(10, 3)), vec![(0, 3), (3, 6), (6, 10)]);
        assert_eq!(bounds(&partition(5, 2)), vec![(0, 2), (2, 5)]);
    }

    #[test]
    fn more_workers_than_rows_leaves_trailing_ranges_empty() {
        let ranges = partition(2, 4);
        assert_eq!(bounds(&ranges), vec![(0, 1), (1, 2), (2, 2), (2, 2)]);
        assert!(ranges[2].is_empty());
    }

    #[test]
    fn empty_input() {
        assert!(partition(0, 3).iter().all(WorkRange::is_empty));
        assert!(partition(7, 0).is_empty());
    }

    #[test]
    fn ranges_cover_input_exactly() {
        for total in 0..64 {
            for workers in 1..=8 {
                let ranges = partition(total, workers);
                assert_eq!(ranges.len(), workers);

                let mut next = 0;
                for range in &ranges {
                    assert!(range.start <= range.end, "{range} inverted");
                    if !range.is_empty() {
                        assert_eq!(range.start, next, "gap or overlap at {range}");
                        next = range.end;
                    }
                }
                assert_eq!(next, total, "N={total} W={workers}");
                assert_eq!(ranges.iter().map(WorkRange::len).sum::<usize>(), total);
            }
        }
    }
}
