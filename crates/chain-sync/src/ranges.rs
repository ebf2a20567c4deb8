//! Block-range arithmetic shared by historical sync: subtracting cached
//! ranges from a required range, and partitioning the remainder into
//! `maxBlockRange`-sized log-fetch tasks (§4.2 steps 3-4).

/// An inclusive `[start, end]` block-number range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "range start must not exceed end");
        Self { start, end }
    }
}

/// Subtracts `cached` (assumed disjoint, sorted ascending by `start`) from
/// `required`, returning the gaps still needing a fetch.
pub fn subtract_cached(required: BlockRange, cached: &[BlockRange]) -> Vec<BlockRange> {
    let mut gaps = Vec::new();
    let mut cursor = required.start;

    for range in cached {
        if range.end < cursor || range.start > required.end {
            continue;
        }
        if range.start > cursor {
            gaps.push(BlockRange::new(cursor, range.start - 1));
        }
        cursor = cursor.max(range.end.saturating_add(1));
        if cursor > required.end {
            break;
        }
    }

    if cursor <= required.end {
        gaps.push(BlockRange::new(cursor, required.end));
    }

    gaps
}

/// Splits `range` into consecutive chunks of at most `max_block_range`
/// blocks each (boundary case: `fromBlock == toBlock` yields a single
/// one-block task, §8).
pub fn partition(range: BlockRange, max_block_range: u64) -> Vec<BlockRange> {
    debug_assert!(max_block_range > 0, "max_block_range must be positive");
    let mut tasks = Vec::new();
    let mut start = range.start;
    while start <= range.end {
        let end = start.saturating_add(max_block_range - 1).min(range.end);
        tasks.push(BlockRange::new(start, end));
        if end == range.end {
            break;
        }
        start = end + 1;
    }
    tasks
}

/// Splits a single range in half, for the "range too large" retry path
/// (§7, §8 scenario 4). Returns `(lower, upper)`.
pub fn split_in_half(range: BlockRange) -> (BlockRange, BlockRange) {
    let width = range.end - range.start + 1;
    let lower_width = width.div_ceil(2);
    let mid = range.start + lower_width - 1;
    (
        BlockRange::new(range.start, mid),
        BlockRange::new(mid + 1, range.end),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtract_with_no_cached_ranges_returns_whole_range() {
        let gaps = subtract_cached(BlockRange::new(0, 100), &[]);
        assert_eq!(gaps, vec![BlockRange::new(0, 100)]);
    }

    #[test]
    fn subtract_removes_fully_covered_middle_range() {
        let gaps = subtract_cached(BlockRange::new(0, 100), &[BlockRange::new(40, 60)]);
        assert_eq!(gaps, vec![BlockRange::new(0, 39), BlockRange::new(61, 100)]);
    }

    #[test]
    fn subtract_handles_range_covering_the_entire_requirement() {
        let gaps = subtract_cached(BlockRange::new(10, 20), &[BlockRange::new(0, 100)]);
        assert!(gaps.is_empty());
    }

    #[test]
    fn partition_splits_into_max_sized_chunks() {
        let tasks = partition(BlockRange::new(100, 102), 10);
        assert_eq!(tasks, vec![BlockRange::new(100, 102)]);

        let tasks = partition(BlockRange::new(0, 25), 10);
        assert_eq!(
            tasks,
            vec![
                BlockRange::new(0, 9),
                BlockRange::new(10, 19),
                BlockRange::new(20, 25),
            ]
        );
    }

    #[test]
    fn partition_one_block_range_is_a_single_task() {
        let tasks = partition(BlockRange::new(5, 5), 10);
        assert_eq!(tasks, vec![BlockRange::new(5, 5)]);
    }

    #[test]
    fn split_in_half_matches_expected_boundaries() {
        let (lower, upper) = split_in_half(BlockRange::new(1_000_000, 1_050_000));
        assert_eq!(lower, BlockRange::new(1_000_000, 1_025_000));
        assert_eq!(upper, BlockRange::new(1_025_001, 1_050_000));
    }
}
