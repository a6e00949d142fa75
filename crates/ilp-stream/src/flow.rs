use std::collections::BTreeMap;

/// A set of disjoint half-open ranges `[start, end)` over byte offsets.
///
/// Supports out-of-order acknowledgement: overlapping or adjacent adds
/// merge instead of double-counting.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RangeSet {
    ranges: BTreeMap<u64, u64>,
}

impl RangeSet {
    pub fn new() -> Self {
        RangeSet::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn add(&mut self, start: u64, end: u64) {
        if start >= end {
            return;
        }
        let mut start = start;
        let mut end = end;

        // Absorb a predecessor that reaches (or touches) the new start.
        if let Some((&prev_start, &prev_end)) = self.ranges.range(..=start).next_back() {
            if prev_end >= start {
                start = prev_start;
                end = end.max(prev_end);
                self.ranges.remove(&prev_start);
            }
        }

        // Absorb every range beginning inside the (grown) new range.
        let overlapping: Vec<u64> = self
            .ranges
            .range(start..=end)
            .map(|(&other_start, _)| other_start)
            .collect();
        for other_start in overlapping {
            if let Some(other_end) = self.ranges.remove(&other_start) {
                end = end.max(other_end);
            }
        }

        self.ranges.insert(start, end);
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.ranges
            .range(..=offset)
            .next_back()
            .map(|(_, &end)| offset < end)
            .unwrap_or(false)
    }

    /// Total number of covered offsets.
    pub fn total(&self) -> u64 {
        self.ranges.iter().map(|(start, end)| end - start).sum()
    }

    /// Length of the contiguous run starting at offset zero.
    pub fn contiguous_prefix(&self) -> u64 {
        match self.ranges.iter().next() {
            Some((&0, &end)) => end,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_adds_never_double_count() {
        let mut set = RangeSet::new();
        set.add(0, 10);
        set.add(5, 15);
        set.add(0, 3);
        assert_eq!(set.total(), 15);
        assert_eq!(set.contiguous_prefix(), 15);
    }

    #[test]
    fn disjoint_ranges_stay_disjoint() {
        let mut set = RangeSet::new();
        set.add(10, 20);
        set.add(30, 40);
        assert_eq!(set.total(), 20);
        assert_eq!(set.contiguous_prefix(), 0);
        assert!(set.contains(15));
        assert!(!set.contains(20));
        assert!(!set.contains(25));
    }

    #[test]
    fn adjacent_ranges_merge() {
        let mut set = RangeSet::new();
        set.add(0, 5);
        set.add(5, 10);
        assert_eq!(set.ranges.len(), 1);
        assert_eq!(set.contiguous_prefix(), 10);
    }

    #[test]
    fn a_bridge_merges_everything_it_spans() {
        let mut set = RangeSet::new();
        set.add(0, 2);
        set.add(4, 6);
        set.add(8, 10);
        set.add(1, 9);
        assert_eq!(set.ranges.len(), 1);
        assert_eq!(set.total(), 10);
    }

    #[test]
    fn out_of_order_arrival_completes_the_prefix() {
        let mut set = RangeSet::new();
        set.add(100, 200);
        assert_eq!(set.contiguous_prefix(), 0);
        set.add(0, 100);
        assert_eq!(set.contiguous_prefix(), 200);
        assert_eq!(set.total(), 200);
    }

    #[test]
    fn empty_ranges_are_ignored() {
        let mut set = RangeSet::new();
        set.add(5, 5);
        set.add(7, 6);
        assert!(set.is_empty());
        assert_eq!(set.total(), 0);
    }
}
