use std::collections::HashSet;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Replay guard with O(1) memory over time: two generations of entries,
/// rotated on a fixed cycle. An entry is remembered for between one and
/// two cycle intervals, never less.
///
/// Rotation happens lazily on access, so an idle set costs nothing.
#[derive(Debug)]
pub struct AgingSet<T> {
    cycle: Duration,
    last_rotation: Instant,
    fresh: HashSet<T>,
    stale: HashSet<T>,
}

impl<T: Eq + Hash> AgingSet<T> {
    pub fn new(cycle: Duration) -> Self {
        AgingSet {
            cycle,
            last_rotation: Instant::now(),
            fresh: HashSet::new(),
            stale: HashSet::new(),
        }
    }

    /// Records `value`, returning `false` if it was seen within the
    /// remembered window (a replay).
    pub fn insert(&mut self, value: T) -> bool {
        self.rotate_if_due(Instant::now());
        let seen = self.fresh.contains(&value) || self.stale.contains(&value);
        self.fresh.insert(value);
        !seen
    }

    /// Whether `value` was seen within the remembered window, without
    /// recording it.
    pub fn contains(&mut self, value: &T) -> bool {
        self.rotate_if_due(Instant::now());
        self.fresh.contains(value) || self.stale.contains(value)
    }

    pub fn len(&self) -> usize {
        self.fresh.len() + self.stale.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fresh.is_empty() && self.stale.is_empty()
    }

    fn rotate_if_due(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_rotation);
        if elapsed >= self.cycle.saturating_mul(2) {
            // More than two idle cycles: everything has aged out.
            self.fresh.clear();
            self.stale.clear();
            self.last_rotation = now;
        } else if elapsed >= self.cycle {
            self.rotate();
            self.last_rotation = now;
        }
    }

    /// Swaps generations, discarding the vacated one.
    pub(crate) fn rotate(&mut self) {
        self.stale = std::mem::take(&mut self.fresh);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_cycle() -> AgingSet<u32> {
        // Long enough that time never rotates during a test run.
        AgingSet::new(Duration::from_secs(3600))
    }

    #[test]
    fn repeats_within_a_cycle_are_replays() {
        let mut set = long_cycle();
        assert!(set.insert(1));
        assert!(!set.insert(1));
        assert!(set.insert(2));
    }

    #[test]
    fn contains_checks_without_recording() {
        let mut set = long_cycle();
        assert!(!set.contains(&1));
        assert!(set.is_empty(), "a lookup must not record the entry");
        assert!(set.insert(1));
        assert!(set.contains(&1));
    }

    #[test]
    fn entries_survive_one_rotation() {
        let mut set = long_cycle();
        assert!(set.insert(1));
        set.rotate();
        assert!(!set.insert(1), "entry one cycle old must be remembered");
    }

    #[test]
    fn entries_age_out_after_two_rotations() {
        let mut set = long_cycle();
        assert!(set.insert(1));
        set.rotate();
        set.rotate();
        assert!(set.insert(1), "entry two cycles old must be forgotten");
    }

    #[test]
    fn reinsertion_refreshes_the_entry() {
        let mut set = long_cycle();
        assert!(set.insert(1));
        set.rotate();
        assert!(!set.insert(1));
        set.rotate();
        // Seen again during the second cycle, so still remembered.
        assert!(!set.insert(1));
    }

    #[test]
    fn rotation_discards_the_vacated_generation() {
        let mut set = long_cycle();
        set.insert(1);
        set.insert(2);
        set.rotate();
        set.insert(3);
        assert_eq!(set.len(), 3);
        set.rotate();
        assert_eq!(set.len(), 1);
    }
}
