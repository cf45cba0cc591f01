use fixedbitset::FixedBitSet;

use crate::heap::region::RegionId;

/// Tracks, per region index, whether the region is backed by committed
/// memory and whether it is part of the active index space. Active is
/// always a subset of committed; an inactive but committed region keeps
/// its memory and can be reactivated without a fresh commit.
pub struct CommittedRegionMap {
    committed: FixedBitSet,
    active: FixedBitSet,
}

impl CommittedRegionMap {
    pub fn new(capacity: usize) -> CommittedRegionMap {
        CommittedRegionMap {
            committed: FixedBitSet::with_capacity(capacity),
            active: FixedBitSet::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.committed.len()
    }

    #[inline(always)]
    pub fn active(&self, id: RegionId) -> bool {
        self.active.contains(id.to_usize())
    }

    #[inline(always)]
    pub fn committed(&self, id: RegionId) -> bool {
        self.committed.contains(id.to_usize())
    }

    pub fn num_active(&self) -> usize {
        self.active.count_ones(..)
    }

    pub fn num_committed(&self) -> usize {
        self.committed.count_ones(..)
    }

    pub fn commit(&mut self, first: RegionId, num: usize) {
        for idx in self.span(first, num) {
            assert!(!self.committed.contains(idx), "region {} already committed", idx);
            self.committed.insert(idx);
        }
    }

    pub fn activate(&mut self, first: RegionId, num: usize) {
        for idx in self.span(first, num) {
            assert!(self.committed.contains(idx), "region {} is not committed", idx);
            assert!(!self.active.contains(idx), "region {} already active", idx);
            self.active.insert(idx);
        }
    }

    pub fn deactivate(&mut self, first: RegionId, num: usize) {
        for idx in self.span(first, num) {
            assert!(self.active.contains(idx), "region {} is not active", idx);
            self.active.set(idx, false);
        }
    }

    pub fn uncommit(&mut self, first: RegionId, num: usize) {
        for idx in self.span(first, num) {
            assert!(self.committed.contains(idx), "region {} is not committed", idx);
            assert!(!self.active.contains(idx), "region {} is still active", idx);
            self.committed.set(idx, false);
        }
    }

    pub fn verify(&self) {
        for idx in self.active.ones() {
            assert!(
                self.committed.contains(idx),
                "region {} active but not committed",
                idx
            );
        }
    }

    fn span(&self, first: RegionId, num: usize) -> std::ops::Range<usize> {
        let start = first.to_usize();
        assert!(num > 0, "empty region span");
        assert!(
            start + num <= self.capacity(),
            "region span {}+{} out of bounds",
            start,
            num
        );

        start..start + num
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(idx: usize) -> RegionId {
        RegionId::from(idx)
    }

    #[test]
    fn commit_and_activate() {
        let mut map = CommittedRegionMap::new(8);
        assert_eq!(0, map.num_committed());

        map.commit(id(2), 3);
        assert!(map.committed(id(2)));
        assert!(map.committed(id(4)));
        assert!(!map.committed(id(5)));
        assert!(!map.active(id(2)));

        map.activate(id(2), 3);
        assert!(map.active(id(3)));
        assert_eq!(3, map.num_active());
        assert_eq!(3, map.num_committed());

        map.verify();
    }

    #[test]
    fn deactivate_keeps_committed() {
        let mut map = CommittedRegionMap::new(4);
        map.commit(id(0), 4);
        map.activate(id(0), 4);

        map.deactivate(id(1), 2);
        assert!(map.active(id(0)));
        assert!(!map.active(id(1)));
        assert!(map.committed(id(1)));
        assert_eq!(2, map.num_active());
        assert_eq!(4, map.num_committed());

        // Reactivation without a fresh commit.
        map.activate(id(1), 2);
        assert_eq!(4, map.num_active());

        map.verify();
    }

    #[test]
    fn uncommit_after_deactivate() {
        let mut map = CommittedRegionMap::new(4);
        map.commit(id(0), 2);
        map.activate(id(0), 2);
        map.deactivate(id(0), 2);
        map.uncommit(id(0), 2);

        assert_eq!(0, map.num_active());
        assert_eq!(0, map.num_committed());
    }

    #[test]
    fn out_of_range_is_inactive() {
        let map = CommittedRegionMap::new(4);
        assert!(!map.active(id(17)));
        assert!(!map.committed(id(17)));
    }

    #[test]
    #[should_panic(expected = "not committed")]
    fn activate_uncommitted() {
        let mut map = CommittedRegionMap::new(4);
        map.activate(id(0), 1);
    }

    #[test]
    #[should_panic(expected = "still active")]
    fn uncommit_active() {
        let mut map = CommittedRegionMap::new(4);
        map.commit(id(0), 1);
        map.activate(id(0), 1);
        map.uncommit(id(0), 1);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn span_out_of_bounds() {
        let mut map = CommittedRegionMap::new(4);
        map.commit(id(3), 2);
    }
}
