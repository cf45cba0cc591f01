use crate::heap::region::RegionId;

#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
struct Link {
    prev: Option<RegionId>,
    next: Option<RegionId>,
    linked: bool,
}

/// Ordered list of free regions, threaded through a per-index link
/// array. Kept in ascending index order: the head is always the free
/// region with the lowest index, and a run of consecutive free indices
/// is adjacent in the list.
pub struct FreeRegionList {
    head: Option<RegionId>,
    tail: Option<RegionId>,
    links: Vec<Link>,
    len: usize,

    // Insertion point hint: additions often come in ascending index order.
    last_added: Option<RegionId>,
}

impl FreeRegionList {
    pub fn new(capacity: usize) -> FreeRegionList {
        FreeRegionList {
            head: None,
            tail: None,
            links: vec![Link::default(); capacity],
            len: 0,
            last_added: None,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn first(&self) -> Option<RegionId> {
        self.head
    }

    #[inline(always)]
    pub fn contains(&self, id: RegionId) -> bool {
        self.links[id.to_usize()].linked
    }

    /// Inserts a region, preserving ascending index order.
    pub fn add_ordered(&mut self, id: RegionId) {
        assert!(
            !self.links[id.to_usize()].linked,
            "region {} already in free list",
            id
        );

        let mut prev = None;
        let mut cursor = self.head;

        if let Some(last) = self.last_added {
            if last < id && self.links[last.to_usize()].linked {
                prev = Some(last);
                cursor = self.links[last.to_usize()].next;
            }
        }

        while let Some(current) = cursor {
            if current > id {
                break;
            }

            prev = Some(current);
            cursor = self.links[current.to_usize()].next;
        }

        self.insert_between(prev, id, cursor);
        self.last_added = Some(id);
        self.len += 1;
    }

    /// Removes the run of `num` regions with consecutive indices starting
    /// at `first`. The whole run must be in the list; partial removal
    /// never happens.
    pub fn remove_starting_at(&mut self, first: RegionId, num: usize) {
        assert!(num > 0, "empty region run");

        for idx in 0..num {
            let id = RegionId::from(first.to_usize() + idx);
            assert!(self.contains(id), "region {} is not in the free list", id);
        }

        // All members are listed; ascending order makes them adjacent.
        for idx in 0..num - 1 {
            let id = RegionId::from(first.to_usize() + idx);
            let next = RegionId::from(first.to_usize() + idx + 1);
            assert_eq!(
                Some(next),
                self.links[id.to_usize()].next,
                "free run starting at {} is not contiguous",
                first
            );
        }

        for idx in 0..num {
            self.unlink(RegionId::from(first.to_usize() + idx));
        }
    }

    pub fn iter(&self) -> FreeRegionIter<'_> {
        FreeRegionIter {
            list: self,
            cursor: self.head,
        }
    }

    pub fn verify(&self) {
        let mut count = 0;
        let mut last: Option<RegionId> = None;
        let mut cursor = self.head;

        while let Some(id) = cursor {
            let link = self.links[id.to_usize()];

            assert!(link.linked, "region {} linked without flag", id);
            assert_eq!(last, link.prev, "broken prev link at region {}", id);

            if let Some(last) = last {
                assert!(last < id, "free list not in ascending order at region {}", id);
            }

            last = Some(id);
            count += 1;
            cursor = link.next;
        }

        assert_eq!(self.tail, last, "broken tail link");
        assert_eq!(self.len, count, "free list length out of sync");
    }

    fn insert_between(&mut self, prev: Option<RegionId>, id: RegionId, next: Option<RegionId>) {
        self.links[id.to_usize()] = Link {
            prev,
            next,
            linked: true,
        };

        match prev {
            Some(prev) => self.links[prev.to_usize()].next = Some(id),
            None => self.head = Some(id),
        }

        match next {
            Some(next) => self.links[next.to_usize()].prev = Some(id),
            None => self.tail = Some(id),
        }
    }

    fn unlink(&mut self, id: RegionId) {
        let idx = id.to_usize();
        assert!(self.links[idx].linked, "region {} is not in the free list", id);

        let Link { prev, next, .. } = self.links[idx];

        match prev {
            Some(prev) => self.links[prev.to_usize()].next = next,
            None => self.head = next,
        }

        match next {
            Some(next) => self.links[next.to_usize()].prev = prev,
            None => self.tail = prev,
        }

        self.links[idx] = Link::default();

        if self.last_added == Some(id) {
            self.last_added = prev;
        }

        self.len -= 1;
    }
}

pub struct FreeRegionIter<'a> {
    list: &'a FreeRegionList,
    cursor: Option<RegionId>,
}

impl<'a> Iterator for FreeRegionIter<'a> {
    type Item = RegionId;

    fn next(&mut self) -> Option<RegionId> {
        let id = self.cursor?;
        self.cursor = self.list.links[id.to_usize()].next;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::seq::SliceRandom;

    fn id(idx: usize) -> RegionId {
        RegionId::from(idx)
    }

    fn ids(list: &FreeRegionList) -> Vec<usize> {
        list.iter().map(|id| id.to_usize()).collect()
    }

    #[test]
    fn ordered_insertion() {
        let mut list = FreeRegionList::new(8);

        list.add_ordered(id(5));
        list.add_ordered(id(1));
        list.add_ordered(id(7));
        list.add_ordered(id(3));

        assert_eq!(vec![1, 3, 5, 7], ids(&list));
        assert_eq!(4, list.len());
        assert_eq!(Some(id(1)), list.first());
        list.verify();
    }

    #[test]
    fn ascending_insertion_uses_hint() {
        let mut list = FreeRegionList::new(64);

        for idx in 0..64 {
            list.add_ordered(id(idx));
        }

        assert_eq!(64, list.len());
        assert_eq!((0..64).collect::<Vec<_>>(), ids(&list));
        list.verify();
    }

    #[test]
    fn random_insertion_order() {
        let mut order: Vec<usize> = (0..32).collect();
        order.shuffle(&mut rand::rng());

        let mut list = FreeRegionList::new(32);

        for &idx in &order {
            list.add_ordered(id(idx));
            list.verify();
        }

        assert_eq!((0..32).collect::<Vec<_>>(), ids(&list));
    }

    #[test]
    fn remove_contiguous_run() {
        let mut list = FreeRegionList::new(4);

        for idx in 0..4 {
            list.add_ordered(id(idx));
        }

        list.remove_starting_at(id(1), 2);

        assert_eq!(vec![0, 3], ids(&list));
        assert_eq!(2, list.len());
        assert!(!list.contains(id(1)));
        assert!(!list.contains(id(2)));
        list.verify();
    }

    #[test]
    fn remove_single() {
        let mut list = FreeRegionList::new(4);
        list.add_ordered(id(2));

        list.remove_starting_at(id(2), 1);

        assert!(list.is_empty());
        assert_eq!(None, list.first());
        list.verify();
    }

    #[test]
    fn reinsert_after_removal() {
        let mut list = FreeRegionList::new(8);

        for idx in 0..8 {
            list.add_ordered(id(idx));
        }

        list.remove_starting_at(id(4), 4);
        list.add_ordered(id(6));
        list.add_ordered(id(4));

        assert_eq!(vec![0, 1, 2, 3, 4, 6], ids(&list));
        list.verify();
    }

    #[test]
    #[should_panic(expected = "already in free list")]
    fn duplicate_insertion() {
        let mut list = FreeRegionList::new(4);
        list.add_ordered(id(1));
        list.add_ordered(id(1));
    }

    #[test]
    #[should_panic(expected = "not in the free list")]
    fn remove_unlisted_region() {
        let mut list = FreeRegionList::new(4);
        list.add_ordered(id(0));
        list.remove_starting_at(id(1), 1);
    }

    #[test]
    #[should_panic(expected = "not in the free list")]
    fn remove_partially_listed_run() {
        let mut list = FreeRegionList::new(4);
        list.add_ordered(id(0));
        list.add_ordered(id(1));
        list.remove_starting_at(id(0), 3);
    }

    #[test]
    fn stress_random_adds_and_removes() {
        let mut rng = rand::rng();
        let mut list = FreeRegionList::new(64);
        let mut order: Vec<usize> = (0..64).collect();

        for _ in 0..16 {
            order.shuffle(&mut rng);

            for &idx in &order {
                list.add_ordered(id(idx));
            }

            list.verify();
            assert_eq!(64, list.len());

            // Remove in runs of four: the full index space is listed, so
            // every aligned run is contiguous.
            for first in (0..64).step_by(4) {
                list.remove_starting_at(id(first), 4);
            }

            assert!(list.is_empty());
            list.verify();
        }
    }
}
