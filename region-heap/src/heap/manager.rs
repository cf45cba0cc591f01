use crate::heap::committed::CommittedRegionMap;
use crate::heap::freelist::FreeRegionList;
use crate::heap::region::{HeapRegion, RegionId};
use crate::heap::table::RegionTable;
use crate::heap::{Address, HeapFlags, Region, REGION_SIZE};
use crate::os::{self, MemoryPermission, Reservation};

/// Composes the region table, the committed-region map and the free
/// list, and keeps the three views consistent. Queries never cache
/// availability; mutators require exclusive access and assert their
/// preconditions instead of reporting errors.
pub struct HeapRegionManager {
    regions: RegionTable,
    committed_map: CommittedRegionMap,
    free_list: FreeRegionList,

    reservation: Reservation,
}

impl HeapRegionManager {
    pub fn new(args: &HeapFlags) -> HeapRegionManager {
        let max_heap_size = args.max_heap_size();
        let num_regions = max_heap_size / REGION_SIZE;

        let reservation = os::reserve_align(max_heap_size, REGION_SIZE);
        let regions = RegionTable::new(reservation.start(), num_regions);

        HeapRegionManager {
            regions,
            committed_map: CommittedRegionMap::new(num_regions),
            free_list: FreeRegionList::new(num_regions),
            reservation,
        }
    }

    pub fn capacity(&self) -> usize {
        self.regions.len()
    }

    pub fn heap_bottom(&self) -> Address {
        self.regions.bottom()
    }

    pub fn heap_end(&self) -> Address {
        self.regions.end()
    }

    pub fn reserved(&self) -> Region {
        Region::new(self.reservation.start(), self.regions.end())
    }

    #[inline(always)]
    pub fn is_available(&self, id: RegionId) -> bool {
        self.committed_map.active(id)
    }

    #[inline(always)]
    pub fn is_committed(&self, id: RegionId) -> bool {
        self.committed_map.committed(id)
    }

    pub fn num_available_regions(&self) -> usize {
        self.committed_map.num_active()
    }

    pub fn num_committed_regions(&self) -> usize {
        self.committed_map.num_committed()
    }

    pub fn num_free_regions(&self) -> usize {
        self.free_list.len()
    }

    pub fn addr_to_region(&self, addr: Address) -> &HeapRegion {
        debug_assert!(addr < self.heap_end(), "addr: {} end: {}", addr, self.heap_end());
        debug_assert!(
            addr >= self.heap_bottom(),
            "addr: {} bottom: {}",
            addr,
            self.heap_bottom()
        );

        self.regions.get_by_address(addr)
    }

    pub fn at(&self, id: RegionId) -> &HeapRegion {
        debug_assert!(self.is_available(id), "region {} is not available", id);

        let region = self.regions.get_by_index(id);
        debug_assert!(
            region.index() == id,
            "region table returned region {} for index {}",
            region.index(),
            id
        );

        region
    }

    /// Checked variant of `at`: never asserts on unavailability.
    pub fn get(&self, id: RegionId) -> Option<&HeapRegion> {
        if !self.is_available(id) {
            return None;
        }

        let region = self.regions.get_by_index(id);
        debug_assert!(
            region.index() == id,
            "all available regions must have a matching table entry but index {} has not",
            id
        );

        Some(region)
    }

    /// Steps forward to the next continuation region of a humongous
    /// object. The chain ends at the heap capacity, at the first
    /// unavailable index, or at the first region that does not continue
    /// the object.
    pub fn next_region_in_humongous(&self, region: &HeapRegion) -> Option<&HeapRegion> {
        let index = region.index();
        debug_assert!(self.is_available(index), "region {} is not available", index);
        debug_assert!(
            region.is_humongous(),
            "region {} is not part of a humongous object",
            index
        );

        let next = RegionId::from(index.to_usize() + 1);

        if next.to_usize() < self.capacity()
            && self.is_available(next)
            && self.at(next).is_continues_humongous()
        {
            Some(self.at(next))
        } else {
            None
        }
    }

    pub fn insert_into_free_list(&mut self, id: RegionId) {
        debug_assert!(self.is_available(id), "inserting unavailable region {}", id);
        debug_assert!(
            self.regions.get_by_index(id).is_free(),
            "inserting region {} that is not free",
            id
        );

        self.free_list.add_ordered(id);
    }

    /// Removes the contiguous run of `num` free regions starting at
    /// `first` from the free list and returns the first region. The run
    /// must be fully free-listed; partial removal never happens.
    pub fn allocate_free_regions_starting_at(&mut self, first: RegionId, num: usize) -> &HeapRegion {
        debug_assert!(self.is_available(first), "region {} is not available", first);

        self.free_list.remove_starting_at(first, num);
        self.at(first)
    }

    /// Lowest run of `num` consecutive indices in the free list.
    pub fn find_contiguous_in_free_list(&self, num: usize) -> Option<RegionId> {
        assert!(num > 0, "empty region run");

        let mut run_start: Option<RegionId> = None;
        let mut run_len = 0;

        for id in self.free_list.iter() {
            match run_start {
                Some(start) if id.to_usize() == start.to_usize() + run_len => run_len += 1,
                _ => {
                    run_start = Some(id);
                    run_len = 1;
                }
            }

            if run_len == num {
                return run_start;
            }
        }

        None
    }

    /// Commits and activates `num` regions starting at `first` and adds
    /// them to the free list. The span must be uncommitted.
    pub fn make_regions_available(&mut self, first: RegionId, num: usize) {
        let start = self.regions.get_by_index(first).bottom();
        os::commit_at(start, num * REGION_SIZE, MemoryPermission::ReadWrite);

        self.committed_map.commit(first, num);
        self.committed_map.activate(first, num);
        self.reset_and_insert(first, num);
    }

    /// Removes `num` free regions starting at `first` from the active
    /// index space. Their memory stays committed.
    pub fn deactivate_regions(&mut self, first: RegionId, num: usize) {
        self.free_list.remove_starting_at(first, num);
        self.committed_map.deactivate(first, num);
    }

    /// Reactivates committed but inactive regions without a fresh commit.
    pub fn reactivate_regions(&mut self, first: RegionId, num: usize) {
        self.committed_map.activate(first, num);
        self.reset_and_insert(first, num);
    }

    /// Releases the backing memory of committed, inactive regions.
    pub fn uncommit_regions(&mut self, first: RegionId, num: usize) {
        self.committed_map.uncommit(first, num);

        let start = self.regions.get_by_index(first).bottom();
        os::discard(start, num * REGION_SIZE);
    }

    pub fn iterate_available<F>(&self, mut f: F)
    where
        F: FnMut(&HeapRegion),
    {
        for idx in 0..self.capacity() {
            let id = RegionId::from(idx);

            if self.is_available(id) {
                f(self.regions.get_by_index(id));
            }
        }
    }

    pub fn iterate_free_list<F>(&self, mut f: F)
    where
        F: FnMut(RegionId),
    {
        for id in self.free_list.iter() {
            f(id);
        }
    }

    /// Checks that the three views of region state agree.
    pub fn verify(&self) {
        self.committed_map.verify();
        self.free_list.verify();

        let reserved = self.reserved();

        for idx in 0..self.capacity() {
            let id = RegionId::from(idx);

            if !self.is_available(id) {
                assert!(
                    !self.free_list.contains(id),
                    "unavailable region {} in free list",
                    id
                );
                continue;
            }

            let region = self.regions.get_by_index(id);
            assert_eq!(id, region.index(), "region table entry {} out of place", id);
            assert!(
                reserved.fully_contains(&region.area()),
                "region {} outside the reservation",
                id
            );

            if self.free_list.contains(id) {
                assert!(
                    region.is_free(),
                    "free-listed region {} has kind {}",
                    id,
                    region.kind().name()
                );
            }

            if region.is_continues_humongous() {
                assert!(idx > 0, "continuation region {} at heap bottom", id);

                let prev = RegionId::from(idx - 1);
                assert!(
                    self.is_available(prev) && self.regions.get_by_index(prev).is_humongous(),
                    "continuation region {} does not follow a humongous region",
                    id
                );
            }
        }
    }

    fn reset_and_insert(&mut self, first: RegionId, num: usize) {
        for idx in 0..num {
            let id = RegionId::from(first.to_usize() + idx);
            let region = self.regions.get_by_index(id);

            region.set_free();
            region.reset_top();

            self.free_list.add_ordered(id);
        }
    }
}
