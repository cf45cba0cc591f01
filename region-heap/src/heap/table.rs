use crate::heap::region::{HeapRegion, RegionId};
use crate::heap::{Address, Region, REGION_SIZE, REGION_SIZE_BITS};

/// The authoritative array of regions: every region object for the whole
/// capacity is built once, up front, against a contiguous address range.
pub struct RegionTable {
    regions: Vec<HeapRegion>,
    bottom: Address,
    end: Address,
}

impl RegionTable {
    pub fn new(bottom: Address, num_regions: usize) -> RegionTable {
        debug_assert!(bottom.is_region_aligned());

        let mut regions = Vec::with_capacity(num_regions);
        let mut next_region_start = bottom;

        for idx in 0..num_regions {
            regions.push(HeapRegion::new(
                RegionId::from(idx),
                next_region_start.region_start(REGION_SIZE),
            ));
            next_region_start = next_region_start.offset(REGION_SIZE);
        }

        RegionTable {
            regions,
            bottom,
            end: next_region_start,
        }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn bottom(&self) -> Address {
        self.bottom
    }

    pub fn end(&self) -> Address {
        self.end
    }

    pub fn get_by_index(&self, id: RegionId) -> &HeapRegion {
        &self.regions[id.to_usize()]
    }

    /// Address-to-region translation is a shift against the table base,
    /// not a search.
    pub fn get_by_address(&self, addr: Address) -> &HeapRegion {
        debug_assert!(
            addr >= self.bottom && addr < self.end,
            "addr: {} heap: {}-{}",
            addr,
            self.bottom,
            self.end
        );

        let index = addr.offset_from(self.bottom) >> REGION_SIZE_BITS;
        &self.regions[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_table(num_regions: usize) -> RegionTable {
        RegionTable::new(Address::from(64 * REGION_SIZE), num_regions)
    }

    #[test]
    fn build_regions_up_front() {
        let table = test_table(4);

        assert_eq!(4, table.len());
        assert_eq!(table.bottom().offset(4 * REGION_SIZE), table.end());

        for idx in 0..4 {
            let region = table.get_by_index(RegionId::from(idx));
            assert_eq!(idx, region.index().to_usize());
            assert_eq!(table.bottom().offset(idx * REGION_SIZE), region.bottom());
            assert_eq!(REGION_SIZE, region.size());
            assert!(region.is_free());
        }
    }

    #[test]
    fn address_lookup() {
        let table = test_table(4);
        let bottom = table.bottom();

        assert_eq!(0, table.get_by_address(bottom).index().to_usize());
        assert_eq!(
            0,
            table
                .get_by_address(bottom.offset(REGION_SIZE - 1))
                .index()
                .to_usize()
        );
        assert_eq!(
            1,
            table.get_by_address(bottom.offset(REGION_SIZE)).index().to_usize()
        );
        assert_eq!(
            3,
            table
                .get_by_address(table.end().sub(1))
                .index()
                .to_usize()
        );
    }

    #[test]
    fn address_lookup_contains_and_is_stable() {
        let table = test_table(4);
        let addr = table.bottom().offset(2 * REGION_SIZE + 4711);

        let region = table.get_by_address(addr);
        assert!(region.contains(addr));
        assert_eq!(region.index(), table.get_by_address(addr).index());
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic]
    fn address_below_heap() {
        let table = test_table(4);
        table.get_by_address(table.bottom().sub(1));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic]
    fn address_past_heap() {
        let table = test_table(4);
        table.get_by_address(table.end());
    }
}
