use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::heap::{Address, Region};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId(usize);

impl RegionId {
    pub fn to_usize(self) -> usize {
        self.0
    }
}

impl From<usize> for RegionId {
    fn from(val: usize) -> RegionId {
        RegionId(val)
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_usize())
    }
}

#[derive(TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Copy, Clone, Debug)]
#[repr(u8)]
pub enum RegionKind {
    Free,
    Single,
    HumongousStart,
    HumongousCont,
}

impl RegionKind {
    pub fn is_free(self) -> bool {
        self == RegionKind::Free
    }

    pub fn is_single(self) -> bool {
        self == RegionKind::Single
    }

    pub fn is_starts_humongous(self) -> bool {
        self == RegionKind::HumongousStart
    }

    pub fn is_continues_humongous(self) -> bool {
        self == RegionKind::HumongousCont
    }

    /// A humongous object spans a start region plus its continuations.
    pub fn is_humongous(self) -> bool {
        self == RegionKind::HumongousStart || self == RegionKind::HumongousCont
    }

    pub fn name(self) -> &'static str {
        match self {
            RegionKind::Free => "free",
            RegionKind::Single => "single",
            RegionKind::HumongousStart => "humongous start",
            RegionKind::HumongousCont => "humongous continuation",
        }
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub struct AtomicRegionKind {
    value: AtomicU8,
}

impl AtomicRegionKind {
    pub fn new(kind: RegionKind) -> AtomicRegionKind {
        AtomicRegionKind {
            value: AtomicU8::new(kind.into()),
        }
    }

    pub fn load(&self) -> RegionKind {
        RegionKind::try_from(self.value.load(Ordering::SeqCst)).unwrap()
    }

    pub fn store(&self, kind: RegionKind) {
        self.value.store(kind.into(), Ordering::SeqCst);
    }
}

/// A single fixed-size partition of the heap. Bounds and index are set
/// once at table construction; kind and top change over the region's
/// lifetime and are stored atomically for concurrent readers.
pub struct HeapRegion {
    index: RegionId,
    area: Region,

    kind: AtomicRegionKind,

    // Separator between used & free bytes in region.
    top: AtomicUsize,
}

impl HeapRegion {
    pub fn new(index: RegionId, area: Region) -> HeapRegion {
        HeapRegion {
            index,
            area,
            kind: AtomicRegionKind::new(RegionKind::Free),
            top: AtomicUsize::new(area.start().to_usize()),
        }
    }

    pub fn index(&self) -> RegionId {
        self.index
    }

    pub fn kind(&self) -> RegionKind {
        self.kind.load()
    }

    pub fn area(&self) -> Region {
        self.area
    }

    pub fn bottom(&self) -> Address {
        self.area.start()
    }

    pub fn end(&self) -> Address {
        self.area.end()
    }

    pub fn size(&self) -> usize {
        self.area.size()
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.area.contains(addr)
    }

    pub fn is_free(&self) -> bool {
        self.kind().is_free()
    }

    pub fn is_single(&self) -> bool {
        self.kind().is_single()
    }

    pub fn is_starts_humongous(&self) -> bool {
        self.kind().is_starts_humongous()
    }

    pub fn is_continues_humongous(&self) -> bool {
        self.kind().is_continues_humongous()
    }

    pub fn is_humongous(&self) -> bool {
        self.kind().is_humongous()
    }

    pub fn set_free(&self) {
        self.kind.store(RegionKind::Free);
    }

    pub fn set_single(&self) {
        self.kind.store(RegionKind::Single);
    }

    pub fn set_starts_humongous(&self) {
        self.kind.store(RegionKind::HumongousStart);
    }

    pub fn set_continues_humongous(&self) {
        self.kind.store(RegionKind::HumongousCont);
    }

    pub fn top(&self) -> Address {
        self.top.load(Ordering::Relaxed).into()
    }

    pub fn reset_top(&self) {
        self.top
            .store(self.area.start().to_usize(), Ordering::Relaxed);
    }

    pub fn used(&self) -> usize {
        self.top().offset_from(self.area.start())
    }

    /// Bump-pointer allocation within the region. Returns a null address
    /// when the remaining space is too small.
    pub fn allocate(&self, size: usize) -> Address {
        let mut top = self.top.load(Ordering::Relaxed);
        let limit = self.area.end().to_usize();

        loop {
            if top + size <= limit {
                let result =
                    self.top
                        .compare_exchange_weak(top, top + size, Ordering::Relaxed, Ordering::Relaxed);

                match result {
                    Ok(_) => return top.into(),
                    Err(actual_top) => {
                        top = actual_top;
                    }
                }
            } else {
                return Address::null();
            }
        }
    }
}
