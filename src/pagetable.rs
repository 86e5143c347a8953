//! Software model of an Sv39-style page table.
//!
//! Three levels of 512-entry tables; a leaf entry packs the physical address
//! of a frame with its permission and status flags in one usize, which works
//! because physical addresses are page-aligned and every flag fits in the low
//! offset bits. The accessed and dirty bits behave like the hardware ones:
//! the user-memory access routines set them on loads and stores, and the
//! eviction and write-back paths query and clear them.

use core::marker::PhantomData;

use alloc::boxed::Box;
use array_macro::array;
use bitflags::bitflags;

use crate::addr::{Addr, PAddr, PLSIZE, MAXVA, PGSIZE, VAddr};

bitflags! {
    /// Leaf page-table entry flags.
    pub struct PteFlags: usize {
        /// Valid.
        const V = 1 << 0;
        /// Readable.
        const R = 1 << 1;
        /// Writable.
        const W = 1 << 2;
        /// Executable.
        const X = 1 << 3;
        /// Accessible by user mode.
        const U = 1 << 4;
        /// Accessed since the bit was last cleared.
        const A = 1 << 6;
        /// Written since the bit was last cleared.
        const D = 1 << 7;
    }
}

const PTE_PER_PT: usize = PLSIZE;

/// Invariant: the address part of a valid entry is the page-aligned physical
/// address of a live frame in the frame table.
#[derive(Default)]
pub struct PageTableEntry {
    inner: usize,
}

impl PageTableEntry {
    fn get_flags(&self) -> PteFlags {
        PteFlags::from_bits_truncate(self.inner)
    }

    fn flag_intersects(&self, flag: PteFlags) -> bool {
        self.get_flags().intersects(flag)
    }

    fn get_pa(&self) -> PAddr {
        PAddr::from(self.inner & !(PGSIZE - 1))
    }

    fn is_valid(&self) -> bool {
        self.flag_intersects(PteFlags::V)
    }

    /// Make the entry refer to a given address with a given permission.
    fn set_entry(&mut self, pa: PAddr, perm: PteFlags) {
        assert!(pa.is_page_aligned(), "PageTableEntry::set_entry");
        self.inner = pa.into_usize() | (perm | PteFlags::V).bits();
    }

    fn set_flag(&mut self, flag: PteFlags, on: bool) {
        if on {
            self.inner |= flag.bits();
        } else {
            self.inner &= !flag.bits();
        }
    }

    /// Invalidate the entry by making every bit 0.
    fn invalidate(&mut self) {
        self.inner = 0;
    }
}

struct Leaf {
    entries: [PageTableEntry; PTE_PER_PT],
}

impl Default for Leaf {
    fn default() -> Self {
        Self {
            entries: array![_ => PageTableEntry::default(); PTE_PER_PT],
        }
    }
}

struct Mid {
    slots: [Option<Box<Leaf>>; PTE_PER_PT],
}

impl Default for Mid {
    fn default() -> Self {
        Self {
            slots: array![_ => None; PTE_PER_PT],
        }
    }
}

struct Top {
    slots: [Option<Box<Mid>>; PTE_PER_PT],
}

impl Default for Top {
    fn default() -> Self {
        Self {
            slots: array![_ => None; PTE_PER_PT],
        }
    }
}

/// Per-process page table. Leaf mappings are created by `set` and removed by
/// `clear`; intermediate tables are allocated on demand and freed with the
/// whole table.
pub struct PageTable<A: VAddr> {
    root: Box<Top>,
    _marker: PhantomData<A>,
}

impl<A: VAddr> PageTable<A> {
    pub fn new() -> Self {
        Self {
            root: Box::new(Top::default()),
            _marker: PhantomData,
        }
    }

    /// Return the entry in this page table that corresponds to virtual
    /// address `va`. If `alloc` is true, create any required intermediate
    /// tables on the way down.
    fn get_mut(&mut self, va: A, alloc: bool) -> Option<&mut PageTableEntry> {
        assert!(va.into_usize() < MAXVA, "PageTable::get_mut");
        let slot = &mut self.root.slots[va.page_table_index(2)];
        if slot.is_none() {
            if !alloc {
                return None;
            }
            *slot = Some(Box::new(Mid::default()));
        }
        let mid = slot.as_mut()?;
        let slot = &mut mid.slots[va.page_table_index(1)];
        if slot.is_none() {
            if !alloc {
                return None;
            }
            *slot = Some(Box::new(Leaf::default()));
        }
        let leaf = slot.as_mut()?;
        Some(&mut leaf.entries[va.page_table_index(0)])
    }

    fn get_ref(&self, va: A) -> Option<&PageTableEntry> {
        assert!(va.into_usize() < MAXVA, "PageTable::get_ref");
        let mid = self.root.slots[va.page_table_index(2)].as_ref()?;
        let leaf = mid.slots[va.page_table_index(1)].as_ref()?;
        Some(&leaf.entries[va.page_table_index(0)])
    }

    /// The physical address and flags mapped at `va`, if any.
    pub fn probe(&self, va: A) -> Option<(PAddr, PteFlags)> {
        let pte = self.get_ref(va)?;
        if !pte.is_valid() {
            return None;
        }
        Some((pte.get_pa(), pte.get_flags()))
    }

    /// The physical address mapped at `va`, if any.
    pub fn get(&self, va: A) -> Option<PAddr> {
        self.probe(va).map(|(pa, _)| pa)
    }

    /// Install a user mapping from `va` to `pa`. The entry must not already
    /// be valid.
    pub fn set(&mut self, va: A, pa: PAddr, writable: bool) {
        assert!(va.is_page_aligned(), "PageTable::set");
        let mut perm = PteFlags::R | PteFlags::U;
        if writable {
            perm |= PteFlags::W;
        }
        let pte = self
            .get_mut(va, true)
            .expect("PageTable::set: walk failed");
        assert!(!pte.is_valid(), "PageTable::set: remap");
        pte.set_entry(pa, perm);
    }

    /// Remove the mapping at `va`, returning the physical address it held.
    pub fn clear(&mut self, va: A) -> Option<PAddr> {
        let pte = self.get_mut(va, false)?;
        if !pte.is_valid() {
            return None;
        }
        let pa = pte.get_pa();
        pte.invalidate();
        Some(pa)
    }

    pub fn is_dirty(&self, va: A) -> bool {
        self.get_ref(va)
            .map_or(false, |pte| pte.flag_intersects(PteFlags::D))
    }

    pub fn set_dirty(&mut self, va: A, on: bool) {
        if let Some(pte) = self.get_mut(va, false) {
            pte.set_flag(PteFlags::D, on);
        }
    }

    pub fn is_accessed(&self, va: A) -> bool {
        self.get_ref(va)
            .map_or(false, |pte| pte.flag_intersects(PteFlags::A))
    }

    pub fn set_accessed(&mut self, va: A, on: bool) {
        if let Some(pte) = self.get_mut(va, false) {
            pte.set_flag(PteFlags::A, on);
        }
    }
}

impl<A: VAddr> Default for PageTable<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::UVAddr;

    fn va(n: usize) -> UVAddr {
        UVAddr::from(n * PGSIZE)
    }

    #[test]
    fn map_and_unmap() {
        let mut pt = PageTable::<UVAddr>::new();
        assert!(pt.get(va(1)).is_none());
        pt.set(va(1), PAddr::from_pfn(7), true);
        let (pa, flags) = pt.probe(va(1)).unwrap();
        assert_eq!(pa.pfn(), 7);
        assert!(flags.contains(PteFlags::V | PteFlags::R | PteFlags::W | PteFlags::U));
        assert_eq!(pt.clear(va(1)).unwrap().pfn(), 7);
        assert!(pt.get(va(1)).is_none());
        assert!(pt.clear(va(1)).is_none());
    }

    #[test]
    fn read_only_mapping_has_no_write_bit() {
        let mut pt = PageTable::<UVAddr>::new();
        pt.set(va(2), PAddr::from_pfn(3), false);
        let (_, flags) = pt.probe(va(2)).unwrap();
        assert!(!flags.contains(PteFlags::W));
    }

    #[test]
    fn status_bits() {
        let mut pt = PageTable::<UVAddr>::new();
        pt.set(va(4), PAddr::from_pfn(1), true);
        assert!(!pt.is_accessed(va(4)));
        assert!(!pt.is_dirty(va(4)));
        pt.set_accessed(va(4), true);
        pt.set_dirty(va(4), true);
        assert!(pt.is_accessed(va(4)));
        assert!(pt.is_dirty(va(4)));
        pt.set_accessed(va(4), false);
        assert!(!pt.is_accessed(va(4)));
        assert!(pt.is_dirty(va(4)));
    }

    #[test]
    #[should_panic]
    fn remap_panics() {
        let mut pt = PageTable::<UVAddr>::new();
        pt.set(va(9), PAddr::from_pfn(1), true);
        pt.set(va(9), PAddr::from_pfn(2), true);
    }

    #[test]
    fn distant_addresses_do_not_collide() {
        let mut pt = PageTable::<UVAddr>::new();
        let low = UVAddr::from(PGSIZE);
        let high = UVAddr::from(MAXVA - PGSIZE);
        pt.set(low, PAddr::from_pfn(1), true);
        pt.set(high, PAddr::from_pfn(2), true);
        assert_eq!(pt.get(low).unwrap().pfn(), 1);
        assert_eq!(pt.get(high).unwrap().pfn(), 2);
    }
}
