//! Whole-VM consistency checks.
//!
//! Walks every address space and every frame and asserts the structural
//! invariants the rest of the module relies on. Debug aid; the end-to-end
//! tests run it after each interesting step.

use hashbrown::HashSet;

use crate::addr::Addr;
use crate::memlayout::STACKBOTTOM;
use crate::pagetable::PteFlags;
use crate::param::NFRAME;
use crate::vm::page::PageKind;
use crate::vm::Vm;

impl Vm {
    /// Panics when any cross-structure invariant is broken.
    pub fn validate(&self) {
        let spaces = self.spaces.lock();
        let frames = self.frames.lock();
        let kmem = self.kmem.lock();
        let swap = self.swap.lock();

        assert_eq!(
            frames.in_use() + kmem.unused(),
            NFRAME,
            "pool pages leaked or duplicated"
        );

        let mut held_slots = HashSet::new();
        for id in spaces.ids() {
            let space = spaces.get(id);
            for page in space.spt.pages() {
                let va = page.va();
                if page.is_stack() {
                    assert!(
                        va.into_usize() >= STACKBOTTOM,
                        "stack page below the stack window"
                    );
                }
                match page.frame() {
                    Some(fid) => {
                        let frame = frames.get(fid);
                        assert_eq!(
                            frame.owner(),
                            Some((id, va)),
                            "frame back-reference disagrees with page"
                        );
                        let (pa, flags) = space
                            .pt
                            .probe(va)
                            .expect("resident page has no hardware mapping");
                        assert_eq!(pa.pfn(), fid, "hardware mapping names another frame");
                        assert_eq!(
                            flags.contains(PteFlags::W),
                            page.writable(),
                            "hardware writable bit disagrees with page"
                        );
                        if let PageKind::Anon(a) = &page.kind {
                            assert!(a.slot.is_none(), "resident anon page holds a swap slot");
                        }
                    }
                    None => {
                        assert!(
                            space.pt.probe(va).is_none(),
                            "non-resident page still mapped at {:#x}",
                            va.into_usize()
                        );
                        if let PageKind::Anon(a) = &page.kind {
                            if let Some(slot) = a.slot {
                                assert!(swap.holds(slot), "swapped page holds a free slot");
                                assert!(
                                    held_slots.insert(slot.index()),
                                    "swap slot {} held by two pages",
                                    slot.index()
                                );
                            }
                        }
                    }
                }
            }
        }

        for fid in frames.ids() {
            let frame = frames.get(fid);
            if let Some((id, va)) = frame.owner() {
                let page = spaces
                    .get(id)
                    .spt
                    .find(va)
                    .expect("frame owned by a page that does not exist");
                assert_eq!(
                    page.frame(),
                    Some(fid),
                    "page does not know about its frame"
                );
            }
        }
    }
}
