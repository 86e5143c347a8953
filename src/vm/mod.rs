//! Virtual memory core.
//!
//! `Vm` is the machine-global state: the user page pool, the frame table,
//! the swap map, and the registry of address spaces. Each address space
//! pairs a hardware page table with a supplemental page table and is named
//! by a `SpaceId`; the thread layer holds the id of its current process and
//! passes it into every operation here, together with the user stack
//! pointer the fault classifier needs.
//!
//! Ownership is deliberately one-directional: a supplemental page table
//! owns its logical pages, the frame table owns the physical pages on loan,
//! and the two sides refer to each other by index only. Claiming a page
//! wires the indices up and installs the hardware mapping; eviction and
//! destruction tear them down in the opposite order.
//!
//! Lock order, outermost first: `spaces`, `frames`, then `kmem` or `swap`,
//! then an inode. Public entry points take `spaces` exactly once and pass
//! the guard's contents down; no internal path re-enters it.

mod anon;
mod file;
mod frame;
mod inspect;
mod page;
mod spt;
mod uninit;

use core::cmp;

use log::{debug, trace};
use zerocopy::{AsBytes, FromBytes};

use alloc::vec::Vec;

use crate::addr::{pgrounddown, Addr, PAddr, PGSIZE, UVAddr};
use crate::file::File;
use crate::kalloc::Kmem;
use crate::lock::Spinlock;
use crate::memlayout::{is_user_vaddr, USERSTACK, USERTOP};
use crate::pagetable::{PageTable, PteFlags};
use crate::param::{NSPACE, STACKSIZE};
use crate::some_or;
use crate::swap::SwapMap;

pub use frame::{Frame, FrameId, FrameTable};
pub use page::{AnonPage, FilePage, PageInit, PageKind, PageTarget, UninitPage, VmPage};
pub use spt::Spt;

/// Name of an address space in the registry.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SpaceId(usize);

/// Per-process memory state: the hardware page table the MMU walks and the
/// supplemental page table describing every logical page, plus the lowest
/// stack page allocated so far.
pub struct AddressSpace {
    pub(crate) pt: PageTable<UVAddr>,
    pub(crate) spt: Spt,
    stack_bottom: usize,
}

impl AddressSpace {
    fn new() -> Self {
        Self {
            pt: PageTable::new(),
            spt: Spt::new(),
            stack_bottom: USERSTACK,
        }
    }
}

pub(crate) struct Spaces {
    slots: [Option<AddressSpace>; NSPACE],
}

impl Spaces {
    fn new() -> Self {
        Self {
            slots: array_macro::array![_ => None; NSPACE],
        }
    }

    pub(crate) fn get(&self, id: SpaceId) -> &AddressSpace {
        self.slots[id.0].as_ref().expect("Spaces::get: vacant slot")
    }

    pub(crate) fn get_mut(&mut self, id: SpaceId) -> &mut AddressSpace {
        self.slots[id.0]
            .as_mut()
            .expect("Spaces::get_mut: vacant slot")
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = SpaceId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| SpaceId(i))
    }

    fn alloc(&mut self) -> Option<SpaceId> {
        let id = self.slots.iter().position(|slot| slot.is_none())?;
        self.slots[id] = Some(AddressSpace::new());
        Some(SpaceId(id))
    }

    fn remove(&mut self, id: SpaceId) {
        let space = self.slots[id.0].take().expect("Spaces::remove: vacant slot");
        assert!(space.spt.is_empty(), "Spaces::remove: pages left behind");
    }
}

/// A classified memory fault, as delivered by the trap layer. `rsp` is the
/// user stack pointer from the trap frame, or the value stashed at syscall
/// entry when the fault is taken in kernel mode on a user address.
#[derive(Clone, Copy, Debug)]
pub struct Fault {
    pub addr: usize,
    pub write: bool,
    pub user: bool,
    pub present: bool,
    pub rsp: usize,
}

pub struct Vm {
    spaces: Spinlock<Spaces>,
    frames: Spinlock<FrameTable>,
    kmem: Spinlock<Kmem>,
    swap: Spinlock<SwapMap>,
}

impl Vm {
    pub fn new() -> Self {
        Self {
            spaces: Spinlock::new(Spaces::new()),
            frames: Spinlock::new(FrameTable::new()),
            kmem: Spinlock::new(Kmem::new()),
            swap: Spinlock::new(SwapMap::new()),
        }
    }

    /// Create an empty address space. `None` when the registry is full.
    pub fn create_space(&self) -> Option<SpaceId> {
        self.spaces.lock().alloc()
    }

    /// Destroy an address space at process exit: every page is destroyed,
    /// dirty file pages are written back, and all frames and swap slots are
    /// returned.
    pub fn destroy_space(&self, id: SpaceId) {
        let mut spaces = self.spaces.lock();
        self.kill(&mut spaces, id);
    }

    /// Duplicate `parent` for a fork. The child sees the same logical pages
    /// with equal contents; materialized pages get private frames, pending
    /// pages get a cloned initializer. `None` when the copy cannot be
    /// completed, in which case the partial child is torn down.
    pub fn fork_space(&self, parent: SpaceId) -> Option<SpaceId> {
        let mut spaces = self.spaces.lock();
        let child = spaces.alloc()?;
        if self.copy_space(&mut spaces, parent, child) {
            Some(child)
        } else {
            self.kill(&mut spaces, child);
            None
        }
    }

    /// Register a pending page at `va` that will become `target` on first
    /// access, with `init` producing its contents. Fails when a page
    /// already covers `va`. No frame is allocated here.
    pub fn alloc_page_with_initializer(
        &self,
        id: SpaceId,
        target: PageTarget,
        va: UVAddr,
        writable: bool,
        init: PageInit,
    ) -> bool {
        if !is_user_vaddr(va.into_usize()) {
            return false;
        }
        let mut spaces = self.spaces.lock();
        let spt = &mut spaces.get_mut(id).spt;
        if spt.find(va).is_some() {
            return false;
        }
        spt.insert(VmPage::new_uninit(va, writable, target, init))
    }

    /// Bind the page at `va` to a frame and make it resident.
    pub fn claim_page(&self, id: SpaceId, va: UVAddr) -> bool {
        let mut spaces = self.spaces.lock();
        self.claim(&mut spaces, id, va)
    }

    /// Resolve a page fault. True when the faulting access may be retried;
    /// false means the access is illegal and the process must be killed.
    pub fn try_handle_fault(&self, id: SpaceId, fault: &Fault) -> bool {
        let mut spaces = self.spaces.lock();
        self.handle(&mut spaces, id, fault)
    }

    /// Map and claim the first stack page, just below USERSTACK.
    pub fn setup_stack(&self, id: SpaceId) -> bool {
        let va = UVAddr::from(USERSTACK - PGSIZE);
        let mut spaces = self.spaces.lock();
        {
            let space = spaces.get_mut(id);
            let page = VmPage::new_uninit(
                va,
                true,
                PageTarget::Anon { stack: true },
                PageInit::Zero,
            );
            if !space.spt.insert(page) {
                return false;
            }
            space.stack_bottom = va.into_usize();
        }
        self.claim(&mut spaces, id, va)
    }

    /// Register the pages of an executable segment for lazy loading:
    /// `read_bytes` bytes of `file` at `offset`, then `zero_bytes` zero
    /// bytes, starting at page-aligned `va`. The pages are anonymous once
    /// materialized; they swap to the swap device, not back to the file.
    pub fn load_segment(
        &self,
        id: SpaceId,
        file: &File,
        offset: usize,
        va: UVAddr,
        read_bytes: usize,
        zero_bytes: usize,
        writable: bool,
    ) -> bool {
        assert!(va.is_page_aligned(), "load_segment: va");
        assert!(offset % PGSIZE == 0, "load_segment: offset");
        assert!(
            (read_bytes + zero_bytes) % PGSIZE == 0,
            "load_segment: length"
        );
        assert!(
            va.into_usize() + read_bytes + zero_bytes <= USERTOP,
            "load_segment: segment leaves user space"
        );
        let handle = file.reopen();
        let mut remaining = read_bytes;
        let mut off = offset;
        let mut spaces = self.spaces.lock();
        let base = va.into_usize();
        for page_va in num_iter::range_step(base, base + read_bytes + zero_bytes, PGSIZE) {
            let page_read_bytes = cmp::min(remaining, PGSIZE);
            let init = if page_read_bytes == 0 {
                PageInit::Zero
            } else {
                PageInit::FromFile {
                    file: handle.clone(),
                    offset: off,
                    read_bytes: page_read_bytes,
                    span: None,
                }
            };
            let page = VmPage::new_uninit(
                UVAddr::from(page_va),
                writable,
                PageTarget::Anon { stack: false },
                init,
            );
            if !spaces.get_mut(id).spt.insert(page) {
                return false;
            }
            remaining -= page_read_bytes;
            off += page_read_bytes;
        }
        true
    }

    /// Number of logical pages an address space currently tracks.
    pub fn page_count(&self, id: SpaceId) -> usize {
        self.spaces.lock().get(id).spt.len()
    }

    /// Copy from kernel to user, faulting pages in like the MMU would.
    /// Copy `src` to virtual address `dstva`.
    /// Return Ok(()) on success, Err(()) when the access is illegal.
    pub fn copy_out_bytes(
        &self,
        id: SpaceId,
        rsp: usize,
        dstva: usize,
        src: &[u8],
    ) -> Result<(), ()> {
        let mut dst = dstva;
        let mut offset = 0;
        let mut len = src.len();
        while len > 0 {
            let va = pgrounddown(dst);
            let poffset = dst - va;
            let n = cmp::min(PGSIZE - poffset, len);
            self.user_page(id, rsp, dst, true, |page| {
                page[poffset..poffset + n].copy_from_slice(&src[offset..offset + n]);
            })?;
            len -= n;
            offset += n;
            dst += n;
        }
        Ok(())
    }

    /// Copy from user to kernel.
    /// Copy to `dst` from virtual address `srcva`.
    /// Return Ok(()) on success, Err(()) when the access is illegal.
    pub fn copy_in_bytes(
        &self,
        id: SpaceId,
        rsp: usize,
        dst: &mut [u8],
        srcva: usize,
    ) -> Result<(), ()> {
        let mut src = srcva;
        let mut offset = 0;
        let mut len = dst.len();
        while len > 0 {
            let va = pgrounddown(src);
            let poffset = src - va;
            let n = cmp::min(PGSIZE - poffset, len);
            let chunk = &mut dst[offset..offset + n];
            self.user_page(id, rsp, src, false, |page| {
                chunk.copy_from_slice(&page[poffset..poffset + n]);
            })?;
            len -= n;
            offset += n;
            src += n;
        }
        Ok(())
    }

    /// Typed variant of `copy_out_bytes`.
    pub fn copy_out<T: AsBytes>(
        &self,
        id: SpaceId,
        rsp: usize,
        dstva: usize,
        src: &T,
    ) -> Result<(), ()> {
        self.copy_out_bytes(id, rsp, dstva, src.as_bytes())
    }

    /// Typed variant of `copy_in_bytes`.
    pub fn copy_in<T: AsBytes + FromBytes>(
        &self,
        id: SpaceId,
        rsp: usize,
        dst: &mut T,
        srcva: usize,
    ) -> Result<(), ()> {
        self.copy_in_bytes(id, rsp, dst.as_bytes_mut(), srcva)
    }

    /// Run `access` against the frame backing `addr`, emulating a user
    /// load (`write` false) or store (`write` true): fault the page in on a
    /// miss, refuse the access when the fault is illegal, and maintain the
    /// accessed and dirty bits the way the hardware would.
    fn user_page<F>(&self, id: SpaceId, rsp: usize, addr: usize, write: bool, access: F) -> Result<(), ()>
    where
        F: FnOnce(&mut [u8; PGSIZE]),
    {
        if !is_user_vaddr(addr) {
            return Err(());
        }
        let va = UVAddr::from(pgrounddown(addr));
        let mut access = Some(access);
        for _ in 0..2 {
            let mut spaces = self.spaces.lock();
            let space = spaces.get_mut(id);
            match space.pt.probe(va) {
                Some((pa, flags)) if !write || flags.contains(PteFlags::W) => {
                    space.pt.set_accessed(va, true);
                    if write {
                        space.pt.set_dirty(va, true);
                    }
                    let access = some_or!(access.take(), return Err(()));
                    let mut frames = self.frames.lock();
                    access(frames.get_mut(pa.pfn()).page_mut());
                    return Ok(());
                }
                probed => {
                    let fault = Fault {
                        addr,
                        write,
                        user: false,
                        present: probed.is_some(),
                        rsp,
                    };
                    if !self.handle(&mut spaces, id, &fault) {
                        return Err(());
                    }
                }
            }
        }
        Err(())
    }

    /// Classify a fault and act on it: kernel addresses and protection
    /// violations are illegal, a known page is claimed, and a fault just
    /// below the stack pointer grows the stack.
    fn handle(&self, spaces: &mut Spaces, id: SpaceId, fault: &Fault) -> bool {
        if !is_user_vaddr(fault.addr) {
            debug!("fault: kernel address {:#x}", fault.addr);
            return false;
        }
        if fault.present {
            // A present fault is a protection violation: a store to a
            // read-only mapping. There is no copy-on-write here.
            debug!(
                "fault: protection violation at {:#x} (user={})",
                fault.addr, fault.user
            );
            return false;
        }
        let va = UVAddr::from(pgrounddown(fault.addr));
        if spaces.get(id).spt.find(va).is_some() {
            return self.claim(spaces, id, va);
        }
        if Self::grows_stack(fault) {
            return self.stack_growth(spaces, id, fault.addr) && self.claim(spaces, id, va);
        }
        debug!("fault: unmapped address {:#x}", fault.addr);
        false
    }

    /// Whether a fault below the stack should grow it: within the stack
    /// window and at or above `rsp - 8`, the lowest address a push may
    /// legally touch.
    fn grows_stack(fault: &Fault) -> bool {
        fault.addr < USERSTACK
            && USERSTACK - fault.addr <= STACKSIZE
            && fault.addr >= fault.rsp.saturating_sub(8)
    }

    /// Allocate anonymous stack pages from the faulting page up to the
    /// current stack bottom, claiming each.
    fn stack_growth(&self, spaces: &mut Spaces, id: SpaceId, addr: usize) -> bool {
        let base = pgrounddown(addr);
        let bottom = spaces.get(id).stack_bottom;
        for va in num_iter::range_step(base, bottom, PGSIZE) {
            let spt = &mut spaces.get_mut(id).spt;
            if spt.find(UVAddr::from(va)).is_some() {
                continue;
            }
            let page = VmPage::new_uninit(
                UVAddr::from(va),
                true,
                PageTarget::Anon { stack: true },
                PageInit::Zero,
            );
            if !spt.insert(page) {
                return false;
            }
        }
        for va in num_iter::range_step(base, bottom, PGSIZE) {
            if !self.claim(spaces, id, UVAddr::from(va)) {
                return false;
            }
        }
        let space = spaces.get_mut(id);
        space.stack_bottom = cmp::min(space.stack_bottom, base);
        trace!("stack: grown down to {:#x}", base);
        true
    }

    /// Bind the page at `va` to a frame, install the hardware mapping, and
    /// fill the contents by the page kind's swap-in. Claiming an already
    /// resident page succeeds trivially. Any failure unwinds completely.
    fn claim(&self, spaces: &mut Spaces, id: SpaceId, va: UVAddr) -> bool {
        let va = UVAddr::from(pgrounddown(va.into_usize()));
        {
            let spt = &spaces.get(id).spt;
            let page = some_or!(spt.find(va), return false);
            if page.is_resident() {
                return true;
            }
        }

        let fid = self.get_frame(spaces);
        {
            let mut frames = self.frames.lock();
            frames.get_mut(fid).set_owner(id, va);
            let space = spaces.get_mut(id);
            let page = space
                .spt
                .find_mut(va)
                .expect("claim: page vanished under us");
            page.frame = Some(fid);
            assert!(space.pt.get(va).is_none(), "claim: already mapped");
            space.pt.set(va, PAddr::from_pfn(fid), page.writable());
        }

        if !self.swap_in_frame(spaces, id, va, fid) {
            // Unwind: drop the mapping, unlink, give the frame back.
            let mut frames = self.frames.lock();
            let space = spaces.get_mut(id);
            let _ = space.pt.clear(va);
            if let Some(page) = space.spt.find_mut(va) {
                page.frame = None;
            }
            let page = frames.release(fid);
            self.kmem.lock().free(page);
            debug!("claim: failed for {:#x}", va.into_usize());
            return false;
        }

        self.frames.lock().get_mut(fid).unpin();
        trace!("claim: {:#x} -> frame {}", va.into_usize(), fid);
        true
    }

    /// Fill a freshly claimed frame according to the page's kind. The frame
    /// arrives zeroed and stays pinned while this runs.
    fn swap_in_frame(&self, spaces: &mut Spaces, id: SpaceId, va: UVAddr, fid: FrameId) -> bool {
        let mut frames = self.frames.lock();
        let frame = frames.get_mut(fid);
        let page = spaces
            .get_mut(id)
            .spt
            .find_mut(va)
            .expect("swap_in: page vanished under us");

        if matches!(page.kind, PageKind::Uninit(_)) {
            let init = uninit::materialize(page);
            return uninit::run_init(&init, frame.page_mut()).is_ok();
        }
        match &mut page.kind {
            PageKind::Anon(a) => {
                let mut swap = self.swap.lock();
                anon::swap_in(a, &mut swap, frame.page_mut());
                true
            }
            PageKind::File(f) => file::load(f, frame.page_mut()).is_ok(),
            PageKind::Uninit(_) => unreachable!(),
        }
    }

    /// A zeroed, pinned, unowned frame: from the pool when it has pages
    /// left, otherwise by evicting a victim.
    fn get_frame(&self, spaces: &mut Spaces) -> FrameId {
        let mut frames = self.frames.lock();
        if let Some(mut page) = self.kmem.lock().alloc() {
            page.write_bytes(0);
            return frames.register(page);
        }
        let victim = self.select_victim(spaces, &mut frames);
        self.swap_out_frame(spaces, &mut frames, victim);
        let frame = frames.get_mut(victim);
        frame.wipe();
        frame.pin();
        victim
    }

    /// Second-chance scan over the frame table. Accessed frames get their
    /// bit cleared and one more round; pinned or unowned frames are
    /// skipped. Panics when nothing is evictable.
    fn select_victim(&self, spaces: &mut Spaces, frames: &mut FrameTable) -> FrameId {
        let n = frames.slots();
        let hand = frames.hand();
        for step in 0..2 * n + 1 {
            let id = (hand + step) % n;
            let (owner, va) = {
                let frame = some_or!(frames.get_opt(id), continue);
                if frame.pinned() {
                    continue;
                }
                some_or!(frame.owner(), continue)
            };
            let pt = &mut spaces.get_mut(owner).pt;
            if pt.is_accessed(va) {
                pt.set_accessed(va, false);
                continue;
            }
            frames.set_hand(id + 1);
            return id;
        }
        panic!("vm: out of frames with nothing evictable");
    }

    /// Write a victim frame's contents to their backing store and unbind it
    /// from its page: anonymous pages go to a fresh swap slot, file pages
    /// go back to the file when dirty. The frame stays in the table for
    /// immediate reuse.
    fn swap_out_frame(&self, spaces: &mut Spaces, frames: &mut FrameTable, fid: FrameId) {
        let frame = frames.get_mut(fid);
        frame.pin();
        let (owner, va) = frame.owner().expect("swap_out: unowned frame");
        let space = spaces.get_mut(owner);
        let AddressSpace { pt, spt, .. } = space;
        let page = spt.find_mut(va).expect("swap_out: page vanished under us");
        debug_assert_eq!(page.frame, Some(fid), "swap_out: stale back-reference");

        match &mut page.kind {
            PageKind::Anon(a) => {
                let mut swap = self.swap.lock();
                anon::swap_out(a, &mut swap, frame.page_data());
                trace!(
                    "evict: anon {:#x} -> slot {:?}",
                    va.into_usize(),
                    a.slot.map(|s| s.index())
                );
            }
            PageKind::File(f) => {
                let dirty = pt.is_dirty(va) || frame.kernel_dirty();
                if dirty {
                    file::write_back(f, frame.page_data());
                    pt.set_dirty(va, false);
                    frame.set_kernel_dirty(false);
                }
                trace!(
                    "evict: file {:#x} (dirty={})",
                    va.into_usize(),
                    dirty
                );
            }
            PageKind::Uninit(_) => panic!("swap_out: pending page is resident"),
        }

        // The store write has landed; only now disappear from the hardware
        // page table and drop the links.
        let cleared = pt.clear(va);
        assert!(cleared.is_some(), "swap_out: mapping already gone");
        page.frame = None;
        frame.clear_owner();
    }

    /// Unlink the page covering `va` and release everything it holds.
    pub(crate) fn remove_page(&self, spaces: &mut Spaces, id: SpaceId, va: UVAddr) {
        let space = spaces.get_mut(id);
        let page = some_or!(space.spt.take(va), return);
        self.reclaim(&mut space.pt, page);
    }

    /// Release a page's resources: write back dirty file contents, return
    /// the frame to the pool, free a held swap slot. The pending kind has
    /// nothing beyond its initializer state, which drops with the record.
    fn reclaim(&self, pt: &mut PageTable<UVAddr>, mut page: VmPage) {
        let va = page.va();
        if let Some(fid) = page.frame.take() {
            let mut frames = self.frames.lock();
            let frame = frames.get_mut(fid);
            assert!(!frame.pinned(), "reclaim: frame has I/O in flight");
            if let PageKind::File(f) = &page.kind {
                if pt.is_dirty(va) || frame.kernel_dirty() {
                    file::write_back(f, frame.page_data());
                }
            }
            let cleared = pt.clear(va);
            assert!(cleared.is_some(), "reclaim: mapping already gone");
            let phys = frames.release(fid);
            self.kmem.lock().free(phys);
        }
        if let PageKind::Anon(a) = &mut page.kind {
            let mut swap = self.swap.lock();
            anon::destroy(a, &mut swap);
        }
    }

    /// Destroy every page of an address space, then the space itself.
    fn kill(&self, spaces: &mut Spaces, id: SpaceId) {
        let vas: Vec<UVAddr> = spaces.get(id).spt.pages().map(|p| p.va()).collect();
        for va in vas {
            self.remove_page(spaces, id, va);
        }
        spaces.remove(id);
        debug!("space {:?}: destroyed", id);
    }

    /// Reproduce every page of `parent` in `child`. True iff the child ends
    /// up with exactly as many pages as the parent.
    fn copy_space(&self, spaces: &mut Spaces, parent: SpaceId, child: SpaceId) -> bool {
        let vas: Vec<UVAddr> = spaces.get(parent).spt.pages().map(|p| p.va()).collect();
        for va in vas {
            let blueprint = {
                let page = spaces
                    .get(parent)
                    .spt
                    .find(va)
                    .expect("fork: page vanished under us");
                let writable = page.writable();
                match &page.kind {
                    PageKind::Uninit(u) => Blueprint::Pending {
                        writable,
                        target: u.target,
                        init: u.init.clone(),
                    },
                    PageKind::Anon(a) => Blueprint::Anon {
                        writable,
                        stack: a.stack,
                    },
                    PageKind::File(f) => Blueprint::File {
                        writable,
                        file: f.file.clone(),
                        offset: f.offset,
                        read_bytes: f.read_bytes,
                        span: f.span,
                    },
                }
            };
            match blueprint {
                Blueprint::Pending {
                    writable,
                    target,
                    init,
                } => {
                    let page = VmPage::new_uninit(va, writable, target, init);
                    if !spaces.get_mut(child).spt.insert(page) {
                        return false;
                    }
                }
                Blueprint::Anon { writable, stack } => {
                    let page = VmPage::new_anon(va, writable, stack);
                    if !self.copy_materialized(spaces, parent, child, va, page) {
                        return false;
                    }
                }
                Blueprint::File {
                    writable,
                    file,
                    offset,
                    read_bytes,
                    span,
                } => {
                    let page = VmPage::new_file(va, writable, file, offset, read_bytes, span);
                    if !self.copy_materialized(spaces, parent, child, va, page) {
                        return false;
                    }
                }
            }
        }
        spaces.get(child).spt.len() == spaces.get(parent).spt.len()
    }

    /// Insert a materialized page into the child, claim a frame for it, and
    /// copy the parent frame's bytes verbatim. The parent page is made
    /// resident first and its frame pinned across the child's claim so the
    /// eviction scan cannot take it away mid-copy.
    fn copy_materialized(
        &self,
        spaces: &mut Spaces,
        parent: SpaceId,
        child: SpaceId,
        va: UVAddr,
        page: VmPage,
    ) -> bool {
        if !spaces.get_mut(child).spt.insert(page) {
            return false;
        }
        if !self.claim(spaces, parent, va) {
            return false;
        }
        let pfid = spaces
            .get(parent)
            .spt
            .find(va)
            .and_then(|p| p.frame())
            .expect("fork: parent not resident after claim");
        self.frames.lock().get_mut(pfid).pin();
        let unpin = scopeguard::guard(pfid, |fid| {
            self.frames.lock().get_mut(fid).unpin();
        });
        if !self.claim(spaces, child, va) {
            return false;
        }
        let cfid = spaces
            .get(child)
            .spt
            .find(va)
            .and_then(|p| p.frame())
            .expect("fork: child not resident after claim");
        {
            let mut frames = self.frames.lock();
            let (src, dst) = frames.pair_mut(pfid, cfid);
            dst.page_mut().copy_from_slice(src.page_data());
            // Copied through the kernel alias; the hardware dirty bit does
            // not see it.
            dst.set_kernel_dirty(true);
        }
        drop(unpin);
        true
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

enum Blueprint {
    Pending {
        writable: bool,
        target: PageTarget,
        init: PageInit,
    },
    Anon {
        writable: bool,
        stack: bool,
    },
    File {
        writable: bool,
        file: File,
        offset: usize,
        read_bytes: usize,
        span: Option<usize>,
    },
}
