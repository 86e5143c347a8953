//! File-backed pages and memory mappings.
//!
//! A mapping covers a contiguous run of pages, each lazily filled from its
//! own byte range of a reopened file handle. The first page of the run
//! remembers the mapping length so unmap can walk the whole extent, even
//! before the page ever materializes. Write-back is driven by the dirty
//! state: the hardware bit for stores through the user mapping, the frame's
//! kernel-dirty flag for stores made through the kernel alias.

use core::cmp;

use log::debug;

use crate::addr::{pgroundup, PGSIZE, UVAddr};
use crate::file::File;
use crate::memlayout::STACKBOTTOM;
use crate::some_or;
use crate::vm::page::{FilePage, PageInit, PageTarget, VmPage};
use crate::vm::{SpaceId, Vm};

/// Fill `buf` from the page's byte range; bytes past the range are zero.
pub(super) fn load(fp: &FilePage, buf: &mut [u8; PGSIZE]) -> Result<(), ()> {
    let n = fp.file.read_at(&mut buf[..fp.read_bytes], fp.offset);
    if n != fp.read_bytes {
        return Err(());
    }
    buf[fp.read_bytes..].fill(0);
    Ok(())
}

/// Write the page's file bytes back at their original offset. Bytes past
/// the backing range were zero-filled at load time and are dropped.
pub(super) fn write_back(fp: &FilePage, buf: &[u8; PGSIZE]) {
    if fp.read_bytes == 0 {
        return;
    }
    let n = fp.file.write_at(&buf[..fp.read_bytes], fp.offset);
    assert_eq!(n, fp.read_bytes, "file: short write-back");
}

impl Vm {
    /// Map `length` bytes of `file` starting at `offset` into the address
    /// space at `addr`. Returns the base address, or `None` when the
    /// arguments are invalid or the range is unavailable. The mapping takes
    /// an independent handle on the file, so closing the caller's descriptor
    /// does not tear it down.
    pub fn mmap(
        &self,
        space: SpaceId,
        addr: usize,
        length: usize,
        writable: bool,
        file: &File,
        offset: usize,
    ) -> Option<UVAddr> {
        if addr == 0 || addr % PGSIZE != 0 || offset % PGSIZE != 0 || length == 0 {
            return None;
        }
        if file.is_empty() {
            return None;
        }
        let end = addr.checked_add(pgroundup(length))?;
        // Anything reaching past STACKBOTTOM would collide with the stack
        // region or the kernel half.
        if end > STACKBOTTOM {
            return None;
        }

        let mut spaces = self.spaces.lock();
        {
            let spt = &spaces.get(space).spt;
            for va in num_iter::range_step(addr, end, PGSIZE) {
                if spt.find(UVAddr::from(va)).is_some() {
                    return None;
                }
            }
        }

        let handle = file.reopen();
        let mut remaining = handle.len().saturating_sub(offset);
        let mut off = offset;
        let mut span = Some(length);
        for va in num_iter::range_step(addr, end, PGSIZE) {
            let read_bytes = cmp::min(remaining, PGSIZE);
            let init = PageInit::FromFile {
                file: handle.clone(),
                offset: off,
                read_bytes,
                span: span.take(),
            };
            let page = VmPage::new_uninit(UVAddr::from(va), writable, PageTarget::File, init);
            let inserted = spaces.get_mut(space).spt.insert(page);
            assert!(inserted, "mmap: overlap after pre-check");
            remaining -= read_bytes;
            off += PGSIZE;
        }
        debug!(
            "mmap: {:#x}..{:#x} -> {} bytes of file at offset {}",
            addr, end, length, offset
        );
        Some(UVAddr::from(addr))
    }

    /// Tear down the mapping whose first page is at `addr`, writing dirty
    /// pages back. Unmapping an address that heads no mapping does nothing.
    pub fn munmap(&self, space: SpaceId, addr: usize) {
        let mut spaces = self.spaces.lock();
        let span = {
            let spt = &spaces.get(space).spt;
            spt.find(UVAddr::from(addr)).and_then(|page| page.mapping_span())
        };
        let span = some_or!(span, return);
        debug!("munmap: {:#x}, {} bytes", addr, span);
        for va in num_iter::range_step(addr, addr + pgroundup(span), PGSIZE) {
            self.remove_page(&mut spaces, space, UVAddr::from(va));
        }
    }
}
