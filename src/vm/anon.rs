//! Anonymous pages.
//!
//! Backed by swap slots when not resident. The slot index is `Some` exactly
//! while the contents live on the swap device; a resident page holds no
//! slot, and a page that has never been swapped out reads back as zeroes.

use crate::addr::PGSIZE;
use crate::some_or;
use crate::swap::SwapMap;
use crate::vm::page::AnonPage;

/// Fill `buf` from the page's swap slot and release the slot. A page with
/// no slot is fresh; its frame is already zeroed.
pub(super) fn swap_in(anon: &mut AnonPage, swap: &mut SwapMap, buf: &mut [u8; PGSIZE]) {
    if let Some(slot) = anon.slot.take() {
        swap.read_page(slot, buf);
        swap.free(slot);
    }
}

/// Park the page's contents in a fresh swap slot. Running out of swap with
/// committed anonymous memory is unrecoverable.
pub(super) fn swap_out(anon: &mut AnonPage, swap: &mut SwapMap, buf: &[u8; PGSIZE]) {
    assert!(anon.slot.is_none(), "anon: resident page holds a slot");
    let slot = some_or!(swap.alloc(), panic!("anon: out of swap slots"));
    swap.write_page(slot, buf);
    anon.slot = Some(slot);
}

/// Release the swap slot a dying page may still hold.
pub(super) fn destroy(anon: &mut AnonPage, swap: &mut SwapMap) {
    if let Some(slot) = anon.slot.take() {
        swap.free(slot);
    }
}
