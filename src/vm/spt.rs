//! Supplemental page table.
//!
//! Per-process map from the page number of a user virtual address to the
//! logical page that owns it. The stored address is always page-aligned and
//! the writable bit is a field of the page record, so lookups may pass any
//! address inside the page and nothing has to be masked out of the key.

use hashbrown::HashMap;

use crate::addr::{UVAddr, VAddr};
use crate::vm::page::VmPage;

pub struct Spt {
    pages: HashMap<usize, VmPage>,
}

impl Spt {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// The page containing `va`, if any.
    pub fn find(&self, va: UVAddr) -> Option<&VmPage> {
        self.pages.get(&va.page_number())
    }

    pub fn find_mut(&mut self, va: UVAddr) -> Option<&mut VmPage> {
        self.pages.get_mut(&va.page_number())
    }

    /// Take ownership of `page`. Fails when a page already covers that
    /// address, in which case `page` is dropped.
    pub fn insert(&mut self, page: VmPage) -> bool {
        let vpn = page.va().page_number();
        if self.pages.contains_key(&vpn) {
            return false;
        }
        let prev = self.pages.insert(vpn, page);
        debug_assert!(prev.is_none());
        true
    }

    /// Unlink the page containing `va` without destroying its resources;
    /// the caller is responsible for releasing them.
    pub fn take(&mut self, va: UVAddr) -> Option<VmPage> {
        self.pages.remove(&va.page_number())
    }

    pub fn pages(&self) -> impl Iterator<Item = &VmPage> {
        self.pages.values()
    }
}

impl Default for Spt {
    fn default() -> Self {
        Self::new()
    }
}
