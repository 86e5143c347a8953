use core::ops::{Deref, DerefMut};

use alloc::boxed::Box;

use crate::addr::PGSIZE;

/// Page-aligned backing storage of a physical page.
#[repr(align(4096))]
pub struct PageData {
    inner: [u8; PGSIZE],
}

impl PageData {
    const DEFAULT: Self = Self { inner: [0; PGSIZE] };
}

/// An owned physical page. Handed out by the user pool and returned to it;
/// the frame table holds the page while it is loaned to a logical page.
pub struct Page {
    data: Box<PageData>,
}

impl Page {
    /// A fresh zeroed page.
    pub fn new() -> Self {
        Self {
            data: Box::new(PageData::DEFAULT),
        }
    }

    /// Fill the whole page with `value`.
    pub fn write_bytes(&mut self, value: u8) {
        self.data.inner = [value; PGSIZE];
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Page {
    type Target = [u8; PGSIZE];

    fn deref(&self) -> &Self::Target {
        &self.data.inner
    }
}

impl DerefMut for Page {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data.inner
    }
}
