//! Physical memory allocator, for user pages.
//! Allocates whole 4096-byte pages from a fixed-size pool.

use arrayvec::ArrayVec;

use crate::page::Page;
use crate::param::NFRAME;

/// The user page pool. Exhaustion is not an error here; the caller is
/// expected to evict a frame and retry.
pub struct Kmem {
    free: ArrayVec<Page, NFRAME>,
}

impl Kmem {
    /// Create the pool with its full complement of NFRAME pages.
    pub fn new() -> Self {
        let mut free = ArrayVec::new();
        for _ in 0..NFRAME {
            free.push(Page::new());
        }
        Self { free }
    }

    pub fn alloc(&mut self) -> Option<Page> {
        self.free.pop()
    }

    pub fn free(&mut self, page: Page) {
        self.free.push(page);
    }

    /// Pages currently available.
    pub fn unused(&self) -> usize {
        self.free.len()
    }
}

impl Default for Kmem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_is_finite() {
        let mut kmem = Kmem::new();
        let mut held = alloc::vec::Vec::new();
        while let Some(page) = kmem.alloc() {
            held.push(page);
        }
        assert_eq!(held.len(), NFRAME);
        assert!(kmem.alloc().is_none());
        kmem.free(held.pop().unwrap());
        assert!(kmem.alloc().is_some());
    }

    #[test]
    fn pages_come_back_zeroed_or_not() {
        let mut kmem = Kmem::new();
        let mut page = kmem.alloc().unwrap();
        page.write_bytes(0xAA);
        assert_eq!(page[0], 0xAA);
        page.write_bytes(0);
        assert!(page.iter().all(|b| *b == 0));
        kmem.free(page);
    }
}
