//! Logical user pages.
//!
//! A `VmPage` is owned by exactly one supplemental page table. Its kind is a
//! one-way state machine: every page starts `Uninit` and becomes `Anon` or
//! `File` on the first materialization; it never reverts. The operations of
//! each kind live in the sibling `uninit`, `anon` and `file` modules and are
//! dispatched on the tag.

use crate::addr::{Addr, UVAddr};
use crate::file::File;
use crate::swap::SwapSlot;
use crate::vm::frame::FrameId;

/// Eventual kind of a pending page.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PageTarget {
    Anon { stack: bool },
    File,
}

/// Content initializer run when a pending page first materializes.
#[derive(Clone)]
pub enum PageInit {
    /// Leave the freshly claimed frame zeroed.
    Zero,
    /// Read `read_bytes` bytes of `file` at `offset`; the rest of the page
    /// is zero. `span` is the total mapping length, recorded only on the
    /// first page of a mapping so unmap knows its extent.
    FromFile {
        file: File,
        offset: usize,
        read_bytes: usize,
        span: Option<usize>,
    },
}

pub struct UninitPage {
    pub target: PageTarget,
    pub init: PageInit,
}

/// Heap or stack page. Either resident or parked in a swap slot, never both.
pub struct AnonPage {
    pub slot: Option<SwapSlot>,
    pub stack: bool,
}

/// Page backed by a byte range of a file.
pub struct FilePage {
    pub file: File,
    pub offset: usize,
    pub read_bytes: usize,
    pub span: Option<usize>,
}

pub enum PageKind {
    Uninit(UninitPage),
    Anon(AnonPage),
    File(FilePage),
}

pub struct VmPage {
    va: UVAddr,
    writable: bool,
    pub(crate) kind: PageKind,
    pub(crate) frame: Option<FrameId>,
}

impl VmPage {
    pub(crate) fn new_uninit(va: UVAddr, writable: bool, target: PageTarget, init: PageInit) -> Self {
        assert!(va.is_page_aligned(), "VmPage::new_uninit");
        if let PageTarget::File = target {
            assert!(
                matches!(init, PageInit::FromFile { .. }),
                "VmPage::new_uninit: file page without file initializer"
            );
        }
        Self {
            va,
            writable,
            kind: PageKind::Uninit(UninitPage { target, init }),
            frame: None,
        }
    }

    /// A materialized anonymous page with no contents yet; used when a fork
    /// reproduces a parent page and immediately fills the frame.
    pub(crate) fn new_anon(va: UVAddr, writable: bool, stack: bool) -> Self {
        assert!(va.is_page_aligned(), "VmPage::new_anon");
        Self {
            va,
            writable,
            kind: PageKind::Anon(AnonPage { slot: None, stack }),
            frame: None,
        }
    }

    /// A materialized file-backed page; the fork counterpart of `new_anon`.
    pub(crate) fn new_file(
        va: UVAddr,
        writable: bool,
        file: File,
        offset: usize,
        read_bytes: usize,
        span: Option<usize>,
    ) -> Self {
        assert!(va.is_page_aligned(), "VmPage::new_file");
        Self {
            va,
            writable,
            kind: PageKind::File(FilePage {
                file,
                offset,
                read_bytes,
                span,
            }),
            frame: None,
        }
    }

    pub fn va(&self) -> UVAddr {
        self.va
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    pub fn is_resident(&self) -> bool {
        self.frame.is_some()
    }

    pub fn frame(&self) -> Option<FrameId> {
        self.frame
    }

    /// Whether this page belongs to the user stack.
    pub fn is_stack(&self) -> bool {
        match &self.kind {
            PageKind::Uninit(u) => matches!(u.target, PageTarget::Anon { stack: true }),
            PageKind::Anon(a) => a.stack,
            PageKind::File(_) => false,
        }
    }

    /// Total length of the mapping this page heads, if it is the first page
    /// of one. Valid both before and after materialization.
    pub fn mapping_span(&self) -> Option<usize> {
        match &self.kind {
            PageKind::Uninit(UninitPage {
                init: PageInit::FromFile { span, .. },
                ..
            }) => *span,
            PageKind::File(f) => f.span,
            _ => None,
        }
    }
}
