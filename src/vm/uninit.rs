//! Pending pages.
//!
//! A pending page carries the kind it will become and the initializer that
//! produces its first contents. Materialization happens under the claim
//! driver once a frame is bound: install the final kind, then run the
//! initializer against the zeroed frame. A pending page that is destroyed
//! first simply drops its initializer state with the page record.

use crate::addr::PGSIZE;
use crate::vm::page::{AnonPage, FilePage, PageInit, PageKind, PageTarget, VmPage};

/// Install the final kind on a pending page and hand back the content
/// initializer for the caller to run. Panics when the page is not pending;
/// the transition is one-way.
pub(super) fn materialize(page: &mut VmPage) -> PageInit {
    let (target, init) = match &page.kind {
        PageKind::Uninit(u) => (u.target, u.init.clone()),
        _ => panic!("uninit: page is not pending"),
    };
    page.kind = match target {
        PageTarget::Anon { stack } => PageKind::Anon(AnonPage { slot: None, stack }),
        PageTarget::File => match &init {
            PageInit::FromFile {
                file,
                offset,
                read_bytes,
                span,
            } => PageKind::File(FilePage {
                file: file.clone(),
                offset: *offset,
                read_bytes: *read_bytes,
                span: *span,
            }),
            PageInit::Zero => unreachable!("uninit: file page without file initializer"),
        },
    };
    init
}

/// Produce the first contents of a just-materialized page into its frame.
/// The frame arrives zeroed, so `Zero` has nothing to do. A short read is a
/// failed materialization and makes the fault fatal.
pub(super) fn run_init(init: &PageInit, buf: &mut [u8; PGSIZE]) -> Result<(), ()> {
    match init {
        PageInit::Zero => Ok(()),
        PageInit::FromFile {
            file,
            offset,
            read_bytes,
            ..
        } => {
            let n = file.read_at(&mut buf[..*read_bytes], *offset);
            if n == *read_bytes {
                Ok(())
            } else {
                Err(())
            }
        }
    }
}
