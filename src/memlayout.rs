//! User address-space layout.
//!
//! The user half of the address space runs from 0 to MAXVA. The stack sits
//! at the very top and grows downward; it may occupy at most STACKSIZE
//! bytes, so addresses in [STACKBOTTOM, USERSTACK) are reserved for it.
//! Everything at or above MAXVA belongs to the kernel.

use crate::addr::MAXVA;
use crate::param::STACKSIZE;

/// One beyond the highest user virtual address.
pub const USERTOP: usize = MAXVA;

/// Top of the user stack. The first stack page is mapped just below it.
pub const USERSTACK: usize = USERTOP;

/// Lowest address the stack may ever reach.
pub const STACKBOTTOM: usize = USERSTACK - STACKSIZE;

/// Whether `addr` falls in the user half of the address space.
pub const fn is_user_vaddr(addr: usize) -> bool {
    addr < USERTOP
}
