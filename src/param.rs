use static_assertions::const_assert;

use crate::addr::PGSIZE;

/// Maximum number of address spaces (one per user process).
pub const NSPACE: usize = 64;

/// Physical frames in the user page pool.
pub const NFRAME: usize = 64;

/// Page-sized slots on the swap device.
pub const NSWAP: usize = 1024;

/// Bytes per disk sector.
pub const SECTSIZE: usize = 512;

/// Sectors that make up one page.
pub const PGSECTS: usize = PGSIZE / SECTSIZE;

/// Open files per process.
pub const NOFILE: usize = 16;

/// Maximum user stack size in bytes.
pub const STACKSIZE: usize = 1 << 20;

const_assert!(PGSIZE % SECTSIZE == 0);
const_assert!(PGSECTS == 8);
const_assert!(STACKSIZE % PGSIZE == 0);
