//! Spin locks.
//!
//! The VM core runs under a handful of busy-waiting locks. The `spin` crate
//! provides the primitive; these aliases keep the kernel's own names at the
//! call sites. Lock order, outermost first: the address-space registry, then
//! the frame table, then the page pool or the swap map, then an inode. A
//! public entry point takes the registry lock exactly once and passes the
//! guard's contents down, so no path ever re-enters it.

pub type Spinlock<T> = spin::Mutex<T>;
pub type SpinlockGuard<'s, T> = spin::MutexGuard<'s, T>;
