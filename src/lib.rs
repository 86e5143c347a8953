//! uvm: demand-paged user virtual memory for a teaching kernel.
//!
//! Per process, a supplemental page table tracks every logical page the
//! process owns, whether pending, resident, parked on the swap device, or
//! backed by a byte range of a file. A global frame table loans physical
//! pages out of a fixed pool and reclaims them with a second-chance scan
//! when the pool runs dry. Faults are classified and served on demand: lazy
//! loads, swap-ins, automatic stack growth. Memory mappings are created and
//! torn down per file handle, and a fork duplicates the entire state of an
//! address space.
//!
//! The hardware-facing pieces are modeled in software so the whole subsystem
//! runs and is tested on a host: the page table is an Sv39-style radix tree
//! whose accessed and dirty bits are maintained by the user-copy routines,
//! and the swap device is a RAM-backed sector disk.
#![cfg_attr(not(test), no_std)]
//
#![deny(keyword_idents)]
#![deny(non_ascii_idents)]
#![deny(trivial_numeric_casts)]
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(unused_import_braces)]

extern crate alloc;

pub mod addr;
pub mod disk;
pub mod file;
pub mod kalloc;
pub mod lock;
pub mod memlayout;
pub mod page;
pub mod pagetable;
pub mod param;
pub mod swap;
pub mod syscall;
mod utils;
pub mod vm;
