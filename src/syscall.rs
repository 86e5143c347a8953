//! System-call surface for memory mapping.
//!
//! The mmap and munmap calls arrive with a file descriptor; this layer
//! resolves it against the process's open-file table and hands the file to
//! the VM core. Descriptors 0 and 1 are the console and can never back a
//! mapping.

use array_macro::array;

use crate::addr::Addr;
use crate::file::File;
use crate::param::NOFILE;
use crate::some_or;
use crate::vm::{SpaceId, Vm};

/// Per-process open-file table. Slots 0 and 1 are reserved for the console
/// and stay empty here.
pub struct FdTable {
    files: [Option<File>; NOFILE],
}

impl FdTable {
    pub fn new() -> Self {
        Self {
            files: array![_ => None; NOFILE],
        }
    }

    /// Install a file in the lowest free descriptor, as open does.
    pub fn install(&mut self, file: File) -> Option<usize> {
        for fd in 2..NOFILE {
            if self.files[fd].is_none() {
                self.files[fd] = Some(file);
                return Some(fd);
            }
        }
        None
    }

    pub fn get(&self, fd: usize) -> Option<&File> {
        self.files.get(fd)?.as_ref()
    }

    /// Drop a descriptor, returning the file so the caller may keep it.
    pub fn close(&mut self, fd: usize) -> Option<File> {
        self.files.get_mut(fd)?.take()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

/// mmap(addr, length, writable, fd, offset). Returns the mapped address or
/// 0 on failure.
pub fn sys_mmap(
    vm: &Vm,
    space: SpaceId,
    fdt: &FdTable,
    addr: usize,
    length: usize,
    writable: bool,
    fd: usize,
    offset: usize,
) -> usize {
    if fd < 2 {
        return 0;
    }
    let file = some_or!(fdt.get(fd), return 0);
    match vm.mmap(space, addr, length, writable, file, offset) {
        Some(base) => base.into_usize(),
        None => 0,
    }
}

/// munmap(addr).
pub fn sys_munmap(vm: &Vm, space: SpaceId, addr: usize) {
    vm.munmap(space, addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fd_table_reserves_console() {
        let mut fdt = FdTable::new();
        let fd = fdt.install(File::create(b"x")).unwrap();
        assert_eq!(fd, 2);
        assert!(fdt.get(0).is_none());
        assert!(fdt.get(1).is_none());
        assert!(fdt.get(2).is_some());
        assert!(fdt.close(2).is_some());
        assert!(fdt.get(2).is_none());
    }

    #[test]
    fn fd_table_fills_up() {
        let mut fdt = FdTable::new();
        for _ in 2..NOFILE {
            assert!(fdt.install(File::create(b"x")).is_some());
        }
        assert!(fdt.install(File::create(b"x")).is_none());
    }
}
