//! End-to-end scenarios driven through the public `Vm` API: lazy stack
//! growth, swap round-trips under memory pressure, file mappings with
//! write-back, fork semantics, and the mmap failure matrix.

use uvm_kernel::addr::{Addr, MAXVA, PGSIZE, UVAddr};
use uvm_kernel::file::File;
use uvm_kernel::memlayout::{STACKBOTTOM, USERSTACK};
use uvm_kernel::param::{NFRAME, STACKSIZE};
use uvm_kernel::syscall::{sys_mmap, sys_munmap, FdTable};
use uvm_kernel::vm::{Fault, PageInit, PageTarget, SpaceId, Vm};

const HEAP: usize = 0x1000_0000;

/// A stack pointer that never triggers the growth heuristic for low
/// addresses.
const IDLE_RSP: usize = USERSTACK;

fn anon_page(vm: &Vm, s: SpaceId, va: usize) {
    assert!(vm.alloc_page_with_initializer(
        s,
        PageTarget::Anon { stack: false },
        UVAddr::from(va),
        true,
        PageInit::Zero,
    ));
}

#[test]
fn lazy_stack_growth() {
    let vm = Vm::new();
    let s = vm.create_space().unwrap();
    assert!(vm.setup_stack(s));
    assert_eq!(vm.page_count(s), 1);

    let addr = USERSTACK - PGSIZE - 4;
    vm.copy_out(s, addr, addr, &0x5Au8).unwrap();
    assert_eq!(vm.page_count(s), 2);

    let mut byte = 0u8;
    vm.copy_in(s, addr, &mut byte, addr).unwrap();
    assert_eq!(byte, 0x5A);
    vm.validate();
    vm.destroy_space(s);
}

#[test]
fn stack_grows_many_pages_at_once() {
    let vm = Vm::new();
    let s = vm.create_space().unwrap();
    assert!(vm.setup_stack(s));

    let addr = USERSTACK - 5 * PGSIZE - 4;
    vm.copy_out(s, addr, addr, &1u8).unwrap();
    assert_eq!(vm.page_count(s), 6);
    vm.validate();
}

#[test]
fn stack_cap_is_enforced() {
    let vm = Vm::new();
    let s = vm.create_space().unwrap();
    assert!(vm.setup_stack(s));

    let addr = USERSTACK - STACKSIZE - 8;
    assert!(vm.copy_out(s, addr, addr, &1u8).is_err());
}

#[test]
fn far_below_rsp_does_not_grow() {
    let vm = Vm::new();
    let s = vm.create_space().unwrap();
    assert!(vm.setup_stack(s));

    // A store far below the stack pointer is not a push.
    let addr = USERSTACK - 64 * PGSIZE;
    assert!(vm.copy_out(s, USERSTACK - PGSIZE, addr, &1u8).is_err());
}

#[test]
fn kernel_address_faults_fail() {
    let vm = Vm::new();
    let s = vm.create_space().unwrap();
    let fault = Fault {
        addr: MAXVA,
        write: false,
        user: true,
        present: false,
        rsp: IDLE_RSP,
    };
    assert!(!vm.try_handle_fault(s, &fault));
}

#[test]
fn anon_swap_round_trip() {
    let vm = Vm::new();
    let s = vm.create_space().unwrap();
    let n = 2 * NFRAME;
    for i in 0..n {
        anon_page(&vm, s, HEAP + i * PGSIZE);
    }
    for i in 0..n {
        let va = HEAP + i * PGSIZE;
        vm.copy_out(s, IDLE_RSP, va, &(i as u64)).unwrap();
    }
    // Touching in reverse forces at least n - NFRAME swap-ins.
    for i in (0..n).rev() {
        let va = HEAP + i * PGSIZE;
        let mut value = 0u64;
        vm.copy_in(s, IDLE_RSP, &mut value, va).unwrap();
        assert_eq!(value, i as u64);
    }
    vm.validate();
    vm.destroy_space(s);
}

#[test]
fn swap_round_trip_preserves_whole_pages() {
    let vm = Vm::new();
    let s = vm.create_space().unwrap();
    let n = NFRAME + 8;
    for i in 0..n {
        anon_page(&vm, s, HEAP + i * PGSIZE);
        let fill = [(i & 0xff) as u8; PGSIZE];
        vm.copy_out_bytes(s, IDLE_RSP, HEAP + i * PGSIZE, &fill).unwrap();
    }
    for i in 0..n {
        let mut back = [0u8; PGSIZE];
        vm.copy_in_bytes(s, IDLE_RSP, &mut back, HEAP + i * PGSIZE)
            .unwrap();
        assert!(back.iter().all(|b| *b == (i & 0xff) as u8));
    }
    vm.validate();
}

#[test]
fn mmap_reads_file_bytes_and_zero_tail() {
    let vm = Vm::new();
    let s = vm.create_space().unwrap();
    let mut fdt = FdTable::new();
    let fd = fdt.install(File::create(&[b'b'; 5000])).unwrap();

    let base = sys_mmap(&vm, s, &fdt, HEAP, 5000, false, fd, 0);
    assert_eq!(base, HEAP);
    assert_eq!(vm.page_count(s), 2);

    let mut byte = 0u8;
    vm.copy_in(s, IDLE_RSP, &mut byte, base + 4999).unwrap();
    assert_eq!(byte, b'b');
    vm.copy_in(s, IDLE_RSP, &mut byte, base + 5000).unwrap();
    assert_eq!(byte, 0);
    vm.copy_in(s, IDLE_RSP, &mut byte, base + 8191).unwrap();
    assert_eq!(byte, 0);
    // One past the mapping: the fault is illegal and the access refused.
    assert!(vm.copy_in(s, IDLE_RSP, &mut byte, base + 8192).is_err());
    vm.validate();
}

#[test]
fn mmap_read_only_rejects_stores() {
    let vm = Vm::new();
    let s = vm.create_space().unwrap();
    let file = File::create(&[1u8; 100]);
    let base = vm.mmap(s, HEAP, 100, false, &file, 0).unwrap().into_usize();
    let mut byte = 0u8;
    vm.copy_in(s, IDLE_RSP, &mut byte, base).unwrap();
    assert_eq!(byte, 1);
    assert!(vm.copy_out(s, IDLE_RSP, base, &2u8).is_err());
}

#[test]
fn munmap_writes_back_dirty_pages() {
    let vm = Vm::new();
    let s = vm.create_space().unwrap();
    let contents: Vec<u8> = (0..100).map(|i| i as u8).collect();
    let file = File::create(&contents);

    let base = vm.mmap(s, HEAP, 100, true, &file, 0).unwrap().into_usize();
    vm.copy_out(s, IDLE_RSP, base, &0xABu8).unwrap();
    vm.munmap(s, base);
    assert_eq!(vm.page_count(s), 0);

    let mut after = [0u8; 100];
    assert_eq!(file.read_at(&mut after, 0), 100);
    assert_eq!(after[0], 0xAB);
    assert!(after[1..].iter().enumerate().all(|(i, b)| *b == (i + 1) as u8));
    assert_eq!(file.len(), 100);
}

#[test]
fn munmap_without_store_leaves_file_untouched() {
    let vm = Vm::new();
    let s = vm.create_space().unwrap();
    let file = File::create(&[7u8; 300]);
    let base = vm.mmap(s, HEAP, 300, true, &file, 0).unwrap().into_usize();
    let mut byte = 0u8;
    vm.copy_in(s, IDLE_RSP, &mut byte, base + 200).unwrap();
    assert_eq!(byte, 7);
    vm.munmap(s, base);
    let mut after = [0u8; 300];
    file.read_at(&mut after, 0);
    assert!(after.iter().all(|b| *b == 7));
}

#[test]
fn eviction_writes_dirty_file_pages_back() {
    let vm = Vm::new();
    let s = vm.create_space().unwrap();
    let file = File::create(&[0u8; PGSIZE]);
    let base = vm.mmap(s, HEAP, PGSIZE, true, &file, 0).unwrap().into_usize();
    vm.copy_out(s, IDLE_RSP, base, &0xEEu8).unwrap();

    // Enough anonymous traffic to cycle every frame through eviction.
    let heap2 = HEAP + 16 * PGSIZE;
    for i in 0..2 * NFRAME {
        anon_page(&vm, s, heap2 + i * PGSIZE);
        vm.copy_out(s, IDLE_RSP, heap2 + i * PGSIZE, &1u8).unwrap();
    }

    let mut first = 0u8;
    assert_eq!(file.read_at(core::slice::from_mut(&mut first), 0), 1);
    assert_eq!(first, 0xEE, "dirty page was not written back on eviction");

    // Fault it back in: the store must still be visible through the mapping.
    let mut byte = 0u8;
    vm.copy_in(s, IDLE_RSP, &mut byte, base).unwrap();
    assert_eq!(byte, 0xEE);
    vm.validate();
}

#[test]
fn munmap_of_untouched_mapping_destroys_pending_pages() {
    let vm = Vm::new();
    let s = vm.create_space().unwrap();
    let file = File::create(&[3u8; 3 * PGSIZE]);
    let base = vm
        .mmap(s, HEAP, 3 * PGSIZE, true, &file, 0)
        .unwrap()
        .into_usize();
    assert_eq!(vm.page_count(s), 3);
    vm.munmap(s, base);
    assert_eq!(vm.page_count(s), 0);
    vm.validate();
}

#[test]
fn munmap_of_unmapped_address_is_a_no_op() {
    let vm = Vm::new();
    let s = vm.create_space().unwrap();
    anon_page(&vm, s, HEAP);
    sys_munmap(&vm, s, HEAP + 0x100000);
    // Not a mapping head either: an anonymous page has no extent.
    sys_munmap(&vm, s, HEAP);
    assert_eq!(vm.page_count(s), 1);
}

#[test]
fn mmap_failure_matrix_leaves_spt_unchanged() {
    let vm = Vm::new();
    let s = vm.create_space().unwrap();
    let mut fdt = FdTable::new();
    let fd = fdt.install(File::create(&[b'x'; 5000])).unwrap();
    let empty_fd = fdt.install(File::create(b"")).unwrap();

    anon_page(&vm, s, HEAP);
    let before = vm.page_count(s);

    assert_eq!(sys_mmap(&vm, s, &fdt, 0, 5000, false, fd, 0), 0);
    assert_eq!(sys_mmap(&vm, s, &fdt, HEAP + PGSIZE, 0, false, fd, 0), 0);
    assert_eq!(sys_mmap(&vm, s, &fdt, HEAP + PGSIZE, 5000, false, fd, 1), 0);
    assert_eq!(sys_mmap(&vm, s, &fdt, HEAP + PGSIZE, 5000, false, 1, 0), 0);
    assert_eq!(sys_mmap(&vm, s, &fdt, HEAP + 1, 5000, false, fd, 0), 0);
    assert_eq!(
        sys_mmap(&vm, s, &fdt, STACKBOTTOM, 5000, false, fd, 0),
        0,
        "a mapping may not collide with the stack"
    );
    assert_eq!(sys_mmap(&vm, s, &fdt, HEAP, 5000, false, fd, 0), 0, "overlap");
    assert_eq!(
        sys_mmap(&vm, s, &fdt, HEAP + PGSIZE, 5000, false, empty_fd, 0),
        0,
        "empty file"
    );

    assert_eq!(vm.page_count(s), before);
    vm.validate();
}

#[test]
fn fork_copies_and_isolates() {
    let vm = Vm::new();
    let parent = vm.create_space().unwrap();
    anon_page(&vm, parent, HEAP);
    vm.copy_out(parent, IDLE_RSP, HEAP, &b'X').unwrap();

    let child = vm.fork_space(parent).unwrap();
    assert_eq!(vm.page_count(child), vm.page_count(parent));

    let mut byte = 0u8;
    vm.copy_in(child, IDLE_RSP, &mut byte, HEAP).unwrap();
    assert_eq!(byte, b'X');

    vm.copy_out(child, IDLE_RSP, HEAP, &b'Y').unwrap();
    vm.copy_in(parent, IDLE_RSP, &mut byte, HEAP).unwrap();
    assert_eq!(byte, b'X', "child stores must not leak into the parent");
    vm.copy_in(child, IDLE_RSP, &mut byte, HEAP).unwrap();
    assert_eq!(byte, b'Y');
    vm.validate();
}

#[test]
fn fork_copies_pending_and_swapped_pages() {
    let vm = Vm::new();
    let parent = vm.create_space().unwrap();
    let n = NFRAME + 16;
    for i in 0..n {
        anon_page(&vm, parent, HEAP + i * PGSIZE);
    }
    // Touch only some: the rest stay pending across the fork.
    for i in 0..n - 8 {
        vm.copy_out(parent, IDLE_RSP, HEAP + i * PGSIZE, &(i as u64)).unwrap();
    }

    let child = vm.fork_space(parent).unwrap();
    assert_eq!(vm.page_count(child), vm.page_count(parent));
    for i in 0..n {
        let mut value = 0u64;
        vm.copy_in(child, IDLE_RSP, &mut value, HEAP + i * PGSIZE).unwrap();
        let expected = if i < n - 8 { i as u64 } else { 0 };
        assert_eq!(value, expected);
    }
    vm.validate();
    vm.destroy_space(child);
    vm.destroy_space(parent);
    vm.validate();
}

#[test]
fn fork_duplicates_file_mappings_privately() {
    let vm = Vm::new();
    let parent = vm.create_space().unwrap();
    let file = File::create(&[9u8; 100]);
    let base = vm
        .mmap(parent, HEAP, 100, true, &file, 0)
        .unwrap()
        .into_usize();
    vm.copy_out(parent, IDLE_RSP, base, &b'P').unwrap();

    let child = vm.fork_space(parent).unwrap();
    let mut byte = 0u8;
    vm.copy_in(child, IDLE_RSP, &mut byte, base).unwrap();
    assert_eq!(byte, b'P');

    vm.copy_out(child, IDLE_RSP, base, &b'C').unwrap();
    vm.copy_in(parent, IDLE_RSP, &mut byte, base).unwrap();
    assert_eq!(byte, b'P');
    vm.validate();
}

#[test]
fn load_segment_is_lazy_and_reads_the_file() {
    let vm = Vm::new();
    let s = vm.create_space().unwrap();
    let contents: Vec<u8> = (0..PGSIZE).map(|i| (i % 251) as u8).collect();
    let file = File::create(&contents);

    let base = 0x40_0000;
    assert!(vm.load_segment(s, &file, 0, UVAddr::from(base), PGSIZE, PGSIZE, true));
    assert_eq!(vm.page_count(s), 2);

    let mut byte = 0u8;
    vm.copy_in(s, IDLE_RSP, &mut byte, base + 999).unwrap();
    assert_eq!(byte, (999 % 251) as u8);
    vm.copy_in(s, IDLE_RSP, &mut byte, base + PGSIZE + 999).unwrap();
    assert_eq!(byte, 0);

    // Segment pages are anonymous: a store never reaches the file.
    vm.copy_out(s, IDLE_RSP, base, &0xFFu8).unwrap();
    let mut first = 0u8;
    file.read_at(core::slice::from_mut(&mut first), 0);
    assert_eq!(first, 0);
    vm.validate();
}

#[test]
fn duplicate_registration_fails() {
    let vm = Vm::new();
    let s = vm.create_space().unwrap();
    anon_page(&vm, s, HEAP);
    assert!(!vm.alloc_page_with_initializer(
        s,
        PageTarget::Anon { stack: false },
        UVAddr::from(HEAP),
        true,
        PageInit::Zero,
    ));
    assert_eq!(vm.page_count(s), 1);
}

#[test]
fn destroy_space_returns_all_frames() {
    let vm = Vm::new();
    let a = vm.create_space().unwrap();
    let b = vm.create_space().unwrap();
    for i in 0..NFRAME / 2 {
        anon_page(&vm, a, HEAP + i * PGSIZE);
        anon_page(&vm, b, HEAP + i * PGSIZE);
        vm.copy_out(a, IDLE_RSP, HEAP + i * PGSIZE, &1u8).unwrap();
        vm.copy_out(b, IDLE_RSP, HEAP + i * PGSIZE, &2u8).unwrap();
    }
    vm.destroy_space(a);
    vm.validate();
    // The freed frames are usable again without eviction pressure.
    let c = vm.create_space().unwrap();
    for i in 0..NFRAME / 2 {
        anon_page(&vm, c, HEAP + i * PGSIZE);
        vm.copy_out(c, IDLE_RSP, HEAP + i * PGSIZE, &3u8).unwrap();
    }
    let mut byte = 0u8;
    vm.copy_in(b, IDLE_RSP, &mut byte, HEAP).unwrap();
    assert_eq!(byte, 2);
    vm.validate();
}
