use segalloc::MemAlloc;

fn log_alloc(addr: *mut u8, size: usize) {
    println!("Requested {size} bytes of memory");
    println!("Received this address: {addr:?}");
}

fn main() {
    let allocator = MemAlloc::new();

    let addr1 = allocator.allocate(8);
    log_alloc(addr1, 8);

    let addr2 = allocator.allocate(8);
    log_alloc(addr2, 8);

    let addr3 = allocator.allocate(16);
    log_alloc(addr3, 16);

    unsafe {
        allocator.release(addr1);
        allocator.release(addr2);
        allocator.release(addr3);
    }

    allocator.verify();
}
