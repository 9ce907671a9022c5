use std::{
    alloc::{GlobalAlloc, Layout},
    cell::UnsafeCell,
    mem,
    ptr::{self, NonNull},
};

use crate::{
    block::{self, Block, BLOCK_FIXED_HEADER_SIZE, BLOCK_HEADER_SIZE, MIN_BLOCK_SIZE},
    freelist::FreeListIndex,
    kernel::{self, Kernel},
    list::{List, Node},
    region::{self, Region, FENCE_SIZE},
    utils::align,
};

/// Size of a single chunk requested from the Region Provider. A fixed
/// compile-time constant, matching the segregated free-list reference
/// variant this allocator is modeled on.
const CHUNK_SIZE: usize = 16 << 20;

struct Inner {
    lists: FreeListIndex,
    chunks: List<Region>,
    /// Cursor into the out-of-band metadata arena that backs `chunks`' nodes
    /// (see `MemAlloc::record_chunk`). `None` until the first chunk is
    /// recorded.
    meta_cursor: Option<NonNull<u8>>,
    /// Bytes remaining at `meta_cursor` before another metadata page must be
    /// requested from the Region Provider.
    meta_remaining: usize,
    top: Option<NonNull<u8>>,
    top_block: Option<NonNull<Block>>,
    bottom: Option<NonNull<u8>>,
    bottom_block: Option<NonNull<Block>>,
}

impl Inner {
    const fn new() -> Self {
        Self {
            lists: FreeListIndex::new(),
            chunks: List::new(),
            meta_cursor: None,
            meta_remaining: 0,
            top: None,
            top_block: None,
            bottom: None,
            bottom_block: None,
        }
    }
}

/// A user-space, general-purpose memory allocator.
///
/// Heap memory is obtained from the OS in fixed-size chunks (see
/// [`CHUNK_SIZE`]) via [`Kernel`], then carved into boundary-tagged
/// [`Block`]s separated by one-word fence sentinels. Free blocks are kept on
/// [`FreeListIndex`], a segregated-by-size structure with a catch-all list
/// for anything too big to have an exact class.
///
/// `MemAlloc` holds all of its mutable state behind an [`UnsafeCell`] and
/// exposes only `&self` methods, so a single instance can live in a `static`
/// and back [`GlobalAlloc`]. It is not internally synchronized: see the
/// module-level safety note on the `Sync` impl below.
pub struct MemAlloc {
    inner: UnsafeCell<Inner>,
}

// SAFETY: `MemAlloc` performs no internal locking. It is `Sync` only because
// `#[global_allocator]` requires it and because, in practice, the global
// allocator is invoked from a single OS thread at a time in the workloads
// this crate targets (see DESIGN.md). Using a `MemAlloc` instance from
// multiple threads concurrently without external synchronization is
// undefined behavior.
unsafe impl Sync for MemAlloc {}

impl MemAlloc {
    /// Creates an allocator with no memory mapped yet. Mapping happens
    /// lazily, on the first call that cannot be satisfied from an empty free
    /// list.
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(Inner::new()),
        }
    }

    /// Largest payload size this allocator can ever satisfy, given the
    /// fixed chunk size it requests memory in.
    pub const fn max_allocation_size() -> usize {
        CHUNK_SIZE - BLOCK_HEADER_SIZE - (FENCE_SIZE * 2)
    }

    #[inline]
    fn inner(&self) -> &mut Inner {
        // SAFETY: see the `Sync` impl note above — single-threaded use only.
        unsafe { &mut *self.inner.get() }
    }

    /// Allocates `n` zeroed bytes and returns a pointer to them, or a null
    /// pointer if `n` is zero, exceeds [`MemAlloc::max_allocation_size`], or
    /// the Region Provider is out of memory.
    pub fn allocate(&self, n: usize) -> *mut u8 {
        if n == 0 || n > Self::max_allocation_size() {
            return ptr::null_mut();
        }

        let word = std::mem::size_of::<usize>();
        let size = align(n, word);

        let inner = self.inner();
        let block = match unsafe { Self::alloc_with_size_class(inner, size) } {
            Some(block) => block,
            None => return ptr::null_mut(),
        };

        unsafe {
            debug_assert!(!block.as_ref().free);
            debug_assert!(block.as_ref().size >= size + BLOCK_FIXED_HEADER_SIZE);

            let data = block::payload(block);
            ptr::write_bytes(data.as_ptr(), 0, size);
            data.as_ptr()
        }
    }

    /// Releases a pointer previously returned by [`MemAlloc::allocate`].
    /// A null pointer is a no-op.
    ///
    /// **SAFETY**: `p` must either be null or a pointer previously returned
    /// by this same allocator's `allocate`, not yet released.
    pub unsafe fn release(&self, p: *mut u8) {
        let Some(p) = NonNull::new(p) else {
            return;
        };

        let inner = self.inner();
        let mut block = unsafe { block::from_payload(p) };

        unsafe {
            debug_assert!(!block.as_ref().free);
            inner.lists.insert(block);

            let right = block::right(block);
            if !region::is_fence(right) {
                let right_block = NonNull::new_unchecked(right as *mut Block);
                if right_block.as_ref().free {
                    block = Self::coalesce(inner, block, right_block);
                }
            }

            let left = block::left(block);
            if !region::is_fence(left) {
                let left_block = NonNull::new_unchecked(left as *mut Block);
                if left_block.as_ref().free {
                    Self::coalesce(inner, left_block, block);
                }
            }
        }
    }

    /// Walks every acquired chunk and every block within it, checking the
    /// structural invariants of the block layout. Panics on the first
    /// violation found, since continuing with corrupted heap metadata would
    /// silently damage unrelated allocations.
    pub fn verify(&self) {
        let inner = self.inner();

        for region in inner.chunks.iter() {
            let mut cursor = region.fenced_area_start();

            unsafe {
                assert!(region::is_fence(cursor), "region is missing its leading fence");
                cursor = cursor.add(FENCE_SIZE);

                let mut prev_size: Option<usize> = None;

                while !region::is_fence(cursor) {
                    let block = NonNull::new_unchecked(cursor as *mut Block);
                    let size = block.as_ref().size;
                    let left_size = block.as_ref().left_size;

                    assert!(size >= MIN_BLOCK_SIZE, "block smaller than the minimum block size");
                    assert_eq!(size % std::mem::size_of::<usize>(), 0, "block size is not word-aligned");

                    if let Some(prev_size) = prev_size {
                        assert_eq!(left_size, prev_size, "left_size does not match the left neighbor's size");
                    }

                    prev_size = Some(size);
                    cursor = cursor.add(size);
                }

                // Not asserted: `cursor == region.end() - FENCE_SIZE`. When a
                // top-merge has fused this region with the next one, a block
                // legitimately runs past this region's own recorded end and
                // the walk only stops at the fused island's true trailing
                // fence — the `while` condition above already guarantees
                // `cursor` sits on *some* fence, which is what matters.
            }
        }
    }

    /// Attempts to satisfy `alloc_size` from its exact-size-class list,
    /// climbing to larger classes and finally the catch-all list (via
    /// [`FreeListIndex::find_fit`]), mapping fresh memory only as a last
    /// resort. Ported from the reference implementation's
    /// `alloc_with_size_class`/`alloc_from_general_list`.
    unsafe fn alloc_with_size_class(inner: &mut Inner, alloc_size: usize) -> Option<NonNull<Block>> {
        let mut block = match unsafe { inner.lists.find_fit(alloc_size) } {
            Some(block) => block,
            None => unsafe { Self::acquire_more_memory(inner, alloc_size) }?,
        };

        unsafe {
            // Split off the leading part as a new free block if what remains
            // after carving out `alloc_size` is still worth keeping. The
            // right portion `split` carves off is never smaller than
            // `BLOCK_HEADER_SIZE` (it clamps up to fit `prev`/`next` in case
            // it is later freed) — the gate has to account for that clamp,
            // not just `alloc_size`, or a small request could leave a left
            // remainder smaller than `MIN_BLOCK_SIZE`.
            let right_size = (alloc_size + BLOCK_FIXED_HEADER_SIZE).max(BLOCK_HEADER_SIZE);
            if block.as_ref().size >= right_size + MIN_BLOCK_SIZE {
                let remainder = Self::split(inner, block, alloc_size);
                inner.lists.insert(block);
                block = remainder;
            }

            block.as_mut().free = false;
            block.as_mut().prev = None;
            block.as_mut().next = None;
        }

        Some(block)
    }

    /// Splits `block` so that its right portion has room for `payload_size`
    /// bytes plus header, keeping the left portion (still free) as large as
    /// possible. Returns the right (now-allocated-sized) portion.
    unsafe fn split(inner: &mut Inner, mut block: NonNull<Block>, payload_size: usize) -> NonNull<Block> {
        unsafe {
            let total_size = block.as_ref().size;
            let left_size = total_size
                - (payload_size + BLOCK_FIXED_HEADER_SIZE).max(BLOCK_HEADER_SIZE);

            block.as_mut().free = true;
            block.as_mut().size = left_size;

            let mut right = NonNull::new_unchecked(block::right(block) as *mut Block);
            right.as_mut().size = total_size - left_size;
            right.as_mut().left_size = left_size;
            right.as_mut().free = false;
            right.as_mut().prev = None;
            right.as_mut().next = None;

            let right_right = block::right(right);
            if !region::is_fence(right_right) {
                (*(right_right as *mut Block)).left_size = right.as_ref().size;
            }

            if inner.top_block == Some(block) {
                inner.top_block = Some(right);
            }

            right
        }
    }

    /// Merges `left` and `right`, which must be physically adjacent, into a
    /// single free block. Returns the merged block (which is `left`, grown).
    unsafe fn coalesce(inner: &mut Inner, left: NonNull<Block>, right: NonNull<Block>) -> NonNull<Block> {
        unsafe {
            inner.lists.remove(left);
            inner.lists.remove(right);

            let mut left = left;
            let merged_size = left.as_ref().size + right.as_ref().size;
            left.as_mut().size = merged_size;

            let right_right = block::right(right);
            if !region::is_fence(right_right) {
                (*(right_right as *mut Block)).left_size = merged_size;
            }

            inner.lists.insert(left);

            if inner.top_block == Some(right) {
                inner.top_block = Some(left);
            }
            if inner.bottom_block == Some(right) {
                inner.bottom_block = Some(left);
            }

            left
        }
    }

    /// Maps a fresh chunk from the Region Provider and stitches it into the
    /// existing layout. Ported from the reference implementation's
    /// `acquire_more_memory`.
    unsafe fn acquire_more_memory(inner: &mut Inner, alloc_size: usize) -> Option<NonNull<Block>> {
        debug_assert!(alloc_size + BLOCK_HEADER_SIZE + (FENCE_SIZE * 2) <= CHUNK_SIZE);

        let base = unsafe { Kernel::request_memory(CHUNK_SIZE).ok()? };
        Some(unsafe { Self::stitch_chunk(inner, base) })
    }

    /// Records `region` in the out-of-band chunk bookkeeping list used by
    /// [`MemAlloc::verify`], backed by a metadata arena fed from its own
    /// Region Provider requests rather than from chunk memory — see the doc
    /// comment on [`crate::region::Region`] for why the node must never live
    /// inside the chunk it describes. Best-effort: if the Region Provider
    /// cannot supply a fresh metadata page, the chunk is simply left out of
    /// `verify`'s walk; allocation and release through it are unaffected.
    unsafe fn record_chunk(inner: &mut Inner, region: Region) {
        let node_size = mem::size_of::<Node<Region>>();

        if inner.meta_remaining < node_size {
            let meta_size = align(node_size, kernel::page_size());
            let Ok(meta_base) = (unsafe { Kernel::request_memory(meta_size) }) else {
                return;
            };
            inner.meta_cursor = Some(meta_base);
            inner.meta_remaining = meta_size;
        }

        let cursor = inner.meta_cursor.unwrap();
        unsafe {
            inner.chunks.append(region, cursor);
            inner.meta_cursor = Some(NonNull::new_unchecked(cursor.as_ptr().add(node_size)));
        }
        inner.meta_remaining -= node_size;
    }

    /// Stitches a chunk already obtained from the Region Provider (base
    /// address `base`, `CHUNK_SIZE` bytes) into the existing layout, merging
    /// with whichever of `top`/`bottom` it happens to abut. Split out of
    /// [`MemAlloc::acquire_more_memory`] so the merge logic can be exercised
    /// directly against a caller-supplied, deterministically adjacent pair of
    /// chunks in tests, without depending on the Region Provider actually
    /// returning adjacent addresses (see the Design Notes on region-merge
    /// correctness).
    unsafe fn stitch_chunk(inner: &mut Inner, base: NonNull<u8>) -> NonNull<Block> {
        let region_descriptor = Region { base: base.as_ptr(), size: CHUNK_SIZE };
        let chunk_start = base.as_ptr();
        let chunk_end = unsafe { chunk_start.add(CHUNK_SIZE) };

        // If this chunk begins exactly where the current top region ends and
        // that region's terminal block is allocated, the top-merge branch
        // below will plant the absorbing block's header one fence-width
        // *before* `chunk_start` — which puts that block's `left_size` field
        // exactly on top of this chunk's own leading-fence word (see the
        // merge branch for why). This chunk then has no leading fence of its
        // own left to find, so it must not be recorded as an independently
        // walkable `Region`: `verify()` would expect a live fence at
        // `chunk_start` and abort on a perfectly healthy heap. The region
        // remains fully covered by `verify()` regardless, since the walk
        // through the preceding (now-extended) region keeps going past its
        // own recorded end and terminates at this chunk's own trailing
        // fence, which is untouched by this merge.
        let absorbed_by_allocated_top = match (inner.top, inner.top_block) {
            (Some(top), Some(top_block)) if top.as_ptr() == chunk_start => {
                unsafe { !top_block.as_ref().free }
            }
            _ => false,
        };

        if !absorbed_by_allocated_top {
            unsafe {
                Self::record_chunk(inner, region_descriptor);
            }
        }

        let fenced_start = region_descriptor.fenced_area_start();
        let fenced_end = region_descriptor.end();

        unsafe {
            region::write_fence(fenced_start);
            region::write_fence(fenced_end.sub(FENCE_SIZE));
        }

        let mut block = unsafe { NonNull::new_unchecked(fenced_start.add(FENCE_SIZE) as *mut Block) };
        unsafe {
            block.as_mut().free = false;
            block.as_mut().size = fenced_end.sub(FENCE_SIZE) as usize - (fenced_start.add(FENCE_SIZE)) as usize;
            block.as_mut().left_size = FENCE_SIZE;
            block.as_mut().prev = None;
            block.as_mut().next = None;
        }

        // Bottom merge: the new chunk ends exactly where the current bottom
        // region begins.
        if let Some(bottom) = inner.bottom {
            if bottom.as_ptr() == chunk_end {
                let mut bottom_block = inner.bottom_block.unwrap();
                unsafe {
                    debug_assert!(region::is_fence(block::left(bottom_block)));

                    if bottom_block.as_ref().free {
                        inner.lists.remove(bottom_block);
                        let merged_size = bottom_block.as_ref().size + CHUNK_SIZE;
                        block.as_mut().size = merged_size;
                        let right = NonNull::new_unchecked(block::right(bottom_block) as *mut Block);
                        (*right.as_ptr()).left_size = merged_size;
                    } else {
                        block.as_mut().size = CHUNK_SIZE;
                        bottom_block.as_mut().left_size = CHUNK_SIZE;
                    }
                }
            }
        }

        if inner.bottom.is_none() || chunk_start < inner.bottom.unwrap().as_ptr() {
            inner.bottom = Some(unsafe { NonNull::new_unchecked(chunk_start) });
            inner.bottom_block = Some(block);
        }

        // Top merge: the new chunk begins exactly where the current top
        // region ends.
        if let Some(top) = inner.top {
            if top.as_ptr() == chunk_start {
                let mut top_block = inner.top_block.unwrap();
                unsafe {
                    let right = NonNull::new_unchecked(block::right(top_block) as *mut Block);
                    debug_assert!(region::is_fence(right.as_ptr() as *const u8));

                    if top_block.as_ref().free {
                        inner.lists.remove(top_block);
                        top_block.as_mut().free = false;
                        top_block.as_mut().size += CHUNK_SIZE;
                        top_block.as_mut().prev = None;
                        top_block.as_mut().next = None;
                        block = top_block;
                    } else {
                        let mut right = right;
                        right.as_mut().free = false;
                        right.as_mut().size = CHUNK_SIZE;
                        right.as_mut().left_size = top_block.as_ref().size;
                        right.as_mut().prev = None;
                        right.as_mut().next = None;
                        block = right;
                    }
                }
            }
        }

        if inner.top.is_none() || chunk_start > inner.top.unwrap().as_ptr() {
            inner.top = Some(unsafe { NonNull::new_unchecked(chunk_end) });
            inner.top_block = Some(block);
        }

        block
    }
}

impl Default for MemAlloc {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl GlobalAlloc for MemAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        debug_assert!(
            layout.align() <= mem::size_of::<usize>(),
            "MemAlloc guarantees only machine-word alignment"
        );
        self.allocate(layout.size())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        unsafe { self.release(ptr) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_gate_never_leaves_an_undersized_remainder() {
        // The right portion `split` carves off is clamped up to
        // `BLOCK_HEADER_SIZE` so it can later be freed safely; the gate in
        // `alloc_with_size_class` has to budget for that clamp, not just the
        // raw `alloc_size`, or a small request against a block sized exactly
        // at the old (under-budgeted) threshold would leave a free remainder
        // too small to hold its own `prev`/`next` pointers.
        let word = std::mem::size_of::<usize>();
        let mut inner = Inner::new();

        for alloc_size in [word, 2 * word, 3 * word, 4 * word] {
            let right_size = (alloc_size + BLOCK_FIXED_HEADER_SIZE).max(BLOCK_HEADER_SIZE);
            let total_size = right_size + MIN_BLOCK_SIZE;

            let mut storage = vec![0u8; total_size + 4 * BLOCK_HEADER_SIZE].into_boxed_slice();
            let block = unsafe { NonNull::new_unchecked(storage.as_mut_ptr() as *mut Block) };
            unsafe {
                (*block.as_ptr()).size = total_size;
            }

            let remainder = unsafe { MemAlloc::split(&mut inner, block, alloc_size) };
            unsafe {
                assert!(block.as_ref().size >= MIN_BLOCK_SIZE, "left remainder below minimum block size");
                assert_eq!(block.as_ref().size + remainder.as_ref().size, total_size);
                assert_eq!(remainder.as_ref().left_size, block.as_ref().size);
            }
        }
    }

    #[test]
    fn single_allocation_lifecycle() {
        let alloc = MemAlloc::new();
        let p = alloc.allocate(128);
        assert!(!p.is_null());

        unsafe {
            ptr::write_bytes(p, 0xAB, 128);
            alloc.release(p);
        }
        alloc.verify();
    }

    #[test]
    fn zero_and_oversized_requests_return_null() {
        let alloc = MemAlloc::new();
        assert!(alloc.allocate(0).is_null());
        assert!(alloc.allocate(MemAlloc::max_allocation_size() + 1).is_null());
    }

    #[test]
    fn split_leaves_a_healthy_remainder_for_a_smaller_request() {
        let alloc = MemAlloc::new();
        let a = alloc.allocate(4096);
        assert!(!a.is_null());
        unsafe { alloc.release(a) };

        let b = alloc.allocate(64);
        assert!(!b.is_null());
        unsafe { alloc.release(b) };
        alloc.verify();
    }

    #[test]
    fn same_size_alloc_release_alloc_reuses_the_freed_block() {
        let alloc = MemAlloc::new();
        let a = alloc.allocate(8);
        assert!(!a.is_null());
        unsafe { alloc.release(a) };

        let b = alloc.allocate(8);
        assert_eq!(b, a, "re-allocating the same size should reuse the freed block");
        unsafe { alloc.release(b) };
        alloc.verify();
    }

    #[test]
    fn odd_index_fragmentation_leaves_five_allocated_and_five_non_adjacent_free() {
        let alloc = MemAlloc::new();

        let pointers: Vec<*mut u8> = (0..10)
            .map(|_| {
                let p = alloc.allocate(8);
                assert!(!p.is_null());
                p
            })
            .collect();

        let odd_indices = [1, 3, 5, 7, 9];
        let mut freed = Vec::new();
        for &i in odd_indices.iter().rev() {
            unsafe { alloc.release(pointers[i]) };
            freed.push(pointers[i]);
        }
        alloc.verify();

        // Each freed block is still exactly reusable on its own: re-allocating
        // the same size five times must hand back exactly the five addresses
        // just freed (in LIFO order, since each is its own size-class list
        // head), proving none of them coalesced into a neighbor — the
        // still-allocated even-index blocks sit between every pair of them.
        let mut reused = Vec::new();
        for _ in 0..5 {
            let p = alloc.allocate(8);
            assert!(!p.is_null());
            reused.push(p);
        }
        reused.sort();
        let mut expected = freed.clone();
        expected.sort();
        assert_eq!(reused, expected, "freed odd-index blocks must stay distinct, unmerged blocks");

        for p in reused {
            unsafe { alloc.release(p) };
        }
        for i in [0, 2, 4, 6, 8] {
            unsafe { alloc.release(pointers[i]) };
        }
        alloc.verify();
    }

    #[test]
    fn every_size_class_reuses_its_freed_block_when_coalescence_is_blocked() {
        let alloc = MemAlloc::new();
        let word = std::mem::size_of::<usize>();

        for k in 1..crate::freelist::N_LISTS {
            let x = alloc.allocate((k + 1) * word);
            assert!(!x.is_null(), "allocation for size class {k} failed");
            // A second, adjacent allocation keeps `x`'s right neighbor
            // allocated, so releasing `x` cannot coalesce it away — the
            // freed block must come back exactly as released.
            let y = alloc.allocate((k + 2) * word);
            assert!(!y.is_null(), "guard allocation for size class {k} failed");

            unsafe { alloc.release(x) };
            let reused = alloc.allocate((k + 1) * word);
            assert_eq!(reused, x, "size class {k} did not reuse its freed block");

            unsafe {
                alloc.release(reused);
                alloc.release(y);
            }
        }
        alloc.verify();
    }

    #[test]
    fn coalesce_adjacent_free_blocks() {
        let alloc = MemAlloc::new();
        let a = alloc.allocate(256);
        let b = alloc.allocate(256);
        let c = alloc.allocate(256);
        assert!(!a.is_null() && !b.is_null() && !c.is_null());

        unsafe {
            alloc.release(b);
            alloc.release(a);
            alloc.release(c);
        }
        alloc.verify();

        // The whole chunk's worth of space should be available as one block
        // again: a large allocation should succeed without mapping another
        // chunk.
        let big = alloc.allocate(4096);
        assert!(!big.is_null());
        unsafe { alloc.release(big) };
    }

    #[test]
    fn allocations_across_all_size_classes() {
        let alloc = MemAlloc::new();
        let word = std::mem::size_of::<usize>();
        let mut pointers = Vec::new();

        for sc in 0..80 {
            let size = (sc + 1) * word;
            let p = alloc.allocate(size);
            assert!(!p.is_null(), "allocation of size {size} failed");
            pointers.push(p);
        }

        alloc.verify();

        for p in pointers {
            unsafe { alloc.release(p) };
        }
        alloc.verify();
    }

    #[test]
    fn mixed_sizes_with_verify_after_every_step() {
        let alloc = MemAlloc::new();
        let sizes = [
            123usize, 456, 1, 8, 8, 8, 56, 8, 12, 67, 32497, 123, 456, 8, 8, 8, 6, 6, 6, 12, 12,
        ];

        for i in 1..=sizes.len() {
            let mut pointers: Vec<*mut u8> = sizes[..i]
                .iter()
                .map(|&size| {
                    let p = alloc.allocate(size);
                    assert!(!p.is_null());
                    p
                })
                .collect();

            if i % 2 == 0 {
                pointers.reverse();
            }

            for p in pointers {
                unsafe { alloc.release(p) };
            }

            alloc.verify();
        }
    }

    #[test]
    fn global_alloc_adapter_round_trips() {
        let alloc = MemAlloc::new();
        let layout = Layout::from_size_align(256, std::mem::size_of::<usize>()).unwrap();

        unsafe {
            let ptr = GlobalAlloc::alloc(&alloc, layout);
            assert!(!ptr.is_null());
            GlobalAlloc::dealloc(&alloc, ptr, layout);
        }
        alloc.verify();
    }

    #[test]
    fn top_merge_survives_writes_to_the_swallowed_chunk() {
        // The Region Provider gives no guarantee that two chunks land
        // adjacent in the address space (see the Design Notes), but when
        // they happen to, `stitch_chunk` must fold them into one block
        // without putting the second chunk's own bookkeeping node somewhere
        // a caller's write can reach it. Simulate that adjacency directly
        // rather than relying on real `mmap` placement.
        //
        // `first` is never released here, so it is still allocated when
        // `high` is stitched on: this drives the allocated-`top_block`
        // branch of the top merge, not the free-`top_block` one.
        let mut storage = vec![0u8; 2 * CHUNK_SIZE].into_boxed_slice();
        let base = storage.as_mut_ptr();

        let mut inner = Inner::new();
        unsafe {
            let low = NonNull::new_unchecked(base);
            let high = NonNull::new_unchecked(base.add(CHUNK_SIZE));

            let first = MemAlloc::stitch_chunk(&mut inner, low);
            assert_eq!(inner.bottom_block, Some(first));
            assert_eq!(inner.top_block, Some(first));

            let second = MemAlloc::stitch_chunk(&mut inner, high);
            assert_eq!(inner.top_block, Some(second));
            assert_eq!(second.as_ref().size, CHUNK_SIZE);
            assert_eq!(second.as_ref().left_size, first.as_ref().size);

            // `high`'s own leading fence was just turned into `second`'s
            // `left_size` field, so it must not be recorded as an
            // independently walkable chunk — only `low` is.
            let bases: Vec<*mut u8> = inner.chunks.iter().map(|r| r.base).collect();
            assert_eq!(bases, vec![low.as_ptr()]);

            // Hammer the entire merged block's payload, including the byte
            // range where the second chunk's own leading fence used to sit.
            let payload = block::payload(second);
            let payload_len = second.as_ref().size - BLOCK_FIXED_HEADER_SIZE;
            ptr::write_bytes(payload.as_ptr(), 0xCC, payload_len);

            // The chunk bookkeeping list must still be intact and walkable.
            let bases: Vec<*mut u8> = inner.chunks.iter().map(|r| r.base).collect();
            assert_eq!(bases, vec![low.as_ptr()]);
        }

        // `verify()` must walk the whole merged island without tripping over
        // the now-absent leading fence of the swallowed chunk.
        let alloc = MemAlloc { inner: UnsafeCell::new(inner) };
        alloc.verify();
    }
}
