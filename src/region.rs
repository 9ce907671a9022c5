use std::mem;

/// Size in bytes of a single fence sentinel. A fence is one machine word wide.
pub(crate) const FENCE_SIZE: usize = mem::size_of::<usize>();

/// Magic value written into every fence word. Reading this value back at a
/// given address is how block-walking code recognizes "there is nothing
/// further to navigate to here".
pub(crate) const FENCE_MAGIC: usize = 0xDEADBEEF;

/// Writes a fence sentinel at `addr`.
///
/// **SAFETY**: `addr` must be valid for a word-sized write.
pub(crate) unsafe fn write_fence(addr: *mut u8) {
    unsafe {
        (addr as *mut usize).write(FENCE_MAGIC);
    }
}

/// Returns whether the word at `addr` is a fence sentinel.
///
/// **SAFETY**: `addr` must be valid for a word-sized read.
pub(crate) unsafe fn is_fence(addr: *const u8) -> bool {
    unsafe { (addr as *const usize).read() == FENCE_MAGIC }
}

/// Bookkeeping record for a single chunk obtained from the Region Provider.
///
/// Unlike the blocks it brackets, a `Region` is not addressed by pointer
/// arithmetic from its neighbors — it exists purely so [`crate::MemAlloc::verify`]
/// can walk every chunk ever mapped, not only the two referenced by the
/// `top`/`bottom` cursors. Deliberately *not* stored inside the chunk's own
/// bytes: the optimistic top/bottom region-merge fast path can fold an
/// entire newly-mapped chunk into an existing block's payload, and a
/// bookkeeping node living in those bytes would be silently overwritten the
/// first time a caller writes through that payload. Instead, every `Region`
/// is recorded in a small out-of-band metadata arena (see
/// `MemAlloc::record_chunk`) fed from its own dedicated Region Provider
/// calls, never from chunk memory.
///
/// ```text
/// +-----------------------------------------------------------------+
/// | fence | block ... block | fence                                 |
/// +-----------------------------------------------------------------+
/// ```
#[derive(Clone, Copy)]
pub(crate) struct Region {
    /// Base address returned by the Region Provider for this chunk.
    pub base: *mut u8,
    /// Total length of the chunk, as requested from the Region Provider.
    pub size: usize,
}

impl Region {
    /// Address of the first byte of the chunk: the leading fence.
    #[inline]
    pub(crate) fn fenced_area_start(&self) -> *mut u8 {
        self.base
    }

    /// Address one past the last byte of the chunk: the end of the trailing fence.
    #[inline]
    pub(crate) fn end(&self) -> *mut u8 {
        unsafe { self.base.add(self.size) }
    }
}
