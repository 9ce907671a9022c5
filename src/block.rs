use std::{mem, ptr::NonNull};

/// Fixed portion of the block header: the bytes present whether or not the
/// block is currently allocated.
///
/// Computed as `offset_of!(Block, prev)`, i.e. the size of `size` +
/// `left_size` + `free` plus whatever padding the compiler inserts before
/// the first pointer field. The free-list `prev`/`next` pointers live past
/// this offset, inside what becomes the caller's payload once the block is
/// allocated — see the module doc on [`Block`].
pub(crate) const BLOCK_FIXED_HEADER_SIZE: usize = mem::offset_of!(Block, prev);

/// Full size of a [`Block`] header, fixed prefix plus the two free-list
/// pointers. This is also the minimum size of any block, since a block must
/// be able to hold its own header whether free or allocated.
pub(crate) const BLOCK_HEADER_SIZE: usize = mem::size_of::<Block>();

/// Minimum total size of a block: the fixed prefix plus two pointer slots.
pub(crate) const MIN_BLOCK_SIZE: usize = BLOCK_HEADER_SIZE;

/// The structure of a block. The fixed fields (`size`, `left_size`, `free`)
/// are present for every block; the `prev`/`next` fields are only meaningful
/// while `free` is `true` — once a block is allocated, those same bytes are
/// handed to the caller as part of the payload.
///
/// ```text
/// +----------------+        +
/// |      size      |        |
/// +----------------+        |
/// |    left_size   |        | -> Fixed header (present always)
/// +----------------+        |
/// |   free (bool)  |        |
/// +----------------+        +
/// |      prev      |        | -> Free-list linkage (payload once allocated)
/// +----------------+        |
/// |      next      |        |
/// +----------------+        +
/// |     Content    |
/// |                |
/// +----------------+
/// ```
#[repr(C)]
pub(crate) struct Block {
    /// Total byte count of the block, including its header. Always a
    /// multiple of the word size.
    pub size: usize,
    /// Total byte count of the immediately-preceding physical block, used
    /// for O(1) left-neighbor navigation. Equals the fence width if the left
    /// neighbor is a fence.
    pub left_size: usize,
    /// Whether this block currently sits on a free list.
    pub free: bool,
    /// Previous free-list sibling. Only meaningful while `free`.
    pub prev: Option<NonNull<Block>>,
    /// Next free-list sibling. Only meaningful while `free`.
    pub next: Option<NonNull<Block>>,
}

/// Address of the first byte the caller sees for `block`.
#[inline]
pub(crate) fn payload(block: NonNull<Block>) -> NonNull<u8> {
    unsafe { NonNull::new_unchecked((block.as_ptr() as *mut u8).add(BLOCK_FIXED_HEADER_SIZE)) }
}

/// Recovers the block header from a pointer previously handed out by
/// [`payload`].
///
/// **SAFETY**: `ptr` must have been returned by [`payload`] for a block that
/// is still allocated.
#[inline]
pub(crate) unsafe fn from_payload(ptr: NonNull<u8>) -> NonNull<Block> {
    unsafe { NonNull::new_unchecked(ptr.as_ptr().sub(BLOCK_FIXED_HEADER_SIZE) as *mut Block) }
}

/// Address of the block (or fence) immediately to the right of `block`.
///
/// **SAFETY**: `block` must be a live block whose `size` field is valid.
#[inline]
pub(crate) unsafe fn right(block: NonNull<Block>) -> *mut u8 {
    let size = unsafe { block.as_ref().size };
    unsafe { (block.as_ptr() as *mut u8).add(size) }
}

/// Address of the block (or fence) immediately to the left of `block`.
///
/// **SAFETY**: `block` must be a live block whose `left_size` field is valid.
#[inline]
pub(crate) unsafe fn left(block: NonNull<Block>) -> *mut u8 {
    let left_size = unsafe { block.as_ref().left_size };
    unsafe { (block.as_ptr() as *mut u8).sub(left_size) }
}
