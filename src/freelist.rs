use std::{mem, ptr::NonNull};

use crate::block::{Block, BLOCK_FIXED_HEADER_SIZE};

/// Number of exact-size free lists. Index `N_LISTS` is the catch-all for
/// anything whose payload capacity would not fit one of the exact classes.
pub(crate) const N_LISTS: usize = 59;

/// A segregated collection of doubly-linked free lists, indexed by size
/// class, plus a catch-all list for oversized blocks.
///
/// Free blocks are linked intrusively through their own `prev`/`next`
/// fields (see [`crate::block::Block`]) rather than through a separate node
/// wrapper — this is what lets an allocated block reuse exactly those bytes
/// as payload.
///
/// ```text
///           lists[0]            lists[1]                    lists[N]
///         (1 word)            (2 words)                   (catch-all)
///      +-----------+       +-----------+               +-----------+
///      |  Block    |       |  Block    |       ...      |  Block    | -> Block -> ...
///      +-----------+       +-----------+               +-----------+
/// ```
pub(crate) struct FreeListIndex {
    lists: [Option<NonNull<Block>>; N_LISTS + 1],
}

impl FreeListIndex {
    pub(crate) const fn new() -> Self {
        Self {
            lists: [None; N_LISTS + 1],
        }
    }

    /// Maps a payload size to the index of the list that holds blocks of
    /// exactly that capacity (or the catch-all, for anything too large).
    pub(crate) fn size_class(payload_size: usize) -> usize {
        let word = mem::size_of::<usize>();
        debug_assert!(payload_size >= word, "payload below minimum allocation size");
        let sc = payload_size / word - 1;
        sc.min(N_LISTS)
    }

    fn payload_size(block: NonNull<Block>) -> usize {
        unsafe { block.as_ref().size - BLOCK_FIXED_HEADER_SIZE }
    }

    /// Adds `block` to the list matching its current size. Marks it free.
    ///
    /// **SAFETY**: `block` must not already be linked into any free list.
    pub(crate) unsafe fn insert(&mut self, mut block: NonNull<Block>) {
        let sc = Self::size_class(Self::payload_size(block));

        unsafe {
            block.as_mut().free = true;
            block.as_mut().prev = None;
            block.as_mut().next = self.lists[sc];

            if let Some(mut old_head) = self.lists[sc] {
                old_head.as_mut().prev = Some(block);
            }

            self.lists[sc] = Some(block);
        }
    }

    /// Removes `block` from the free list it currently sits on. Marks it
    /// allocated.
    ///
    /// **SAFETY**: `block` must currently be linked into the list matching
    /// its size.
    pub(crate) unsafe fn remove(&mut self, mut block: NonNull<Block>) {
        let sc = Self::size_class(Self::payload_size(block));

        unsafe {
            match block.as_ref().prev {
                Some(mut prev) => prev.as_mut().next = block.as_ref().next,
                None => self.lists[sc] = block.as_ref().next,
            }

            if let Some(mut next) = block.as_ref().next {
                next.as_mut().prev = block.as_ref().prev;
            }

            block.as_mut().prev = None;
            block.as_mut().next = None;
            block.as_mut().free = false;
        }
    }

    /// Finds a free block whose payload capacity is at least `min_payload`
    /// and removes it from its list. Starts at `size_class(min_payload)`; if
    /// that exact-size list is empty, climbs to the next larger exact-size
    /// list (any block found there is guaranteed to fit); only falls back to
    /// a linear first-fit scan of the catch-all list.
    pub(crate) unsafe fn find_fit(&mut self, min_payload: usize) -> Option<NonNull<Block>> {
        let start = Self::size_class(min_payload);

        for sc in start..N_LISTS {
            if let Some(block) = self.lists[sc] {
                unsafe { self.remove(block) };
                return Some(block);
            }
        }

        let mut current = self.lists[N_LISTS];
        while let Some(block) = current {
            if Self::payload_size(block) >= min_payload {
                unsafe { self.remove(block) };
                return Some(block);
            }
            current = unsafe { block.as_ref().next };
        }

        None
    }
}
