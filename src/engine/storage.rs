//! Raw block storage backing archetype rows.
//!
//! A block is a contiguous, zero-initialized byte arena holding a fixed
//! number of entity rows. Rows are cells of uniform width, so addressing is
//! pure offset arithmetic and iteration walks memory linearly.
//!
//! Invariants:
//! - A block's buffer is allocated once and never moves or shrinks.
//! - Every cell offset inside a block is aligned to the row layout's cell
//!   alignment, because `cell_size` is rounded up to a multiple of it.
//! - Freshly allocated and recycled rows are fully zeroed before any
//!   component constructor runs over them.

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;

use crate::engine::types::MAX_ENTITIES_PER_BLOCK;

/// Byte layout of a single entity row.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RowLayout {
    /// Uniform cell width in bytes, a multiple of `cell_align`.
    pub cell_size: usize,
    /// Alignment required by the widest cell occupant.
    pub cell_align: usize,
    /// Row width in bytes.
    pub row_size: usize,
    /// Block width in bytes.
    pub block_size: usize,
}

impl RowLayout {
    /// Computes the row layout for `num_cols` cells of at least
    /// `max_cell_size` bytes aligned to `max_cell_align`.
    pub fn new(num_cols: usize, max_cell_size: usize, max_cell_align: usize) -> Self {
        let cell_align = max_cell_align.max(1);
        // Round the cell up so every column inside the row stays aligned.
        let cell_size = (max_cell_size.max(1) + cell_align - 1) / cell_align * cell_align;
        let row_size = cell_size * num_cols;
        Self {
            cell_size,
            cell_align,
            row_size,
            block_size: row_size * MAX_ENTITIES_PER_BLOCK,
        }
    }

    fn alloc_layout(&self) -> Layout {
        // block_size is a multiple of cell_align by construction.
        Layout::from_size_align(self.block_size, self.cell_align)
            .expect("row layout produced an invalid allocation layout")
    }
}

/// A zero-initialized arena of `MAX_ENTITIES_PER_BLOCK` rows.
pub(crate) struct Block {
    data: NonNull<u8>,
    layout: Layout,
}

impl Block {
    /// Allocates a zeroed block for the given row layout.
    pub fn zeroed(rows: &RowLayout) -> Self {
        let layout = rows.alloc_layout();
        let data = unsafe { alloc_zeroed(layout) };
        let Some(data) = NonNull::new(data) else {
            handle_alloc_error(layout);
        };
        Self { data, layout }
    }

    /// Base pointer of the block's buffer.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.data.as_ptr()
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        unsafe { dealloc(self.data.as_ptr(), self.layout) }
    }
}

/// Zeroes `len` bytes starting at `row`.
///
/// ## Safety
/// `row` must be valid for writes of `len` bytes.
#[inline]
pub(crate) unsafe fn zero_row(row: *mut u8, len: usize) {
    unsafe { std::ptr::write_bytes(row, 0, len) }
}
