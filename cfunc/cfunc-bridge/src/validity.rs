//! Validity bitmaps over Arrow null buffers.
//!
//! The C ABI wants a byte-aligned LSB-first bitmap starting at row 0. Arrow
//! null buffers already use that bit layout but may start at an arbitrary
//! bit offset after slicing, so a bitmap is borrowed when the offset is
//! byte-aligned and re-packed into an owned buffer otherwise.

use std::marker::PhantomData;

use arrow::array::Array;

/// Row-validity view handed to compiled wrappers.
pub struct ValidityBitmap<'a> {
    /// Kept alive for [`ptr`](Self::ptr) when the Arrow buffer could not be
    /// borrowed directly.
    owned: Option<Vec<u8>>,
    /// Null when every row is valid.
    ptr: *const u8,
    _source: PhantomData<&'a ()>,
}

impl<'a> ValidityBitmap<'a> {
    pub fn all_valid() -> ValidityBitmap<'a> {
        ValidityBitmap {
            owned: None,
            ptr: std::ptr::null(),
            _source: PhantomData,
        }
    }

    pub fn from_array(array: &'a dyn Array) -> ValidityBitmap<'a> {
        let Some(nulls) = array.nulls() else {
            return Self::all_valid();
        };
        let inner = nulls.inner();
        if inner.offset() % 8 == 0 {
            // Byte-aligned: borrow the buffer directly.
            let ptr = unsafe { inner.values().as_ptr().add(inner.offset() / 8) };
            return ValidityBitmap {
                owned: None,
                ptr,
                _source: PhantomData,
            };
        }
        let mut owned = new_bitmap(array.len(), false);
        for row in 0..array.len() {
            if nulls.is_valid(row) {
                bitmap_set(&mut owned, row);
            }
        }
        Self::from_owned(owned)
    }

    pub fn from_owned(owned: Vec<u8>) -> ValidityBitmap<'a> {
        let ptr = owned.as_ptr();
        ValidityBitmap {
            owned: Some(owned),
            ptr,
            _source: PhantomData,
        }
    }

    /// Bitmap base pointer for the C ABI; null means all rows valid.
    pub fn ptr(&self) -> *const u8 {
        self.ptr
    }

    pub fn is_valid(&self, row: usize) -> bool {
        // SAFETY: `ptr` either is null, borrows a null buffer covering the
        // source array, or points into `owned` sized for the row count.
        unsafe { crate::abi::bitmap_is_valid(self.ptr, row) }
    }

    /// True when no bitmap is attached (every row valid).
    pub fn is_all_valid(&self) -> bool {
        self.ptr.is_null()
    }
}

// The owned variant never aliases anything mutable and borrowed buffers are
// immutable Arrow memory.
impl std::fmt::Debug for ValidityBitmap<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidityBitmap")
            .field("owned", &self.owned.is_some())
            .field("all_valid", &self.is_all_valid())
            .finish()
    }
}

/// Fresh bitmap covering `rows` rows, every bit set to `valid`.
pub(crate) fn new_bitmap(rows: usize, valid: bool) -> Vec<u8> {
    vec![if valid { 0xFF } else { 0 }; rows.div_ceil(8).max(1)]
}

pub(crate) fn bitmap_set(bits: &mut [u8], row: usize) {
    bits[row / 8] |= 1 << (row % 8);
}
