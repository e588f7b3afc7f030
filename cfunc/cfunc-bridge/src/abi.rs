//! Flat C-ABI descriptor structs and wrapper calling conventions.
//!
//! These layouts are the compatibility-critical boundary of the whole
//! system: compiled code on the other side declares matching C structs and
//! reads them field by field. All fields are pointer-sized or `u64`, natural
//! alignment only, and the sizes are pinned by tests against
//! [`TypeTag::storage_size`](cfunc_sig::TypeTag::storage_size).
//!
//! Validity bitmaps are byte-addressed, LSB-first (Arrow layout): row `r` is
//! valid iff `bitmap[r / 8] >> (r % 8) & 1`. A null bitmap pointer means
//! every row is valid.

use std::ffi::c_void;

/// One varchar/blob element: borrowed bytes plus length. Strings are not
/// NUL-terminated here; row-mode dispatch makes terminated copies instead.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CBytesRef {
    pub ptr: *const u8,
    pub len: u64,
}

/// One list row. `ptr` is the child element base already advanced to
/// `offset`; the validity bit of child element `i` is bit `offset + i` of
/// `validity`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CListRef {
    pub ptr: *const c_void,
    pub validity: *const u8,
    pub offset: u64,
    pub len: u64,
}

/// One fixed-size-array row. Same layout as [`CListRef`]; `len` always
/// equals the declared array length.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CArrayRef {
    pub ptr: *const c_void,
    pub validity: *const u8,
    pub offset: u64,
    pub len: u64,
}

/// One struct row. Field base pointers are row-invariant, so all rows of a
/// column share the same `field_ptrs`/`field_validity` tables and only
/// `row_offset` varies: field `f` of this row lives at
/// `field_ptrs[f] + row_offset * field_size`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CStructRef {
    pub field_ptrs: *const *const c_void,
    pub field_validity: *const *const u8,
    pub field_count: u64,
    pub row_offset: u64,
}

/// One map row over the engine's list-of-entries backing: parallel key and
/// value element bases, `offset`/`len` into both.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CMapRef {
    pub key_ptr: *const c_void,
    pub key_validity: *const u8,
    pub value_ptr: *const c_void,
    pub value_validity: *const u8,
    pub offset: u64,
    pub len: u64,
}

/// One union row. `tag_ptr[row_offset]` selects the member; member tables
/// are shared across rows like struct fields.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CUnionRef {
    pub tag_ptr: *const i8,
    pub member_ptrs: *const *const c_void,
    pub member_validity: *const *const u8,
    pub member_count: u64,
    pub row_offset: u64,
}

macro_rules! zeroed_ref {
    ($($ty:ty),*) => {$(
        impl $ty {
            /// Null/zero sentinel written for every invalid row: a wrapper
            /// that checks validity first never dereferences it.
            pub const fn zeroed() -> Self {
                // SAFETY: all fields are raw pointers or integers, for which
                // the all-zero bit pattern is a valid value.
                unsafe { std::mem::zeroed() }
            }
        }
    )*};
}

zeroed_ref!(CBytesRef, CListRef, CArrayRef, CStructRef, CMapRef, CUnionRef);

/// Row-mode wrapper contract: called once per fully valid row with one
/// pointer per argument. Returns `false` to fail the whole chunk; sets
/// `*out_is_null` to produce an invalid output row.
pub type RowWrapperFn = unsafe extern "C" fn(
    args: *const *const c_void,
    out: *mut c_void,
    out_is_null: *mut bool,
) -> bool;

/// Batch-mode wrapper contract: called once per chunk with column-major
/// argument pointers and per-argument validity bitmaps (null = all valid).
/// `out_validity` arrives all-ones; the wrapper clears bits to emit nulls.
pub type BatchWrapperFn = unsafe extern "C" fn(
    args: *const *const c_void,
    validity: *const *const u8,
    row_count: u64,
    out: *mut c_void,
    out_validity: *mut u8,
) -> bool;

/// Read one bit of an LSB-first validity bitmap. A null pointer reads as
/// valid.
///
/// # Safety
/// `bitmap`, when non-null, must cover at least `row / 8 + 1` bytes.
pub unsafe fn bitmap_is_valid(bitmap: *const u8, row: usize) -> bool {
    if bitmap.is_null() {
        return true;
    }
    let byte = unsafe { *bitmap.add(row / 8) };
    byte >> (row % 8) & 1 == 1
}
