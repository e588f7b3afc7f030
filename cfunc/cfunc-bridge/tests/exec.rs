//! Execution engine tests driving real `extern "C"` wrappers end to end.

use std::ffi::{CStr, c_char, c_void};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arrow::array::{
    Array, ArrayRef, Int32Array, Int64Array, ListArray, StringArray, StructArray,
};
use arrow::datatypes::{DataType, Field};
use cfunc_bridge::abi::{CBytesRef, CListRef, CStructRef, bitmap_is_valid};
use cfunc_bridge::{InvokeError, WrapperFn, execute};
use cfunc_sig::Signature;

fn sig(ret: &str, args: &str) -> Signature {
    Signature::parse(ret, Some(args)).unwrap()
}

static ADD_CALLS: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn add_i32(
    args: *const *const c_void,
    out: *mut c_void,
    out_is_null: *mut bool,
) -> bool {
    ADD_CALLS.fetch_add(1, Ordering::SeqCst);
    unsafe {
        let a = *(*args as *const i32);
        let b = *(*args.add(1) as *const i32);
        *(out as *mut i32) = a + b;
        *out_is_null = false;
    }
    true
}

#[test]
fn row_mode_adds_and_skips_invalid_rows() {
    let signature = sig("i32", "i32,i32");
    let chunk: Vec<ArrayRef> = vec![
        Arc::new(Int32Array::from(vec![Some(1), Some(3), Some(5)])),
        Arc::new(Int32Array::from(vec![Some(2), None, Some(6)])),
    ];

    ADD_CALLS.store(0, Ordering::SeqCst);
    let result = execute(&signature, WrapperFn::Row(add_i32), &chunk, 3).unwrap();

    // Row 1 has an invalid argument: null output, wrapper never called.
    assert_eq!(ADD_CALLS.load(Ordering::SeqCst), 2);
    let ints = result.as_any().downcast_ref::<Int32Array>().unwrap();
    assert_eq!(ints.len(), 3);
    assert_eq!(ints.value(0), 3);
    assert!(ints.is_null(1));
    assert_eq!(ints.value(2), 11);
}

static THREE_ARG_CALLS: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn sum3(
    args: *const *const c_void,
    out: *mut c_void,
    out_is_null: *mut bool,
) -> bool {
    THREE_ARG_CALLS.fetch_add(1, Ordering::SeqCst);
    unsafe {
        let mut total = 0i32;
        for i in 0..3 {
            total += *(*args.add(i) as *const i32);
        }
        *(out as *mut i32) = total;
        *out_is_null = false;
    }
    true
}

#[test]
fn any_invalid_argument_short_circuits_the_row() {
    let signature = sig("i32", "i32,i32,i32");
    let chunk: Vec<ArrayRef> = vec![
        Arc::new(Int32Array::from(vec![Some(1), Some(1), Some(1), Some(1)])),
        Arc::new(Int32Array::from(vec![Some(1), Some(1), None, Some(1)])),
        Arc::new(Int32Array::from(vec![Some(1), Some(1), Some(1), None])),
    ];

    THREE_ARG_CALLS.store(0, Ordering::SeqCst);
    let result = execute(&signature, WrapperFn::Row(sum3), &chunk, 4).unwrap();

    assert_eq!(THREE_ARG_CALLS.load(Ordering::SeqCst), 2);
    let ints = result.as_any().downcast_ref::<Int32Array>().unwrap();
    assert_eq!(ints.value(0), 3);
    assert_eq!(ints.value(1), 3);
    assert!(ints.is_null(2));
    assert!(ints.is_null(3));
}

unsafe extern "C" fn strlen_i64(
    args: *const *const c_void,
    out: *mut c_void,
    out_is_null: *mut bool,
) -> bool {
    unsafe {
        // Row mode hands varchar arguments over as NUL-terminated strings.
        let text = CStr::from_ptr(*args as *const c_char);
        *(out as *mut i64) = text.to_bytes().len() as i64;
        *out_is_null = false;
    }
    true
}

#[test]
fn row_mode_varchar_arguments_are_nul_terminated() {
    let signature = sig("i64", "varchar");
    let chunk: Vec<ArrayRef> = vec![Arc::new(StringArray::from(vec![
        Some("ab"),
        None,
        Some(""),
        Some("hello"),
    ]))];

    let result = execute(&signature, WrapperFn::Row(strlen_i64), &chunk, 4).unwrap();
    let lens = result.as_any().downcast_ref::<Int64Array>().unwrap();
    assert_eq!(lens.value(0), 2);
    assert!(lens.is_null(1));
    assert_eq!(lens.value(2), 0);
    assert_eq!(lens.value(3), 5);
}

static GREETING: &[u8] = b"hi";

unsafe extern "C" fn constant_text(
    _args: *const *const c_void,
    out: *mut c_void,
    out_is_null: *mut bool,
) -> bool {
    unsafe {
        std::ptr::write_unaligned(
            out as *mut CBytesRef,
            CBytesRef {
                ptr: GREETING.as_ptr(),
                len: GREETING.len() as u64,
            },
        );
        *out_is_null = false;
    }
    true
}

#[test]
fn varchar_results_come_back_as_strings() {
    let signature = sig("varchar", "");
    let result = execute(&signature, WrapperFn::Row(constant_text), &[], 2).unwrap();
    let texts = result.as_any().downcast_ref::<StringArray>().unwrap();
    assert_eq!(texts.value(0), "hi");
    assert_eq!(texts.value(1), "hi");
}

static LIST_DATA: [i32; 3] = [7, 8, 9];
static LIST_ROW: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn make_list(
    _args: *const *const c_void,
    out: *mut c_void,
    out_is_null: *mut bool,
) -> bool {
    let row = LIST_ROW.fetch_add(1, Ordering::SeqCst);
    let rec = if row == 0 {
        // Empty list: zeroed descriptor with len 0 is a valid empty value.
        CListRef::zeroed()
    } else {
        CListRef {
            ptr: LIST_DATA.as_ptr() as *const c_void,
            validity: std::ptr::null(),
            offset: 0,
            len: 3,
        }
    };
    unsafe {
        std::ptr::write_unaligned(out as *mut CListRef, rec);
        *out_is_null = false;
    }
    true
}

#[test]
fn list_results_grow_offsets_per_row() {
    let signature = sig("list<i32>", "");
    LIST_ROW.store(0, Ordering::SeqCst);
    let result = execute(&signature, WrapperFn::Row(make_list), &[], 2).unwrap();

    let lists = result.as_any().downcast_ref::<ListArray>().unwrap();
    assert_eq!(lists.value_offsets(), &[0, 0, 3]);
    let values = lists
        .values()
        .as_any()
        .downcast_ref::<Int32Array>()
        .unwrap();
    assert_eq!(values.values(), &[7, 8, 9]);
}

unsafe extern "C" fn struct_pick_x(
    args: *const *const c_void,
    out: *mut c_void,
    out_is_null: *mut bool,
) -> bool {
    unsafe {
        let row = std::ptr::read_unaligned(*args as *const CStructRef);
        if row.field_count != 2 {
            return false;
        }
        let x_base = *row.field_ptrs as *const i32;
        let x = *x_base.add(row.row_offset as usize);
        let y_valid = bitmap_is_valid(*row.field_validity.add(1), row.row_offset as usize);
        *(out as *mut i32) = x;
        *out_is_null = !y_valid;
    }
    true
}

#[test]
fn struct_arguments_expose_field_tables_and_validity() {
    let fields = vec![
        (
            Arc::new(Field::new("x", DataType::Int32, true)),
            Arc::new(Int32Array::from(vec![10, 20])) as ArrayRef,
        ),
        (
            Arc::new(Field::new("y", DataType::Utf8, true)),
            Arc::new(StringArray::from(vec![Some("a"), None])) as ArrayRef,
        ),
    ];
    let structs = StructArray::from(fields);

    let signature = sig("i32", "struct<x:i32;y:varchar>");
    let chunk: Vec<ArrayRef> = vec![Arc::new(structs)];
    let result = execute(&signature, WrapperFn::Row(struct_pick_x), &chunk, 2).unwrap();

    let ints = result.as_any().downcast_ref::<Int32Array>().unwrap();
    assert_eq!(ints.value(0), 10);
    // The wrapper nulls its output when field y is invalid at that row.
    assert!(ints.is_null(1));
}

unsafe extern "C" fn double_batch(
    args: *const *const c_void,
    validity: *const *const u8,
    row_count: u64,
    out: *mut c_void,
    out_validity: *mut u8,
) -> bool {
    unsafe {
        let col = *args as *const i32;
        let bits = *validity;
        let out = out as *mut i32;
        for row in 0..row_count as usize {
            if bitmap_is_valid(bits, row) {
                *out.add(row) = *col.add(row) * 2;
            } else {
                *out_validity.add(row / 8) &= !(1 << (row % 8));
            }
        }
    }
    true
}

#[test]
fn batch_mode_propagates_validity_through_the_out_bitmap() {
    let signature = sig("i32", "i32");
    let chunk: Vec<ArrayRef> = vec![Arc::new(Int32Array::from(vec![Some(1), None, Some(3)]))];

    let result = execute(&signature, WrapperFn::Batch(double_batch), &chunk, 3).unwrap();
    let ints = result.as_any().downcast_ref::<Int32Array>().unwrap();
    assert_eq!(ints.value(0), 2);
    assert!(ints.is_null(1));
    assert_eq!(ints.value(2), 6);
}

unsafe extern "C" fn batch_strlen(
    args: *const *const c_void,
    _validity: *const *const u8,
    row_count: u64,
    out: *mut c_void,
    out_validity: *mut u8,
) -> bool {
    unsafe {
        // Varchar columns arrive as per-row char* tables, null for invalid
        // rows.
        let table = *args as *const *const c_char;
        let out = out as *mut i64;
        for row in 0..row_count as usize {
            let ptr = *table.add(row);
            if ptr.is_null() {
                *out_validity.add(row / 8) &= !(1 << (row % 8));
            } else {
                *out.add(row) = CStr::from_ptr(ptr).to_bytes().len() as i64;
            }
        }
    }
    true
}

#[test]
fn batch_mode_varchar_columns_are_pointer_tables() {
    let signature = sig("i64", "varchar");
    let chunk: Vec<ArrayRef> =
        vec![Arc::new(StringArray::from(vec![Some("abc"), None, Some("")]))];

    let result = execute(&signature, WrapperFn::Batch(batch_strlen), &chunk, 3).unwrap();
    let lens = result.as_any().downcast_ref::<Int64Array>().unwrap();
    assert_eq!(lens.value(0), 3);
    assert!(lens.is_null(1));
    assert_eq!(lens.value(2), 0);
}

static SHORT_ARRAY: [f64; 3] = [1.0, 2.0, 3.0];

unsafe extern "C" fn short_array(
    _args: *const *const c_void,
    out: *mut c_void,
    out_is_null: *mut bool,
) -> bool {
    unsafe {
        std::ptr::write_unaligned(
            out as *mut cfunc_bridge::abi::CArrayRef,
            cfunc_bridge::abi::CArrayRef {
                ptr: SHORT_ARRAY.as_ptr() as *const c_void,
                validity: std::ptr::null(),
                offset: 0,
                len: 3,
            },
        );
        *out_is_null = false;
    }
    true
}

#[test]
fn fixed_array_result_length_is_enforced() {
    let signature = sig("f64[4]", "");
    let err = execute(&signature, WrapperFn::Row(short_array), &[], 1).unwrap_err();
    match err {
        InvokeError::ArrayLengthMismatch { expected: 4, got: 3 } => {}
        other => panic!("unexpected error: {other}"),
    }
}

unsafe extern "C" fn always_fails(
    _args: *const *const c_void,
    _out: *mut c_void,
    _out_is_null: *mut bool,
) -> bool {
    false
}

#[test]
fn wrapper_failure_aborts_the_chunk() {
    let signature = sig("i32", "i32");
    let chunk: Vec<ArrayRef> = vec![Arc::new(Int32Array::from(vec![1, 2, 3]))];
    let err = execute(&signature, WrapperFn::Row(always_fails), &chunk, 3).unwrap_err();
    assert!(matches!(err, InvokeError::WrapperFailed));
}

#[test]
fn arity_and_row_count_are_validated_up_front() {
    let signature = sig("i32", "i32,i32");
    let one: Vec<ArrayRef> = vec![Arc::new(Int32Array::from(vec![1]))];
    let err = execute(&signature, WrapperFn::Row(add_i32), &one, 1).unwrap_err();
    assert!(matches!(
        err,
        InvokeError::ArityMismatch { expected: 2, got: 1 }
    ));

    let mismatched: Vec<ArrayRef> = vec![
        Arc::new(Int32Array::from(vec![1, 2])),
        Arc::new(Int32Array::from(vec![1, 2, 3])),
    ];
    let err = execute(&signature, WrapperFn::Row(add_i32), &mismatched, 2).unwrap_err();
    match err {
        InvokeError::RowCountMismatch {
            column: 1,
            expected: 2,
            got: 3,
        } => {}
        other => panic!("unexpected error: {other}"),
    }
}

static VOID_CALLS: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn side_effect_only(
    _args: *const *const c_void,
    _out: *mut c_void,
    _out_is_null: *mut bool,
) -> bool {
    VOID_CALLS.fetch_add(1, Ordering::SeqCst);
    true
}

#[test]
fn void_return_produces_a_null_column() {
    let signature = sig("void", "i32");
    let chunk: Vec<ArrayRef> = vec![Arc::new(Int32Array::from(vec![Some(1), None, Some(3)]))];

    VOID_CALLS.store(0, Ordering::SeqCst);
    let result = execute(&signature, WrapperFn::Row(side_effect_only), &chunk, 3).unwrap();
    assert_eq!(result.data_type(), &DataType::Null);
    assert_eq!(result.len(), 3);
    assert_eq!(VOID_CALLS.load(Ordering::SeqCst), 2);
}

#[test]
fn empty_chunk_yields_empty_column() {
    let signature = sig("i32", "i32,i32");
    let chunk: Vec<ArrayRef> = vec![
        Arc::new(Int32Array::from(Vec::<i32>::new())),
        Arc::new(Int32Array::from(Vec::<i32>::new())),
    ];
    let result = execute(&signature, WrapperFn::Row(add_i32), &chunk, 0).unwrap();
    assert_eq!(result.len(), 0);
}
