//! Vectorized dispatch of compiled wrappers over input chunks.
//!
//! One call runs Setup (bridge every argument column), Dispatch (row mode or
//! batch mode, chosen at registration), Writeback (serialize results through
//! [`ColumnWriter`]), and Cleanup. Cleanup is not a phase of its own: every
//! allocation made here (bridges, NUL-terminated string copies, scratch and
//! out buffers) is owned by locals, so failure at any point releases
//! everything on unwind-free early return.

use std::ffi::{CString, c_void};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, NullArray};
use arrow::datatypes::DataType;
use cfunc_sig::{CompositeMeta, Signature, TypeTag};
use tracing::trace;

use crate::abi::{BatchWrapperFn, CBytesRef, RowWrapperFn, bitmap_is_valid};
use crate::validity::new_bitmap;
use crate::writer::ColumnWriter;
use crate::{BridgeError, InvokeError, ValueBridge};

/// Dispatch protocol of a registered wrapper, fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperMode {
    /// One call per fully valid row.
    Row,
    /// One call per chunk.
    Batch,
}

/// Compiled entry point plus its dispatch protocol.
#[derive(Debug, Clone, Copy)]
pub enum WrapperFn {
    Row(RowWrapperFn),
    Batch(BatchWrapperFn),
}

impl WrapperFn {
    pub fn mode(&self) -> WrapperMode {
        match self {
            WrapperFn::Row(_) => WrapperMode::Row,
            WrapperFn::Batch(_) => WrapperMode::Batch,
        }
    }
}

/// Run one compiled wrapper over a chunk of argument columns.
///
/// `row_count` is the chunk length; it is validated against every column so
/// zero-argument functions still know how many rows to produce. On any
/// failure the whole chunk is abandoned with a single error; rows written
/// before the failure are discarded with the writer.
pub fn execute(
    signature: &Signature,
    wrapper: WrapperFn,
    chunk: &[ArrayRef],
    row_count: usize,
) -> Result<ArrayRef, InvokeError> {
    if chunk.len() != signature.arity() {
        return Err(InvokeError::ArityMismatch {
            expected: signature.arity(),
            got: chunk.len(),
        });
    }
    for (column, array) in chunk.iter().enumerate() {
        if array.len() != row_count {
            return Err(InvokeError::RowCountMismatch {
                column,
                expected: row_count,
                got: array.len(),
            });
        }
        check_cached_shape(signature, column, array.as_ref())?;
    }
    trace!(
        rows = row_count,
        args = chunk.len(),
        mode = ?wrapper.mode(),
        "dispatching compiled scalar wrapper"
    );

    // Setup: bridge every argument column. First failure aborts the call.
    let bridges = chunk
        .iter()
        .zip(signature.args())
        .map(|(array, desc)| ValueBridge::build(array.as_ref(), desc))
        .collect::<Result<Vec<_>, _>>()?;

    let return_desc = signature.return_desc();
    if return_desc.tag() == TypeTag::Void {
        // No output column to build; the wrapper runs for its side effects.
        dispatch_void(wrapper, &bridges, row_count)?;
        return Ok(Arc::new(NullArray::new(row_count)));
    }

    let mut writer = ColumnWriter::new(return_desc, row_count);
    match wrapper {
        WrapperFn::Row(f) => run_row_mode(f, signature, &bridges, row_count, &mut writer)?,
        WrapperFn::Batch(f) => run_batch_mode(f, signature, &bridges, row_count, &mut writer)?,
    }
    writer.finish()
}

/// Cheap pre-flight check of composite argument columns against the
/// signature's cached metadata, so an obviously misshapen chunk fails
/// before any bridge allocation.
fn check_cached_shape(
    signature: &Signature,
    column: usize,
    array: &dyn Array,
) -> Result<(), InvokeError> {
    let declared = match signature.arg_meta(column) {
        Some(CompositeMeta::Struct(meta)) => meta.field_count(),
        Some(CompositeMeta::Union(meta)) => meta.member_count(),
        _ => return Ok(()),
    };
    let actual = match array.data_type() {
        DataType::Struct(fields) => fields.len(),
        DataType::Union(fields, _) => fields.len(),
        _ => return Ok(()), // full mismatch diagnosis happens in the bridge
    };
    if actual != declared {
        return Err(InvokeError::Bridge(BridgeError::TypeMismatch {
            expected: signature.args()[column].token().into(),
            actual: format!("{:?}", array.data_type()),
        }));
    }
    Ok(())
}

fn run_row_mode(
    wrapper: RowWrapperFn,
    signature: &Signature,
    bridges: &[ValueBridge<'_>],
    row_count: usize,
    writer: &mut ColumnWriter,
) -> Result<(), InvokeError> {
    let return_size = signature.return_desc().storage_size().max(1);
    let mut scratch = vec![0u8; return_size];
    let mut args: Vec<*const c_void> = vec![std::ptr::null(); bridges.len()];
    // NUL-terminated copies of varchar arguments; grows over the call and is
    // released with this frame whether the call succeeds or fails.
    let mut cstrings: Vec<CString> = Vec::new();

    for row in 0..row_count {
        // Validity propagation: a row with any invalid argument is
        // short-circuited to a null output and the wrapper is not called.
        if !bridges.iter().all(|b| b.is_row_valid(row)) {
            unsafe { writer.append(std::ptr::null(), false)? };
            continue;
        }

        for (slot, bridge) in args.iter_mut().zip(bridges) {
            *slot = match bridge.tag() {
                TypeTag::Varchar => {
                    let copy = unsafe { cstring_at(bridge, row)? };
                    let ptr = copy.as_ptr() as *const c_void;
                    cstrings.push(copy);
                    ptr
                }
                _ => bridge.element_ptr(row),
            };
        }

        scratch.fill(0);
        let mut out_is_null = false;
        let ok = unsafe {
            wrapper(
                args.as_ptr(),
                scratch.as_mut_ptr() as *mut c_void,
                &mut out_is_null,
            )
        };
        if !ok {
            return Err(InvokeError::WrapperFailed);
        }
        unsafe { writer.append(scratch.as_ptr(), !out_is_null)? };
    }
    Ok(())
}

fn run_batch_mode(
    wrapper: BatchWrapperFn,
    signature: &Signature,
    bridges: &[ValueBridge<'_>],
    row_count: usize,
    writer: &mut ColumnWriter,
) -> Result<(), InvokeError> {
    let (args, validity, _pool) = batch_argument_tables(bridges, row_count)?;

    let return_size = signature.return_desc().storage_size().max(1);
    let mut out = vec![0u8; return_size * row_count.max(1)];
    let mut out_validity = new_bitmap(row_count, true);

    let ok = unsafe {
        wrapper(
            args.as_ptr(),
            validity.as_ptr(),
            row_count as u64,
            out.as_mut_ptr() as *mut c_void,
            out_validity.as_mut_ptr(),
        )
    };
    if !ok {
        return Err(InvokeError::WrapperFailed);
    }

    for row in 0..row_count {
        let valid = unsafe { bitmap_is_valid(out_validity.as_ptr(), row) };
        let slot = unsafe { out.as_ptr().add(row * return_size) };
        unsafe { writer.append(slot, valid)? };
    }
    Ok(())
}

fn dispatch_void(
    wrapper: WrapperFn,
    bridges: &[ValueBridge<'_>],
    row_count: usize,
) -> Result<(), InvokeError> {
    let mut sink = 0u64;
    match wrapper {
        WrapperFn::Row(f) => {
            let mut args: Vec<*const c_void> = vec![std::ptr::null(); bridges.len()];
            let mut cstrings: Vec<CString> = Vec::new();
            for row in 0..row_count {
                if !bridges.iter().all(|b| b.is_row_valid(row)) {
                    continue;
                }
                for (slot, bridge) in args.iter_mut().zip(bridges) {
                    *slot = match bridge.tag() {
                        TypeTag::Varchar => {
                            let copy = unsafe { cstring_at(bridge, row)? };
                            let ptr = copy.as_ptr() as *const c_void;
                            cstrings.push(copy);
                            ptr
                        }
                        _ => bridge.element_ptr(row),
                    };
                }
                let mut out_is_null = false;
                let ok = unsafe {
                    f(
                        args.as_ptr(),
                        &mut sink as *mut u64 as *mut c_void,
                        &mut out_is_null,
                    )
                };
                if !ok {
                    return Err(InvokeError::WrapperFailed);
                }
            }
            Ok(())
        }
        WrapperFn::Batch(f) => {
            let (args, validity, _pool) = batch_argument_tables(bridges, row_count)?;
            let mut out_validity = new_bitmap(row_count, true);
            let ok = unsafe {
                f(
                    args.as_ptr(),
                    validity.as_ptr(),
                    row_count as u64,
                    &mut sink as *mut u64 as *mut c_void,
                    out_validity.as_mut_ptr(),
                )
            };
            if ok { Ok(()) } else { Err(InvokeError::WrapperFailed) }
        }
    }
}

/// Owned storage backing the batch-mode varchar pointer tables.
struct BatchPool {
    #[allow(dead_code)]
    cstrings: Vec<CString>,
    #[allow(dead_code)]
    tables: Vec<Vec<*const c_void>>,
}

/// Column-major argument and validity pointer tables for one batch call.
/// Varchar columns are pre-decoded into per-row `char*` tables (null for
/// invalid rows); everything else passes its bridge base pointer through.
fn batch_argument_tables(
    bridges: &[ValueBridge<'_>],
    row_count: usize,
) -> Result<(Vec<*const c_void>, Vec<*const u8>, BatchPool), InvokeError> {
    let mut pool = BatchPool {
        cstrings: Vec::new(),
        tables: Vec::new(),
    };
    let mut args = Vec::with_capacity(bridges.len());
    let mut validity = Vec::with_capacity(bridges.len());

    for bridge in bridges {
        match bridge.tag() {
            TypeTag::Varchar => {
                let mut table: Vec<*const c_void> = Vec::with_capacity(row_count);
                for row in 0..row_count {
                    if bridge.is_row_valid(row) {
                        let copy = unsafe { cstring_at(bridge, row)? };
                        table.push(copy.as_ptr() as *const c_void);
                        pool.cstrings.push(copy);
                    } else {
                        table.push(std::ptr::null());
                    }
                }
                args.push(table.as_ptr() as *const c_void);
                pool.tables.push(table);
            }
            _ => args.push(bridge.data_ptr()),
        }
        validity.push(bridge.validity_ptr());
    }
    Ok((args, validity, pool))
}

/// NUL-terminated copy of one varchar row.
unsafe fn cstring_at(bridge: &ValueBridge<'_>, row: usize) -> Result<CString, InvokeError> {
    let bytes = unsafe { std::ptr::read_unaligned(bridge.element_ptr(row) as *const CBytesRef) };
    let slice = if bytes.ptr.is_null() {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(bytes.ptr, bytes.len as usize) }
    };
    CString::new(slice).map_err(|_| InvokeError::EmbeddedNul)
}
