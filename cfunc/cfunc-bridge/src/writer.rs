//! Recursive result writer: consumes the flat C descriptor structs a
//! compiled wrapper filled in and appends them to a growing Arrow column.
//!
//! This mirrors the bridge builder in reverse. Primitive and varchar/blob
//! values go through typed Arrow builders; list/array/struct/map/union rows
//! are walked child by child. Unions are assembled by hand (type ids plus
//! per-member child writers) because Arrow's `UnionBuilder` cannot nest.

use std::sync::Arc;

use arrow::array::{
    ArrayBuilder, ArrayRef, BinaryBuilder, BooleanBuilder, FixedSizeListArray, ListArray,
    MapArray, NullArray, NullBufferBuilder, PrimitiveBuilder, StringBuilder, StructArray,
    UnionArray,
};
use arrow::buffer::{OffsetBuffer, ScalarBuffer};
use arrow::datatypes::{
    DataType, Date32Type, Decimal128Type, Field, Fields, Float32Type, Float64Type, Int8Type,
    Int16Type, Int32Type, Int64Type, Time64MicrosecondType, TimestampMicrosecondType, UInt8Type,
    UInt16Type, UInt32Type, UInt64Type,
};
use cfunc_sig::{FieldDescriptor, TypeDescriptor, TypeShape, TypeTag};

use crate::InvokeError;
use crate::abi::{CArrayRef, CBytesRef, CListRef, CMapRef, CStructRef, CUnionRef, bitmap_is_valid};
use crate::logical::{descriptor_to_datatype, union_fields};

macro_rules! cast_builder {
    ($b:expr, $T:ty) => {
        $b.as_any_mut()
            .downcast_mut::<$T>()
            .expect(concat!("expected builder type: ", stringify!($T)))
    };
}

/// Serializes wrapper results of one declared type into an Arrow column.
pub struct ColumnWriter {
    desc: TypeDescriptor,
    inner: WriterInner,
}

enum WriterInner {
    /// `void` return: row count only.
    Null { rows: usize },
    Scalar(Box<dyn ArrayBuilder>),
    List {
        offsets: Vec<i32>,
        nulls: NullBufferBuilder,
        child: Box<ColumnWriter>,
    },
    Array {
        len: usize,
        nulls: NullBufferBuilder,
        child: Box<ColumnWriter>,
    },
    Struct {
        nulls: NullBufferBuilder,
        children: Vec<ColumnWriter>,
    },
    Map {
        offsets: Vec<i32>,
        nulls: NullBufferBuilder,
        key: Box<ColumnWriter>,
        value: Box<ColumnWriter>,
    },
    Union {
        type_ids: Vec<i8>,
        children: Vec<ColumnWriter>,
    },
}

impl ColumnWriter {
    pub fn new(desc: &TypeDescriptor, capacity: usize) -> ColumnWriter {
        let inner = match desc.shape() {
            TypeShape::Primitive => {
                if desc.tag() == TypeTag::Void {
                    WriterInner::Null { rows: 0 }
                } else {
                    WriterInner::Scalar(make_scalar_builder(desc.tag(), capacity))
                }
            }
            TypeShape::List(elem) => WriterInner::List {
                offsets: vec![0],
                nulls: NullBufferBuilder::new(capacity),
                child: Box::new(ColumnWriter::new(elem, capacity)),
            },
            TypeShape::Array(elem, len) => WriterInner::Array {
                len: *len,
                nulls: NullBufferBuilder::new(capacity),
                child: Box::new(ColumnWriter::new(elem, capacity * len)),
            },
            TypeShape::Struct(fields) => WriterInner::Struct {
                nulls: NullBufferBuilder::new(capacity),
                children: fields
                    .iter()
                    .map(|f| ColumnWriter::new(&f.desc, capacity))
                    .collect(),
            },
            TypeShape::Map { key, value } => WriterInner::Map {
                offsets: vec![0],
                nulls: NullBufferBuilder::new(capacity),
                key: Box::new(ColumnWriter::new(key, capacity)),
                value: Box::new(ColumnWriter::new(value, capacity)),
            },
            TypeShape::Union(members) => WriterInner::Union {
                type_ids: Vec::with_capacity(capacity),
                children: members
                    .iter()
                    .map(|m| ColumnWriter::new(&m.desc, capacity))
                    .collect(),
            },
        };
        ColumnWriter {
            desc: desc.clone(),
            inner,
        }
    }

    /// Append one row read from `ptr`. When `valid` is false `ptr` is never
    /// dereferenced, so a null pointer is fine for null rows.
    ///
    /// # Safety
    /// For valid rows `ptr` must point at a value of this writer's declared
    /// type, with every pointer reachable from it (child elements, field
    /// tables, validity bitmaps) alive and matching the descriptor.
    pub unsafe fn append(&mut self, ptr: *const u8, valid: bool) -> Result<(), InvokeError> {
        let tag = self.desc.tag();
        match &mut self.inner {
            WriterInner::Null { rows } => {
                *rows += 1;
                Ok(())
            }
            WriterInner::Scalar(builder) => unsafe { append_scalar(builder, tag, ptr, valid) },
            WriterInner::List {
                offsets,
                nulls,
                child,
            } => {
                if !valid {
                    offsets.push(*offsets.last().unwrap());
                    nulls.append_null();
                    return Ok(());
                }
                let row = unsafe { std::ptr::read_unaligned(ptr as *const CListRef) };
                let elem_size = child.desc.storage_size();
                for i in 0..row.len as usize {
                    let elem_ptr = unsafe { (row.ptr as *const u8).add(i * elem_size) };
                    let elem_valid =
                        unsafe { bitmap_is_valid(row.validity, row.offset as usize + i) };
                    unsafe { child.append(elem_ptr, elem_valid)? };
                }
                offsets.push(offsets.last().unwrap() + row.len as i32);
                nulls.append_non_null();
                Ok(())
            }
            WriterInner::Array { len, nulls, child } => {
                if !valid {
                    for _ in 0..*len {
                        unsafe { child.append(std::ptr::null(), false)? };
                    }
                    nulls.append_null();
                    return Ok(());
                }
                let row = unsafe { std::ptr::read_unaligned(ptr as *const CArrayRef) };
                if row.len as usize != *len {
                    return Err(InvokeError::ArrayLengthMismatch {
                        expected: *len,
                        got: row.len as usize,
                    });
                }
                let elem_size = child.desc.storage_size();
                for i in 0..*len {
                    let elem_ptr = unsafe { (row.ptr as *const u8).add(i * elem_size) };
                    let elem_valid =
                        unsafe { bitmap_is_valid(row.validity, row.offset as usize + i) };
                    unsafe { child.append(elem_ptr, elem_valid)? };
                }
                nulls.append_non_null();
                Ok(())
            }
            WriterInner::Struct { nulls, children } => {
                if !valid {
                    for child in children.iter_mut() {
                        unsafe { child.append(std::ptr::null(), false)? };
                    }
                    nulls.append_null();
                    return Ok(());
                }
                let row = unsafe { std::ptr::read_unaligned(ptr as *const CStructRef) };
                if row.field_count as usize != children.len() {
                    return Err(InvokeError::StructShapeMismatch {
                        expected: children.len(),
                        got: row.field_count as usize,
                    });
                }
                for (f, child) in children.iter_mut().enumerate() {
                    let base = unsafe { *row.field_ptrs.add(f) } as *const u8;
                    let field_ptr =
                        unsafe { base.add(row.row_offset as usize * child.desc.storage_size()) };
                    let field_valid = unsafe {
                        bitmap_is_valid(*row.field_validity.add(f), row.row_offset as usize)
                    };
                    unsafe { child.append(field_ptr, field_valid)? };
                }
                nulls.append_non_null();
                Ok(())
            }
            WriterInner::Map {
                offsets,
                nulls,
                key,
                value,
            } => {
                if !valid {
                    offsets.push(*offsets.last().unwrap());
                    nulls.append_null();
                    return Ok(());
                }
                let row = unsafe { std::ptr::read_unaligned(ptr as *const CMapRef) };
                let key_size = key.desc.storage_size();
                let value_size = value.desc.storage_size();
                for i in 0..row.len as usize {
                    let entry = row.offset as usize + i;
                    if !unsafe { bitmap_is_valid(row.key_validity, entry) } {
                        return Err(InvokeError::NullMapKey);
                    }
                    let key_ptr = unsafe { (row.key_ptr as *const u8).add(i * key_size) };
                    unsafe { key.append(key_ptr, true)? };
                    let value_ptr = unsafe { (row.value_ptr as *const u8).add(i * value_size) };
                    let value_valid = unsafe { bitmap_is_valid(row.value_validity, entry) };
                    unsafe { value.append(value_ptr, value_valid)? };
                }
                offsets.push(offsets.last().unwrap() + row.len as i32);
                nulls.append_non_null();
                Ok(())
            }
            WriterInner::Union { type_ids, children } => {
                if !valid {
                    for child in children.iter_mut() {
                        unsafe { child.append(std::ptr::null(), false)? };
                    }
                    type_ids.push(0);
                    return Ok(());
                }
                let row = unsafe { std::ptr::read_unaligned(ptr as *const CUnionRef) };
                if row.member_count as usize != children.len() {
                    return Err(InvokeError::UnionShapeMismatch {
                        expected: children.len(),
                        got: row.member_count as usize,
                    });
                }
                let chosen = unsafe { *row.tag_ptr.add(row.row_offset as usize) };
                if chosen < 0 || chosen as usize >= children.len() {
                    return Err(InvokeError::UnionTagOutOfRange {
                        tag: chosen,
                        member_count: children.len(),
                    });
                }
                for (m, child) in children.iter_mut().enumerate() {
                    if m == chosen as usize {
                        let base = unsafe { *row.member_ptrs.add(m) } as *const u8;
                        let member_ptr = unsafe {
                            base.add(row.row_offset as usize * child.desc.storage_size())
                        };
                        let member_valid = unsafe {
                            bitmap_is_valid(*row.member_validity.add(m), row.row_offset as usize)
                        };
                        unsafe { child.append(member_ptr, member_valid)? };
                    } else {
                        // Sparse layout: every non-selected member gets an
                        // invalid slot at this row.
                        unsafe { child.append(std::ptr::null(), false)? };
                    }
                }
                type_ids.push(chosen);
                Ok(())
            }
        }
    }

    /// Finish the column into an Arrow array of the declared logical type.
    pub fn finish(self) -> Result<ArrayRef, InvokeError> {
        let desc = self.desc;
        match self.inner {
            WriterInner::Null { rows } => Ok(Arc::new(NullArray::new(rows))),
            WriterInner::Scalar(mut builder) => Ok(builder.finish()),
            WriterInner::List {
                offsets,
                mut nulls,
                child,
            } => {
                let child_dt = descriptor_to_datatype(child_desc(&desc, 0));
                let values = child.finish()?;
                let field = Arc::new(Field::new("item", child_dt, true));
                let array = ListArray::try_new(
                    field,
                    OffsetBuffer::new(ScalarBuffer::from(offsets)),
                    values,
                    nulls.finish(),
                )?;
                Ok(Arc::new(array))
            }
            WriterInner::Array {
                len,
                mut nulls,
                child,
            } => {
                let child_dt = descriptor_to_datatype(child_desc(&desc, 0));
                let values = child.finish()?;
                let field = Arc::new(Field::new("item", child_dt, true));
                let array =
                    FixedSizeListArray::try_new(field, len as i32, values, nulls.finish())?;
                Ok(Arc::new(array))
            }
            WriterInner::Struct {
                mut nulls,
                children,
            } => {
                let fields = struct_fields(&desc);
                let arrays = children
                    .into_iter()
                    .map(ColumnWriter::finish)
                    .collect::<Result<Vec<_>, _>>()?;
                let array = StructArray::try_new(fields, arrays, nulls.finish())?;
                Ok(Arc::new(array))
            }
            WriterInner::Map {
                offsets,
                mut nulls,
                key,
                value,
            } => {
                let key_dt = descriptor_to_datatype(child_desc(&desc, 0));
                let value_dt = descriptor_to_datatype(child_desc(&desc, 1));
                let entry_fields: Fields = vec![
                    Field::new("key", key_dt, false),
                    Field::new("value", value_dt, true),
                ]
                .into();
                let entries = StructArray::try_new(
                    entry_fields.clone(),
                    vec![key.finish()?, value.finish()?],
                    None,
                )?;
                let entry_field = Arc::new(Field::new(
                    "entries",
                    DataType::Struct(entry_fields),
                    false,
                ));
                let array = MapArray::try_new(
                    entry_field,
                    OffsetBuffer::new(ScalarBuffer::from(offsets)),
                    entries,
                    nulls.finish(),
                    false,
                )?;
                Ok(Arc::new(array))
            }
            WriterInner::Union { type_ids, children } => {
                let TypeShape::Union(members) = desc.shape() else {
                    unreachable!("union writer carries a union descriptor");
                };
                let fields = union_fields(members);
                let arrays = children
                    .into_iter()
                    .map(ColumnWriter::finish)
                    .collect::<Result<Vec<_>, _>>()?;
                let array =
                    UnionArray::try_new(fields, ScalarBuffer::from(type_ids), None, arrays)?;
                Ok(Arc::new(array))
            }
        }
    }
}

fn child_desc(desc: &TypeDescriptor, index: usize) -> &TypeDescriptor {
    match desc.shape() {
        TypeShape::List(elem) | TypeShape::Array(elem, _) => elem,
        TypeShape::Map { key, value } => {
            if index == 0 {
                key
            } else {
                value
            }
        }
        _ => unreachable!("child_desc on a leaf descriptor"),
    }
}

fn struct_fields(desc: &TypeDescriptor) -> Fields {
    let TypeShape::Struct(fields) = desc.shape() else {
        unreachable!("struct writer carries a struct descriptor");
    };
    fields
        .iter()
        .map(|f: &FieldDescriptor| Field::new(&f.name, descriptor_to_datatype(&f.desc), true))
        .collect()
}

fn make_scalar_builder(tag: TypeTag, capacity: usize) -> Box<dyn ArrayBuilder> {
    match tag {
        TypeTag::Bool => Box::new(BooleanBuilder::with_capacity(capacity)),
        TypeTag::I8 => Box::new(PrimitiveBuilder::<Int8Type>::with_capacity(capacity)),
        TypeTag::I16 => Box::new(PrimitiveBuilder::<Int16Type>::with_capacity(capacity)),
        TypeTag::I32 => Box::new(PrimitiveBuilder::<Int32Type>::with_capacity(capacity)),
        TypeTag::I64 => Box::new(PrimitiveBuilder::<Int64Type>::with_capacity(capacity)),
        TypeTag::U8 => Box::new(PrimitiveBuilder::<UInt8Type>::with_capacity(capacity)),
        TypeTag::U16 => Box::new(PrimitiveBuilder::<UInt16Type>::with_capacity(capacity)),
        TypeTag::U32 => Box::new(PrimitiveBuilder::<UInt32Type>::with_capacity(capacity)),
        TypeTag::U64 | TypeTag::Pointer => {
            Box::new(PrimitiveBuilder::<UInt64Type>::with_capacity(capacity))
        }
        TypeTag::F32 => Box::new(PrimitiveBuilder::<Float32Type>::with_capacity(capacity)),
        TypeTag::F64 => Box::new(PrimitiveBuilder::<Float64Type>::with_capacity(capacity)),
        TypeTag::Date => Box::new(PrimitiveBuilder::<Date32Type>::with_capacity(capacity)),
        TypeTag::Time => Box::new(PrimitiveBuilder::<Time64MicrosecondType>::with_capacity(
            capacity,
        )),
        TypeTag::Timestamp => Box::new(
            PrimitiveBuilder::<TimestampMicrosecondType>::with_capacity(capacity),
        ),
        TypeTag::Decimal => Box::new(
            PrimitiveBuilder::<Decimal128Type>::with_capacity(capacity)
                .with_data_type(DataType::Decimal128(38, 10)),
        ),
        TypeTag::Varchar => Box::new(StringBuilder::with_capacity(capacity, 64)),
        TypeTag::Blob => Box::new(BinaryBuilder::with_capacity(capacity, 64)),
        TypeTag::Void
        | TypeTag::List
        | TypeTag::Array
        | TypeTag::Struct
        | TypeTag::Map
        | TypeTag::Union => unreachable!("scalar builder for non-scalar tag"),
    }
}

unsafe fn append_scalar(
    builder: &mut Box<dyn ArrayBuilder>,
    tag: TypeTag,
    ptr: *const u8,
    valid: bool,
) -> Result<(), InvokeError> {
    macro_rules! read_primitive {
        ($T:ty, $native:ty) => {{
            let b = cast_builder!(builder, PrimitiveBuilder<$T>);
            if valid {
                b.append_value(unsafe { std::ptr::read_unaligned(ptr as *const $native) });
            } else {
                b.append_null();
            }
        }};
    }

    match tag {
        TypeTag::Bool => {
            let b = cast_builder!(builder, BooleanBuilder);
            if valid {
                b.append_value(unsafe { *ptr } != 0);
            } else {
                b.append_null();
            }
        }
        TypeTag::I8 => read_primitive!(Int8Type, i8),
        TypeTag::I16 => read_primitive!(Int16Type, i16),
        TypeTag::I32 => read_primitive!(Int32Type, i32),
        TypeTag::I64 => read_primitive!(Int64Type, i64),
        TypeTag::U8 => read_primitive!(UInt8Type, u8),
        TypeTag::U16 => read_primitive!(UInt16Type, u16),
        TypeTag::U32 => read_primitive!(UInt32Type, u32),
        TypeTag::U64 | TypeTag::Pointer => read_primitive!(UInt64Type, u64),
        TypeTag::F32 => read_primitive!(Float32Type, f32),
        TypeTag::F64 => read_primitive!(Float64Type, f64),
        TypeTag::Date => read_primitive!(Date32Type, i32),
        TypeTag::Time => read_primitive!(Time64MicrosecondType, i64),
        TypeTag::Timestamp => read_primitive!(TimestampMicrosecondType, i64),
        TypeTag::Decimal => read_primitive!(Decimal128Type, i128),
        TypeTag::Varchar => {
            let b = cast_builder!(builder, StringBuilder);
            if !valid {
                b.append_null();
            } else {
                let bytes = unsafe { read_bytes_ref(ptr) };
                let text = std::str::from_utf8(bytes).map_err(|_| InvokeError::InvalidUtf8)?;
                b.append_value(text);
            }
        }
        TypeTag::Blob => {
            let b = cast_builder!(builder, BinaryBuilder);
            if !valid {
                b.append_null();
            } else {
                b.append_value(unsafe { read_bytes_ref(ptr) });
            }
        }
        TypeTag::Void
        | TypeTag::List
        | TypeTag::Array
        | TypeTag::Struct
        | TypeTag::Map
        | TypeTag::Union => unreachable!("scalar append for non-scalar tag"),
    }
    Ok(())
}

/// Read a `CBytesRef` slot. A null pointer with zero length is a valid
/// empty value, not a null.
unsafe fn read_bytes_ref<'a>(ptr: *const u8) -> &'a [u8] {
    let bytes = unsafe { std::ptr::read_unaligned(ptr as *const CBytesRef) };
    if bytes.ptr.is_null() {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(bytes.ptr, bytes.len as usize) }
    }
}
