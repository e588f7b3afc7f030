//! Read-only value bridges: a flat C-ABI view over Arrow columns.
//!
//! A bridge is transient, built per invocation chunk. Scalar data is never
//! copied; only the per-row descriptor structs for composite rows (and the
//! pointer tables they share) are allocated, and the bridge tree owns every
//! one of those allocations, so dropping the root releases everything on all
//! paths. Pointers into the source arrays are borrowed for `'a`.

use std::ffi::c_void;

use arrow::array::{
    Array, BooleanArray, FixedSizeListArray, ListArray, MapArray, PrimitiveArray, StructArray,
    UnionArray,
};
use arrow::array::{BinaryArray, StringArray};
use arrow::datatypes::{
    ArrowPrimitiveType, DataType, Date32Type, Decimal128Type, Float32Type, Float64Type, Int8Type,
    Int16Type, Int32Type, Int64Type, Time64MicrosecondType, TimestampMicrosecondType, UInt8Type,
    UInt16Type, UInt32Type, UInt64Type, UnionMode,
};
use cfunc_sig::{TypeDescriptor, TypeShape, TypeTag};

use crate::BridgeError;
use crate::abi::{CArrayRef, CBytesRef, CListRef, CMapRef, CStructRef, CUnionRef};
use crate::validity::{ValidityBitmap, bitmap_set, new_bitmap};

/// Per-row payload of a bridge node.
pub enum BridgeData {
    /// Fixed-width scalar column, borrowed straight from the Arrow buffer.
    Borrowed(*const u8),
    /// Re-packed fixed-width values (bit-packed booleans become one byte
    /// per row).
    OwnedFixed(Vec<u8>),
    Bytes(Vec<CBytesRef>),
    Lists(Vec<CListRef>),
    Arrays(Vec<CArrayRef>),
    Structs(Vec<CStructRef>),
    Maps(Vec<CMapRef>),
    Unions(Vec<CUnionRef>),
}

/// Flat view over one column, recursive over the descriptor.
///
/// Invalid rows always carry zeroed descriptors: a wrapper that checks
/// validity before dereferencing never sees a dangling pointer.
pub struct ValueBridge<'a> {
    tag: TypeTag,
    row_count: usize,
    element_size: usize,
    data: BridgeData,
    validity: ValidityBitmap<'a>,
    children: Vec<ValueBridge<'a>>,
    // Shared row-invariant tables referenced by struct/union descriptor
    // structs; kept here so their addresses outlive the per-row structs.
    ptr_table: Vec<*const c_void>,
    validity_table: Vec<*const u8>,
}

impl<'a> ValueBridge<'a> {
    /// Build a bridge over `array` described by `desc`.
    pub fn build(
        array: &'a dyn Array,
        desc: &TypeDescriptor,
    ) -> Result<ValueBridge<'a>, BridgeError> {
        match desc.shape() {
            TypeShape::Primitive => Self::build_primitive(array, desc),
            TypeShape::List(elem) => Self::build_list(array, desc, elem),
            TypeShape::Array(elem, len) => Self::build_array(array, desc, elem, *len),
            TypeShape::Struct(fields) => Self::build_struct(array, desc, fields),
            TypeShape::Map { key, value } => Self::build_map(array, desc, key, value),
            TypeShape::Union(members) => Self::build_union(array, desc, members),
        }
    }

    /// Column-major base pointer handed to compiled wrappers.
    pub fn data_ptr(&self) -> *const c_void {
        match &self.data {
            BridgeData::Borrowed(ptr) => *ptr as *const c_void,
            BridgeData::OwnedFixed(buf) => buf.as_ptr() as *const c_void,
            BridgeData::Bytes(rows) => rows.as_ptr() as *const c_void,
            BridgeData::Lists(rows) => rows.as_ptr() as *const c_void,
            BridgeData::Arrays(rows) => rows.as_ptr() as *const c_void,
            BridgeData::Structs(rows) => rows.as_ptr() as *const c_void,
            BridgeData::Maps(rows) => rows.as_ptr() as *const c_void,
            BridgeData::Unions(rows) => rows.as_ptr() as *const c_void,
        }
    }

    /// Validity bitmap base pointer; null when every row is valid.
    pub fn validity_ptr(&self) -> *const u8 {
        self.validity.ptr()
    }

    pub fn is_row_valid(&self, row: usize) -> bool {
        self.validity.is_valid(row)
    }

    /// Pointer to the storage slot of one row.
    pub fn element_ptr(&self, row: usize) -> *const c_void {
        unsafe { (self.data_ptr() as *const u8).add(row * self.element_size) as *const c_void }
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn data(&self) -> &BridgeData {
        &self.data
    }

    fn from_parts(
        tag: TypeTag,
        row_count: usize,
        data: BridgeData,
        validity: ValidityBitmap<'a>,
    ) -> ValueBridge<'a> {
        ValueBridge {
            tag,
            row_count,
            element_size: tag.storage_size(),
            data,
            validity,
            children: Vec::new(),
            ptr_table: Vec::new(),
            validity_table: Vec::new(),
        }
    }

    fn build_primitive(
        array: &'a dyn Array,
        desc: &TypeDescriptor,
    ) -> Result<ValueBridge<'a>, BridgeError> {
        let tag = desc.tag();
        let validity = ValidityBitmap::from_array(array);
        let data = match tag {
            TypeTag::Void => return Err(BridgeError::UnsupportedType(desc.token().into())),
            TypeTag::Bool => {
                let bools: &BooleanArray = downcast(array, desc)?;
                let mut buf = vec![0u8; bools.len().max(1)];
                for row in 0..bools.len() {
                    if bools.value(row) {
                        buf[row] = 1;
                    }
                }
                BridgeData::OwnedFixed(buf)
            }
            TypeTag::I8 => primitive_data::<Int8Type>(array, desc)?,
            TypeTag::I16 => primitive_data::<Int16Type>(array, desc)?,
            TypeTag::I32 => primitive_data::<Int32Type>(array, desc)?,
            TypeTag::I64 => primitive_data::<Int64Type>(array, desc)?,
            TypeTag::U8 => primitive_data::<UInt8Type>(array, desc)?,
            TypeTag::U16 => primitive_data::<UInt16Type>(array, desc)?,
            TypeTag::U32 => primitive_data::<UInt32Type>(array, desc)?,
            TypeTag::U64 | TypeTag::Pointer => primitive_data::<UInt64Type>(array, desc)?,
            TypeTag::F32 => primitive_data::<Float32Type>(array, desc)?,
            TypeTag::F64 => primitive_data::<Float64Type>(array, desc)?,
            TypeTag::Date => primitive_data::<Date32Type>(array, desc)?,
            TypeTag::Time => primitive_data::<Time64MicrosecondType>(array, desc)?,
            TypeTag::Timestamp => primitive_data::<TimestampMicrosecondType>(array, desc)?,
            TypeTag::Decimal => primitive_data::<Decimal128Type>(array, desc)?,
            TypeTag::Varchar => {
                let strings: &StringArray = downcast(array, desc)?;
                let mut rows = Vec::with_capacity(strings.len());
                for row in 0..strings.len() {
                    if strings.is_valid(row) {
                        let value = strings.value(row);
                        rows.push(CBytesRef {
                            ptr: value.as_ptr(),
                            len: value.len() as u64,
                        });
                    } else {
                        rows.push(CBytesRef::zeroed());
                    }
                }
                BridgeData::Bytes(rows)
            }
            TypeTag::Blob => {
                let blobs: &BinaryArray = downcast(array, desc)?;
                let mut rows = Vec::with_capacity(blobs.len());
                for row in 0..blobs.len() {
                    if blobs.is_valid(row) {
                        let value = blobs.value(row);
                        rows.push(CBytesRef {
                            ptr: value.as_ptr(),
                            len: value.len() as u64,
                        });
                    } else {
                        rows.push(CBytesRef::zeroed());
                    }
                }
                BridgeData::Bytes(rows)
            }
            TypeTag::List
            | TypeTag::Array
            | TypeTag::Struct
            | TypeTag::Map
            | TypeTag::Union => unreachable!("composite tags carry a composite shape"),
        };
        Ok(Self::from_parts(tag, array.len(), data, validity))
    }

    fn build_list(
        array: &'a dyn Array,
        desc: &TypeDescriptor,
        elem: &TypeDescriptor,
    ) -> Result<ValueBridge<'a>, BridgeError> {
        let list: &ListArray = downcast(array, desc)?;
        let child = Self::build(list.values().as_ref(), elem)?;
        let validity = ValidityBitmap::from_array(array);
        let offsets = list.value_offsets();

        let mut rows = Vec::with_capacity(list.len());
        for row in 0..list.len() {
            if !validity.is_valid(row) {
                rows.push(CListRef::zeroed());
                continue;
            }
            let start = offsets[row] as usize;
            let end = offsets[row + 1] as usize;
            rows.push(CListRef {
                ptr: child.element_ptr(start),
                validity: child.validity_ptr(),
                offset: start as u64,
                len: (end - start) as u64,
            });
        }

        let mut bridge =
            Self::from_parts(desc.tag(), list.len(), BridgeData::Lists(rows), validity);
        bridge.children.push(child);
        Ok(bridge)
    }

    fn build_array(
        array: &'a dyn Array,
        desc: &TypeDescriptor,
        elem: &TypeDescriptor,
        declared_len: usize,
    ) -> Result<ValueBridge<'a>, BridgeError> {
        let fixed: &FixedSizeListArray = downcast(array, desc)?;
        let actual = fixed.value_length() as usize;
        if actual != declared_len {
            return Err(BridgeError::ArrayWidthMismatch {
                declared: declared_len,
                actual,
            });
        }
        let child = Self::build(fixed.values().as_ref(), elem)?;
        let validity = ValidityBitmap::from_array(array);

        let mut rows = Vec::with_capacity(fixed.len());
        for row in 0..fixed.len() {
            if !validity.is_valid(row) {
                rows.push(CArrayRef::zeroed());
                continue;
            }
            let start = fixed.value_offset(row) as usize;
            rows.push(CArrayRef {
                ptr: child.element_ptr(start),
                validity: child.validity_ptr(),
                offset: start as u64,
                len: declared_len as u64,
            });
        }

        let mut bridge =
            Self::from_parts(desc.tag(), fixed.len(), BridgeData::Arrays(rows), validity);
        bridge.children.push(child);
        Ok(bridge)
    }

    fn build_struct(
        array: &'a dyn Array,
        desc: &TypeDescriptor,
        fields: &[cfunc_sig::FieldDescriptor],
    ) -> Result<ValueBridge<'a>, BridgeError> {
        let structs: &StructArray = downcast(array, desc)?;
        if structs.num_columns() != fields.len() {
            return Err(BridgeError::TypeMismatch {
                expected: desc.token().into(),
                actual: format!("{:?}", structs.data_type()),
            });
        }

        let mut children = Vec::with_capacity(fields.len());
        for (field, column) in fields.iter().zip(structs.columns()) {
            children.push(Self::build(column.as_ref(), &field.desc)?);
        }
        // Field base pointers are row-invariant; all rows share these two
        // tables and differ only in row_offset.
        let ptr_table: Vec<*const c_void> = children.iter().map(|c| c.data_ptr()).collect();
        let validity_table: Vec<*const u8> = children.iter().map(|c| c.validity_ptr()).collect();

        let validity = ValidityBitmap::from_array(array);
        let mut rows = Vec::with_capacity(structs.len());
        for row in 0..structs.len() {
            if !validity.is_valid(row) {
                rows.push(CStructRef::zeroed());
                continue;
            }
            rows.push(CStructRef {
                field_ptrs: ptr_table.as_ptr(),
                field_validity: validity_table.as_ptr(),
                field_count: fields.len() as u64,
                row_offset: row as u64,
            });
        }

        let mut bridge =
            Self::from_parts(desc.tag(), structs.len(), BridgeData::Structs(rows), validity);
        bridge.children = children;
        bridge.ptr_table = ptr_table;
        bridge.validity_table = validity_table;
        Ok(bridge)
    }

    fn build_map(
        array: &'a dyn Array,
        desc: &TypeDescriptor,
        key: &TypeDescriptor,
        value: &TypeDescriptor,
    ) -> Result<ValueBridge<'a>, BridgeError> {
        let map: &MapArray = downcast(array, desc)?;
        let key_bridge = Self::build(map.keys().as_ref(), key)?;
        let value_bridge = Self::build(map.values().as_ref(), value)?;
        let validity = ValidityBitmap::from_array(array);
        let offsets = map.value_offsets();

        let mut rows = Vec::with_capacity(map.len());
        for row in 0..map.len() {
            if !validity.is_valid(row) {
                rows.push(CMapRef::zeroed());
                continue;
            }
            let start = offsets[row] as usize;
            let end = offsets[row + 1] as usize;
            rows.push(CMapRef {
                key_ptr: key_bridge.element_ptr(start),
                key_validity: key_bridge.validity_ptr(),
                value_ptr: value_bridge.element_ptr(start),
                value_validity: value_bridge.validity_ptr(),
                offset: start as u64,
                len: (end - start) as u64,
            });
        }

        let mut bridge = Self::from_parts(desc.tag(), map.len(), BridgeData::Maps(rows), validity);
        bridge.children.push(key_bridge);
        bridge.children.push(value_bridge);
        Ok(bridge)
    }

    fn build_union(
        array: &'a dyn Array,
        desc: &TypeDescriptor,
        members: &[cfunc_sig::FieldDescriptor],
    ) -> Result<ValueBridge<'a>, BridgeError> {
        let union: &UnionArray = downcast(array, desc)?;
        match union.data_type() {
            DataType::Union(fields, UnionMode::Sparse) => {
                if fields.len() != members.len() {
                    return Err(BridgeError::UnionMemberMismatch {
                        expected: desc.token().into(),
                        declared: members.len(),
                        actual: fields.len(),
                    });
                }
                // Members are addressed by position and `tag_ptr` exposes the
                // raw type-ids buffer, so the column's ids must be exactly
                // 0..n in declaration order.
                let positional = fields
                    .iter()
                    .enumerate()
                    .all(|(index, (id, _))| id == index as i8);
                if !positional {
                    return Err(BridgeError::TypeMismatch {
                        expected: desc.token().into(),
                        actual: format!("{:?}", union.data_type()),
                    });
                }
            }
            DataType::Union(_, UnionMode::Dense) => {
                return Err(BridgeError::DenseUnionUnsupported);
            }
            other => {
                return Err(BridgeError::TypeMismatch {
                    expected: desc.token().into(),
                    actual: format!("{other:?}"),
                });
            }
        }

        let mut children = Vec::with_capacity(members.len());
        for (index, member) in members.iter().enumerate() {
            children.push(Self::build(union.child(index as i8).as_ref(), &member.desc)?);
        }
        let ptr_table: Vec<*const c_void> = children.iter().map(|c| c.data_ptr()).collect();
        let validity_table: Vec<*const u8> = children.iter().map(|c| c.validity_ptr()).collect();
        let tag_ptr = union.type_ids().as_ptr();

        // Arrow unions expose no row-level validity. Fallback policy: a row
        // is valid iff at least one member is valid there.
        let mut mask = new_bitmap(union.len(), false);
        for row in 0..union.len() {
            if children.iter().any(|c| c.is_row_valid(row)) {
                bitmap_set(&mut mask, row);
            }
        }
        let validity = ValidityBitmap::from_owned(mask);

        let mut rows = Vec::with_capacity(union.len());
        for row in 0..union.len() {
            if !validity.is_valid(row) {
                rows.push(CUnionRef::zeroed());
                continue;
            }
            rows.push(CUnionRef {
                tag_ptr,
                member_ptrs: ptr_table.as_ptr(),
                member_validity: validity_table.as_ptr(),
                member_count: members.len() as u64,
                row_offset: row as u64,
            });
        }

        let mut bridge =
            Self::from_parts(desc.tag(), union.len(), BridgeData::Unions(rows), validity);
        bridge.children = children;
        bridge.ptr_table = ptr_table;
        bridge.validity_table = validity_table;
        Ok(bridge)
    }
}

fn primitive_data<T: ArrowPrimitiveType>(
    array: &dyn Array,
    desc: &TypeDescriptor,
) -> Result<BridgeData, BridgeError> {
    let typed: &PrimitiveArray<T> = downcast(array, desc)?;
    Ok(BridgeData::Borrowed(typed.values().as_ptr() as *const u8))
}

fn downcast<'a, T: 'static>(
    array: &'a dyn Array,
    desc: &TypeDescriptor,
) -> Result<&'a T, BridgeError> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| BridgeError::TypeMismatch {
            expected: desc.token().into(),
            actual: format!("{:?}", array.data_type()),
        })
}
