//! Descriptor-to-Arrow logical type materialization.

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, TimeUnit, UnionFields, UnionMode};
use cfunc_sig::{TypeDescriptor, TypeShape, TypeTag};

/// Recursively convert a parsed descriptor into the engine-native Arrow
/// `DataType`, mirroring the descriptor structure exactly.
pub fn descriptor_to_datatype(desc: &TypeDescriptor) -> DataType {
    match desc.shape() {
        TypeShape::Primitive => primitive_datatype(desc.tag()),
        TypeShape::List(elem) => {
            DataType::List(Arc::new(Field::new("item", descriptor_to_datatype(elem), true)))
        }
        TypeShape::Array(elem, len) => DataType::FixedSizeList(
            Arc::new(Field::new("item", descriptor_to_datatype(elem), true)),
            *len as i32,
        ),
        TypeShape::Struct(fields) => {
            let arrow_fields: Vec<Field> = fields
                .iter()
                .map(|f| Field::new(&f.name, descriptor_to_datatype(&f.desc), true))
                .collect();
            DataType::Struct(arrow_fields.into())
        }
        TypeShape::Map { key, value } => {
            let key_field = Field::new("key", descriptor_to_datatype(key), false);
            let value_field = Field::new("value", descriptor_to_datatype(value), true);
            let entry_struct = DataType::Struct(vec![key_field, value_field].into());
            DataType::Map(Arc::new(Field::new("entries", entry_struct, false)), false)
        }
        TypeShape::Union(members) => DataType::Union(union_fields(members), UnionMode::Sparse),
    }
}

/// Union member fields with type ids assigned by member position.
pub(crate) fn union_fields(members: &[cfunc_sig::FieldDescriptor]) -> UnionFields {
    UnionFields::new(
        0..members.len() as i8,
        members
            .iter()
            .map(|m| Field::new(&m.name, descriptor_to_datatype(&m.desc), true)),
    )
}

fn primitive_datatype(tag: TypeTag) -> DataType {
    match tag {
        TypeTag::Void => DataType::Null,
        TypeTag::Bool => DataType::Boolean,
        TypeTag::I8 => DataType::Int8,
        TypeTag::I16 => DataType::Int16,
        TypeTag::I32 => DataType::Int32,
        TypeTag::I64 => DataType::Int64,
        TypeTag::U8 => DataType::UInt8,
        TypeTag::U16 => DataType::UInt16,
        TypeTag::U32 => DataType::UInt32,
        TypeTag::U64 => DataType::UInt64,
        TypeTag::F32 => DataType::Float32,
        TypeTag::F64 => DataType::Float64,
        // Opaque machine pointers travel as unsigned 64-bit columns.
        TypeTag::Pointer => DataType::UInt64,
        TypeTag::Date => DataType::Date32,
        TypeTag::Time => DataType::Time64(TimeUnit::Microsecond),
        TypeTag::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        TypeTag::Decimal => DataType::Decimal128(38, 10),
        TypeTag::Varchar => DataType::Utf8,
        TypeTag::Blob => DataType::Binary,
        TypeTag::List
        | TypeTag::Array
        | TypeTag::Struct
        | TypeTag::Map
        | TypeTag::Union => unreachable!("composite tags carry a composite shape"),
    }
}
