/// Flat type tag for every shape the signature grammar can express.
///
/// The set is closed on purpose: every dispatch over a tag (or over
/// [`TypeShape`](crate::TypeShape)) is an exhaustive `match`, so adding a tag
/// fails to compile until every consumer handles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// Sentinel "no value" tag, legal only as a return type.
    Void,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    /// Opaque machine pointer, passed through untouched.
    Pointer,
    /// Days since the Unix epoch, i32.
    Date,
    /// Microseconds since midnight, i64.
    Time,
    /// Microseconds since the Unix epoch, i64.
    Timestamp,
    /// 128-bit fixed-point decimal, precision 38 scale 10.
    Decimal,
    Varchar,
    Blob,
    List,
    Array,
    Struct,
    Map,
    Union,
}

// Sizes of the flat C descriptor structs handed to compiled wrappers.
// `cfunc-bridge` asserts these against `size_of` in its ABI layout tests.
pub(crate) const BYTES_REF_SIZE: usize = 16;
pub(crate) const LIST_REF_SIZE: usize = 32;
pub(crate) const ARRAY_REF_SIZE: usize = 32;
pub(crate) const STRUCT_REF_SIZE: usize = 32;
pub(crate) const MAP_REF_SIZE: usize = 48;
pub(crate) const UNION_REF_SIZE: usize = 40;

impl TypeTag {
    /// Per-row storage size in bytes: the value width for fixed-width
    /// scalars, the flat descriptor-struct size for variable-length and
    /// composite tags, and zero for `Void`.
    pub fn storage_size(self) -> usize {
        match self {
            TypeTag::Void => 0,
            TypeTag::Bool | TypeTag::I8 | TypeTag::U8 => 1,
            TypeTag::I16 | TypeTag::U16 => 2,
            TypeTag::I32 | TypeTag::U32 | TypeTag::F32 | TypeTag::Date => 4,
            TypeTag::I64
            | TypeTag::U64
            | TypeTag::F64
            | TypeTag::Pointer
            | TypeTag::Time
            | TypeTag::Timestamp => 8,
            TypeTag::Decimal => 16,
            TypeTag::Varchar | TypeTag::Blob => BYTES_REF_SIZE,
            TypeTag::List => LIST_REF_SIZE,
            TypeTag::Array => ARRAY_REF_SIZE,
            TypeTag::Struct => STRUCT_REF_SIZE,
            TypeTag::Map => MAP_REF_SIZE,
            TypeTag::Union => UNION_REF_SIZE,
        }
    }

    /// Natural C alignment for fixed-width scalars, used by the flat
    /// field-spec layout. Composites never appear in flat layouts.
    pub fn alignment(self) -> usize {
        match self {
            TypeTag::Decimal => 16,
            other => other.storage_size().clamp(1, 8),
        }
    }

    /// True for scalars a compiled wrapper reads directly from a column slot
    /// (everything except varchar/blob, composites, and `Void`).
    pub fn is_fixed_width(self) -> bool {
        !matches!(
            self,
            TypeTag::Void
                | TypeTag::Varchar
                | TypeTag::Blob
                | TypeTag::List
                | TypeTag::Array
                | TypeTag::Struct
                | TypeTag::Map
                | TypeTag::Union
        )
    }

    pub fn is_composite(self) -> bool {
        matches!(
            self,
            TypeTag::List | TypeTag::Array | TypeTag::Struct | TypeTag::Map | TypeTag::Union
        )
    }

    /// Canonical lowercase spelling, the first alias of [`from_keyword`].
    ///
    /// [`from_keyword`]: TypeTag::from_keyword
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Void => "void",
            TypeTag::Bool => "bool",
            TypeTag::I8 => "i8",
            TypeTag::I16 => "i16",
            TypeTag::I32 => "i32",
            TypeTag::I64 => "i64",
            TypeTag::U8 => "u8",
            TypeTag::U16 => "u16",
            TypeTag::U32 => "u32",
            TypeTag::U64 => "u64",
            TypeTag::F32 => "f32",
            TypeTag::F64 => "f64",
            TypeTag::Pointer => "ptr",
            TypeTag::Date => "date",
            TypeTag::Time => "time",
            TypeTag::Timestamp => "timestamp",
            TypeTag::Decimal => "decimal",
            TypeTag::Varchar => "varchar",
            TypeTag::Blob => "blob",
            TypeTag::List => "list",
            TypeTag::Array => "array",
            TypeTag::Struct => "struct",
            TypeTag::Map => "map",
            TypeTag::Union => "union",
        }
    }

    /// Resolve a primitive keyword (already lowercased by the parser).
    /// Composite tags are never spelled bare, so they resolve to `None`.
    pub fn from_keyword(keyword: &str) -> Option<TypeTag> {
        let tag = match keyword {
            "void" => TypeTag::Void,
            "bool" | "boolean" => TypeTag::Bool,
            "i8" | "tinyint" => TypeTag::I8,
            "i16" | "smallint" => TypeTag::I16,
            "i32" | "int" | "integer" => TypeTag::I32,
            "i64" | "bigint" => TypeTag::I64,
            "u8" | "utinyint" => TypeTag::U8,
            "u16" | "usmallint" => TypeTag::U16,
            "u32" | "uinteger" => TypeTag::U32,
            "u64" | "ubigint" => TypeTag::U64,
            "f32" | "float" | "real" => TypeTag::F32,
            "f64" | "double" => TypeTag::F64,
            "ptr" | "pointer" => TypeTag::Pointer,
            "date" => TypeTag::Date,
            "time" => TypeTag::Time,
            "timestamp" => TypeTag::Timestamp,
            "decimal" => TypeTag::Decimal,
            "varchar" | "text" | "string" => TypeTag::Varchar,
            "blob" | "bytea" => TypeTag::Blob,
            _ => return None,
        };
        Some(tag)
    }
}
