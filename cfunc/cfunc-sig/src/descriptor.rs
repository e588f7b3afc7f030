//! Recursive type descriptors and their flattened metadata tables.

use crate::{SigError, TypeTag, parse};

/// Parsed form of one type token.
///
/// A descriptor is built once per signature at registration time and never
/// mutated afterwards; the runtime bridge walks it on every invocation. The
/// original token text is kept verbatim so a descriptor can always be
/// reparsed into a structurally identical tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    tag: TypeTag,
    token: String,
    shape: TypeShape,
}

/// Child layout per kind. Variants mirror [`TypeTag`] composites one-to-one.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeShape {
    Primitive,
    List(Box<TypeDescriptor>),
    Array(Box<TypeDescriptor>, usize),
    Struct(Vec<FieldDescriptor>),
    Map {
        key: Box<TypeDescriptor>,
        value: Box<TypeDescriptor>,
    },
    Union(Vec<FieldDescriptor>),
}

/// Named child of a struct or union descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub desc: TypeDescriptor,
}

impl TypeDescriptor {
    /// Parse one type token. `allow_void` admits the `void` sentinel, which
    /// is legal only for return types.
    pub fn parse(token: &str, allow_void: bool) -> Result<TypeDescriptor, SigError> {
        parse::parse_type(token, allow_void)
    }

    /// Constructor reserved for the parser so `tag` and `shape` cannot
    /// disagree.
    pub(crate) fn new(tag: TypeTag, token: impl Into<String>, shape: TypeShape) -> TypeDescriptor {
        debug_assert!(tag_matches_shape(tag, &shape));
        TypeDescriptor {
            tag,
            token: token.into(),
            shape,
        }
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// The original token text this descriptor was parsed from.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn shape(&self) -> &TypeShape {
        &self.shape
    }

    /// Per-row storage size of this type's slot (see [`TypeTag::storage_size`]).
    pub fn storage_size(&self) -> usize {
        self.tag.storage_size()
    }

    pub fn is_composite(&self) -> bool {
        self.tag.is_composite()
    }

    /// Fixed length if this is an array descriptor.
    pub fn fixed_len(&self) -> Option<usize> {
        match &self.shape {
            TypeShape::Array(_, n) => Some(*n),
            _ => None,
        }
    }

    /// Flattened field table for a struct descriptor, `None` otherwise.
    pub fn struct_meta(&self) -> Option<StructMeta> {
        match &self.shape {
            TypeShape::Struct(fields) => Some(StructMeta::from_fields(fields)),
            _ => None,
        }
    }

    /// Flattened key/value table for a map descriptor, `None` otherwise.
    pub fn map_meta(&self) -> Option<MapMeta> {
        match &self.shape {
            TypeShape::Map { key, value } => Some(MapMeta {
                key_tag: key.tag(),
                key_size: key.storage_size(),
                value_tag: value.tag(),
                value_size: value.storage_size(),
            }),
            _ => None,
        }
    }

    /// Flattened member table for a union descriptor, `None` otherwise.
    pub fn union_meta(&self) -> Option<UnionMeta> {
        match &self.shape {
            TypeShape::Union(members) => Some(UnionMeta::from_fields(members)),
            _ => None,
        }
    }

    /// Flattened metadata for whichever composite this is, if any.
    pub fn composite_meta(&self) -> Option<CompositeMeta> {
        match &self.shape {
            TypeShape::Struct(_) => self.struct_meta().map(CompositeMeta::Struct),
            TypeShape::Map { .. } => self.map_meta().map(CompositeMeta::Map),
            TypeShape::Union(_) => self.union_meta().map(CompositeMeta::Union),
            _ => None,
        }
    }
}

fn tag_matches_shape(tag: TypeTag, shape: &TypeShape) -> bool {
    match shape {
        TypeShape::Primitive => !tag.is_composite(),
        TypeShape::List(_) => tag == TypeTag::List,
        TypeShape::Array(_, _) => tag == TypeTag::Array,
        TypeShape::Struct(_) => tag == TypeTag::Struct,
        TypeShape::Map { .. } => tag == TypeTag::Map,
        TypeShape::Union(_) => tag == TypeTag::Union,
    }
}

/// Immediate field names, tags, and sizes of a struct descriptor.
///
/// Count and order exactly mirror the originating descriptor; the bridge and
/// the result writer consult these instead of re-walking token text.
#[derive(Debug, Clone, PartialEq)]
pub struct StructMeta {
    pub names: Vec<String>,
    pub tags: Vec<TypeTag>,
    pub sizes: Vec<usize>,
}

impl StructMeta {
    fn from_fields(fields: &[FieldDescriptor]) -> StructMeta {
        StructMeta {
            names: fields.iter().map(|f| f.name.clone()).collect(),
            tags: fields.iter().map(|f| f.desc.tag()).collect(),
            sizes: fields.iter().map(|f| f.desc.storage_size()).collect(),
        }
    }

    pub fn field_count(&self) -> usize {
        self.names.len()
    }
}

/// Key/value tags and sizes of a map descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapMeta {
    pub key_tag: TypeTag,
    pub key_size: usize,
    pub value_tag: TypeTag,
    pub value_size: usize,
}

/// Immediate member names, tags, and sizes of a union descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionMeta {
    pub names: Vec<String>,
    pub tags: Vec<TypeTag>,
    pub sizes: Vec<usize>,
}

impl UnionMeta {
    fn from_fields(members: &[FieldDescriptor]) -> UnionMeta {
        UnionMeta {
            names: members.iter().map(|f| f.name.clone()).collect(),
            tags: members.iter().map(|f| f.desc.tag()).collect(),
            sizes: members.iter().map(|f| f.desc.storage_size()).collect(),
        }
    }

    pub fn member_count(&self) -> usize {
        self.names.len()
    }
}

/// Flattened metadata of one composite node, cached per signature argument.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositeMeta {
    Struct(StructMeta),
    Map(MapMeta),
    Union(UnionMeta),
}
