//! Error type for the grammar and signature layer.

use thiserror::Error;

/// Error returned by the type-token and signature parsers.
///
/// Every variant carries the offending token text so the message a user sees
/// names exactly the piece of input that failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SigError {
    #[error("empty type token")]
    EmptyToken,

    #[error("unknown type name '{0}'")]
    UnknownType(String),

    #[error("unbalanced brackets in '{0}'")]
    Unbalanced(String),

    #[error("unexpected trailing input in '{0}'")]
    TrailingInput(String),

    #[error("array length must be a positive integer, got '{0}'")]
    BadArrayLength(String),

    #[error("zero-length array in '{0}'")]
    ZeroLengthArray(String),

    #[error("'void' is only legal as a return type")]
    VoidNotAllowed,

    #[error("'{keyword}<...>' takes exactly one element type, got '{body}'")]
    ElementArity { keyword: &'static str, body: String },

    #[error("map takes exactly a key and a value type, got '{0}'")]
    MapArity(String),

    #[error("struct and union require at least one field, got '{0}'")]
    EmptyFieldList(String),

    #[error("union member requires a name in '{0}'")]
    MissingMemberName(String),

    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("duplicate member name '{0}'")]
    DuplicateMember(String),

    #[error("no argument list provided")]
    MissingArgumentList,

    #[error("flat field specs accept fixed-width scalar types only, got '{0}'")]
    CompositeFieldInFlatSpec(String),

    #[error("bitfield '{name}' does not fit the {carrier_bits}-bit carrier")]
    BitfieldOverflow { name: String, carrier_bits: usize },

    #[error("bitfield carrier must be an unsigned integer, got '{0}'")]
    BadBitfieldCarrier(String),

    #[error("invalid enum value in '{0}'")]
    BadEnumValue(String),
}
