//! Error types for the bridge and execution layer.

use arrow::error::ArrowError;
use thiserror::Error;

/// Error building a value bridge over an Arrow array.
///
/// When argument types were validated at registration these indicate an
/// internal invariant violation; when arrays come straight from a caller
/// they are runtime data-shape mismatches.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("column does not match declared type '{expected}': got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("fixed array declared length {declared} but column width is {actual}")]
    ArrayWidthMismatch { declared: usize, actual: usize },

    #[error("dense union columns are not supported; re-encode as a sparse union")]
    DenseUnionUnsupported,

    #[error("union column has {actual} members but '{expected}' declares {declared}")]
    UnionMemberMismatch {
        expected: String,
        declared: usize,
        actual: usize,
    },

    #[error("'{0}' cannot be bridged as an argument or element type")]
    UnsupportedType(String),
}

/// Error raised while dispatching a compiled wrapper or writing its results
/// back. Fatal for the current chunk: the engine surfaces exactly one of
/// these per failed call and no partial result set.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("expected {expected} argument columns, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("argument column {column} has {got} rows, chunk has {expected}")]
    RowCountMismatch {
        column: usize,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("compiled function reported failure")]
    WrapperFailed,

    #[error("fixed array result declared length {expected} but wrapper returned {got}")]
    ArrayLengthMismatch { expected: usize, got: usize },

    #[error("struct result has {got} fields, declared type has {expected}")]
    StructShapeMismatch { expected: usize, got: usize },

    #[error("union result has {got} members, declared type has {expected}")]
    UnionShapeMismatch { expected: usize, got: usize },

    #[error("union tag {tag} out of range for {member_count} members")]
    UnionTagOutOfRange { tag: i8, member_count: usize },

    #[error("map result contains an invalid key")]
    NullMapKey,

    #[error("varchar result is not valid UTF-8")]
    InvalidUtf8,

    #[error("varchar argument contains an embedded NUL byte")]
    EmbeddedNul,

    #[error(transparent)]
    Arrow(#[from] ArrowError),
}
