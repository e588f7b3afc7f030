//! Columnar value bridges and the vectorized execution engine for `cfunc`.
//!
//! The bridge layer walks Arrow arrays guided by a
//! [`TypeDescriptor`](cfunc_sig::TypeDescriptor) and exposes them as flat
//! C-ABI descriptor structs ([`abi`]) without copying scalar data. The
//! execution engine ([`exec`]) drives externally compiled wrapper functions
//! over input chunks, row by row or batch by batch, and serializes their
//! results back into Arrow arrays through the recursive [`ColumnWriter`].
//!
//! Nothing here assumes the compiled wrapper is memory-safe. The guarantee
//! is narrower: values matching the declared signature are marshalled
//! faithfully in both directions, and every invalid row a wrapper might see
//! carries a zeroed descriptor, never a dangling pointer.

pub mod abi;
mod bridge;
mod error;
mod exec;
mod logical;
mod validity;
mod writer;

pub use bridge::{BridgeData, ValueBridge};
pub use error::{BridgeError, InvokeError};
pub use exec::{WrapperFn, WrapperMode, execute};
pub use logical::descriptor_to_datatype;
pub use validity::ValidityBitmap;
pub use writer::ColumnWriter;
