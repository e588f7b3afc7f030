//! Signature grammar and type descriptors for `cfunc`.
//!
//! This crate is Arrow-independent. It turns textual type tokens such as
//! `list<struct<a:i32;b:varchar>>` into owned [`TypeDescriptor`] trees and
//! whole signatures ([`Signature`]) into per-argument descriptor lists, plus
//! the flattened [`StructMeta`]/[`MapMeta`]/[`UnionMeta`] tables the runtime
//! bridge consults instead of re-reading token text.
//!
//! A second, deliberately restrictive grammar lives in [`fieldspec`]: the
//! flat struct/union/bitfield/enum helper mode only accepts fixed-width
//! scalar fields because its helpers hand out raw memory offsets.

mod descriptor;
mod error;
pub mod fieldspec;
mod parse;
mod signature;
mod tag;

pub use descriptor::{
    CompositeMeta, FieldDescriptor, MapMeta, StructMeta, TypeDescriptor, TypeShape, UnionMeta,
};
pub use error::SigError;
pub use signature::Signature;
pub use tag::TypeTag;
