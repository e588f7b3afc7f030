//! Register ad-hoc compiled C functions as scalar operators over Arrow
//! columns.
//!
//! A function is declared with a return type token and a comma-separated
//! argument list in the type grammar of [`cfunc_sig`], compiled through a
//! delegate [`Compiler`], and dispatched over column chunks by the engine in
//! [`cfunc_bridge`], either once per valid row or once per batch. This crate
//! ties those layers together: the [`ScalarRegistry`] catalog, the
//! [`Session`] that stages build configuration and owns compiled modules,
//! and the compiler seam in [`compile`].

pub mod compile;
mod error;
mod registry;
mod session;

pub use cfunc_bridge::{
    BridgeError, ColumnWriter, InvokeError, ValueBridge, WrapperFn, WrapperMode, abi,
    descriptor_to_datatype, execute,
};
pub use cfunc_sig::{SigError, Signature, TypeDescriptor, TypeShape, TypeTag};

pub use compile::{BuildConfig, CompiledModule, Compiler, RawSymbol};
pub use error::{CallError, CompileError, RegisterError};
pub use registry::{ScalarFunction, ScalarRegistry, parse_mode};
pub use session::Session;
