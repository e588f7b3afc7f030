//! Errors for registration, invocation lookup, and the compiler boundary.

use cfunc_bridge::InvokeError;
use cfunc_sig::SigError;
use thiserror::Error;

/// Error registering or unregistering a scalar function. Registration is
/// all-or-nothing: any of these leaves the registry untouched.
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("function '{0}' is already registered")]
    Duplicate(String),

    #[error("no function named '{0}'")]
    Unknown(String),

    #[error("unknown dispatch mode '{0}', expected 'row' or 'batch'")]
    BadMode(String),

    #[error(transparent)]
    Signature(#[from] SigError),
}

/// Error invoking a function by name.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("no function named '{0}'")]
    Unknown(String),

    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

/// Error creating a function through a session's delegate compiler.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("compiler failed: {0}")]
    Build(String),

    #[error("compiled module does not export symbol '{0}'")]
    MissingSymbol(String),

    #[error(transparent)]
    Register(#[from] RegisterError),
}
