//! Delegate compiler boundary.
//!
//! Turning C source text into loadable machine code is someone else's job;
//! this crate only specifies the seam. A [`Compiler`] takes assembled source
//! plus the session's staged [`BuildConfig`] and yields a [`CompiledModule`]
//! that can resolve wrapper entry points by name. The session keeps every
//! module it produced alive for its own lifetime, so resolved symbols stay
//! callable even after the function is unregistered.

use std::ffi::c_void;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::CompileError;

/// Build inputs staged on a session before any function is created.
#[derive(Debug, Default, Clone)]
pub struct BuildConfig {
    /// Extra `-I` search directories.
    pub include_dirs: Vec<PathBuf>,
    /// Header names emitted as `#include` lines ahead of the source.
    pub prelude_headers: Vec<String>,
    /// Shared C source prepended to every function body.
    pub source_fragments: Vec<String>,
    /// Libraries to link against.
    pub libraries: Vec<String>,
    /// Verbatim extra compiler flags.
    pub extra_flags: Vec<String>,
}

/// Address of one wrapper entry point inside a compiled module.
///
/// Producers promise the address points at a function matching the row or
/// batch calling convention it is registered under, and that it stays valid
/// for as long as the owning [`CompiledModule`] is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSymbol {
    pub addr: *const c_void,
}

/// One unit of compiled code, kept loaded while the session owns it.
pub trait CompiledModule: Send + Sync {
    /// Resolve an exported symbol, `None` if the module does not define it.
    fn symbol(&self, name: &str) -> Option<RawSymbol>;
}

/// External compiler turning assembled C source into a loaded module.
pub trait Compiler {
    fn compile(
        &self,
        source: &str,
        config: &BuildConfig,
    ) -> Result<Box<dyn CompiledModule>, CompileError>;
}

impl<C: Compiler + ?Sized> Compiler for Arc<C> {
    fn compile(
        &self,
        source: &str,
        config: &BuildConfig,
    ) -> Result<Box<dyn CompiledModule>, CompileError> {
        (**self).compile(source, config)
    }
}
