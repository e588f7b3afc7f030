//! Session: staged build configuration, the delegate compiler, and ownership
//! of everything it compiled.

use std::ffi::c_void;
use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::ArrayRef;
use cfunc_bridge::abi::{BatchWrapperFn, RowWrapperFn};
use cfunc_bridge::{WrapperFn, WrapperMode};
use parking_lot::RwLock;
use tracing::debug;

use crate::compile::{BuildConfig, CompiledModule, Compiler};
use crate::error::{CallError, CompileError, RegisterError};
use crate::registry::{ScalarFunction, ScalarRegistry, parse_mode};

/// One user session: a registry of scalar functions plus the compiler state
/// needed to add more.
///
/// Compiled modules are owned here and live until the session is dropped.
/// Dropping a function only removes its catalog entry, never the module:
/// other functions from the same compilation unit, and invocations still in
/// flight, keep using the loaded code.
pub struct Session<C> {
    compiler: C,
    config: RwLock<BuildConfig>,
    registry: ScalarRegistry,
    modules: RwLock<Vec<Box<dyn CompiledModule>>>,
}

impl<C: Compiler> Session<C> {
    pub fn new(compiler: C) -> Session<C> {
        Session {
            compiler,
            config: RwLock::new(BuildConfig::default()),
            registry: ScalarRegistry::new(),
            modules: RwLock::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &ScalarRegistry {
        &self.registry
    }

    pub fn add_include_dir(&self, dir: impl Into<PathBuf>) {
        self.config.write().include_dirs.push(dir.into());
    }

    pub fn add_prelude_header(&self, header: impl Into<String>) {
        self.config.write().prelude_headers.push(header.into());
    }

    /// Stage shared C source prepended to every later function body.
    pub fn add_source_fragment(&self, source: impl Into<String>) {
        self.config.write().source_fragments.push(source.into());
    }

    pub fn add_library(&self, library: impl Into<String>) {
        self.config.write().libraries.push(library.into());
    }

    pub fn add_flag(&self, flag: impl Into<String>) {
        self.config.write().extra_flags.push(flag.into());
    }

    /// Snapshot of the currently staged build configuration.
    pub fn config(&self) -> BuildConfig {
        self.config.read().clone()
    }

    /// Number of compiled modules this session keeps loaded.
    pub fn module_count(&self) -> usize {
        self.modules.read().len()
    }

    /// Compile `body` together with the staged source fragments, resolve the
    /// wrapper symbol named `name`, and register it under that name.
    ///
    /// Nothing is registered and no module is retained unless every step
    /// succeeds.
    pub fn create_function(
        &self,
        name: &str,
        return_token: &str,
        args_csv: Option<&str>,
        mode_token: &str,
        body: &str,
    ) -> Result<Arc<ScalarFunction>, CompileError> {
        let mode = parse_mode(mode_token)?;
        let config = self.config.read().clone();

        let mut source = String::new();
        for fragment in &config.source_fragments {
            source.push_str(fragment);
            source.push('\n');
        }
        source.push_str(body);

        let module = self.compiler.compile(&source, &config)?;
        let symbol = module
            .symbol(name)
            .ok_or_else(|| CompileError::MissingSymbol(name.into()))?;

        // The module producer guarantees the symbol matches the calling
        // convention it was declared under.
        let wrapper = match mode {
            WrapperMode::Row => WrapperFn::Row(unsafe {
                std::mem::transmute::<*const c_void, RowWrapperFn>(symbol.addr)
            }),
            WrapperMode::Batch => WrapperFn::Batch(unsafe {
                std::mem::transmute::<*const c_void, BatchWrapperFn>(symbol.addr)
            }),
        };

        let function = self
            .registry
            .register(name, wrapper, return_token, args_csv)?;
        self.modules.write().push(module);
        debug!(name, modules = self.module_count(), "created scalar function");
        Ok(function)
    }

    /// Remove a function from the catalog. Its compiled module stays loaded
    /// for the rest of the session's lifetime.
    pub fn drop_function(&self, name: &str) -> Result<(), RegisterError> {
        self.registry.unregister(name)
    }

    /// Look up a registered function and run it over one chunk.
    pub fn invoke(
        &self,
        name: &str,
        chunk: &[ArrayRef],
        row_count: usize,
    ) -> Result<ArrayRef, CallError> {
        self.registry.invoke(name, chunk, row_count)
    }
}
