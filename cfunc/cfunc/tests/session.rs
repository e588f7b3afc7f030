//! Session flow with a stub compiler: staged configuration, function
//! creation, and module ownership across drops.

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use parking_lot::Mutex;

use arrow::array::{Array, ArrayRef, Int32Array};
use cfunc::{
    BuildConfig, CallError, CompileError, CompiledModule, Compiler, RawSymbol, Session,
};

unsafe extern "C" fn add_i32(
    args: *const *const c_void,
    out: *mut c_void,
    out_is_null: *mut bool,
) -> bool {
    unsafe {
        let a = *(*args as *const i32);
        let b = *(*args.add(1) as *const i32);
        *(out as *mut i32) = a + b;
        *out_is_null = false;
    }
    true
}

struct StubModule {
    symbols: HashMap<String, RawSymbol>,
}

// SAFETY: the stored symbols point at `add_i32`, a plain function that is
// valid to call from any thread.
unsafe impl Send for StubModule {}
unsafe impl Sync for StubModule {}

impl CompiledModule for StubModule {
    fn symbol(&self, name: &str) -> Option<RawSymbol> {
        self.symbols.get(name).copied()
    }
}

/// Resolves every known wrapper name and records what it was asked to build.
#[derive(Default)]
struct StubCompiler {
    calls: AtomicUsize,
    last_source: Mutex<String>,
    last_config: Mutex<BuildConfig>,
    fail: bool,
}

impl Compiler for StubCompiler {
    fn compile(
        &self,
        source: &str,
        config: &BuildConfig,
    ) -> Result<Box<dyn CompiledModule>, CompileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_source.lock() = source.to_string();
        *self.last_config.lock() = config.clone();
        if self.fail {
            return Err(CompileError::Build("stub failure".into()));
        }
        let mut symbols = HashMap::new();
        symbols.insert(
            "add2".to_string(),
            RawSymbol {
                addr: add_i32 as *const c_void,
            },
        );
        Ok(Box::new(StubModule { symbols }))
    }
}

fn int_chunk() -> Vec<ArrayRef> {
    vec![
        Arc::new(Int32Array::from(vec![Some(1), Some(3)])),
        Arc::new(Int32Array::from(vec![Some(2), Some(4)])),
    ]
}

fn stub_session() -> (Arc<StubCompiler>, Session<Arc<StubCompiler>>) {
    let compiler = Arc::new(StubCompiler::default());
    let session = Session::new(Arc::clone(&compiler));
    (compiler, session)
}

#[test]
fn create_function_compiles_and_registers() {
    let (_, session) = stub_session();
    session
        .create_function("add2", "i32", Some("i32,i32"), "row", "int add2(...) {}")
        .unwrap();

    let result = session.invoke("add2", &int_chunk(), 2).unwrap();
    let ints = result.as_any().downcast_ref::<Int32Array>().unwrap();
    assert_eq!(ints.value(0), 3);
    assert_eq!(ints.value(1), 7);
    assert_eq!(session.module_count(), 1);
}

#[test]
fn staged_config_reaches_the_delegate() {
    let (compiler, session) = stub_session();
    session.add_include_dir("/opt/vec/include");
    session.add_prelude_header("math.h");
    session.add_source_fragment("static int twice(int x) { return 2 * x; }");
    session.add_library("m");
    session.add_flag("-O2");

    session
        .create_function("add2", "i32", Some("i32,i32"), "row", "/* body */")
        .unwrap();

    let seen = compiler.last_config.lock().clone();
    assert_eq!(seen.include_dirs.len(), 1);
    assert_eq!(seen.prelude_headers, vec!["math.h".to_string()]);
    assert_eq!(seen.libraries, vec!["m".to_string()]);
    assert_eq!(seen.extra_flags, vec!["-O2".to_string()]);
    assert_eq!(compiler.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn source_fragments_are_prepended_to_the_body() {
    let (compiler, session) = stub_session();
    session.add_source_fragment("static int helper(void) { return 1; }");
    session
        .create_function("add2", "i32", Some("i32,i32"), "row", "/* body */")
        .unwrap();

    let source = compiler.last_source.lock().clone();
    assert!(source.starts_with("static int helper(void)"));
    assert!(source.ends_with("/* body */"));
}

#[test]
fn dropping_a_function_keeps_its_module_loaded() {
    let (_, session) = stub_session();
    session
        .create_function("add2", "i32", Some("i32,i32"), "row", "/* body */")
        .unwrap();
    assert_eq!(session.module_count(), 1);

    session.drop_function("add2").unwrap();
    let err = session.invoke("add2", &int_chunk(), 2).unwrap_err();
    assert!(matches!(err, CallError::Unknown(_)));
    // The compiled module survives the drop.
    assert_eq!(session.module_count(), 1);
}

#[test]
fn missing_symbol_registers_nothing() {
    let (_, session) = stub_session();
    let err = session
        .create_function("other", "i32", Some("i32"), "row", "/* body */")
        .unwrap_err();
    assert!(matches!(err, CompileError::MissingSymbol(name) if name == "other"));
    assert!(session.registry().is_empty());
    assert_eq!(session.module_count(), 0);
}

#[test]
fn compiler_failure_registers_nothing() {
    let session = Session::new(Arc::new(StubCompiler {
        fail: true,
        ..StubCompiler::default()
    }));
    let err = session
        .create_function("add2", "i32", Some("i32,i32"), "row", "/* body */")
        .unwrap_err();
    assert!(matches!(err, CompileError::Build(_)));
    assert!(session.registry().is_empty());
    assert_eq!(session.module_count(), 0);
}

#[test]
fn bad_mode_token_fails_before_compiling() {
    let (compiler, session) = stub_session();
    let err = session
        .create_function("add2", "i32", Some("i32,i32"), "chunked", "/* body */")
        .unwrap_err();
    assert!(matches!(err, CompileError::Register(_)));
    assert_eq!(compiler.calls.load(Ordering::SeqCst), 0);
    assert_eq!(session.module_count(), 0);
}

#[test]
fn bad_signature_does_not_retain_the_module() {
    let (_, session) = stub_session();
    let err = session
        .create_function("add2", "i32", Some("i32,nope"), "row", "/* body */")
        .unwrap_err();
    assert!(matches!(err, CompileError::Register(_)));
    assert!(session.registry().is_empty());
    assert_eq!(session.module_count(), 0);
}
