//! Catalog behavior: registration, duplicates, lookup, unregistration.

use std::ffi::c_void;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int32Array};
use arrow::datatypes::DataType;
use cfunc::{CallError, RegisterError, ScalarRegistry, WrapperFn, WrapperMode, parse_mode};

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

fn int_chunk() -> Vec<ArrayRef> {
    vec![
        Arc::new(Int32Array::from(vec![Some(1), Some(3)])),
        Arc::new(Int32Array::from(vec![Some(2), None])),
    ]
}

#[test]
fn register_materializes_engine_types() {
    let registry = ScalarRegistry::new();
    let function = registry
        .register("add2", WrapperFn::Row(add_i32), "i32", Some("i32,i32"))
        .unwrap();

    assert_eq!(function.name(), "add2");
    assert_eq!(function.mode(), WrapperMode::Row);
    assert_eq!(function.return_type(), &DataType::Int32);
    assert_eq!(function.arg_types(), &[DataType::Int32, DataType::Int32]);
    assert_eq!(registry.names(), vec!["add2".to_string()]);
}

#[test]
fn invoke_by_name_runs_the_wrapper() {
    let registry = ScalarRegistry::new();
    registry
        .register("add2", WrapperFn::Row(add_i32), "i32", Some("i32,i32"))
        .unwrap();

    let result = registry.invoke("add2", &int_chunk(), 2).unwrap();
    let ints = result.as_any().downcast_ref::<Int32Array>().unwrap();
    assert_eq!(ints.value(0), 3);
    assert!(ints.is_null(1));
}

#[test]
fn duplicate_names_are_rejected() {
    let registry = ScalarRegistry::new();
    registry
        .register("add2", WrapperFn::Row(add_i32), "i32", Some("i32,i32"))
        .unwrap();
    let err = registry
        .register("add2", WrapperFn::Row(add_i32), "i64", Some("i64,i64"))
        .unwrap_err();
    assert!(matches!(err, RegisterError::Duplicate(name) if name == "add2"));

    // The original registration is untouched.
    let function = registry.get("add2").unwrap();
    assert_eq!(function.return_type(), &DataType::Int32);
}

#[test]
fn failed_registration_leaves_no_trace() {
    let registry = ScalarRegistry::new();
    let err = registry
        .register("broken", WrapperFn::Row(add_i32), "i32", Some("i32,nope"))
        .unwrap_err();
    assert!(matches!(err, RegisterError::Signature(_)));
    assert!(registry.is_empty());
    assert!(registry.get("broken").is_none());
}

#[test]
fn missing_argument_list_is_an_error() {
    let registry = ScalarRegistry::new();
    let err = registry
        .register("noargs", WrapperFn::Row(add_i32), "i32", None)
        .unwrap_err();
    assert!(matches!(err, RegisterError::Signature(_)));
}

#[test]
fn unregister_removes_only_the_catalog_entry() {
    let registry = ScalarRegistry::new();
    let function = registry
        .register("add2", WrapperFn::Row(add_i32), "i32", Some("i32,i32"))
        .unwrap();

    registry.unregister("add2").unwrap();
    assert!(registry.is_empty());
    let err = registry.invoke("add2", &int_chunk(), 2).unwrap_err();
    assert!(matches!(err, CallError::Unknown(_)));

    // A handle obtained before unregistration keeps working.
    let result = function.invoke(&int_chunk(), 2).unwrap();
    assert_eq!(result.len(), 2);
}

#[test]
fn unregistering_an_unknown_name_fails() {
    let registry = ScalarRegistry::new();
    let err = registry.unregister("ghost").unwrap_err();
    assert!(matches!(err, RegisterError::Unknown(name) if name == "ghost"));
}

#[test]
fn mode_tokens_parse_case_insensitively() {
    assert_eq!(parse_mode("row").unwrap(), WrapperMode::Row);
    assert_eq!(parse_mode("BATCH").unwrap(), WrapperMode::Batch);
    assert_eq!(parse_mode(" Row ").unwrap(), WrapperMode::Row);
    assert!(matches!(
        parse_mode("vectorized"),
        Err(RegisterError::BadMode(_))
    ));
}
