//! Scalar function catalog: parsed signatures plus wrapper entry points,
//! shared behind a reader/writer lock.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::datatypes::DataType;
use cfunc_bridge::{WrapperFn, WrapperMode, descriptor_to_datatype, execute};
use cfunc_sig::Signature;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{CallError, RegisterError};

/// Parse a dispatch-mode token, case-insensitively.
pub fn parse_mode(token: &str) -> Result<WrapperMode, RegisterError> {
    match token.trim().to_ascii_lowercase().as_str() {
        "row" => Ok(WrapperMode::Row),
        "batch" => Ok(WrapperMode::Batch),
        other => Err(RegisterError::BadMode(other.into())),
    }
}

/// One registered scalar function. Immutable once registered; invocations
/// share it through an `Arc` and never block registration of others.
#[derive(Debug)]
pub struct ScalarFunction {
    name: String,
    signature: Signature,
    wrapper: WrapperFn,
    return_type: DataType,
    arg_types: Vec<DataType>,
}

impl ScalarFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn mode(&self) -> WrapperMode {
        self.wrapper.mode()
    }

    /// Engine-native return type, materialized at registration.
    pub fn return_type(&self) -> &DataType {
        &self.return_type
    }

    /// Engine-native argument types, in declaration order.
    pub fn arg_types(&self) -> &[DataType] {
        &self.arg_types
    }

    /// Run this function over one chunk of argument columns.
    pub fn invoke(&self, chunk: &[ArrayRef], row_count: usize) -> Result<ArrayRef, CallError> {
        Ok(execute(&self.signature, self.wrapper, chunk, row_count)?)
    }
}

/// Name-keyed catalog of scalar functions.
#[derive(Default)]
pub struct ScalarRegistry {
    functions: RwLock<HashMap<String, Arc<ScalarFunction>>>,
}

impl ScalarRegistry {
    pub fn new() -> ScalarRegistry {
        ScalarRegistry::default()
    }

    /// Register a function under `name`.
    ///
    /// The signature is parsed and its engine types materialized before the
    /// catalog is touched, so a failing registration leaves no trace. A
    /// duplicate name is rejected; unregister the old function first to
    /// replace it.
    pub fn register(
        &self,
        name: &str,
        wrapper: WrapperFn,
        return_token: &str,
        args_csv: Option<&str>,
    ) -> Result<Arc<ScalarFunction>, RegisterError> {
        let signature = Signature::parse(return_token, args_csv)?;
        let return_type = descriptor_to_datatype(signature.return_desc());
        let arg_types = signature.args().iter().map(descriptor_to_datatype).collect();

        let function = Arc::new(ScalarFunction {
            name: name.into(),
            signature,
            wrapper,
            return_type,
            arg_types,
        });

        match self.functions.write().entry(name.into()) {
            Entry::Occupied(_) => return Err(RegisterError::Duplicate(name.into())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&function));
            }
        }
        debug!(
            name,
            mode = ?function.mode(),
            arity = function.arg_types.len(),
            "registered scalar function"
        );
        Ok(function)
    }

    /// Remove `name` from the catalog. Invocations already holding the
    /// function's `Arc` finish undisturbed; the compiled code behind the
    /// wrapper is owned by the session and stays loaded.
    pub fn unregister(&self, name: &str) -> Result<(), RegisterError> {
        match self.functions.write().remove(name) {
            Some(_) => {
                debug!(name, "unregistered scalar function");
                Ok(())
            }
            None => Err(RegisterError::Unknown(name.into())),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<ScalarFunction>> {
        self.functions.read().get(name).cloned()
    }

    /// Look up `name` and run it over one chunk.
    pub fn invoke(
        &self,
        name: &str,
        chunk: &[ArrayRef],
        row_count: usize,
    ) -> Result<ArrayRef, CallError> {
        let function = self
            .get(name)
            .ok_or_else(|| CallError::Unknown(name.into()))?;
        function.invoke(chunk, row_count)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.read().is_empty()
    }
}
