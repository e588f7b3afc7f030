//! Whole-signature parsing: one return token plus a comma-separated
//! argument-type list.

use crate::descriptor::CompositeMeta;
use crate::parse::split_top_level;
use crate::{SigError, TypeDescriptor};

/// Parsed signature of one scalar function.
///
/// Flattened composite metadata for the return type and every argument is
/// computed once here and cached; the execution engine reads the caches on
/// every chunk instead of re-walking descriptor children.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    return_desc: TypeDescriptor,
    args: Vec<TypeDescriptor>,
    return_meta: Option<CompositeMeta>,
    arg_meta: Vec<Option<CompositeMeta>>,
}

impl Signature {
    /// Parse a signature. `args_csv` distinguishes "no argument list
    /// provided" (`None`, an error) from "zero arguments" (`Some("")`).
    ///
    /// Any token failing to parse aborts the whole signature; there is no
    /// partial result.
    pub fn parse(return_token: &str, args_csv: Option<&str>) -> Result<Signature, SigError> {
        let args_csv = args_csv.ok_or(SigError::MissingArgumentList)?;
        let return_desc = TypeDescriptor::parse(return_token, true)?;

        let trimmed = args_csv.trim();
        let args = if trimmed.is_empty() {
            Vec::new()
        } else {
            split_top_level(trimmed, ',', trimmed)?
                .iter()
                .map(|token| TypeDescriptor::parse(token, false))
                .collect::<Result<Vec<_>, _>>()?
        };

        let return_meta = return_desc.composite_meta();
        let arg_meta = args.iter().map(TypeDescriptor::composite_meta).collect();
        Ok(Signature {
            return_desc,
            args,
            return_meta,
            arg_meta,
        })
    }

    pub fn return_desc(&self) -> &TypeDescriptor {
        &self.return_desc
    }

    pub fn args(&self) -> &[TypeDescriptor] {
        &self.args
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    pub fn return_meta(&self) -> Option<&CompositeMeta> {
        self.return_meta.as_ref()
    }

    /// Cached composite metadata of argument `index`, `None` for scalars.
    pub fn arg_meta(&self, index: usize) -> Option<&CompositeMeta> {
        self.arg_meta.get(index).and_then(|m| m.as_ref())
    }
}
