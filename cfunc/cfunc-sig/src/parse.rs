//! Tokenizer and recursive-descent parser for the type grammar.
//!
//! Separators (`,` `;` `:`) only split at angle/bracket depth zero, so
//! composites nested inside struct fields parse without any lookahead. The
//! parser is total: any input string returns `Ok` or a [`SigError`], never a
//! panic.

use crate::descriptor::{FieldDescriptor, TypeDescriptor, TypeShape};
use crate::{SigError, TypeTag};

/// Parse one type token into a descriptor tree.
pub(crate) fn parse_type(token: &str, allow_void: bool) -> Result<TypeDescriptor, SigError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(SigError::EmptyToken);
    }

    // Postfix `[]` / `[N]` binds outermost: `i32[3][]` is a list of arrays.
    if token.ends_with(']') {
        return parse_bracket_suffix(token);
    }

    if let Some(lt) = token.find('<') {
        return parse_angle_composite(token, lt);
    }

    let keyword = token.to_ascii_lowercase();
    if let Some(rest) = keyword.strip_prefix("list_") {
        return parse_list_shorthand(token, rest);
    }

    let tag = TypeTag::from_keyword(&keyword).ok_or_else(|| SigError::UnknownType(token.into()))?;
    if tag == TypeTag::Void && !allow_void {
        return Err(SigError::VoidNotAllowed);
    }
    Ok(TypeDescriptor::new(tag, token, TypeShape::Primitive))
}

/// `T[]` and `T[N]`.
fn parse_bracket_suffix(token: &str) -> Result<TypeDescriptor, SigError> {
    let mut depth = 0usize;
    let mut open = None;
    for (i, c) in token.char_indices().rev() {
        match c {
            ']' => depth += 1,
            '[' => {
                depth -= 1;
                if depth == 0 {
                    open = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let open = open.ok_or_else(|| SigError::Unbalanced(token.into()))?;

    let elem = parse_type(&token[..open], false)?;
    let len_text = token[open + 1..token.len() - 1].trim();

    if len_text.is_empty() {
        return Ok(TypeDescriptor::new(
            TypeTag::List,
            token,
            TypeShape::List(Box::new(elem)),
        ));
    }
    let len: usize = len_text
        .parse()
        .map_err(|_| SigError::BadArrayLength(len_text.into()))?;
    if len == 0 {
        return Err(SigError::ZeroLengthArray(token.into()));
    }
    Ok(TypeDescriptor::new(
        TypeTag::Array,
        token,
        TypeShape::Array(Box::new(elem), len),
    ))
}

/// `list<T>`, `map<K;V>`, `struct<...>`, `union<...>`.
fn parse_angle_composite(token: &str, lt: usize) -> Result<TypeDescriptor, SigError> {
    if !token.ends_with('>') {
        return Err(SigError::TrailingInput(token.into()));
    }
    let keyword = token[..lt].trim().to_ascii_lowercase();
    let body = &token[lt + 1..token.len() - 1];

    match keyword.as_str() {
        "list" => {
            let parts = split_top_level(body, ';', token)?;
            if parts.len() != 1 {
                return Err(SigError::ElementArity {
                    keyword: "list",
                    body: body.into(),
                });
            }
            let elem = parse_type(parts[0], false)?;
            Ok(TypeDescriptor::new(
                TypeTag::List,
                token,
                TypeShape::List(Box::new(elem)),
            ))
        }
        "map" => {
            let parts = split_top_level(body, ';', token)?;
            if parts.len() != 2 {
                return Err(SigError::MapArity(body.into()));
            }
            let key = parse_type(parts[0], false)?;
            let value = parse_type(parts[1], false)?;
            Ok(TypeDescriptor::new(
                TypeTag::Map,
                token,
                TypeShape::Map {
                    key: Box::new(key),
                    value: Box::new(value),
                },
            ))
        }
        "struct" => {
            let fields = parse_field_list(body, token, false)?;
            Ok(TypeDescriptor::new(
                TypeTag::Struct,
                token,
                TypeShape::Struct(fields),
            ))
        }
        "union" => {
            let members = parse_field_list(body, token, true)?;
            Ok(TypeDescriptor::new(
                TypeTag::Union,
                token,
                TypeShape::Union(members),
            ))
        }
        _ => Err(SigError::UnknownType(token[..lt].trim().into())),
    }
}

/// `list_i32` style shorthand, primitive element only.
fn parse_list_shorthand(token: &str, elem_keyword: &str) -> Result<TypeDescriptor, SigError> {
    let tag = match TypeTag::from_keyword(elem_keyword) {
        Some(TypeTag::Void) | None => return Err(SigError::UnknownType(token.into())),
        Some(tag) => tag,
    };
    let elem = TypeDescriptor::new(tag, elem_keyword, TypeShape::Primitive);
    Ok(TypeDescriptor::new(
        TypeTag::List,
        token,
        TypeShape::List(Box::new(elem)),
    ))
}

/// `name:type;name:type;...` bodies of struct and union tokens.
/// Struct field names are optional and default to `f1`, `f2`, ... in order;
/// union member names are mandatory, must be identifiers, and must be unique.
fn parse_field_list(
    body: &str,
    whole: &str,
    names_required: bool,
) -> Result<Vec<FieldDescriptor>, SigError> {
    let parts = split_top_level(body, ';', whole)?;
    let mut fields = Vec::with_capacity(parts.len());

    for (index, part) in parts.iter().enumerate() {
        if part.trim().is_empty() {
            return Err(SigError::EmptyFieldList(whole.into()));
        }
        let pieces = split_top_level(part, ':', whole)?;
        let (name, type_token) = match pieces.as_slice() {
            [ty] => {
                if names_required {
                    return Err(SigError::MissingMemberName(part.trim().into()));
                }
                (format!("f{}", index + 1), *ty)
            }
            [name, ty] => {
                let name = name.trim();
                if !is_identifier(name) {
                    return Err(SigError::InvalidIdentifier(name.into()));
                }
                (name.to_string(), *ty)
            }
            _ => return Err(SigError::TrailingInput(part.trim().into())),
        };
        if names_required && fields.iter().any(|f: &FieldDescriptor| f.name == name) {
            return Err(SigError::DuplicateMember(name));
        }
        fields.push(FieldDescriptor {
            name,
            desc: parse_type(type_token, false)?,
        });
    }

    Ok(fields)
}

/// Split `s` on `sep` at angle/bracket depth zero, validating balance.
/// `whole` is only used to name the offending token in errors.
pub(crate) fn split_top_level<'a>(
    s: &'a str,
    sep: char,
    whole: &str,
) -> Result<Vec<&'a str>, SigError> {
    let mut parts = Vec::new();
    let mut angle = 0i32;
    let mut square = 0i32;
    let mut start = 0usize;

    for (i, c) in s.char_indices() {
        match c {
            '<' => angle += 1,
            '>' => {
                angle -= 1;
                if angle < 0 {
                    return Err(SigError::Unbalanced(whole.into()));
                }
            }
            '[' => square += 1,
            ']' => {
                square -= 1;
                if square < 0 {
                    return Err(SigError::Unbalanced(whole.into()));
                }
            }
            c if c == sep && angle == 0 && square == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    if angle != 0 || square != 0 {
        return Err(SigError::Unbalanced(whole.into()));
    }
    parts.push(&s[start..]);
    Ok(parts)
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_respects_nesting() {
        let parts = split_top_level("i32,struct<a:i32;b:map<varchar;i64>>,f64", ',', "x").unwrap();
        assert_eq!(
            parts,
            vec!["i32", "struct<a:i32;b:map<varchar;i64>>", "f64"]
        );
    }

    #[test]
    fn split_rejects_unbalanced() {
        assert!(split_top_level("list<i32", ',', "list<i32").is_err());
        assert!(split_top_level("i32>", ',', "i32>").is_err());
        assert!(split_top_level("i32]", ',', "i32]").is_err());
    }

    #[test]
    fn identifier_rules() {
        assert!(is_identifier("a"));
        assert!(is_identifier("_f2"));
        assert!(!is_identifier("2f"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a b"));
    }
}
