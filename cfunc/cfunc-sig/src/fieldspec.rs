//! Restrictive flat field-spec grammar for the struct/union/bitfield/enum
//! helper mode.
//!
//! Helpers generated from these specs hand compiled code raw byte offsets, so
//! field types are limited to fixed-width scalars and pointers: nesting a
//! list/struct/map/union or a varchar/blob here is rejected outright. This is
//! a narrower grammar than the general signature grammar on purpose; the two
//! must not be unified (the general grammar marshals values, this one
//! describes raw memory).

use crate::parse::{is_identifier, split_top_level};
use crate::{SigError, TypeDescriptor, TypeTag};

/// One field of a flat struct or union layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatField {
    pub name: String,
    pub tag: TypeTag,
    pub size: usize,
    pub offset: usize,
}

/// Computed C layout of a flat struct or union spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatLayout {
    pub fields: Vec<FlatField>,
    pub size: usize,
    pub align: usize,
}

/// One member of a bitfield spec, in bit units over the carrier integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitField {
    pub name: String,
    pub bit_offset: usize,
    pub bit_width: usize,
}

/// One member of an enum spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    pub name: String,
    pub value: i64,
}

/// Parse `name:type;...` and lay the fields out with C natural alignment:
/// each offset rounds up to the field's alignment, total size rounds up to
/// the largest alignment seen.
pub fn parse_struct_layout(spec: &str) -> Result<FlatLayout, SigError> {
    let fields = parse_flat_fields(spec)?;
    let mut offset = 0usize;
    let mut align = 1usize;
    let mut laid_out = Vec::with_capacity(fields.len());

    for (name, tag) in fields {
        let size = tag.storage_size();
        let field_align = tag.alignment();
        offset = round_up(offset, field_align);
        align = align.max(field_align);
        laid_out.push(FlatField {
            name,
            tag,
            size,
            offset,
        });
        offset += size;
    }

    Ok(FlatLayout {
        fields: laid_out,
        size: round_up(offset, align),
        align,
    })
}

/// Parse `name:type;...` as an overlay: every field at offset 0, total size
/// and alignment taken from the widest field.
pub fn parse_union_layout(spec: &str) -> Result<FlatLayout, SigError> {
    let fields = parse_flat_fields(spec)?;
    let mut size = 0usize;
    let mut align = 1usize;
    let laid_out = fields
        .into_iter()
        .map(|(name, tag)| {
            size = size.max(tag.storage_size());
            align = align.max(tag.alignment());
            FlatField {
                name,
                tag,
                size: tag.storage_size(),
                offset: 0,
            }
        })
        .collect();

    Ok(FlatLayout {
        fields: laid_out,
        size: round_up(size, align),
        align,
    })
}

/// Parse `name:width;...` bit allocations over an unsigned carrier integer.
/// Widths are packed LSB-first; the sum must fit the carrier.
pub fn parse_bitfield_layout(spec: &str, carrier: TypeTag) -> Result<Vec<BitField>, SigError> {
    let carrier_bits = match carrier {
        TypeTag::U8 | TypeTag::U16 | TypeTag::U32 | TypeTag::U64 => carrier.storage_size() * 8,
        other => return Err(SigError::BadBitfieldCarrier(other.name().into())),
    };

    let mut members = Vec::new();
    let mut bit_offset = 0usize;
    for part in split_top_level(spec.trim(), ';', spec)? {
        let part = part.trim();
        if part.is_empty() {
            return Err(SigError::EmptyFieldList(spec.into()));
        }
        let (name, width_text) = split_name_colon(part)?;
        let bit_width: usize = width_text
            .trim()
            .parse()
            .map_err(|_| SigError::BadArrayLength(width_text.trim().into()))?;
        if bit_width == 0 || bit_offset + bit_width > carrier_bits {
            return Err(SigError::BitfieldOverflow {
                name: name.to_string(),
                carrier_bits,
            });
        }
        check_duplicate(&members, name, |m: &BitField| &m.name)?;
        members.push(BitField {
            name: name.to_string(),
            bit_offset,
            bit_width,
        });
        bit_offset += bit_width;
    }
    Ok(members)
}

/// Parse `name[=value];...` enum members. Unvalued members continue from the
/// previous value plus one, starting at zero.
pub fn parse_enum_members(spec: &str) -> Result<Vec<EnumMember>, SigError> {
    let mut members: Vec<EnumMember> = Vec::new();
    let mut next = 0i64;
    for part in split_top_level(spec.trim(), ';', spec)? {
        let part = part.trim();
        if part.is_empty() {
            return Err(SigError::EmptyFieldList(spec.into()));
        }
        let (name, value) = match part.split_once('=') {
            Some((name, value)) => {
                let value: i64 = value
                    .trim()
                    .parse()
                    .map_err(|_| SigError::BadEnumValue(part.into()))?;
                (name.trim(), value)
            }
            None => (part, next),
        };
        if !is_identifier(name) {
            return Err(SigError::InvalidIdentifier(name.into()));
        }
        check_duplicate(&members, name, |m: &EnumMember| &m.name)?;
        members.push(EnumMember {
            name: name.to_string(),
            value,
        });
        next = value + 1;
    }
    Ok(members)
}

fn parse_flat_fields(spec: &str) -> Result<Vec<(String, TypeTag)>, SigError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(SigError::EmptyFieldList(spec.into()));
    }

    let mut fields: Vec<(String, TypeTag)> = Vec::new();
    for part in split_top_level(spec, ';', spec)? {
        let part = part.trim();
        if part.is_empty() {
            return Err(SigError::EmptyFieldList(spec.into()));
        }
        let (name, type_token) = split_name_colon(part)?;

        // Run the general parser first (void admitted) so every non-flat
        // type, `void` included, fails with the flat-spec error rather than
        // a grammar error.
        let desc = TypeDescriptor::parse(type_token, true)?;
        if !desc.tag().is_fixed_width() {
            return Err(SigError::CompositeFieldInFlatSpec(type_token.trim().into()));
        }
        if fields.iter().any(|(existing, _)| existing == name) {
            return Err(SigError::DuplicateMember(name.into()));
        }
        fields.push((name.to_string(), desc.tag()));
    }
    Ok(fields)
}

fn split_name_colon(part: &str) -> Result<(&str, &str), SigError> {
    let (name, rest) = part
        .split_once(':')
        .ok_or_else(|| SigError::MissingMemberName(part.into()))?;
    let name = name.trim();
    if !is_identifier(name) {
        return Err(SigError::InvalidIdentifier(name.into()));
    }
    Ok((name, rest))
}

fn check_duplicate<T>(members: &[T], name: &str, key: impl Fn(&T) -> &String) -> Result<(), SigError> {
    if members.iter().any(|m| key(m) == name) {
        return Err(SigError::DuplicateMember(name.into()));
    }
    Ok(())
}

fn round_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_layout_applies_natural_alignment() {
        let layout = parse_struct_layout("a:u8;b:i32;c:u16").unwrap();
        assert_eq!(layout.fields[0].offset, 0);
        assert_eq!(layout.fields[1].offset, 4);
        assert_eq!(layout.fields[2].offset, 8);
        assert_eq!(layout.size, 12);
        assert_eq!(layout.align, 4);
    }

    #[test]
    fn union_layout_overlays_fields() {
        let layout = parse_union_layout("a:u8;b:f64").unwrap();
        assert!(layout.fields.iter().all(|f| f.offset == 0));
        assert_eq!(layout.size, 8);
    }

    #[test]
    fn flat_spec_rejects_nested_composites() {
        let err = parse_struct_layout("a:list<i32>").unwrap_err();
        assert_eq!(err, SigError::CompositeFieldInFlatSpec("list<i32>".into()));
        let err = parse_struct_layout("a:varchar").unwrap_err();
        assert_eq!(err, SigError::CompositeFieldInFlatSpec("varchar".into()));
        let err = parse_struct_layout("a:void;b:i32").unwrap_err();
        assert_eq!(err, SigError::CompositeFieldInFlatSpec("void".into()));
    }

    #[test]
    fn bitfields_pack_lsb_first_and_check_carrier() {
        let bits = parse_bitfield_layout("a:3;b:5;c:8", TypeTag::U16).unwrap();
        assert_eq!(bits[1].bit_offset, 3);
        assert_eq!(bits[2].bit_offset, 8);
        assert!(parse_bitfield_layout("a:9", TypeTag::U8).is_err());
        assert!(parse_bitfield_layout("a:1", TypeTag::I32).is_err());
    }

    #[test]
    fn enum_members_auto_increment() {
        let members = parse_enum_members("a;b=10;c").unwrap();
        assert_eq!(members[0].value, 0);
        assert_eq!(members[1].value, 10);
        assert_eq!(members[2].value, 11);
    }
}
