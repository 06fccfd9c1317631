//! Typed datastore values and leaf marshalling
//!
//! The back-end speaks in tagged-union values: container and list
//! markers for interior nodes, typed scalars for leaves. This module is
//! the bidirectional bridge between those values and schema-typed leaf
//! text, driven by the leaf's base type.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::error::{NetconfError, Result};
use crate::schema::{BaseType, NodeKind, SchemaNode};

/// Tagged-union value as stored by the back-end
#[derive(Debug, Clone, PartialEq)]
pub enum DsValue {
    /// Container marker; `presence` is taken from the schema
    Container { presence: bool },
    /// List entry marker
    List,
    /// base64 text in canonical form
    Binary(String),
    /// Space-separated list of set bit names
    Bits(String),
    Bool(bool),
    /// Scaled integer representation: the canonical form is
    /// `value / 10^fraction_digits` printed to exactly that many digits
    Decimal64 { value: i64, fraction_digits: u8 },
    Empty,
    Enum(String),
    /// Canonical form; module-qualified when the identity is foreign
    Identityref(String),
    InstanceId(String),
    String(String),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
}

impl DsValue {
    /// Canonical string form of a scalar; `None` for interior markers
    /// and `empty` leaves, which carry no payload
    pub fn canonical(&self) -> Option<String> {
        match self {
            DsValue::Container { .. } | DsValue::List | DsValue::Empty => None,
            DsValue::Binary(s)
            | DsValue::Bits(s)
            | DsValue::Enum(s)
            | DsValue::Identityref(s)
            | DsValue::InstanceId(s)
            | DsValue::String(s) => Some(s.clone()),
            DsValue::Bool(b) => Some(if *b { "true" } else { "false" }.to_string()),
            DsValue::Decimal64 {
                value,
                fraction_digits,
            } => Some(format_decimal64(*value, *fraction_digits)),
            DsValue::Int8(n) => Some(n.to_string()),
            DsValue::Int16(n) => Some(n.to_string()),
            DsValue::Int32(n) => Some(n.to_string()),
            DsValue::Int64(n) => Some(n.to_string()),
            DsValue::Uint8(n) => Some(n.to_string()),
            DsValue::Uint16(n) => Some(n.to_string()),
            DsValue::Uint32(n) => Some(n.to_string()),
            DsValue::Uint64(n) => Some(n.to_string()),
        }
    }

    /// Marker value for an interior schema node
    pub fn marker_for(snode: &SchemaNode) -> DsValue {
        match snode.kind {
            NodeKind::PresenceContainer => DsValue::Container { presence: true },
            NodeKind::List => DsValue::List,
            _ => DsValue::Container { presence: false },
        }
    }

    /// Parse leaf text into a typed value under the leaf's base type
    pub fn from_leaf(snode: &SchemaNode, text: &str) -> Result<DsValue> {
        let base = snode.base.ok_or_else(|| {
            NetconfError::InvalidValue(format!("'{}' has no base type", snode.name))
        })?;

        let bad = |what: &str| {
            NetconfError::InvalidValue(format!("'{}': cannot parse '{text}' as {what}", snode.name))
        };

        Ok(match base {
            BaseType::Binary => {
                BASE64.decode(text).map_err(|_| bad("binary"))?;
                DsValue::Binary(text.to_string())
            }
            BaseType::Bits => {
                // normalize runs of whitespace between bit names
                DsValue::Bits(text.split_whitespace().collect::<Vec<_>>().join(" "))
            }
            BaseType::Boolean => match text {
                "true" => DsValue::Bool(true),
                "false" => DsValue::Bool(false),
                _ => return Err(bad("boolean")),
            },
            BaseType::Decimal64 => {
                let digits = snode.fraction_digits.ok_or_else(|| {
                    NetconfError::InvalidValue(format!(
                        "'{}': decimal64 without fraction-digits",
                        snode.name
                    ))
                })?;
                let value = parse_decimal64(text, digits).ok_or_else(|| bad("decimal64"))?;
                DsValue::Decimal64 {
                    value,
                    fraction_digits: digits,
                }
            }
            BaseType::Empty => {
                if !text.is_empty() {
                    return Err(bad("empty"));
                }
                DsValue::Empty
            }
            BaseType::Enumeration => DsValue::Enum(text.to_string()),
            BaseType::Identityref => DsValue::Identityref(text.to_string()),
            BaseType::InstanceIdentifier => DsValue::InstanceId(text.to_string()),
            // leafref, union and derived types carry the underlying
            // canonical string
            BaseType::String | BaseType::Leafref | BaseType::Union => {
                DsValue::String(text.to_string())
            }
            BaseType::Int8 => DsValue::Int8(text.parse().map_err(|_| bad("int8"))?),
            BaseType::Int16 => DsValue::Int16(text.parse().map_err(|_| bad("int16"))?),
            BaseType::Int32 => DsValue::Int32(text.parse().map_err(|_| bad("int32"))?),
            BaseType::Int64 => DsValue::Int64(text.parse().map_err(|_| bad("int64"))?),
            BaseType::Uint8 => DsValue::Uint8(text.parse().map_err(|_| bad("uint8"))?),
            BaseType::Uint16 => DsValue::Uint16(text.parse().map_err(|_| bad("uint16"))?),
            BaseType::Uint32 => DsValue::Uint32(text.parse().map_err(|_| bad("uint32"))?),
            BaseType::Uint64 => DsValue::Uint64(text.parse().map_err(|_| bad("uint64"))?),
        })
    }

    /// Whether this value is an interior marker (container or list)
    pub fn is_marker(&self) -> bool {
        matches!(self, DsValue::Container { .. } | DsValue::List)
    }
}

/// Print a scaled decimal64 to exactly `digits` fraction digits
fn format_decimal64(value: i64, digits: u8) -> String {
    let scale = 10i64.pow(digits as u32);
    let int = value / scale;
    let frac = (value % scale).unsigned_abs();
    if value < 0 && int == 0 {
        format!("-0.{frac:0width$}", width = digits as usize)
    } else {
        format!("{int}.{frac:0width$}", width = digits as usize)
    }
}

/// Parse decimal64 text into the scaled representation; rejects more
/// fraction digits than the schema allows
fn parse_decimal64(text: &str, digits: u8) -> Option<i64> {
    let (sign, rest) = match text.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = match rest.split_once('.') {
        Some((i, f)) => (i, f),
        None => (rest, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if frac_part.len() > digits as usize {
        return None;
    }
    let int: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().ok()?
    };
    let mut frac: i64 = if frac_part.is_empty() {
        0
    } else {
        frac_part.parse().ok()?
    };
    frac *= 10i64.pow(digits as u32 - frac_part.len() as u32);

    let scale = 10i64.pow(digits as u32);
    int.checked_mul(scale)?
        .checked_add(frac)?
        .checked_mul(sign)
}
