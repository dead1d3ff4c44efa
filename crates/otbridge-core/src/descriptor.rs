//! Field descriptors as written in configuration.
//!
//! Three surface forms collapse to one [`FieldSpec`]:
//!
//! 1. a named alias: `"flag7_hb"`, `"u8_lb"`, `"q7_8"`, ...
//! 2. a position-bearing kind with an explicit position:
//!    `{ callback = "flag", position = 12 }`
//! 3. a raw extent: `{ position = 4, length = 3 }`, always a masked field
//!
//! Forms are tried in that order and the first one whose shape matches wins.
//! Shape is checked when the descriptor is deserialized; alias lookup and
//! extent validation happen in [`FieldDescriptor::resolve`].

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DescriptorError, FieldError};
use crate::field::FieldSpec;

/// Every accepted alias and the field it names.
pub const ALIAS_TABLE: &[(&str, FieldSpec)] = &[
    ("flag0", FieldSpec::Flag { bit: 0 }),
    ("flag1", FieldSpec::Flag { bit: 1 }),
    ("flag2", FieldSpec::Flag { bit: 2 }),
    ("flag3", FieldSpec::Flag { bit: 3 }),
    ("flag4", FieldSpec::Flag { bit: 4 }),
    ("flag5", FieldSpec::Flag { bit: 5 }),
    ("flag6", FieldSpec::Flag { bit: 6 }),
    ("flag7", FieldSpec::Flag { bit: 7 }),
    ("flag8", FieldSpec::Flag { bit: 8 }),
    ("flag9", FieldSpec::Flag { bit: 9 }),
    ("flag10", FieldSpec::Flag { bit: 10 }),
    ("flag11", FieldSpec::Flag { bit: 11 }),
    ("flag12", FieldSpec::Flag { bit: 12 }),
    ("flag13", FieldSpec::Flag { bit: 13 }),
    ("flag14", FieldSpec::Flag { bit: 14 }),
    ("flag15", FieldSpec::Flag { bit: 15 }),
    ("flag0_lb", FieldSpec::Flag { bit: 0 }),
    ("flag1_lb", FieldSpec::Flag { bit: 1 }),
    ("flag2_lb", FieldSpec::Flag { bit: 2 }),
    ("flag3_lb", FieldSpec::Flag { bit: 3 }),
    ("flag4_lb", FieldSpec::Flag { bit: 4 }),
    ("flag5_lb", FieldSpec::Flag { bit: 5 }),
    ("flag6_lb", FieldSpec::Flag { bit: 6 }),
    ("flag7_lb", FieldSpec::Flag { bit: 7 }),
    ("flag0_hb", FieldSpec::Flag { bit: 8 }),
    ("flag1_hb", FieldSpec::Flag { bit: 9 }),
    ("flag2_hb", FieldSpec::Flag { bit: 10 }),
    ("flag3_hb", FieldSpec::Flag { bit: 11 }),
    ("flag4_hb", FieldSpec::Flag { bit: 12 }),
    ("flag5_hb", FieldSpec::Flag { bit: 13 }),
    ("flag6_hb", FieldSpec::Flag { bit: 14 }),
    ("flag7_hb", FieldSpec::Flag { bit: 15 }),
    ("s8_lb", FieldSpec::SignedByte { offset: 0 }),
    ("s8_hb", FieldSpec::SignedByte { offset: 8 }),
    ("u8_lb", FieldSpec::UnsignedByte { offset: 0 }),
    ("u8_hb", FieldSpec::UnsignedByte { offset: 8 }),
    ("s16", FieldSpec::Signed16),
    ("u16", FieldSpec::Unsigned16),
    ("q7_8", FieldSpec::FixedPoint8_8),
];

static ALIASES: Lazy<HashMap<&'static str, FieldSpec>> =
    Lazy::new(|| ALIAS_TABLE.iter().copied().collect());

/// Look up an alias (case-insensitive).
pub fn lookup_alias(name: &str) -> Option<FieldSpec> {
    ALIASES.get(name.to_ascii_lowercase().as_str()).copied()
}

/// Position-bearing field kinds of the second authoring form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionedKind {
    Flag,
    S8,
    U8,
}

impl PositionedKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::S8 => "s8",
            Self::U8 => "u8",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "flag" => Some(Self::Flag),
            "s8" => Some(Self::S8),
            "u8" => Some(Self::U8),
            _ => None,
        }
    }
}

/// A field descriptor in one of the three authoring forms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "Value")]
pub enum FieldDescriptor {
    /// Named alias, stored lower-cased
    Alias(String),
    /// Kind plus explicit position
    Positioned { kind: PositionedKind, position: i64 },
    /// Raw `(position, length)` extent
    Mask { position: i64, length: i64 },
}

impl FieldDescriptor {
    pub fn alias(name: impl Into<String>) -> Self {
        Self::Alias(name.into().to_ascii_lowercase())
    }

    /// Canonicalize to a validated [`FieldSpec`].
    pub fn resolve(&self) -> Result<FieldSpec, DescriptorError> {
        let resolved = match self {
            Self::Alias(name) => {
                lookup_alias(name).ok_or_else(|| DescriptorError::UnknownAlias(name.clone()))?
            }
            Self::Positioned { kind, position } => {
                let spec = match kind {
                    PositionedKind::Flag => FieldSpec::flag(*position),
                    PositionedKind::S8 => FieldSpec::signed_byte(*position),
                    PositionedKind::U8 => FieldSpec::unsigned_byte(*position),
                };
                spec.map_err(|source| self.field_error(source))?
            }
            Self::Mask { position, length } => {
                FieldSpec::masked(*position, *length).map_err(|source| self.field_error(source))?
            }
        };
        tracing::trace!(descriptor = %self, field = %resolved, "resolved field descriptor");
        Ok(resolved)
    }

    /// Parse a descriptor from a loosely-typed value, trying each form in order.
    pub fn from_value(value: &Value) -> Result<Self, DescriptorError> {
        if let Value::String(name) = value {
            return Ok(Self::alias(name.as_str()));
        }

        if let Value::Object(map) = value {
            if map.len() == 2 {
                if let (Some(Value::String(callback)), Some(position)) =
                    (map.get("callback"), map.get("position").and_then(Value::as_i64))
                {
                    let kind = PositionedKind::parse(callback)
                        .ok_or_else(|| DescriptorError::UnknownKind(callback.clone()))?;
                    return Ok(Self::Positioned { kind, position });
                }
                if let (Some(position), Some(length)) = (
                    map.get("position").and_then(Value::as_i64),
                    map.get("length").and_then(Value::as_i64),
                ) {
                    return Ok(Self::Mask { position, length });
                }
            }
        }

        Err(DescriptorError::InvalidShape(value.to_string()))
    }

    fn field_error(&self, source: FieldError) -> DescriptorError {
        DescriptorError::Field {
            descriptor: self.to_string(),
            source,
        }
    }
}

impl TryFrom<Value> for FieldDescriptor {
    type Error = DescriptorError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(&value)
    }
}

impl From<FieldSpec> for FieldDescriptor {
    fn from(spec: FieldSpec) -> Self {
        match spec {
            FieldSpec::Flag { bit } => Self::Positioned {
                kind: PositionedKind::Flag,
                position: bit.into(),
            },
            FieldSpec::SignedByte { offset } => Self::Positioned {
                kind: PositionedKind::S8,
                position: offset.into(),
            },
            FieldSpec::UnsignedByte { offset } => Self::Positioned {
                kind: PositionedKind::U8,
                position: offset.into(),
            },
            FieldSpec::Signed16 => Self::alias("s16"),
            FieldSpec::Unsigned16 => Self::alias("u16"),
            FieldSpec::FixedPoint8_8 => Self::alias("q7_8"),
            FieldSpec::Masked { position, length } => Self::Mask {
                position: position.into(),
                length: length.into(),
            },
        }
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alias(name) => write!(f, "'{}'", name),
            Self::Positioned { kind, position } => {
                write!(f, "{{callback: {}, position: {}}}", kind.name(), position)
            }
            Self::Mask { position, length } => {
                write!(f, "{{position: {}, length: {}}}", position, length)
            }
        }
    }
}
