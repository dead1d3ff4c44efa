//! Error types shared by the otbridge crates.

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A field extent that does not fit in the 16-bit payload word.
///
/// These are configuration errors: they are raised while a field is being
/// declared, never while a payload is being decoded or encoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// Flag bit outside 0..=15
    #[error("flag bit {0} is outside the 16-bit word (expected 0..=15)")]
    BitOutOfRange(i64),

    /// Byte field that does not start within bits 0..=8
    #[error("byte offset {0} is invalid (expected 0..=8 so all eight bits fit in the word)")]
    InvalidByteOffset(i64),

    /// Mask length outside 1..=16
    #[error("mask length {0} is invalid (expected 1..=16)")]
    InvalidLength(i64),

    /// Mask position outside 0..=15
    #[error("mask position {0} is invalid (expected 0..=15)")]
    InvalidPosition(i64),

    /// `position + length` runs past bit 15
    #[error("field at position {position} with length {length} exceeds the 16-bit word")]
    ExtentOverflow { position: i64, length: i64 },
}

/// A field descriptor that matches none of the accepted authoring forms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// String descriptor that is not in the alias table
    #[error("unknown field alias '{0}'")]
    UnknownAlias(String),

    /// Positioned descriptor whose kind is not flag, s8 or u8
    #[error("unknown positioned field kind '{0}' (expected one of flag, s8, u8)")]
    UnknownKind(String),

    /// Value that is neither an alias, a kind+position map nor a position+length map
    #[error("invalid field descriptor {0}")]
    InvalidShape(String),

    /// Descriptor form was recognized but its extent is invalid
    #[error("invalid field descriptor {descriptor}: {source}")]
    Field {
        descriptor: String,
        #[source]
        source: FieldError,
    },
}

/// Errors in protocol-level identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Type byte whose type bits are the reserved value 0x30
    #[error("reserved message type bits 0x{0:02X}")]
    ReservedMessageType(u8),

    /// Message type name not in the enumeration
    #[error("unknown message type '{0}'")]
    UnknownMessageType(String),

    /// Message id name not in the well-known table
    #[error("unknown message id '{0}'")]
    UnknownMessageId(String),
}

/// Top-level core error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
