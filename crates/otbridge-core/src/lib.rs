//! Core types for otbridge.
//!
//! This crate holds the pieces with no runtime state: OpenTherm protocol
//! identifiers, the field codec that slices a 16-bit payload word into typed
//! fields, and the field descriptors used to declare those fields in
//! configuration.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod field;
pub mod protocol;

pub use descriptor::{lookup_alias, FieldDescriptor, PositionedKind, ALIAS_TABLE};
pub use error::{DescriptorError, Error, FieldError, ProtocolError, Result};
pub use field::{FieldCodec, FieldSpec, FieldValue, WORD_BITS};
pub use protocol::{Frame, MessageId, MessageKey, MessageType, TYPE_MASK};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::descriptor::FieldDescriptor;
    pub use crate::error::{Error, Result};
    pub use crate::field::{FieldCodec, FieldSpec, FieldValue};
    pub use crate::protocol::{Frame, MessageId, MessageKey, MessageType};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
