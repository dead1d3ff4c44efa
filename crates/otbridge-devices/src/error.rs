//! Error types for endpoints, bindings and hub configuration.

use otbridge_core::{DescriptorError, FieldError, MessageKey, ProtocolError};
use thiserror::Error;

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Error raised by an endpoint when it is commanded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EndpointError {
    /// Value outside the configured range of a number endpoint
    #[error("value {value} for '{name}' is outside [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: f32,
        min: f32,
        max: f32,
    },

    /// Value that is not a number
    #[error("value for '{0}' is not a number")]
    NotANumber(String),
}

/// Configuration error, fatal to building a hub.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field descriptor of an endpoint could not be resolved
    #[error("endpoint '{endpoint}': invalid {field}: {source}")]
    Field {
        endpoint: String,
        field: &'static str,
        #[source]
        source: DescriptorError,
    },

    /// Field rejected while binding an endpoint
    #[error("endpoint '{endpoint}': {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: FieldError,
    },

    /// Two endpoints share a name
    #[error("duplicate endpoint name '{0}'")]
    DuplicateName(String),

    /// Number endpoint with an empty range
    #[error("endpoint '{endpoint}': min_value {min} is greater than max_value {max}")]
    InvalidRange { endpoint: String, min: f32, max: f32 },

    /// Two fields bound to the same key and direction cover common bits
    #[error("{direction} fields of '{first}' ({first_field}) and '{second}' ({second_field}) overlap on {key}")]
    Overlap {
        key: MessageKey,
        direction: Direction,
        first: String,
        first_field: String,
        second: String,
        second_field: String,
    },

    /// Configuration file could not be parsed
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// Configuration file could not be read
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Direction of a registered field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// Error from the frame transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No frame arrived in time
    #[error("receive timeout after {0}ms")]
    Timeout(u64),

    /// Transport has shut down
    #[error("transport is closed")]
    Closed,
}

/// Top-level device error.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
