//! OTBridge Devices
//!
//! Endpoints and the hub that routes OpenTherm payloads to them.
//!
//! ## Layers
//!
//! - [`endpoint`]: the four endpoint kinds and the [`Endpoint`] capability
//! - [`binding`]: [`bind`] attaches an endpoint's fields to a message key
//! - [`hub`]: the [`Hub`] registry that delivers and composes payloads
//! - [`config`]: builds a hub from a TOML or JSON file
//! - [`exchange`]: drives request/response exchanges over a [`FrameTransport`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use otbridge_devices::HubConfig;
//! use otbridge_core::{MessageId, MessageType};
//!
//! let assembly = HubConfig::load("boiler.toml")?.build()?;
//! assembly.hub.deliver(MessageId::STATUS, MessageType::ReadData, 0x0008);
//! ```

pub mod binding;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod exchange;
pub mod hub;

pub use binding::{bind, Binding, Dispatcher, Registration};
pub use config::{Assembly, EndpointConfig, HubConfig, PlatformConfig};
pub use endpoint::{
    BinarySensor, CommandCallback, Endpoint, EndpointHandle, EndpointKind, Number, Published,
    Sensor, Switch,
};
pub use error::{
    ConfigError, DeviceError, DeviceResult, Direction, EndpointError, TransportError,
};
pub use exchange::{ExchangeOutcome, Exchanger, FrameTransport, RequestHandle, RequestQueue};
pub use hub::{FrameOutcome, Hub};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
