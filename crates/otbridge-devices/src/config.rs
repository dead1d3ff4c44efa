//! Declarative hub configuration.
//!
//! A configuration file lists endpoints and the fields they bind:
//!
//! ```toml
//! reject_overlaps = true
//!
//! [[endpoint]]
//! name = "flame"
//! platform = "binary_sensor"
//! message_id = "STATUS"
//! read_callback = "flag3_lb"
//!
//! [[endpoint]]
//! name = "ch_setpoint"
//! platform = "number"
//! message_id = 1
//! write_callback = "q7_8"
//! min_value = 20.0
//! max_value = 80.0
//! ```
//!
//! TOML and JSON are accepted. [`HubConfig::build`] resolves every field
//! descriptor, creates the endpoints and binds them to a fresh [`Hub`].

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use otbridge_core::config::endpoint::DEFAULT_NUMBER_STEP;
use otbridge_core::{FieldDescriptor, FieldSpec, MessageId, MessageKey, MessageType};
use serde::Deserialize;

use crate::binding::{bind, Binding};
use crate::endpoint::{BinarySensor, EndpointHandle, EndpointKind, Number, Sensor, Switch};
use crate::error::ConfigError;
use crate::exchange::RequestHandle;
use crate::hub::Hub;

/// Root of a configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HubConfig {
    /// Reject fields that overlap on the same key and direction
    #[serde(default)]
    pub reject_overlaps: bool,

    #[serde(default, rename = "endpoint")]
    pub endpoints: Vec<EndpointConfig>,
}

/// One endpoint declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub name: String,

    #[serde(flatten)]
    pub platform: PlatformConfig,

    pub message_id: MessageId,

    /// Defaults to `READ_DATA` for sensors and `WRITE_DATA` for switches and numbers
    #[serde(default)]
    pub message_type: Option<MessageType>,

    #[serde(default)]
    pub read_callback: Option<FieldDescriptor>,

    #[serde(default)]
    pub write_callback: Option<FieldDescriptor>,
}

/// Kind-specific settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "platform", rename_all = "snake_case")]
pub enum PlatformConfig {
    BinarySensor,
    Sensor,
    Switch,
    Number {
        min_value: f32,
        max_value: f32,
        #[serde(default = "default_step")]
        step: f32,
    },
}

fn default_step() -> f32 {
    DEFAULT_NUMBER_STEP
}

impl PlatformConfig {
    pub fn kind(&self) -> EndpointKind {
        match self {
            Self::BinarySensor => EndpointKind::BinarySensor,
            Self::Sensor => EndpointKind::Sensor,
            Self::Switch => EndpointKind::Switch,
            Self::Number { .. } => EndpointKind::Number,
        }
    }
}

impl EndpointConfig {
    pub fn key(&self) -> MessageKey {
        let message_type = self
            .message_type
            .unwrap_or_else(|| self.platform.kind().default_message_type());
        MessageKey::new(self.message_id, message_type)
    }

    /// Resolve the read and write descriptors, naming this endpoint on failure.
    pub fn fields(&self) -> Result<(Option<FieldSpec>, Option<FieldSpec>), ConfigError> {
        let resolve = |descriptor: &Option<FieldDescriptor>, field: &'static str| {
            descriptor
                .as_ref()
                .map(|d| d.resolve())
                .transpose()
                .map_err(|source| ConfigError::Field {
                    endpoint: self.name.clone(),
                    field,
                    source,
                })
        };
        Ok((
            resolve(&self.read_callback, "read_callback")?,
            resolve(&self.write_callback, "write_callback")?,
        ))
    }

    fn create(&self) -> Result<EndpointHandle, ConfigError> {
        Ok(match self.platform {
            PlatformConfig::BinarySensor => {
                EndpointHandle::BinarySensor(Arc::new(BinarySensor::new(&self.name)))
            }
            PlatformConfig::Sensor => EndpointHandle::Sensor(Arc::new(Sensor::new(&self.name))),
            PlatformConfig::Switch => EndpointHandle::Switch(Arc::new(Switch::new(&self.name))),
            PlatformConfig::Number {
                min_value,
                max_value,
                step,
            } => {
                if min_value > max_value {
                    return Err(ConfigError::InvalidRange {
                        endpoint: self.name.clone(),
                        min: min_value,
                        max: max_value,
                    });
                }
                EndpointHandle::Number(Arc::new(
                    Number::new(&self.name, min_value, max_value).with_step(step),
                ))
            }
        })
    }
}

/// A built hub together with the endpoints bound to it.
pub struct Assembly {
    pub hub: Hub,
    pub bindings: Vec<Binding>,
    endpoints: HashMap<String, EndpointHandle>,
}

impl Assembly {
    pub fn endpoint(&self, name: &str) -> Option<&EndpointHandle> {
        self.endpoints.get(name)
    }

    /// Endpoints in declaration order.
    pub fn endpoints(&self) -> impl Iterator<Item = &EndpointHandle> {
        self.bindings
            .iter()
            .filter_map(|b| self.endpoints.get(b.endpoint().name()))
    }

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.endpoint().name() == name)
    }

    /// Wire every binding to `requests` so commands queue their exchanges.
    pub fn link(&self, requests: &RequestHandle) {
        for binding in &self.bindings {
            requests.link(binding);
        }
    }
}

impl fmt::Debug for Assembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assembly")
            .field("keys", &self.hub.keys())
            .field("bindings", &self.bindings)
            .finish()
    }
}

impl HubConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load a `.json` file as JSON and anything else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        tracing::info!(category = "config", "Loading config from: {}", path.display());
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    /// Resolve every field, create the endpoints and bind them to a new hub.
    ///
    /// Nothing is bound unless the whole configuration is valid.
    pub fn build(&self) -> Result<Assembly, ConfigError> {
        let mut planned = Vec::with_capacity(self.endpoints.len());
        let mut endpoints = HashMap::with_capacity(self.endpoints.len());
        for endpoint in &self.endpoints {
            if endpoints.contains_key(&endpoint.name) {
                return Err(ConfigError::DuplicateName(endpoint.name.clone()));
            }
            let (read, write) = endpoint.fields()?;
            let handle = endpoint.create()?;
            planned.push((handle.clone(), endpoint.key(), read, write));
            endpoints.insert(endpoint.name.clone(), handle);
        }

        let mut hub = Hub::new();
        let mut bindings = Vec::with_capacity(planned.len());
        for (handle, key, read, write) in planned {
            let binding = bind(&mut hub, handle.endpoint(), key, read, write).map_err(|source| {
                ConfigError::Bind {
                    endpoint: handle.name().to_string(),
                    source,
                }
            })?;
            bindings.push(binding);
        }

        if self.reject_overlaps {
            hub.check_overlaps()?;
        }

        tracing::info!(
            category = "config",
            endpoints = bindings.len(),
            keys = hub.keys().len(),
            "hub configured"
        );

        Ok(Assembly {
            hub,
            bindings,
            endpoints,
        })
    }
}
