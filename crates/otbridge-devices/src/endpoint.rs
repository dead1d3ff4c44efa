//! Endpoints: typed values that bind to payload fields.
//!
//! The hub only needs the [`Endpoint`] capability. Each concrete kind owns its
//! value exclusively; the read callback of its binding is the only writer on
//! the inbound side, and commands from the application (`write_state`,
//! `control`) are the only writers on the outbound side.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use otbridge_core::config::endpoint::DEFAULT_NUMBER_STEP;
use otbridge_core::{FieldValue, MessageType};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::EndpointError;

/// Hook run after an application command changes an endpoint's value.
pub type CommandCallback = Box<dyn Fn() + Send + Sync>;

/// Capability shared by every endpoint kind.
pub trait Endpoint: Send + Sync {
    /// Unique name of this endpoint.
    fn name(&self) -> &str;

    fn kind(&self) -> EndpointKind;

    /// Store a value decoded from an inbound payload.
    fn apply_decoded(&self, value: FieldValue);

    /// Value to encode into an outbound payload, if the endpoint has one.
    fn current_value(&self) -> Option<FieldValue>;

    /// Called when an exchange for this endpoint's message id failed.
    fn on_error(&self) {}

    /// Attach a hook fired after each command. Read-only kinds ignore it.
    fn on_command(&self, _callback: CommandCallback) {}
}

/// Hooks fired after a command, in attach order.
#[derive(Default)]
struct CommandHooks(RwLock<Vec<CommandCallback>>);

impl CommandHooks {
    fn attach(&self, callback: CommandCallback) {
        self.0.write().push(callback);
    }

    fn fire(&self) {
        for callback in self.0.read().iter() {
            callback();
        }
    }
}

impl fmt::Debug for CommandHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandHooks({})", self.0.read().len())
    }
}

/// Endpoint kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    BinarySensor,
    Sensor,
    Switch,
    Number,
}

impl EndpointKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::BinarySensor => "binary_sensor",
            Self::Sensor => "sensor",
            Self::Switch => "switch",
            Self::Number => "number",
        }
    }

    /// Message type used when configuration does not name one.
    ///
    /// Sensors read from the boiler, switches and numbers write to it.
    pub fn default_message_type(self) -> MessageType {
        match self {
            Self::BinarySensor | Self::Sensor => MessageType::ReadData,
            Self::Switch | Self::Number => MessageType::WriteData,
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Last published value and when it was published.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Published<T> {
    pub value: Option<T>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> Default for Published<T> {
    fn default() -> Self {
        Self {
            value: None,
            updated_at: None,
        }
    }
}

impl<T: Copy> Published<T> {
    fn publish(&mut self, value: T) {
        self.value = Some(value);
        self.updated_at = Some(Utc::now());
    }

    fn clear(&mut self) {
        self.value = None;
    }
}

/// Read-only boolean endpoint.
#[derive(Debug)]
pub struct BinarySensor {
    name: String,
    state: RwLock<Published<bool>>,
}

impl BinarySensor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(Published::default()),
        }
    }

    pub fn state(&self) -> Option<bool> {
        self.state.read().value
    }

    pub fn published(&self) -> Published<bool> {
        *self.state.read()
    }
}

impl Endpoint for BinarySensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EndpointKind {
        EndpointKind::BinarySensor
    }

    fn apply_decoded(&self, value: FieldValue) {
        self.state.write().publish(value.as_bool());
    }

    fn current_value(&self) -> Option<FieldValue> {
        self.state().map(FieldValue::Bool)
    }

    fn on_error(&self) {
        self.state.write().clear();
    }
}

/// Read-only numeric endpoint.
#[derive(Debug)]
pub struct Sensor {
    name: String,
    state: RwLock<Published<f32>>,
}

impl Sensor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(Published::default()),
        }
    }

    pub fn state(&self) -> Option<f32> {
        self.state.read().value
    }

    pub fn published(&self) -> Published<f32> {
        *self.state.read()
    }
}

impl Endpoint for Sensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EndpointKind {
        EndpointKind::Sensor
    }

    fn apply_decoded(&self, value: FieldValue) {
        self.state.write().publish(value.as_f32());
    }

    fn current_value(&self) -> Option<FieldValue> {
        self.state().map(FieldValue::Float)
    }

    fn on_error(&self) {
        self.state.write().clear();
    }
}

/// Boolean endpoint that can be commanded.
///
/// A failed exchange leaves the last state in place.
#[derive(Debug)]
pub struct Switch {
    name: String,
    state: RwLock<Published<bool>>,
    commands: CommandHooks,
}

impl Switch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(Published::default()),
            commands: CommandHooks::default(),
        }
    }

    pub fn state(&self) -> Option<bool> {
        self.state.read().value
    }

    pub fn published(&self) -> Published<bool> {
        *self.state.read()
    }

    /// Command a new state; it is written on the next outbound composition.
    pub fn write_state(&self, on: bool) {
        tracing::debug!(endpoint = %self.name, state = on, "switch commanded");
        self.state.write().publish(on);
        self.commands.fire();
    }

    pub fn turn_on(&self) {
        self.write_state(true);
    }

    pub fn turn_off(&self) {
        self.write_state(false);
    }
}

impl Endpoint for Switch {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EndpointKind {
        EndpointKind::Switch
    }

    fn apply_decoded(&self, value: FieldValue) {
        self.state.write().publish(value.as_bool());
    }

    fn current_value(&self) -> Option<FieldValue> {
        self.state().map(FieldValue::Bool)
    }

    fn on_command(&self, callback: CommandCallback) {
        self.commands.attach(callback);
    }
}

/// Numeric endpoint that can be commanded within a range.
#[derive(Debug)]
pub struct Number {
    name: String,
    min_value: f32,
    max_value: f32,
    step: f32,
    state: RwLock<Published<f32>>,
    commands: CommandHooks,
}

impl Number {
    pub fn new(name: impl Into<String>, min_value: f32, max_value: f32) -> Self {
        Self {
            name: name.into(),
            min_value,
            max_value,
            step: DEFAULT_NUMBER_STEP,
            state: RwLock::new(Published::default()),
            commands: CommandHooks::default(),
        }
    }

    pub fn with_step(mut self, step: f32) -> Self {
        self.step = step;
        self
    }

    pub fn min_value(&self) -> f32 {
        self.min_value
    }

    pub fn max_value(&self) -> f32 {
        self.max_value
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    pub fn state(&self) -> Option<f32> {
        self.state.read().value
    }

    pub fn published(&self) -> Published<f32> {
        *self.state.read()
    }

    /// Command a new value; it is written on the next outbound composition.
    pub fn control(&self, value: f32) -> Result<(), EndpointError> {
        if value.is_nan() {
            return Err(EndpointError::NotANumber(self.name.clone()));
        }
        if value < self.min_value || value > self.max_value {
            return Err(EndpointError::OutOfRange {
                name: self.name.clone(),
                value,
                min: self.min_value,
                max: self.max_value,
            });
        }
        tracing::debug!(endpoint = %self.name, value, "number commanded");
        self.state.write().publish(value);
        self.commands.fire();
        Ok(())
    }
}

impl Endpoint for Number {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EndpointKind {
        EndpointKind::Number
    }

    fn apply_decoded(&self, value: FieldValue) {
        self.state.write().publish(value.as_f32());
    }

    fn current_value(&self) -> Option<FieldValue> {
        self.state().map(FieldValue::Float)
    }

    fn on_error(&self) {
        self.state.write().clear();
    }

    fn on_command(&self, callback: CommandCallback) {
        self.commands.attach(callback);
    }
}

/// A concrete endpoint, kept so the application can command it after setup.
#[derive(Debug, Clone)]
pub enum EndpointHandle {
    BinarySensor(Arc<BinarySensor>),
    Sensor(Arc<Sensor>),
    Switch(Arc<Switch>),
    Number(Arc<Number>),
}

impl EndpointHandle {
    /// The endpoint as a shared capability object.
    pub fn endpoint(&self) -> Arc<dyn Endpoint> {
        match self {
            Self::BinarySensor(e) => e.clone(),
            Self::Sensor(e) => e.clone(),
            Self::Switch(e) => e.clone(),
            Self::Number(e) => e.clone(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::BinarySensor(e) => e.name(),
            Self::Sensor(e) => e.name(),
            Self::Switch(e) => e.name(),
            Self::Number(e) => e.name(),
        }
    }

    pub fn kind(&self) -> EndpointKind {
        match self {
            Self::BinarySensor(_) => EndpointKind::BinarySensor,
            Self::Sensor(_) => EndpointKind::Sensor,
            Self::Switch(_) => EndpointKind::Switch,
            Self::Number(_) => EndpointKind::Number,
        }
    }

    /// Set the endpoint's value from the application side.
    ///
    /// Switches take any truthy value; numbers are range-checked; sensors
    /// store the value as if it had been decoded.
    pub fn set(&self, value: FieldValue) -> Result<(), EndpointError> {
        match self {
            Self::Switch(e) => {
                e.write_state(value.as_bool());
                Ok(())
            }
            Self::Number(e) => e.control(value.as_f32()),
            Self::BinarySensor(e) => {
                e.apply_decoded(value);
                Ok(())
            }
            Self::Sensor(e) => {
                e.apply_decoded(value);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_sensor_converts_and_clears() {
        let sensor = BinarySensor::new("flame");
        assert_eq!(sensor.current_value(), None);
        sensor.apply_decoded(FieldValue::Int(4));
        assert_eq!(sensor.state(), Some(true));
        assert!(sensor.published().updated_at.is_some());
        sensor.on_error();
        assert_eq!(sensor.state(), None);
    }

    #[test]
    fn test_sensor_widens_integers() {
        let sensor = Sensor::new("modulation");
        sensor.apply_decoded(FieldValue::Int(-91));
        assert_eq!(sensor.current_value(), Some(FieldValue::Float(-91.0)));
    }

    #[test]
    fn test_switch_keeps_state_on_error() {
        let switch = Switch::new("ch_enable");
        switch.turn_on();
        switch.on_error();
        assert_eq!(switch.state(), Some(true));
        switch.turn_off();
        assert_eq!(switch.current_value(), Some(FieldValue::Bool(false)));
    }

    #[test]
    fn test_number_control_range() {
        let number = Number::new("ch_setpoint", 20.0, 80.0);
        assert_eq!(number.step(), DEFAULT_NUMBER_STEP);
        assert!(number.control(55.5).is_ok());
        assert_eq!(number.state(), Some(55.5));
        assert_eq!(
            number.control(90.0),
            Err(EndpointError::OutOfRange {
                name: "ch_setpoint".to_string(),
                value: 90.0,
                min: 20.0,
                max: 80.0,
            })
        );
        assert!(matches!(
            number.control(f32::NAN),
            Err(EndpointError::NotANumber(_))
        ));
        assert_eq!(number.state(), Some(55.5));
        number.on_error();
        assert_eq!(number.state(), None);
    }

    #[test]
    fn test_commands_fire_hooks() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let fired = Arc::new(AtomicUsize::new(0));
        let switch = Switch::new("ch_enable");
        let number = Number::new("ch_setpoint", 20.0, 80.0);
        for endpoint in [&switch as &dyn Endpoint, &number] {
            let fired = fired.clone();
            endpoint.on_command(Box::new(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            }));
        }

        switch.turn_on();
        number.control(40.0).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        // Rejected commands and inbound values do not fire
        assert!(number.control(90.0).is_err());
        switch.apply_decoded(FieldValue::Bool(false));
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        // Sensors accept and ignore hooks
        Sensor::new("feed").on_command(Box::new(|| {}));
    }

    #[test]
    fn test_default_message_types() {
        assert_eq!(EndpointKind::Sensor.default_message_type(), MessageType::ReadData);
        assert_eq!(EndpointKind::BinarySensor.default_message_type(), MessageType::ReadData);
        assert_eq!(EndpointKind::Switch.default_message_type(), MessageType::WriteData);
        assert_eq!(EndpointKind::Number.default_message_type(), MessageType::WriteData);
    }

    #[test]
    fn test_handle_set() {
        let handle = EndpointHandle::Number(Arc::new(Number::new("dhw", 30.0, 60.0)));
        assert!(handle.set(FieldValue::Int(45)).is_ok());
        assert_eq!(handle.endpoint().current_value(), Some(FieldValue::Float(45.0)));
        assert!(handle.set(FieldValue::Int(10)).is_err());
        assert_eq!(handle.kind(), EndpointKind::Number);
        assert_eq!(handle.name(), "dhw");
    }
}
