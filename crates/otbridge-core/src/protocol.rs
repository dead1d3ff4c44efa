//! OpenTherm protocol identifiers.
//!
//! Message types, message ids and the [`MessageKey`] pair that identifies one
//! request/response slot on the shared channel. The bit-level transport
//! (framing, parity, timing) is not modelled here; a [`Frame`] is the clean
//! `(type, id, data)` triple a transport hands over.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ProtocolError;

/// Bits of the type byte that carry the message type.
pub const TYPE_MASK: u8 = 0x70;

/// OpenTherm message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MessageType {
    /// Master requests a value
    ReadData = 0x00,
    /// Master writes a value
    WriteData = 0x10,
    /// Master signals invalid data
    InvalidData = 0x20,
    /// Slave acknowledges a read
    ReadAck = 0x40,
    /// Slave acknowledges a write
    WriteAck = 0x50,
    /// Slave reports the data as invalid
    DataInvalid = 0x60,
    /// Slave does not know the message id
    UnknownDataId = 0x70,
}

impl MessageType {
    pub const ALL: [MessageType; 7] = [
        Self::ReadData,
        Self::WriteData,
        Self::InvalidData,
        Self::ReadAck,
        Self::WriteAck,
        Self::DataInvalid,
        Self::UnknownDataId,
    ];

    /// Decode the type bits of a raw type byte. Parity and spare bits are ignored.
    pub fn from_bits(type_byte: u8) -> Result<Self, ProtocolError> {
        match type_byte & TYPE_MASK {
            0x00 => Ok(Self::ReadData),
            0x10 => Ok(Self::WriteData),
            0x20 => Ok(Self::InvalidData),
            0x40 => Ok(Self::ReadAck),
            0x50 => Ok(Self::WriteAck),
            0x60 => Ok(Self::DataInvalid),
            0x70 => Ok(Self::UnknownDataId),
            reserved => Err(ProtocolError::ReservedMessageType(reserved)),
        }
    }

    /// Wire value of this type.
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Canonical upper-case name.
    pub fn name(self) -> &'static str {
        match self {
            Self::ReadData => "READ_DATA",
            Self::WriteData => "WRITE_DATA",
            Self::InvalidData => "INVALID_DATA",
            Self::ReadAck => "READ_ACK",
            Self::WriteAck => "WRITE_ACK",
            Self::DataInvalid => "DATA_INVALID",
            Self::UnknownDataId => "UNKNOWN_DATA_ID",
        }
    }

    /// Whether this type is sent by the slave.
    pub fn is_response(self) -> bool {
        self.bits() & 0x40 != 0
    }

    /// The request type a response answers.
    ///
    /// Acknowledgements map back to the request they acknowledge; requests map
    /// to themselves. `DATA_INVALID` and `UNKNOWN_DATA_ID` answer no specific
    /// request type and return `None`.
    pub fn request_type(self) -> Option<MessageType> {
        match self {
            Self::ReadAck => Some(Self::ReadData),
            Self::WriteAck => Some(Self::WriteData),
            Self::DataInvalid | Self::UnknownDataId => None,
            request => Some(request),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MessageType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|t| t.name() == upper)
            .ok_or_else(|| ProtocolError::UnknownMessageType(s.to_string()))
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// OpenTherm data id.
///
/// Any `u8` is a valid id; the well-known ids have names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MessageId(pub u8);

macro_rules! well_known_ids {
    ($($name:ident = $value:literal),* $(,)?) => {
        impl MessageId {
            $(pub const $name: MessageId = MessageId($value);)*

            /// Table of every named id.
            pub const NAMED: &'static [(&'static str, MessageId)] = &[
                $((stringify!($name), MessageId($value)),)*
            ];
        }
    };
}

well_known_ids! {
    STATUS = 0,
    CH_SETPOINT = 1,
    CONTROLLER_CONFIG = 2,
    DEVICE_CONFIG = 3,
    COMMAND_CODE = 4,
    FAULT_FLAGS = 5,
    REMOTE = 6,
    COOLING_CONTROL = 7,
    CH2_SETPOINT = 8,
    CH_SETPOINT_OVERRIDE = 9,
    TSP_COUNT = 10,
    TSP_COMMAND = 11,
    FHB_SIZE = 12,
    FHB_COMMAND = 13,
    MAX_MODULATION_LEVEL = 14,
    MAX_BOILER_CAPACITY = 15,
    ROOM_SETPOINT = 16,
    MODULATION_LEVEL = 17,
    CH_WATER_PRESSURE = 18,
    DHW_FLOW_RATE = 19,
    DAY_TIME = 20,
    DATE = 21,
    YEAR = 22,
    ROOM_SETPOINT_CH2 = 23,
    ROOM_TEMP = 24,
    FEED_TEMP = 25,
    DHW_TEMP = 26,
    OUTSIDE_TEMP = 27,
    RETURN_WATER_TEMP = 28,
    SOLAR_STORE_TEMP = 29,
    SOLAR_COLLECT_TEMP = 30,
    FEED_TEMP_CH2 = 31,
    DHW2_TEMP = 32,
    EXHAUST_TEMP = 33,
    FAN_SPEED = 35,
    FLAME_CURRENT = 36,
    DHW_BOUNDS = 48,
    CH_BOUNDS = 49,
    OTC_CURVE_BOUNDS = 50,
    DHW_SETPOINT = 56,
    MAX_CH_SETPOINT = 57,
    OTC_CURVE_RATIO = 58,
    HVAC_STATUS = 70,
    REL_VENT_SETPOINT = 71,
    DEVICE_VENT = 74,
    REL_VENTILATION = 77,
    REL_HUMID_EXHAUST = 78,
    SUPPLY_INLET_TEMP = 80,
    SUPPLY_OUTLET_TEMP = 81,
    EXHAUST_INLET_TEMP = 82,
    EXHAUST_OUTLET_TEMP = 83,
    NOM_REL_VENTILATION = 87,
    OVERRIDE_FUNC = 100,
    OEM_DIAGNOSTIC = 115,
    BURNER_STARTS = 116,
    CH_PUMP_STARTS = 117,
    DHW_PUMP_STARTS = 118,
    DHW_BURNER_STARTS = 119,
    BURNER_HOURS = 120,
    CH_PUMP_HOURS = 121,
    DHW_PUMP_HOURS = 122,
    DHW_BURNER_HOURS = 123,
    OT_VERSION_CONTROLLER = 124,
    OT_VERSION_DEVICE = 125,
    VERSION_CONTROLLER = 126,
    VERSION_DEVICE = 127,
}

impl MessageId {
    /// Name of a well-known id.
    pub fn name(self) -> Option<&'static str> {
        Self::NAMED
            .iter()
            .find(|(_, id)| *id == self)
            .map(|(name, _)| *name)
    }

    /// Look up a well-known id by name (case-insensitive).
    pub fn from_name(name: &str) -> Option<MessageId> {
        let upper = name.trim().to_ascii_uppercase();
        Self::NAMED
            .iter()
            .find(|(n, _)| *n == upper)
            .map(|(_, id)| *id)
    }
}

impl From<u8> for MessageId {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:02X})", name, self.0),
            None => write!(f, "0x{:02X}", self.0),
        }
    }
}

/// Accepts a name, a decimal string or a `0x` hex string.
impl FromStr for MessageId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let numeric = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => u8::from_str_radix(hex, 16).ok(),
            None => trimmed.parse::<u8>().ok(),
        };
        numeric
            .map(MessageId)
            .or_else(|| Self::from_name(trimmed))
            .ok_or_else(|| ProtocolError::UnknownMessageId(s.to_string()))
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(u8),
            Name(String),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Number(n) => Ok(MessageId(n)),
            RawId::Name(name) => MessageId::from_name(&name)
                .ok_or_else(|| serde::de::Error::custom(ProtocolError::UnknownMessageId(name))),
        }
    }
}

/// One logical request/response slot on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageKey {
    pub id: MessageId,
    pub message_type: MessageType,
}

impl MessageKey {
    pub fn new(id: impl Into<MessageId>, message_type: MessageType) -> Self {
        Self {
            id: id.into(),
            message_type,
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type=0x{:02X}, id=0x{:02X}",
            self.message_type.bits(),
            self.id.0
        )
    }
}

/// A decoded protocol frame: type byte, data id and 16-bit payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame {
    /// Raw type byte (may carry parity and spare bits)
    pub type_byte: u8,
    pub id: MessageId,
    pub data: u16,
}

impl Frame {
    pub fn new(message_type: MessageType, id: impl Into<MessageId>, data: u16) -> Self {
        Self {
            type_byte: message_type.bits(),
            id: id.into(),
            data,
        }
    }

    /// Frame for the request slot identified by `key`.
    pub fn request(key: MessageKey, data: u16) -> Self {
        Self::new(key.message_type, key.id, data)
    }

    /// Split a raw 32-bit message into its parts.
    pub fn from_raw(raw: u32) -> Self {
        Self {
            type_byte: (raw >> 24) as u8,
            id: MessageId((raw >> 16) as u8),
            data: raw as u16,
        }
    }

    /// Join the parts into a raw 32-bit message.
    pub fn to_raw(self) -> u32 {
        (u32::from(self.type_byte) << 24) | (u32::from(self.id.0) << 16) | u32::from(self.data)
    }

    pub fn message_type(&self) -> Result<MessageType, ProtocolError> {
        MessageType::from_bits(self.type_byte)
    }

    pub fn key(&self) -> Result<MessageKey, ProtocolError> {
        Ok(MessageKey::new(self.id, self.message_type()?))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type=0x{:02X}, id=0x{:02X}, data=0x{:04X}",
            self.type_byte, self.id.0, self.data
        )
    }
}
