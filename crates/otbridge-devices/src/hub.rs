//! The hub: registry of bound callbacks and the routing of payloads.
//!
//! Registration happens once, during setup, through the [`Dispatcher`] trait.
//! After that the hub is only read: [`Hub::deliver`] fans an inbound payload
//! out to every read callback bound to its key, and [`Hub::compose`] folds
//! every write callback bound to a key over an outbound payload.
//!
//! The hub does not serialize deliveries. Callers must not deliver two
//! payloads for the same key concurrently.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use otbridge_core::{Frame, MessageId, MessageKey, MessageType, ProtocolError};

use crate::binding::{Dispatcher, ErrorCallback, ReadCallback, Registration, WriteCallback};
use crate::endpoint::Endpoint;
use crate::error::{ConfigError, Direction};

struct Entry<C> {
    registration: Registration,
    callback: C,
}

/// Registry of read, write and error callbacks keyed by message.
#[derive(Default)]
pub struct Hub {
    readers: HashMap<MessageKey, Vec<Entry<ReadCallback>>>,
    writers: HashMap<MessageKey, Vec<Entry<WriteCallback>>>,
    error_handlers: HashMap<MessageId, Vec<(Arc<dyn Endpoint>, ErrorCallback)>>,
}

/// What happened to an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Payload was delivered to `readers` read callbacks
    Delivered { key: MessageKey, readers: usize },
    /// Slave flagged the data as invalid
    DataInvalid(MessageId),
    /// Slave does not know the message id
    UnknownDataId(MessageId),
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke every read callback bound to `(id, message_type)` with `payload`.
    ///
    /// Returns the number of callbacks invoked.
    pub fn deliver(&self, id: MessageId, message_type: MessageType, payload: u16) -> usize {
        let key = MessageKey::new(id, message_type);
        let Some(entries) = self.readers.get(&key) else {
            tracing::debug!(key = %key, payload = format_args!("0x{:04X}", payload), "no readers bound");
            return 0;
        };

        for entry in entries {
            (entry.callback)(payload);
        }
        tracing::debug!(
            key = %key,
            payload = format_args!("0x{:04X}", payload),
            readers = entries.len(),
            "payload delivered"
        );
        entries.len()
    }

    /// Fold every write callback bound to `(id, message_type)` over `initial`.
    pub fn compose(&self, id: MessageId, message_type: MessageType, initial: u16) -> u16 {
        let key = MessageKey::new(id, message_type);
        let payload = self
            .writers
            .get(&key)
            .map(|entries| {
                entries
                    .iter()
                    .fold(initial, |payload, entry| (entry.callback)(payload))
            })
            .unwrap_or(initial);
        tracing::debug!(
            key = %key,
            initial = format_args!("0x{:04X}", initial),
            payload = format_args!("0x{:04X}", payload),
            "payload composed"
        );
        payload
    }

    /// Route a response frame.
    ///
    /// Acknowledgements are delivered to the request type they answer, so a
    /// `READ_ACK` reaches endpoints bound to `READ_DATA`. Invalid-data and
    /// unknown-id responses are reported, not delivered.
    pub fn on_frame(&self, frame: Frame) -> Result<FrameOutcome, ProtocolError> {
        let message_type = frame.message_type()?;
        match message_type {
            MessageType::DataInvalid => {
                tracing::warn!(
                    id = frame.id.0,
                    data = format_args!("0x{:04X}", frame.data),
                    "Data invalid"
                );
                Ok(FrameOutcome::DataInvalid(frame.id))
            }
            MessageType::UnknownDataId => {
                tracing::warn!(id = frame.id.0, "Unknown data id");
                Ok(FrameOutcome::UnknownDataId(frame.id))
            }
            other => {
                let target = other.request_type().unwrap_or(other);
                tracing::debug!(frame = %frame, "frame received");
                let readers = self.deliver(frame.id, target, frame.data);
                Ok(FrameOutcome::Delivered {
                    key: MessageKey::new(frame.id, target),
                    readers,
                })
            }
        }
    }

    /// Tell every endpoint bound to message `id` that its exchange failed.
    ///
    /// Returns the number of endpoints notified.
    pub fn notify_error(&self, id: MessageId) -> usize {
        let handlers = self.error_handlers.get(&id).map(Vec::as_slice).unwrap_or(&[]);
        for (_, callback) in handlers {
            callback();
        }
        tracing::debug!(id = id.0, endpoints = handlers.len(), "exchange error reported");
        handlers.len()
    }

    /// Every key with at least one registration, in key order.
    pub fn keys(&self) -> Vec<MessageKey> {
        self.readers
            .keys()
            .chain(self.writers.keys())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn read_registrations(&self, key: &MessageKey) -> Vec<&Registration> {
        registrations(&self.readers, key)
    }

    pub fn write_registrations(&self, key: &MessageKey) -> Vec<&Registration> {
        registrations(&self.writers, key)
    }

    /// Number of distinct endpoints bound through this hub.
    pub fn endpoint_count(&self) -> usize {
        self.readers
            .values()
            .flatten()
            .map(|e| e.registration.owner.as_str())
            .chain(
                self.writers
                    .values()
                    .flatten()
                    .map(|e| e.registration.owner.as_str()),
            )
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Reject any two fields bound to the same key and direction that share bits.
    pub fn check_overlaps(&self) -> Result<(), ConfigError> {
        for key in self.keys() {
            for (direction, fields) in [
                (Direction::Read, self.read_registrations(&key)),
                (Direction::Write, self.write_registrations(&key)),
            ] {
                for (i, first) in fields.iter().enumerate() {
                    if let Some(second) = fields[i + 1..]
                        .iter()
                        .find(|other| first.field.overlaps(&other.field))
                    {
                        tracing::warn!(
                            key = %key,
                            first = %first.owner,
                            second = %second.owner,
                            "{} fields overlap",
                            direction
                        );
                        return Err(ConfigError::Overlap {
                            key,
                            direction,
                            first: first.owner.clone(),
                            first_field: first.field.to_string(),
                            second: second.owner.clone(),
                            second_field: second.field.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Log the registry at info level.
    pub fn dump_config(&self) {
        tracing::info!("OpenTherm hub:");
        tracing::info!("  Total number of endpoints: {}", self.endpoint_count());
        for key in self.keys() {
            tracing::info!(
                "  Message Type: 0x{:02X}, Message ID: 0x{:02X}",
                key.message_type.bits(),
                key.id.0
            );
            for registration in self.read_registrations(&key) {
                tracing::info!(
                    "    {}: read callback {}",
                    registration.owner,
                    registration.field
                );
            }
            for registration in self.write_registrations(&key) {
                tracing::info!(
                    "    {}: write callback {}",
                    registration.owner,
                    registration.field
                );
            }
        }
    }
}

impl Dispatcher for Hub {
    fn register_read(&mut self, key: MessageKey, registration: Registration, callback: ReadCallback) {
        tracing::debug!(key = %key, owner = %registration.owner, field = %registration.field, "read callback registered");
        self.readers.entry(key).or_default().push(Entry {
            registration,
            callback,
        });
    }

    fn register_write(
        &mut self,
        key: MessageKey,
        registration: Registration,
        callback: WriteCallback,
    ) {
        tracing::debug!(key = %key, owner = %registration.owner, field = %registration.field, "write callback registered");
        self.writers.entry(key).or_default().push(Entry {
            registration,
            callback,
        });
    }

    fn register_error(
        &mut self,
        id: MessageId,
        endpoint: &Arc<dyn Endpoint>,
        callback: ErrorCallback,
    ) {
        let handlers = self.error_handlers.entry(id).or_default();
        // One endpoint may bind several keys on the same id; notify it once.
        if !handlers
            .iter()
            .any(|(existing, _)| Arc::ptr_eq(existing, endpoint))
        {
            handlers.push((endpoint.clone(), callback));
        }
    }
}

fn registrations<'a, C>(
    map: &'a HashMap<MessageKey, Vec<Entry<C>>>,
    key: &MessageKey,
) -> Vec<&'a Registration> {
    map.get(key)
        .map(|entries| entries.iter().map(|e| &e.registration).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::bind;
    use crate::endpoint::{BinarySensor, Number, Sensor, Switch};
    use otbridge_core::FieldSpec;
    use std::sync::Arc;

    fn key(id: MessageId, message_type: MessageType) -> MessageKey {
        MessageKey::new(id, message_type)
    }

    #[test]
    fn test_deliver_fans_out() {
        let mut hub = Hub::new();
        let status = key(MessageId::STATUS, MessageType::ReadData);
        let flame = Arc::new(BinarySensor::new("flame"));
        let fault = Arc::new(BinarySensor::new("fault"));
        bind(&mut hub, flame.clone(), status, Some(FieldSpec::Flag { bit: 3 }), None).unwrap();
        bind(&mut hub, fault.clone(), status, Some(FieldSpec::Flag { bit: 0 }), None).unwrap();

        assert_eq!(hub.deliver(MessageId::STATUS, MessageType::ReadData, 0x0008), 2);
        assert_eq!(flame.state(), Some(true));
        assert_eq!(fault.state(), Some(false));

        // Different type, nothing bound
        assert_eq!(hub.deliver(MessageId::STATUS, MessageType::WriteData, 0xFFFF), 0);
        assert_eq!(fault.state(), Some(false));
    }

    #[test]
    fn test_compose_folds_in_registration_order() {
        let mut hub = Hub::new();
        let k = key(MessageId(100), MessageType::WriteData);
        let first = Arc::new(Number::new("first", 0.0, 255.0));
        let second = Arc::new(Number::new("second", 0.0, 255.0));
        // Both write the low byte; the later registration wins
        bind(&mut hub, first.clone(), k, None, Some(FieldSpec::UnsignedByte { offset: 0 })).unwrap();
        bind(&mut hub, second.clone(), k, None, Some(FieldSpec::UnsignedByte { offset: 0 })).unwrap();
        first.control(1.0).unwrap();
        second.control(2.0).unwrap();
        assert_eq!(hub.compose(MessageId(100), MessageType::WriteData, 0xAB00), 0xAB02);
        assert!(matches!(
            hub.check_overlaps(),
            Err(ConfigError::Overlap {
                direction: Direction::Write,
                ..
            })
        ));
    }

    #[test]
    fn test_compose_without_writers_returns_initial() {
        let hub = Hub::new();
        assert_eq!(hub.compose(MessageId(1), MessageType::WriteData, 0x1234), 0x1234);
    }

    #[test]
    fn test_on_frame_routes_ack_to_request_key() {
        let mut hub = Hub::new();
        let feed = Arc::new(Sensor::new("feed_temp"));
        bind(
            &mut hub,
            feed.clone(),
            key(MessageId::FEED_TEMP, MessageType::ReadData),
            Some(FieldSpec::FixedPoint8_8),
            None,
        )
        .unwrap();

        // READ_ACK with parity bit set
        let outcome = hub.on_frame(Frame::from_raw(0xC019_2A80)).unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::Delivered {
                key: key(MessageId::FEED_TEMP, MessageType::ReadData),
                readers: 1
            }
        );
        assert_eq!(feed.state(), Some(42.5));

        let invalid = hub
            .on_frame(Frame::new(MessageType::DataInvalid, MessageId::FEED_TEMP, 0))
            .unwrap();
        assert_eq!(invalid, FrameOutcome::DataInvalid(MessageId::FEED_TEMP));
        assert_eq!(feed.state(), Some(42.5));

        assert_eq!(
            hub.on_frame(Frame::from_raw(0x3019_0000)),
            Err(ProtocolError::ReservedMessageType(0x30))
        );
    }

    #[test]
    fn test_notify_error_reaches_every_type_once() {
        let mut hub = Hub::new();
        let sensor = Arc::new(Sensor::new("dhw_temp"));
        let switch = Arc::new(Switch::new("dhw_enable"));
        bind(
            &mut hub,
            sensor.clone(),
            key(MessageId::DHW_TEMP, MessageType::ReadData),
            Some(FieldSpec::FixedPoint8_8),
            None,
        )
        .unwrap();
        bind(
            &mut hub,
            sensor.clone(),
            key(MessageId::DHW_TEMP, MessageType::WriteData),
            None,
            Some(FieldSpec::FixedPoint8_8),
        )
        .unwrap();
        bind(
            &mut hub,
            switch.clone(),
            key(MessageId::DHW_TEMP, MessageType::WriteData),
            None,
            Some(FieldSpec::Flag { bit: 0 }),
        )
        .unwrap();

        hub.deliver(MessageId::DHW_TEMP, MessageType::ReadData, 0x3C00);
        switch.turn_on();
        assert_eq!(hub.notify_error(MessageId::DHW_TEMP), 2);
        assert_eq!(sensor.state(), None);
        assert_eq!(switch.state(), Some(true));
        assert_eq!(hub.notify_error(MessageId::STATUS), 0);
    }

    #[test]
    fn test_notify_error_tells_same_named_endpoints_apart() {
        let mut hub = Hub::new();
        let first = Arc::new(Sensor::new("outside"));
        let second = Arc::new(Sensor::new("outside"));
        for sensor in [&first, &second] {
            bind(
                &mut hub,
                sensor.clone(),
                key(MessageId::OUTSIDE_TEMP, MessageType::ReadData),
                Some(FieldSpec::FixedPoint8_8),
                None,
            )
            .unwrap();
        }

        hub.deliver(MessageId::OUTSIDE_TEMP, MessageType::ReadData, 0x0A00);
        assert_eq!(first.state(), Some(10.0));
        assert_eq!(second.state(), Some(10.0));

        assert_eq!(hub.notify_error(MessageId::OUTSIDE_TEMP), 2);
        assert_eq!(first.state(), None);
        assert_eq!(second.state(), None);
    }

    #[test]
    fn test_keys_and_counts() {
        let mut hub = Hub::new();
        let a = Arc::new(Switch::new("a"));
        bind(
            &mut hub,
            a.clone(),
            key(MessageId::STATUS, MessageType::ReadData),
            Some(FieldSpec::Flag { bit: 1 }),
            Some(FieldSpec::Flag { bit: 9 }),
        )
        .unwrap();
        bind(
            &mut hub,
            Arc::new(Sensor::new("b")),
            key(MessageId::ROOM_TEMP, MessageType::ReadData),
            Some(FieldSpec::FixedPoint8_8),
            None,
        )
        .unwrap();
        assert_eq!(
            hub.keys(),
            vec![
                key(MessageId::STATUS, MessageType::ReadData),
                key(MessageId::ROOM_TEMP, MessageType::ReadData)
            ]
        );
        assert_eq!(hub.endpoint_count(), 2);
        assert!(hub.check_overlaps().is_ok());
        hub.dump_config();
    }
}
