//! Endpoint binding: attach an endpoint's fields to a message key.
//!
//! [`bind`] turns an endpoint plus up to two field specs into a read callback
//! and a write callback and hands them to a [`Dispatcher`]. The dispatcher
//! owns the registry; a binding never unregisters.

use std::fmt;
use std::sync::Arc;

use otbridge_core::{FieldCodec, FieldError, FieldSpec, MessageId, MessageKey};

use crate::endpoint::Endpoint;

/// Decodes an inbound payload into an endpoint.
pub type ReadCallback = Box<dyn Fn(u16) + Send + Sync>;

/// Returns the payload with the endpoint's field written into it.
pub type WriteCallback = Box<dyn Fn(u16) -> u16 + Send + Sync>;

/// Tells an endpoint that an exchange for its message id failed.
pub type ErrorCallback = Box<dyn Fn() + Send + Sync>;

/// Who registered a callback and which field it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub owner: String,
    pub field: FieldSpec,
}

/// Registry side of the binding contract.
pub trait Dispatcher {
    /// Add a read callback for `key`. Callbacks run in registration order.
    fn register_read(&mut self, key: MessageKey, registration: Registration, callback: ReadCallback);

    /// Add a write callback for `key`. Callbacks are folded in registration order.
    fn register_write(
        &mut self,
        key: MessageKey,
        registration: Registration,
        callback: WriteCallback,
    );

    /// Add an error callback for every exchange on message id `id`.
    fn register_error(
        &mut self,
        _id: MessageId,
        _endpoint: &Arc<dyn Endpoint>,
        _callback: ErrorCallback,
    ) {
    }
}

/// The record of one endpoint's registration.
#[derive(Clone)]
pub struct Binding {
    endpoint: Arc<dyn Endpoint>,
    key: MessageKey,
    read: Option<FieldSpec>,
    write: Option<FieldSpec>,
}

impl Binding {
    pub fn endpoint(&self) -> &Arc<dyn Endpoint> {
        &self.endpoint
    }

    pub fn key(&self) -> MessageKey {
        self.key
    }

    pub fn read_field(&self) -> Option<FieldSpec> {
        self.read
    }

    pub fn write_field(&self) -> Option<FieldSpec> {
        self.write
    }

    /// A binding with neither field registers nothing.
    pub fn is_inert(&self) -> bool {
        self.read.is_none() && self.write.is_none()
    }

    /// Whether the endpoint's state is never confirmed by an inbound payload.
    pub fn assumed_state(&self) -> bool {
        self.read.is_none()
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("endpoint", &self.endpoint.name())
            .field("key", &self.key)
            .field("read", &self.read)
            .field("write", &self.write)
            .finish()
    }
}

/// Register `endpoint`'s read and/or write field for `key` with `dispatcher`.
///
/// Both field specs are validated before anything is registered, so a failed
/// bind leaves the dispatcher untouched. A binding with neither field is
/// accepted and has no runtime effect.
pub fn bind<D>(
    dispatcher: &mut D,
    endpoint: Arc<dyn Endpoint>,
    key: MessageKey,
    read: Option<FieldSpec>,
    write: Option<FieldSpec>,
) -> Result<Binding, FieldError>
where
    D: Dispatcher + ?Sized,
{
    let read_codec = read.map(FieldCodec::new).transpose()?;
    let write_codec = write.map(FieldCodec::new).transpose()?;

    if let Some(codec) = read_codec {
        dispatcher.register_read(
            key,
            Registration {
                owner: endpoint.name().to_string(),
                field: codec.spec(),
            },
            read_callback(endpoint.clone(), codec),
        );
    }

    if let Some(codec) = write_codec {
        dispatcher.register_write(
            key,
            Registration {
                owner: endpoint.name().to_string(),
                field: codec.spec(),
            },
            write_callback(endpoint.clone(), codec),
        );
    }

    if read_codec.is_none() && write_codec.is_none() {
        tracing::warn!(
            endpoint = endpoint.name(),
            key = %key,
            "binding has neither a read nor a write field; it will never be used"
        );
    } else {
        let target = endpoint.clone();
        dispatcher.register_error(key.id, &endpoint, Box::new(move || target.on_error()));
    }

    Ok(Binding {
        endpoint,
        key,
        read,
        write,
    })
}

fn read_callback(endpoint: Arc<dyn Endpoint>, codec: FieldCodec) -> ReadCallback {
    Box::new(move |payload| endpoint.apply_decoded(codec.decode(payload)))
}

fn write_callback(endpoint: Arc<dyn Endpoint>, codec: FieldCodec) -> WriteCallback {
    Box::new(move |payload| match endpoint.current_value() {
        Some(value) => codec.encode(payload, value),
        None => {
            tracing::debug!(
                endpoint = endpoint.name(),
                "no value to write; payload left unchanged"
            );
            payload
        }
    })
}
