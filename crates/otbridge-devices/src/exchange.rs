//! Request/response exchange over a frame transport.
//!
//! The master side of the channel works one request at a time:
//!
//! ```text
//!  request(key)          process_next()
//! ┌──────────────┐      ┌──────────────────────────────────────────────┐
//! │ RequestQueue │─────▶│ compose ─▶ transmit ─▶ receive ─▶ on_frame   │
//! └──────────────┘      │                          │                   │
//!                       │                          └─ timeout ─▶ notify │
//!                       └──────────────────────────────────────────────┘
//! ```
//!
//! Bit-level transports implement [`FrameTransport`]; the exchanger only sees
//! whole frames.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use otbridge_core::config::env_vars;
use otbridge_core::{Frame, MessageKey, MessageType};
use parking_lot::Mutex;

use crate::binding::Binding;
use crate::endpoint::EndpointKind;
use crate::error::{DeviceResult, TransportError};
use crate::hub::{FrameOutcome, Hub};

/// Frame-level transport to the slave.
#[async_trait]
pub trait FrameTransport: Send + Sync {
    /// Send one request frame.
    async fn transmit(&self, frame: Frame) -> Result<(), TransportError>;

    /// Wait for the next response frame.
    async fn receive(&self) -> Result<Frame, TransportError>;

    /// Receive with a deadline.
    async fn receive_timeout(&self, timeout: Duration) -> Result<Frame, TransportError> {
        tokio::time::timeout(timeout, self.receive())
            .await
            .map_err(|_| TransportError::Timeout(timeout.as_millis() as u64))?
    }
}

/// FIFO of pending requests in which each key appears at most once.
#[derive(Debug, Default)]
pub struct RequestQueue {
    order: VecDeque<MessageKey>,
    pending: HashSet<MessageKey>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `key` unless it is already pending. Returns whether it was added.
    pub fn push(&mut self, key: MessageKey) -> bool {
        if !self.pending.insert(key) {
            tracing::info!(key = %key, "Request not unique, skipping");
            return false;
        }
        self.order.push_back(key);
        tracing::info!(key = %key, queued = self.order.len(), "Enqueued request");
        true
    }

    pub fn pop(&mut self) -> Option<MessageKey> {
        let key = self.order.pop_front()?;
        self.pending.remove(&key);
        Some(key)
    }

    pub fn contains(&self, key: &MessageKey) -> bool {
        self.pending.contains(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Shared handle to a request queue.
///
/// Endpoints hold a clone through their command hooks so that a command
/// queues the exchange which carries it to the slave.
#[derive(Debug, Clone, Default)]
pub struct RequestHandle(Arc<Mutex<RequestQueue>>);

impl RequestHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an exchange for `key`. Returns `false` if it was already pending.
    pub fn request(&self, key: MessageKey) -> bool {
        self.0.lock().push(key)
    }

    pub fn pending(&self) -> usize {
        self.0.lock().len()
    }

    pub fn contains(&self, key: &MessageKey) -> bool {
        self.0.lock().contains(key)
    }

    fn pop(&self) -> Option<MessageKey> {
        self.0.lock().pop()
    }

    /// Wire `binding` to this queue.
    ///
    /// Commanding a writable binding queues its key. A number also gets an
    /// immediate `READ_DATA` request for its id so its value is known before
    /// the first command.
    pub fn link(&self, binding: &Binding) {
        let key = binding.key();
        if binding.write_field().is_some() {
            let requests = self.clone();
            binding.endpoint().on_command(Box::new(move || {
                requests.request(key);
            }));
        }
        if binding.endpoint().kind() == EndpointKind::Number {
            self.request(MessageKey::new(key.id, MessageType::ReadData));
        }
    }
}

/// Result of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The slave answered and the response was routed through the hub
    Completed {
        request: Frame,
        response: Frame,
        outcome: FrameOutcome,
    },
    /// No answer arrived in time; endpoints bound to the id were notified
    TimedOut { request: Frame, notified: usize },
}

/// Drives requests from a queue through a transport and the hub.
pub struct Exchanger<T> {
    hub: Arc<Hub>,
    transport: T,
    requests: RequestHandle,
    timeout: Duration,
}

impl<T: FrameTransport> Exchanger<T> {
    /// Create an exchanger whose receive timeout comes from the environment.
    pub fn new(hub: Arc<Hub>, transport: T) -> Self {
        Self {
            hub,
            transport,
            requests: RequestHandle::new(),
            timeout: env_vars::receive_timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Handle to this exchanger's queue, for wiring endpoints.
    pub fn requests(&self) -> &RequestHandle {
        &self.requests
    }

    /// Queue an exchange for `key`. Returns `false` if it was already pending.
    pub fn request(&self, key: MessageKey) -> bool {
        self.requests.request(key)
    }

    pub fn pending(&self) -> usize {
        self.requests.pending()
    }

    /// Wire every binding so commands queue their exchanges.
    pub fn link_all<'a>(&self, bindings: impl IntoIterator<Item = &'a Binding>) {
        for binding in bindings {
            self.requests.link(binding);
        }
    }

    /// Run the next queued exchange, if any.
    pub async fn process_next(&self) -> DeviceResult<Option<ExchangeOutcome>> {
        let Some(key) = self.requests.pop() else {
            return Ok(None);
        };

        let data = self.hub.compose(key.id, key.message_type, 0);
        let request = Frame::request(key, data);
        tracing::debug!(
            id = key.id.0,
            message_type = %key.message_type,
            payload = format_args!("0x{:04X}", data),
            "Sending request"
        );
        self.transport.transmit(request).await?;

        match self.transport.receive_timeout(self.timeout).await {
            Ok(response) => {
                let outcome = self.hub.on_frame(response)?;
                Ok(Some(ExchangeOutcome::Completed {
                    request,
                    response,
                    outcome,
                }))
            }
            Err(TransportError::Timeout(ms)) => {
                tracing::warn!(
                    id = key.id.0,
                    message_type = %key.message_type,
                    timeout_ms = ms,
                    "Receive timeout"
                );
                let notified = self.hub.notify_error(key.id);
                Ok(Some(ExchangeOutcome::TimedOut { request, notified }))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run exchanges until the queue is empty.
    pub async fn drain(&self) -> DeviceResult<Vec<ExchangeOutcome>> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.process_next().await? {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}
