//! Signaling relay: forwards invites and answers to live connections
//!
//! The relay performs no validation, transformation, retry or acknowledgment.
//! A forward addressed to an identifier that is not live is dropped and the
//! sender is never told.

use super::protocol::{ClientMessage, ServerEvent};
use super::session::Session;
use crate::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, RegistryError};
use serde_json::Value;
use std::sync::Arc;

/// Outcome of a single forward, visible inside the process only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued on the target connection
    Delivered,
    /// Target not live; nothing was sent anywhere
    Dropped,
}

/// The signaling relay
pub struct SignalingRelay {
    registry: Arc<dyn ConnectionRegistry>,
}

impl SignalingRelay {
    pub fn new(registry: Arc<dyn ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this relay addresses connections through
    pub fn registry(&self) -> &Arc<dyn ConnectionRegistry> {
        &self.registry
    }

    /// Register a new connection and return its session.
    ///
    /// The session's first queued event is `connected {id}`.
    pub fn open_session(self: &Arc<Self>) -> Result<Session, RegistryError> {
        let id = ConnectionId::generate();
        let (handle, events) = ConnectionHandle::channel();

        handle.deliver(ServerEvent::Connected { id: id.to_string() });
        self.registry.register(id.clone(), handle)?;

        tracing::info!(connection = %id, live = self.registry.len(), "Client connected");

        Ok(Session::new(id, self.clone(), events))
    }

    /// Invalidate a connection identifier
    pub fn disconnect(&self, id: &ConnectionId) {
        if self.registry.unregister(id).is_some() {
            tracing::info!(connection = %id, live = self.registry.len(), "Client disconnected");
        }
    }

    /// Forward an invite to `to` as `incomingCall {from, signalData}`
    pub fn invite(&self, to: &ConnectionId, signal_data: Value, from: Option<String>) -> Delivery {
        self.forward(to, ServerEvent::IncomingCall { from, signal_data })
    }

    /// Forward an answer to `to` as `callAnswered {signal}`
    pub fn answer(&self, to: &ConnectionId, signal: Value) -> Delivery {
        self.forward(to, ServerEvent::CallAnswered { signal })
    }

    /// Route a decoded client message
    pub fn dispatch(&self, message: ClientMessage) -> Delivery {
        match message {
            ClientMessage::CallUser {
                to,
                signal_data,
                from,
            } => self.invite(&ConnectionId::from(to), signal_data, from),
            ClientMessage::AnswerCall { to, signal } => {
                self.answer(&ConnectionId::from(to), signal)
            }
        }
    }

    /// Decode and route one inbound text frame from `origin`.
    ///
    /// Malformed frames are discarded; `None` is returned in that case.
    pub fn handle_text(&self, origin: &ConnectionId, text: &str) -> Option<Delivery> {
        match ClientMessage::decode(text) {
            Ok(message) => Some(self.dispatch(message)),
            Err(e) => {
                tracing::debug!(connection = %origin, error = %e, "Discarding malformed frame");
                None
            }
        }
    }

    fn forward(&self, to: &ConnectionId, event: ServerEvent) -> Delivery {
        let name = event.event_name();

        match self.registry.lookup(to) {
            Some(handle) if handle.deliver(event) => {
                tracing::debug!(target_id = %to, event = name, "Forwarded");
                Delivery::Delivered
            }
            _ => {
                tracing::debug!(target_id = %to, event = name, "Target not live, dropped");
                Delivery::Dropped
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
