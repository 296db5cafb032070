// Per-connection signaling session
//
// One session exists per live transport connection. Inbound frames are fed
// through `handle_text` in arrival order; outbound events are drained from the
// session's queue by the transport's writer task. Dropping the session
// unregisters its identifier.

use super::protocol::ServerEvent;
use super::relay::{Delivery, SignalingRelay};
use crate::registry::ConnectionId;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct Session {
    id: ConnectionId,
    relay: Arc<SignalingRelay>,
    events: Option<mpsc::UnboundedReceiver<ServerEvent>>,
}

impl Session {
    pub(crate) fn new(
        id: ConnectionId,
        relay: Arc<SignalingRelay>,
        events: mpsc::UnboundedReceiver<ServerEvent>,
    ) -> Self {
        Self {
            id,
            relay,
            events: Some(events),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Process one inbound text frame
    pub fn handle_text(&self, text: &str) -> Option<Delivery> {
        self.relay.handle_text(&self.id, text)
    }

    /// Hand the outbound queue to a writer task.
    ///
    /// Returns `None` if it was already taken.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ServerEvent>> {
        self.events.take()
    }

    /// Wait for the next outbound event
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        match self.events.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Pop the next outbound event without waiting
    pub fn try_next_event(&mut self) -> Option<ServerEvent> {
        self.events.as_mut().and_then(|rx| rx.try_recv().ok())
    }

    /// Pop every queued outbound event
    pub fn drain(&mut self) -> Vec<ServerEvent> {
        let mut drained = Vec::new();
        while let Some(event) = self.try_next_event() {
            drained.push(event);
        }
        drained
    }

    /// Disconnect explicitly; equivalent to dropping the session
    pub fn close(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        self.relay.disconnect(&self.id);
    }
}
