//! Signaling wire protocol: event frames and JSON serialization
//!
//! Every WebSocket text frame carries one event:
//!
//! ```text
//! {"event": "callUser", "data": {"to": "...", "signalData": {...}, "from": "..."}}
//! ```
//!
//! Event names are kept verbatim for compatibility with existing clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A message sent by a client to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Invite: ask the server to ring `to`
    #[serde(rename_all = "camelCase")]
    CallUser {
        /// Target connection identifier
        to: String,
        /// Opaque offer payload, forwarded verbatim
        #[serde(default, skip_serializing_if = "Value::is_null")]
        signal_data: Value,
        /// Originator identifier as claimed by the client
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
    },
    /// Answer: reply to a previously received invite
    AnswerCall {
        /// Target connection identifier (the original caller)
        to: String,
        /// Opaque answer payload, forwarded verbatim
        #[serde(default, skip_serializing_if = "Value::is_null")]
        signal: Value,
    },
}

/// An event pushed by the server to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// First frame on every connection: the identifier peers must use to reach it
    Connected { id: String },
    /// An invite forwarded from another connection. Fields the caller left
    /// out stay absent on the wire.
    #[serde(rename_all = "camelCase")]
    IncomingCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        signal_data: Value,
    },
    /// An answer forwarded from another connection
    CallAnswered {
        #[serde(default, skip_serializing_if = "Value::is_null")]
        signal: Value,
    },
}

/// Signaling protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ClientMessage {
    /// Decode a client text frame
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode to a text frame (used by test clients)
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// The connection this message is addressed to
    pub fn target(&self) -> &str {
        match self {
            ClientMessage::CallUser { to, .. } | ClientMessage::AnswerCall { to, .. } => to,
        }
    }

    /// Wire name of the event
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::CallUser { .. } => "callUser",
            ClientMessage::AnswerCall { .. } => "answerCall",
        }
    }
}

impl ServerEvent {
    /// Encode to a text frame
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Decode a server text frame (used by test clients)
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Wire name of the event
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::IncomingCall { .. } => "incomingCall",
            ServerEvent::CallAnswered { .. } => "callAnswered",
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
