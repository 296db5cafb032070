//! Call signaling
//!
//! A thin relay for WebRTC offer/answer exchange: two client events
//! (`callUser`, `answerCall`) forwarded to the connection named in the
//! message. No call state is kept.

pub mod protocol;
pub mod relay;
pub mod session;

pub use protocol::{ClientMessage, ProtocolError, ServerEvent};
pub use relay::{Delivery, SignalingRelay};
pub use session::Session;
