// peercall core: signaling relay and account backend
//
// The relay forwards call invites and answers between live connections.
// Accounts and call logs are ordinary request/response collaborators that
// the relay never consults.

pub mod account;
pub mod calls;
pub mod registry;
pub mod signaling;
pub mod store;

pub use account::{AuthError, AuthService, NewAccount, PasswordHasher, TokenIssuer, User, UserStore};
pub use calls::{CallLog, CallLogStore, CallLogView};
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, LocalRegistry, RegistryConfig, RegistryError};
pub use signaling::{ClientMessage, Delivery, ServerEvent, Session, SignalingRelay};
pub use store::{MemoryStorage, SledStorage, StorageBackend, StoreError};
