//! Accounts: user records, password hashing, session tokens

pub mod credentials;
pub mod service;
pub mod token;
pub mod users;

pub use credentials::PasswordHasher;
pub use service::{AuthError, AuthService, LoginResult, NewAccount};
pub use token::{Claims, TokenIssuer};
pub use users::{User, UserProfile, UserStore};
