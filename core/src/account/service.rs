//! Account service: signup, login and token verification
//!
//! Only two failures are attributable to the caller: an unknown email and a
//! wrong password. Everything else (duplicate email included) is reported as
//! an internal failure, matching the HTTP surface built on top of this.

use super::credentials::PasswordHasher;
use super::token::{Claims, TokenIssuer};
use super::users::{User, UserProfile, UserStore};
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User not found")]
    UserNotFound,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Password hashing error: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl AuthError {
    /// Whether the failure is the caller's fault (reported as 400)
    pub fn is_client_error(&self) -> bool {
        matches!(self, AuthError::UserNotFound | AuthError::InvalidCredentials)
    }
}

/// Signup input
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Public path of an already-stored profile image
    pub profile_picture: Option<String>,
}

/// Successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResult {
    pub token: String,
    pub user: UserProfile,
}

pub struct AuthService {
    users: UserStore,
    hasher: PasswordHasher,
    tokens: TokenIssuer,
}

impl AuthService {
    pub fn new(users: UserStore, hasher: PasswordHasher, tokens: TokenIssuer) -> Self {
        Self {
            users,
            hasher,
            tokens,
        }
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    pub fn signup(&self, account: NewAccount) -> Result<User, AuthError> {
        if account.password.is_empty() {
            return Err(StoreError::MissingField("password").into());
        }

        let password_hash = self.hasher.hash(&account.password)?;
        let mut user = User::new(account.username, account.email, password_hash);
        if let Some(path) = account.profile_picture {
            user = user.with_profile_picture(path);
        }

        Ok(self.users.create(user)?)
    }

    pub fn login(&self, email: &str, password: &str) -> Result<LoginResult, AuthError> {
        let user = self
            .users
            .find_by_email(email)?
            .ok_or(AuthError::UserNotFound)?;

        if !self.hasher.verify(password, &user.password_hash)? {
            tracing::debug!(user_id = %user.id, "Login rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.tokens.issue(&user.id, &user.username)?;
        tracing::info!(user_id = %user.id, "User logged in");

        Ok(LoginResult {
            token,
            user: user.profile(),
        })
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        Ok(self.tokens.verify(token)?)
    }
}
