// User account storage
//
// Layout on the backend:
// - user:<id>     -> JSON-encoded User
// - email:<email> -> user id (uniqueness index, claimed atomically)

use crate::store::{StorageBackend, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const USER_PREFIX: &str = "user:";
const EMAIL_PREFIX: &str = "email:";

/// A registered account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    /// bcrypt hash of the password
    pub password_hash: String,
    /// Path of the uploaded profile image, empty when none was provided
    #[serde(default)]
    pub profile_picture: String,
    /// Ids of other users this user has added. Not reciprocal.
    #[serde(default)]
    pub contacts: Vec<String>,
}

/// Public projection of a user, safe to send to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub profile_picture: String,
    pub contacts: Vec<String>,
}

impl User {
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username,
            email,
            password_hash,
            profile_picture: String::new(),
            contacts: Vec::new(),
        }
    }

    pub fn with_profile_picture(mut self, path: String) -> Self {
        self.profile_picture = path;
        self
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            profile_picture: self.profile_picture.clone(),
            contacts: self.contacts.clone(),
        }
    }
}

#[derive(Clone)]
pub struct UserStore {
    backend: Arc<dyn StorageBackend>,
}

impl UserStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Persist a new user. Fails with `EmailTaken` if the email is already
    /// registered; no second record is written in that case.
    pub fn create(&self, user: User) -> Result<User, StoreError> {
        if user.username.is_empty() {
            return Err(StoreError::MissingField("username"));
        }
        if user.email.is_empty() {
            return Err(StoreError::MissingField("email"));
        }
        if user.password_hash.is_empty() {
            return Err(StoreError::MissingField("password"));
        }

        let email_key = email_key(&user.email);
        let claimed = self
            .backend
            .put_if_absent(email_key.as_bytes(), user.id.as_bytes())
            .map_err(StoreError::Backend)?;
        if !claimed {
            return Err(StoreError::EmailTaken(user.email));
        }

        if let Err(e) = self.write(&user) {
            // Release the email so a retry can succeed
            let _ = self.backend.remove(email_key.as_bytes());
            return Err(e);
        }

        tracing::info!(user_id = %user.id, username = %user.username, "User created");
        Ok(user)
    }

    pub fn get(&self, id: &str) -> Result<Option<User>, StoreError> {
        match self
            .backend
            .get(user_key(id).as_bytes())
            .map_err(StoreError::Backend)?
        {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let id = match self
            .backend
            .get(email_key(email).as_bytes())
            .map_err(StoreError::Backend)?
        {
            Some(id) => String::from_utf8_lossy(&id).into_owned(),
            None => return Ok(None),
        };
        self.get(&id)
    }

    /// All users, sorted by username
    pub fn list(&self) -> Result<Vec<User>, StoreError> {
        let mut users = Vec::new();
        for (_, value) in self
            .backend
            .scan_prefix(USER_PREFIX.as_bytes())
            .map_err(StoreError::Backend)?
        {
            users.push(serde_json::from_slice::<User>(&value)?);
        }
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    pub fn count(&self) -> usize {
        self.backend
            .count_prefix(USER_PREFIX.as_bytes())
            .unwrap_or(0)
    }

    /// Add `contact_id` to the contact list of `user_id`. Adding an existing
    /// contact is a no-op. The contact does not gain a reverse entry.
    pub fn add_contact(&self, user_id: &str, contact_id: &str) -> Result<User, StoreError> {
        if self.get(contact_id)?.is_none() {
            return Err(StoreError::NotFound(contact_id.to_string()));
        }

        let mut user = self
            .get(user_id)?
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))?;

        if !user.contacts.iter().any(|c| c == contact_id) {
            user.contacts.push(contact_id.to_string());
            self.write(&user)?;
        }
        Ok(user)
    }

    pub fn remove_contact(&self, user_id: &str, contact_id: &str) -> Result<User, StoreError> {
        let mut user = self
            .get(user_id)?
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))?;

        let before = user.contacts.len();
        user.contacts.retain(|c| c != contact_id);
        if user.contacts.len() != before {
            self.write(&user)?;
        }
        Ok(user)
    }

    /// Resolve a user's contacts. Contacts whose account no longer exists are skipped.
    pub fn contacts(&self, user_id: &str) -> Result<Vec<User>, StoreError> {
        let user = self
            .get(user_id)?
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))?;

        let mut resolved = Vec::with_capacity(user.contacts.len());
        for contact_id in &user.contacts {
            if let Some(contact) = self.get(contact_id)? {
                resolved.push(contact);
            }
        }
        Ok(resolved)
    }

    fn write(&self, user: &User) -> Result<(), StoreError> {
        let value = serde_json::to_vec(user)?;
        self.backend
            .put(user_key(&user.id).as_bytes(), &value)
            .map_err(StoreError::Backend)?;
        self.backend.flush().map_err(StoreError::Backend)
    }
}

fn user_key(id: &str) -> String {
    format!("{}{}", USER_PREFIX, id)
}

fn email_key(email: &str) -> String {
    format!("{}{}", EMAIL_PREFIX, email)
}
