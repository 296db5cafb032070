// Call log persistence
//
// Records are write-once: a call log is created with status "ongoing" and is
// never updated afterwards. Keys sort chronologically:
// call:<micros since epoch, zero padded>_<id>

use crate::account::UserStore;
use crate::store::{StorageBackend, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const CALL_PREFIX: &str = "call:";

/// Status given to every new call log
pub const DEFAULT_STATUS: &str = "ongoing";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallLog {
    pub id: String,
    /// User id of the caller
    pub caller: String,
    /// User id of the receiver
    pub receiver: String,
    pub timestamp: DateTime<Utc>,
    pub status: String,
}

impl CallLog {
    pub fn new(caller: String, receiver: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            caller,
            receiver,
            timestamp: Utc::now(),
            status: DEFAULT_STATUS.to_string(),
        }
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.caller == user_id || self.receiver == user_id
    }

    pub fn formatted_time(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// A call participant reduced to the fields clients display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub username: String,
    pub profile_picture: String,
}

/// Call log with caller and receiver resolved. A participant whose account
/// no longer exists is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallLogView {
    pub id: String,
    pub caller: Option<Participant>,
    pub receiver: Option<Participant>,
    pub timestamp: DateTime<Utc>,
    pub status: String,
}

#[derive(Clone)]
pub struct CallLogStore {
    backend: Arc<dyn StorageBackend>,
}

impl CallLogStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Append a call log for `caller` → `receiver`
    pub fn record(&self, caller: &str, receiver: &str) -> Result<CallLog, StoreError> {
        if caller.is_empty() {
            return Err(StoreError::MissingField("caller"));
        }
        if receiver.is_empty() {
            return Err(StoreError::MissingField("receiver"));
        }

        let log = CallLog::new(caller.to_string(), receiver.to_string());
        let key = format!(
            "{}{:020}_{}",
            CALL_PREFIX,
            log.timestamp.timestamp_micros().max(0),
            log.id
        );
        let value = serde_json::to_vec(&log)?;

        self.backend
            .put(key.as_bytes(), &value)
            .map_err(StoreError::Backend)?;
        self.backend.flush().map_err(StoreError::Backend)?;

        tracing::debug!(call_id = %log.id, caller, receiver, "Call log recorded");
        Ok(log)
    }

    /// All call logs, oldest first
    pub fn list(&self) -> Result<Vec<CallLog>, StoreError> {
        let mut logs = Vec::new();
        for (_, value) in self
            .backend
            .scan_prefix(CALL_PREFIX.as_bytes())
            .map_err(StoreError::Backend)?
        {
            logs.push(serde_json::from_slice(&value)?);
        }
        Ok(logs)
    }

    /// Most recent call logs first, optionally only those involving `user_id`
    pub fn recent(&self, user_id: Option<&str>, limit: usize) -> Result<Vec<CallLog>, StoreError> {
        let logs = self.list()?;
        Ok(logs
            .into_iter()
            .rev()
            .filter(|log| user_id.map_or(true, |id| log.involves(id)))
            .take(limit)
            .collect())
    }

    pub fn count(&self) -> usize {
        self.backend
            .count_prefix(CALL_PREFIX.as_bytes())
            .unwrap_or(0)
    }

    /// All call logs with caller and receiver resolved against `users`
    pub fn list_with_participants(&self, users: &UserStore) -> Result<Vec<CallLogView>, StoreError> {
        let resolve = |id: &str| -> Result<Option<Participant>, StoreError> {
            Ok(users.get(id)?.map(|u| Participant {
                id: u.id,
                username: u.username,
                profile_picture: u.profile_picture,
            }))
        };

        self.list()?
            .into_iter()
            .map(|log| {
                Ok(CallLogView {
                    caller: resolve(&log.caller)?,
                    receiver: resolve(&log.receiver)?,
                    id: log.id,
                    timestamp: log.timestamp,
                    status: log.status,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::User;
    use crate::store::MemoryStorage;

    fn stores() -> (CallLogStore, UserStore) {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
        (CallLogStore::new(backend.clone()), UserStore::new(backend))
    }

    #[test]
    fn test_record_defaults() {
        let (calls, _) = stores();
        let log = calls.record("u1", "u2").unwrap();

        assert_eq!(log.status, "ongoing");
        assert_eq!(log.caller, "u1");
        assert_eq!(log.receiver, "u2");
        assert_eq!(calls.count(), 1);
    }

    #[test]
    fn test_record_requires_participants() {
        let (calls, _) = stores();
        assert!(matches!(
            calls.record("", "u2"),
            Err(StoreError::MissingField("caller"))
        ));
        assert!(matches!(
            calls.record("u1", ""),
            Err(StoreError::MissingField("receiver"))
        ));
        assert_eq!(calls.count(), 0);
    }

    #[test]
    fn test_list_chronological_and_recent() {
        let (calls, _) = stores();
        let first = calls.record("u1", "u2").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = calls.record("u3", "u1").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let third = calls.record("u3", "u4").unwrap();

        let all = calls.list().unwrap();
        assert_eq!(
            all.iter().map(|l| l.id.clone()).collect::<Vec<_>>(),
            vec![first.id.clone(), second.id.clone(), third.id.clone()]
        );

        let recent = calls.recent(None, 2).unwrap();
        assert_eq!(recent[0].id, third.id);
        assert_eq!(recent[1].id, second.id);

        let involving = calls.recent(Some("u1"), 10).unwrap();
        assert_eq!(involving.len(), 2);
        assert_eq!(involving[0].id, second.id);
    }

    #[test]
    fn test_participants_resolved() {
        let (calls, users) = stores();
        let alice = users
            .create(
                User::new(
                    "alice".to_string(),
                    "alice@example.com".to_string(),
                    "h".to_string(),
                )
                .with_profile_picture("/uploads/a.png".to_string()),
            )
            .unwrap();

        calls.record(&alice.id, "deleted-user").unwrap();

        let views = calls.list_with_participants(&users).unwrap();
        assert_eq!(views.len(), 1);

        let caller = views[0].caller.as_ref().unwrap();
        assert_eq!(caller.username, "alice");
        assert_eq!(caller.profile_picture, "/uploads/a.png");
        assert!(views[0].receiver.is_none());

        let json = serde_json::to_value(&views[0]).unwrap();
        assert_eq!(json["caller"]["profilePicture"], "/uploads/a.png");
        assert!(json["receiver"].is_null());
        assert_eq!(json["status"], "ongoing");
    }
}
