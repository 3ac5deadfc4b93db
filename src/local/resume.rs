use std::sync::Arc;
use tracing::{debug, warn};

use super::store::{KeyValueStore, LocalStoreError};
use crate::models::{SessionId, UserIdentity, floor_seconds};

pub const RESUME_KEY_PREFIX: &str = "nilplayer.audio.resume";
pub const AUTH_SNAPSHOT_KEY: &str = "nil_auth";

/// Audio resume positions kept on this device only
#[derive(Clone)]
pub struct LocalResume {
    store: Arc<dyn KeyValueStore>,
}

impl LocalResume {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn key(username: Option<&str>, session_id: &SessionId) -> String {
        let user = username
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or("anon");
        format!("{}::{}::{}", RESUME_KEY_PREFIX, user, session_id)
    }

    /// Stored position in whole seconds, 0 when absent or unreadable
    pub fn read(&self, username: Option<&str>, session_id: &SessionId) -> u64 {
        let key = Self::key(username, session_id);
        match self.store.get(&key) {
            Ok(Some(value)) => value.trim().parse::<f64>().map(floor_seconds).unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                warn!("Failed to read audio resume for {}: {}", session_id, e);
                0
            }
        }
    }

    pub fn write(&self, username: Option<&str>, session_id: &SessionId, seconds: f64) {
        let key = Self::key(username, session_id);
        let value = floor_seconds(seconds).to_string();
        if let Err(e) = self.store.set(&key, &value) {
            warn!("Failed to write audio resume for {}: {}", session_id, e);
        }
    }

    /// Reset the resume point to the start
    pub fn clear(&self, username: Option<&str>, session_id: &SessionId) {
        debug!("Clearing audio resume for {}", session_id);
        self.write(username, session_id, 0.0);
    }
}

/// Signed-in user from the local auth snapshot, if one is stored and readable
pub fn read_auth_snapshot(store: &dyn KeyValueStore) -> Option<UserIdentity> {
    let raw = match store.get(AUTH_SNAPSHOT_KEY) {
        Ok(raw) => raw?,
        Err(e) => {
            warn!("Failed to read auth snapshot: {}", e);
            return None;
        }
    };

    match serde_json::from_str::<UserIdentity>(&raw) {
        Ok(identity) if !identity.username.trim().is_empty() => Some(identity),
        Ok(_) => None,
        Err(e) => {
            debug!("Ignoring malformed auth snapshot: {}", e);
            None
        }
    }
}

pub fn write_auth_snapshot(
    store: &dyn KeyValueStore,
    identity: &UserIdentity,
) -> Result<(), LocalStoreError> {
    let raw = serde_json::to_string(identity)?;
    store.set(AUTH_SNAPSHOT_KEY, &raw)
}
