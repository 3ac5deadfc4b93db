use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::local::{KeyValueStore, read_auth_snapshot};
use crate::models::UserIdentity;

/// Ready signal for the signed-in user. Reads that need a username wait on it.
#[derive(Clone)]
pub struct IdentityGate {
    sender: Arc<watch::Sender<Option<UserIdentity>>>,
}

impl Default for IdentityGate {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityGate {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Seeded from the persisted auth snapshot when one exists
    pub fn from_store(store: &dyn KeyValueStore) -> Self {
        let gate = Self::new();
        if let Some(identity) = read_auth_snapshot(store) {
            debug!("Identity restored for {}", identity.username);
            gate.confirm(identity);
        }
        gate
    }

    pub fn confirm(&self, identity: UserIdentity) {
        self.sender.send_replace(Some(identity));
    }

    pub fn sign_out(&self) {
        self.sender.send_replace(None);
    }

    pub fn current(&self) -> Option<UserIdentity> {
        self.sender.borrow().clone()
    }

    /// Wait up to `timeout` for a confirmed identity
    pub async fn wait(&self, timeout: Duration) -> Option<UserIdentity> {
        let mut receiver = self.sender.subscribe();
        let confirmed = tokio::time::timeout(timeout, receiver.wait_for(Option::is_some)).await;
        match confirmed {
            Ok(Ok(identity)) => identity.clone(),
            _ => {
                debug!("No identity confirmed within {:?}", timeout);
                None
            }
        }
    }
}
