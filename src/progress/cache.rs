use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::events::{EventBus, EventFilter, EventType};
use crate::models::{CourseCode, ProgressEntry, SessionId};
use crate::store::{ProgressStore, ProgressStoreError};

/// Progress badges for the sessions shown on one course page
#[derive(Debug, Clone, Default)]
pub struct ProgressCache {
    entries: Arc<RwLock<HashMap<SessionId, ProgressEntry>>>,
}

impl ProgressCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &SessionId) -> Option<ProgressEntry> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .copied()
    }

    pub fn insert(&self, session_id: SessionId, entry: ProgressEntry) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_id, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the entries for `session_ids` with what the store holds now
    pub async fn refresh(
        &self,
        store: &ProgressStore,
        username: Option<&str>,
        session_ids: &[SessionId],
    ) -> Result<usize, ProgressStoreError> {
        let records = store.load_many(username, session_ids).await?;

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        for id in session_ids {
            entries.remove(id);
        }
        for (id, record) in &records {
            entries.insert(id.clone(), ProgressEntry::from_record(record));
        }

        debug!("Progress cache refreshed with {} records", records.len());
        Ok(records.len())
    }

    /// Refresh whenever progress for one of `session_ids` is saved or a modal asks for it.
    /// The subscription is taken before this returns.
    pub fn spawn_listener(
        &self,
        bus: &EventBus,
        store: ProgressStore,
        username: String,
        session_ids: Vec<SessionId>,
        course_code: Option<CourseCode>,
    ) -> JoinHandle<()> {
        let mut filter = EventFilter::new()
            .with_types(vec![
                EventType::ProgressUpdated,
                EventType::ProgressRefreshRequested,
            ])
            .with_sessions(session_ids.clone());
        if let Some(course) = course_code {
            filter = filter.with_course(course);
        }
        let mut subscriber = bus.subscribe_filtered(filter);
        let cache = self.clone();

        tokio::spawn(async move {
            loop {
                match subscriber.recv().await {
                    Ok(event) => debug!("Refreshing progress after {}", event.event_type.as_str()),
                    Err(e) => match e.downcast_ref::<RecvError>() {
                        Some(RecvError::Lagged(skipped)) => {
                            debug!("Progress listener lagged by {} events", skipped)
                        }
                        _ => break,
                    },
                }

                if let Err(e) = cache.refresh(&store, Some(&username), &session_ids).await {
                    warn!("Progress refresh failed: {}", e);
                }
            }
            debug!("Progress listener stopped");
        })
    }
}
