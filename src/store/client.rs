use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::backend::ProgressBackend;
use super::errors::ProgressStoreError;
use crate::events::EventBus;
use crate::models::{CourseCode, ProgressRecord, ProgressRow, ProgressSnapshot, SessionId};

type Reply = oneshot::Sender<Result<SaveOutcome, ProgressStoreError>>;
type SlotKey = (String, SessionId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The payload reached the store
    Saved,
    /// A newer payload for the same key replaced this one before it was sent
    Superseded,
}

struct PendingSave {
    row: ProgressRow,
    reply: Reply,
}

/// A key present in the slot map has a save in flight; `pending` is the latest payload
/// waiting behind it.
#[derive(Default)]
struct Slot {
    pending: Option<PendingSave>,
}

/// Result handle for a submitted save
pub struct SaveTicket {
    inner: TicketInner,
}

enum TicketInner {
    Ready(Result<SaveOutcome, ProgressStoreError>),
    Waiting(oneshot::Receiver<Result<SaveOutcome, ProgressStoreError>>),
}

impl SaveTicket {
    fn ready(result: Result<SaveOutcome, ProgressStoreError>) -> Self {
        Self {
            inner: TicketInner::Ready(result),
        }
    }

    pub async fn outcome(self) -> Result<SaveOutcome, ProgressStoreError> {
        match self.inner {
            TicketInner::Ready(result) => result,
            TicketInner::Waiting(rx) => rx.await.unwrap_or(Err(ProgressStoreError::Cancelled)),
        }
    }
}

/// Progress store client with per-key write coalescing
///
/// At most one upsert per `(username, session_id)` is in flight. Saves that arrive while one
/// is running replace each other in a single pending slot, so only the most recent payload
/// is sent once the running call completes.
#[derive(Clone)]
pub struct ProgressStore {
    backend: Arc<dyn ProgressBackend>,
    bus: Option<Arc<EventBus>>,
    slots: Arc<Mutex<HashMap<SlotKey, Slot>>>,
}

impl ProgressStore {
    pub fn new(backend: Arc<dyn ProgressBackend>) -> Self {
        Self {
            backend,
            bus: None,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Publish a progress-updated event after every successful save
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<SlotKey, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a save without waiting for it.
    ///
    /// The payload is queued before this returns, so saves submitted in order are applied
    /// in order. Must be called from within a tokio runtime.
    pub fn submit(
        &self,
        username: Option<&str>,
        course_code: Option<&CourseCode>,
        session_id: &SessionId,
        snapshot: &ProgressSnapshot,
    ) -> SaveTicket {
        let Some(username) = username.map(str::trim).filter(|u| !u.is_empty()) else {
            warn!("Skipping progress save for {}: no username", session_id);
            return SaveTicket::ready(Err(ProgressStoreError::MissingKeys("username")));
        };
        if session_id.is_blank() {
            warn!("Skipping progress save for {}: no session id", username);
            return SaveTicket::ready(Err(ProgressStoreError::MissingKeys("session_id")));
        }

        let row = ProgressRow::new(username, course_code.cloned(), session_id.clone(), snapshot);
        let key = (row.username.clone(), row.session_id.clone());
        let (reply, rx) = oneshot::channel();
        let save = PendingSave { row, reply };

        let mut slots = self.lock_slots();
        if let Some(slot) = slots.get_mut(&key) {
            debug!("Save in flight for {}, queueing latest payload", key.1);
            if let Some(previous) = slot.pending.replace(save) {
                let _ = previous.reply.send(Ok(SaveOutcome::Superseded));
            }
        } else {
            slots.insert(key.clone(), Slot::default());
            drop(slots);

            let store = self.clone();
            tokio::spawn(async move {
                store.drain(key, save).await;
            });
        }

        SaveTicket {
            inner: TicketInner::Waiting(rx),
        }
    }

    /// Save and wait for the outcome
    pub async fn save(
        &self,
        username: Option<&str>,
        course_code: Option<&CourseCode>,
        session_id: &SessionId,
        snapshot: &ProgressSnapshot,
    ) -> Result<SaveOutcome, ProgressStoreError> {
        self.submit(username, course_code, session_id, snapshot)
            .outcome()
            .await
    }

    async fn drain(&self, key: SlotKey, mut current: PendingSave) {
        loop {
            let result = self.backend.upsert(&current.row).await;
            match &result {
                Ok(()) => {
                    debug!(
                        "Saved progress for {} at {}s",
                        current.row.session_id, current.row.last_position
                    );
                    self.notify(&current.row).await;
                }
                Err(e) => warn!("Failed to save progress for {}: {}", current.row.session_id, e),
            }
            let _ = current.reply.send(result.map(|_| SaveOutcome::Saved));

            let next = {
                let mut slots = self.lock_slots();
                let next = slots.get_mut(&key).and_then(|slot| slot.pending.take());
                if next.is_none() {
                    slots.remove(&key);
                }
                next
            };

            match next {
                Some(save) => current = save,
                None => break,
            }
        }
    }

    async fn notify(&self, row: &ProgressRow) {
        if let Some(bus) = &self.bus
            && let Err(e) = bus
                .emit_progress_updated(
                    row.session_id.clone(),
                    row.course_code.clone(),
                    row.username.clone(),
                )
                .await
        {
            debug!("Failed to publish progress update: {}", e);
        }
    }

    /// Stored record for one session. A missing username or session id is "no record".
    pub async fn load(
        &self,
        username: Option<&str>,
        session_id: &SessionId,
    ) -> Result<Option<ProgressRecord>, ProgressStoreError> {
        let Some(username) = username.map(str::trim).filter(|u| !u.is_empty()) else {
            return Ok(None);
        };
        if session_id.is_blank() {
            return Ok(None);
        }

        self.backend.fetch(username, session_id).await.map_err(|e| {
            warn!("Failed to load progress for {}: {}", session_id, e);
            e
        })
    }

    /// Stored records for a page of sessions, keyed by session id
    pub async fn load_many(
        &self,
        username: Option<&str>,
        session_ids: &[SessionId],
    ) -> Result<HashMap<SessionId, ProgressRecord>, ProgressStoreError> {
        let Some(username) = username.map(str::trim).filter(|u| !u.is_empty()) else {
            return Ok(HashMap::new());
        };

        let records = self
            .backend
            .fetch_many(username, session_ids)
            .await
            .map_err(|e| {
                warn!("Failed to load course progress: {}", e);
                e
            })?;

        Ok(records
            .into_iter()
            .filter_map(|record| record.session_id.clone().map(|id| (id, record)))
            .collect())
    }

    /// Number of keys with a save currently in flight
    pub fn in_flight(&self) -> usize {
        self.lock_slots().len()
    }
}
