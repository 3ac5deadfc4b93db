use super::types::{EventPayload, EventType, PlayerEvent};
use crate::models::{CourseCode, MediaKind, SessionId};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::trace;

/// Subscription handle. Dropping it unsubscribes.
pub struct EventSubscriber {
    receiver: broadcast::Receiver<PlayerEvent>,
    filter: Option<EventFilter>,
}

impl EventSubscriber {
    pub fn new(receiver: broadcast::Receiver<PlayerEvent>, filter: Option<EventFilter>) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next event matching the filter
    pub async fn recv(&mut self) -> Result<PlayerEvent> {
        loop {
            let event = self.receiver.recv().await?;

            match self.filter {
                Some(ref filter) if !filter.matches(&event) => continue,
                _ => return Ok(event),
            }
        }
    }

    /// Try to receive without blocking
    pub fn try_recv(&mut self) -> Result<Option<PlayerEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if let Some(ref filter) = self.filter
                        && !filter.matches(&event)
                    {
                        continue;
                    }
                    return Ok(Some(event));
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    event_types: Option<Vec<EventType>>,
    sessions: Option<Vec<SessionId>>,
    course_code: Option<CourseCode>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(mut self, types: Vec<EventType>) -> Self {
        self.event_types = Some(types);
        self
    }

    pub fn with_sessions(mut self, sessions: Vec<SessionId>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_course(mut self, course_code: CourseCode) -> Self {
        self.course_code = Some(course_code);
        self
    }

    pub fn matches(&self, event: &PlayerEvent) -> bool {
        if let Some(ref types) = self.event_types
            && !types.contains(&event.event_type)
        {
            return false;
        }

        if let Some(ref sessions) = self.sessions
            && !sessions.contains(event.session_id())
        {
            return false;
        }

        if let Some(ref course) = self.course_code
            && event.course_code() != Some(course)
        {
            return false;
        }

        true
    }
}

/// Broadcast channel for progress and modal notifications
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<PlayerEvent>,
    stats: Arc<RwLock<EventBusStats>>,
    event_history: Arc<RwLock<Vec<PlayerEvent>>>,
    max_history_size: usize,
}

#[derive(Debug, Default, Clone)]
pub struct EventBusStats {
    pub total_events: u64,
    pub events_by_type: HashMap<String, u64>,
    pub subscriber_count: usize,
    pub dropped_events: u64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventBus {
    /// Create a new event bus with specified buffer capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);

        Self {
            sender,
            stats: Arc::new(RwLock::new(EventBusStats::default())),
            event_history: Arc::new(RwLock::new(Vec::new())),
            max_history_size: 100,
        }
    }

    /// Publish an event to all subscribers
    pub async fn publish(&self, event: PlayerEvent) -> Result<()> {
        trace!(
            "Publishing event: {} for session {}",
            event.event_type.as_str(),
            event.session_id()
        );

        {
            let mut stats = self.stats.write().await;
            stats.total_events += 1;
            *stats
                .events_by_type
                .entry(event.event_type.as_str().to_string())
                .or_insert(0) += 1;
        }

        {
            let mut history = self.event_history.write().await;
            history.push(event.clone());
            if history.len() > self.max_history_size {
                let excess = history.len() - self.max_history_size;
                history.drain(0..excess);
            }
        }

        if self.sender.send(event).is_err() {
            // No subscribers is normal
            self.stats.write().await.dropped_events += 1;
        }
        Ok(())
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber::new(self.sender.subscribe(), None)
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> EventSubscriber {
        EventSubscriber::new(self.sender.subscribe(), Some(filter))
    }

    pub fn subscribe_to_types(&self, types: Vec<EventType>) -> EventSubscriber {
        self.subscribe_filtered(EventFilter::new().with_types(types))
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub async fn get_stats(&self) -> EventBusStats {
        let stats = self.stats.read().await;
        EventBusStats {
            subscriber_count: self.subscriber_count(),
            ..stats.clone()
        }
    }

    /// Recent events, oldest first
    pub async fn get_history(&self) -> Vec<PlayerEvent> {
        self.event_history.read().await.clone()
    }

    pub async fn clear_history(&self) {
        self.event_history.write().await.clear();
    }

    /// Emit after a successful progress save
    pub async fn emit_progress_updated(
        &self,
        session_id: SessionId,
        course_code: Option<CourseCode>,
        username: String,
    ) -> Result<()> {
        let event = PlayerEvent::new(
            EventType::ProgressUpdated,
            EventPayload::Progress {
                session_id,
                course_code,
                username,
            },
        );
        self.publish(event).await
    }

    /// Emit when the modal closes so pages refetch cached progress
    pub async fn emit_refresh_requested(
        &self,
        session_id: SessionId,
        course_code: Option<CourseCode>,
        username: String,
    ) -> Result<()> {
        let event = PlayerEvent::new(
            EventType::ProgressRefreshRequested,
            EventPayload::Progress {
                session_id,
                course_code,
                username,
            },
        );
        self.publish(event).await
    }

    pub async fn emit_modal_event(
        &self,
        event_type: EventType,
        session_id: SessionId,
        course_code: Option<CourseCode>,
        kind: MediaKind,
    ) -> Result<()> {
        let event = PlayerEvent::new(
            event_type,
            EventPayload::Modal {
                session_id,
                course_code,
                kind,
            },
        );
        self.publish(event).await
    }
}
