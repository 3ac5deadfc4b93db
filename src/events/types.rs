use serde::{Deserialize, Serialize};

use crate::models::{CourseCode, MediaKind, SessionId};

/// Notification published by the playback core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerEvent {
    pub id: String,
    pub event_type: EventType,
    pub payload: EventPayload,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl PlayerEvent {
    pub fn new(event_type: EventType, payload: EventPayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            payload,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Session the event refers to
    pub fn session_id(&self) -> &SessionId {
        match &self.payload {
            EventPayload::Progress { session_id, .. } => session_id,
            EventPayload::Modal { session_id, .. } => session_id,
        }
    }

    pub fn course_code(&self) -> Option<&CourseCode> {
        match &self.payload {
            EventPayload::Progress { course_code, .. } => course_code.as_ref(),
            EventPayload::Modal { course_code, .. } => course_code.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A progress row was written to the remote store
    ProgressUpdated,
    /// The modal closed and listening pages should refetch their badges
    ProgressRefreshRequested,
    ModalOpened,
    LinkExpired,
    CaptureSuspected,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ProgressUpdated => "progress.updated",
            EventType::ProgressRefreshRequested => "progress.refresh_requested",
            EventType::ModalOpened => "modal.opened",
            EventType::LinkExpired => "modal.link_expired",
            EventType::CaptureSuspected => "modal.capture_suspected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Progress {
        session_id: SessionId,
        course_code: Option<CourseCode>,
        username: String,
    },
    Modal {
        session_id: SessionId,
        course_code: Option<CourseCode>,
        kind: MediaKind,
    },
}
