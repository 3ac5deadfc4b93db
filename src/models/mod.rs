mod identifiers;
pub mod progress;

pub use identifiers::{CourseCode, SessionId};
pub use progress::{ProgressEntry, ProgressRecord, ProgressRow, ProgressSnapshot, floor_seconds};

use serde::{Deserialize, Serialize};
use std::fmt;

/// A recorded course session as listed by a course page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
}

impl Session {
    /// Media URL for the requested kind, if the session carries one
    pub fn url_for(&self, kind: MediaKind) -> Option<&str> {
        let url = match kind {
            MediaKind::Video => self.video_url.as_deref(),
            MediaKind::Audio => self.audio_url.as_deref(),
        };
        url.filter(|u| !u.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed-in user as persisted in the local auth snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub course_code: String,
}

impl UserIdentity {
    pub fn new(username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            id: username.clone(),
            username,
            course_code: String::new(),
        }
    }
}
