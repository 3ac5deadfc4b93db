use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::{CourseCode, SessionId};

/// Floor a seconds value and clamp it to zero. Non-finite input becomes zero.
pub fn floor_seconds(seconds: f64) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    seconds.floor() as u64
}

/// Progress as observed on the media element, in fractional seconds
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProgressSnapshot {
    pub last_position: f64,
    pub watched_seconds: f64,
    pub total_seconds: f64,
    pub completed: bool,
}

/// Upsert payload for the remote progress table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressRow {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_code: Option<CourseCode>,
    pub session_id: SessionId,
    pub last_position: u64,
    pub watched_seconds: u64,
    pub total_seconds: u64,
    pub completed: bool,
}

impl ProgressRow {
    pub fn new(
        username: impl Into<String>,
        course_code: Option<CourseCode>,
        session_id: SessionId,
        snapshot: &ProgressSnapshot,
    ) -> Self {
        Self {
            username: username.into(),
            course_code,
            session_id,
            last_position: floor_seconds(snapshot.last_position),
            watched_seconds: floor_seconds(snapshot.watched_seconds),
            total_seconds: floor_seconds(snapshot.total_seconds),
            completed: snapshot.completed,
        }
    }
}

/// A stored progress row as read back from the remote table
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ProgressRecord {
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub course_code: Option<CourseCode>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub last_position: u64,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub watched_seconds: u64,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub total_seconds: u64,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub completed: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

// Columns may come back as null or as floats depending on how the table was created.
fn lenient_seconds<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.map(floor_seconds).unwrap_or(0))
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Per-session badge state shown on a course page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEntry {
    pub percent: u8,
    pub last_position: u64,
    pub watched_seconds: u64,
    pub completed: bool,
}

impl ProgressEntry {
    pub fn from_record(record: &ProgressRecord) -> Self {
        let base = if record.watched_seconds > 0 {
            record.watched_seconds
        } else {
            record.last_position
        };
        let percent = if record.total_seconds > 0 {
            let ratio = base as f64 / record.total_seconds as f64 * 100.0;
            ratio.round().min(100.0) as u8
        } else {
            0
        };

        Self {
            percent,
            last_position: record.last_position,
            watched_seconds: record.watched_seconds,
            completed: record.completed,
        }
    }

    pub fn is_done(&self) -> bool {
        self.completed || self.percent == 100
    }
}
