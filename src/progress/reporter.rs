use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

use super::resume::ResumePoint;
use crate::local::LocalResume;
use crate::models::{ProgressSnapshot, SessionId, floor_seconds};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterState {
    Idle,
    Attached,
    Playing,
    Paused,
    Ended,
}

impl ReporterState {
    /// Metadata has been seen, so snapshots carry a real total
    fn is_started(&self) -> bool {
        matches!(
            self,
            ReporterState::Playing | ReporterState::Paused | ReporterState::Ended
        )
    }
}

/// Turns video element events into progress snapshots for the remote store.
///
/// Periodic snapshots are rate limited with drop semantics: a time update that arrives
/// inside the window produces nothing. Metadata, pause, end and unload snapshots are not
/// throttled.
#[derive(Debug)]
pub struct VideoProgressReporter {
    state: ReporterState,
    interval: Duration,
    total_seconds: f64,
    position: f64,
    high_water: f64,
    last_emission: Option<Instant>,
}

impl VideoProgressReporter {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: ReporterState::Idle,
            interval,
            total_seconds: 0.0,
            position: 0.0,
            high_water: 0.0,
            last_emission: None,
        }
    }

    pub fn state(&self) -> ReporterState {
        self.state
    }

    pub fn high_water(&self) -> f64 {
        self.high_water
    }

    pub fn attach(&mut self) {
        *self = Self::new(self.interval);
        self.state = ReporterState::Attached;
    }

    /// Seed totals and the high-water mark. Returns the snapshot that creates the record.
    pub fn on_metadata(
        &mut self,
        duration: f64,
        start: ResumePoint,
        now: Instant,
    ) -> ProgressSnapshot {
        self.total_seconds = finite_or_zero(duration);
        self.position = finite_or_zero(start.position);
        self.high_water = finite_or_zero(start.high_water).max(self.position);
        self.last_emission = Some(now);
        self.state = ReporterState::Paused;

        self.current_snapshot()
    }

    pub fn on_playing(&mut self) {
        if self.state.is_started() {
            self.state = ReporterState::Playing;
        }
    }

    /// Track position; emit only when the reporting window has elapsed
    pub fn on_time_update(&mut self, position: f64, now: Instant) -> Option<ProgressSnapshot> {
        if self.state == ReporterState::Ended || !self.state.is_started() {
            return None;
        }
        self.observe(position);

        let due = self
            .last_emission
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if !due {
            trace!("Progress update at {:.1}s inside window, dropped", self.position);
            return None;
        }

        self.last_emission = Some(now);
        Some(self.current_snapshot())
    }

    pub fn on_pause(&mut self, position: f64) -> Option<ProgressSnapshot> {
        if !self.state.is_started() {
            return None;
        }
        if self.state == ReporterState::Ended {
            return Some(self.completed_snapshot());
        }
        self.observe(position);
        self.state = ReporterState::Paused;
        Some(self.current_snapshot())
    }

    pub fn on_ended(&mut self) -> Option<ProgressSnapshot> {
        if !self.state.is_started() {
            return None;
        }
        if self.total_seconds <= 0.0 {
            self.total_seconds = self.high_water.max(self.position);
        }
        self.position = self.total_seconds;
        self.high_water = self.high_water.max(self.total_seconds);
        self.state = ReporterState::Ended;
        Some(self.completed_snapshot())
    }

    /// Best-effort snapshot for page unload or modal close; does not change state
    pub fn on_unload(&mut self, position: f64) -> Option<ProgressSnapshot> {
        if !self.state.is_started() {
            return None;
        }
        if self.state == ReporterState::Ended {
            return Some(self.completed_snapshot());
        }
        self.observe(position);
        Some(self.current_snapshot())
    }

    /// Playback restarted after the end
    pub fn on_restart(&mut self) {
        if self.state == ReporterState::Ended {
            self.state = ReporterState::Playing;
        }
    }

    fn observe(&mut self, position: f64) {
        if position.is_finite() && position >= 0.0 {
            self.position = position;
            self.high_water = self.high_water.max(position);
        }
    }

    fn current_snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            last_position: self.position,
            watched_seconds: self.high_water,
            total_seconds: self.total_seconds,
            completed: false,
        }
    }

    fn completed_snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            last_position: self.total_seconds,
            watched_seconds: self.total_seconds,
            total_seconds: self.total_seconds,
            completed: true,
        }
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Writes audio positions to the device-local resume entry; never touches the remote store.
///
/// Once ended the entry stays cleared until playback resumes.
#[derive(Clone)]
pub struct AudioResumeReporter {
    local: LocalResume,
    username: Option<String>,
    session_id: SessionId,
    last_written: Option<u64>,
    ended: bool,
}

impl AudioResumeReporter {
    pub fn new(local: LocalResume, username: Option<String>, session_id: SessionId) -> Self {
        Self {
            local,
            username,
            session_id,
            last_written: None,
            ended: false,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn on_playing(&mut self) {
        self.ended = false;
    }

    /// Skips the write when the whole second has not changed
    pub fn on_time_update(&mut self, position: f64) {
        if self.ended {
            return;
        }
        let second = floor_seconds(position);
        if self.last_written == Some(second) {
            return;
        }
        self.write(position);
    }

    pub fn on_pause(&mut self, position: f64) {
        if !self.ended {
            self.write(position);
        }
    }

    pub fn on_unload(&mut self, position: f64) {
        self.on_pause(position);
    }

    pub fn on_ended(&mut self) {
        self.local.clear(self.username.as_deref(), &self.session_id);
        self.last_written = Some(0);
        self.ended = true;
    }

    fn write(&mut self, position: f64) {
        self.local
            .write(self.username.as_deref(), &self.session_id, position);
        self.last_written = Some(floor_seconds(position));
    }
}
