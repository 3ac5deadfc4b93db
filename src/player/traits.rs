use anyhow::Result;
use std::sync::Arc;

use super::types::{CanPlay, EngineEvent, ReadyState};
use crate::config::EngineConfig;

/// A host-provided audio or video element
pub trait MediaElement: Send + Sync {
    fn ready_state(&self) -> ReadyState;
    fn current_time(&self) -> f64;
    /// Duration in seconds; NaN or 0 while unknown
    fn duration(&self) -> f64;
    fn set_current_time(&self, seconds: f64) -> Result<()>;
    fn play(&self) -> Result<()>;
    fn pause(&self);
    /// Replace the source; `None` removes it
    fn set_source(&self, url: Option<&str>);
    /// Reset the element after a source change
    fn load(&self);
    fn can_play_type(&self, mime: &str) -> CanPlay;
    fn set_playback_rate(&self, rate: f64);
}

/// A software adaptive-streaming engine instance
pub trait StreamEngine: Send {
    fn attach_media(&mut self, element: Arc<dyn MediaElement>) -> Result<()>;
    fn load_source(&mut self, url: &str) -> Result<()>;
    /// Restart loading of the current queue
    fn start_load(&mut self);
    fn recover_media_error(&mut self);
    fn destroy(&mut self);
}

pub type EngineEventSink = Arc<dyn Fn(EngineEvent) + Send + Sync>;

pub trait EngineFactory: Send + Sync {
    /// Whether the runtime can host a software engine at all
    fn is_supported(&self) -> bool;

    fn create(
        &self,
        config: &EngineConfig,
        events: EngineEventSink,
    ) -> Result<Box<dyn StreamEngine>>;
}
