use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::traits::{EngineEventSink, EngineFactory, MediaElement, StreamEngine};
use super::types::{
    AttachStrategy, CanPlay, RecoveryAction, StreamError, StreamErrorKind, is_adaptive_manifest,
};
use crate::config::EngineConfig;

/// Binds one source URL to one media element for the lifetime of a playback session
pub struct StreamAttachment {
    element: Arc<dyn MediaElement>,
    factory: Arc<dyn EngineFactory>,
    events: EngineEventSink,
    url: String,
    strategy: AttachStrategy,
    engine: Option<Box<dyn StreamEngine>>,
    recreated: bool,
    destroyed: bool,
}

impl std::fmt::Debug for StreamAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAttachment")
            .field("url", &self.url)
            .field("strategy", &self.strategy)
            .field("has_engine", &self.engine.is_some())
            .field("recreated", &self.recreated)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl StreamAttachment {
    /// Reset the element, then pick a playback strategy for `url`.
    ///
    /// Never fails: when nothing can play the source the element is left without one and
    /// the strategy is [`AttachStrategy::Unsupported`].
    pub fn attach(
        element: Arc<dyn MediaElement>,
        url: &str,
        factory: Arc<dyn EngineFactory>,
        engine_config: &EngineConfig,
        native_mime: &str,
        events: EngineEventSink,
    ) -> Self {
        reset_element(element.as_ref());

        let mut attachment = Self {
            element,
            factory,
            events,
            url: url.to_string(),
            strategy: AttachStrategy::Unsupported,
            engine: None,
            recreated: false,
            destroyed: false,
        };

        if !is_adaptive_manifest(url) {
            debug!("Progressive source: {}", url);
            attachment.element.set_source(Some(url));
            attachment.strategy = AttachStrategy::Progressive;
            return attachment;
        }

        if attachment.factory.is_supported() {
            match attachment.spawn_engine(engine_config) {
                Ok(engine) => {
                    info!("Attached streaming engine for {}", url);
                    attachment.engine = Some(engine);
                    attachment.strategy = AttachStrategy::Engine;
                    return attachment;
                }
                Err(e) => warn!("Streaming engine failed to start, trying native playback: {:#}", e),
            }
        }

        if attachment.element.can_play_type(native_mime) != CanPlay::No {
            debug!("Native manifest playback for {}", url);
            attachment.element.set_source(Some(url));
            attachment.strategy = AttachStrategy::Native;
        } else {
            warn!("Adaptive streaming is not supported on this device");
        }

        attachment
    }

    fn spawn_engine(&self, config: &EngineConfig) -> Result<Box<dyn StreamEngine>> {
        let mut engine = self.factory.create(config, self.events.clone())?;
        let bound = engine
            .attach_media(self.element.clone())
            .and_then(|_| engine.load_source(&self.url));
        if let Err(e) = bound {
            engine.destroy();
            return Err(e);
        }
        Ok(engine)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn strategy(&self) -> AttachStrategy {
        self.strategy
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Apply the recovery policy to an engine error
    pub fn handle_error(&mut self, error: &StreamError) -> RecoveryAction {
        if !error.fatal {
            debug!("Non-fatal stream error ignored: {}", error.details);
            return RecoveryAction::Ignored;
        }
        if self.destroyed {
            return RecoveryAction::Ignored;
        }
        let Some(engine) = self.engine.as_mut() else {
            return RecoveryAction::Ignored;
        };

        match error.kind {
            StreamErrorKind::Network => {
                warn!("Fatal network error, reloading: {}", error.details);
                engine.start_load();
                RecoveryAction::Reloaded
            }
            StreamErrorKind::Media => {
                warn!("Fatal media error, recovering: {}", error.details);
                engine.recover_media_error();
                RecoveryAction::RecoveredMedia
            }
            StreamErrorKind::Other => {
                engine.destroy();
                self.engine = None;

                if self.recreated {
                    warn!(
                        "Fatal stream error after recreation, giving up: {}",
                        error.details
                    );
                    return RecoveryAction::GaveUp;
                }
                self.recreated = true;

                warn!("Fatal stream error, recreating engine: {}", error.details);
                match self.spawn_engine(&EngineConfig::recovery()) {
                    Ok(engine) => {
                        self.engine = Some(engine);
                        RecoveryAction::Recreated
                    }
                    Err(e) => {
                        warn!("Engine recreation failed: {:#}", e);
                        RecoveryAction::GaveUp
                    }
                }
            }
        }
    }

    /// Release the engine and leave the element without a source. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
        }
        reset_element(self.element.as_ref());
        debug!("Stream attachment for {} destroyed", self.url);
    }
}

impl Drop for StreamAttachment {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn reset_element(element: &dyn MediaElement) {
    element.pause();
    element.set_source(None);
    element.load();
}
