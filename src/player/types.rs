/// Common types shared by media elements and streaming engines

/// Playback speeds offered by the rate picker
pub const PLAYBACK_RATES: [f64; 6] = [0.5, 0.75, 1.0, 1.25, 1.5, 2.0];

/// Readiness of a media element, ordered by how much data is available
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ReadyState {
    #[default]
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

impl ReadyState {
    pub fn has_metadata(&self) -> bool {
        *self >= ReadyState::HaveMetadata
    }
}

/// Answer of a media element asked whether it can play a MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanPlay {
    No,
    Maybe,
    Probably,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    Network,
    Media,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamError {
    pub fatal: bool,
    pub kind: StreamErrorKind,
    pub details: String,
}

impl StreamError {
    pub fn fatal(kind: StreamErrorKind, details: impl Into<String>) -> Self {
        Self {
            fatal: true,
            kind,
            details: details.into(),
        }
    }

    pub fn warning(kind: StreamErrorKind, details: impl Into<String>) -> Self {
        Self {
            fatal: false,
            kind,
            details: details.into(),
        }
    }
}

/// Notifications raised by a streaming engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ManifestParsed,
    Error(StreamError),
}

/// How a source ended up bound to the element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachStrategy {
    /// Software adaptive-streaming engine feeds the element
    Engine,
    /// The element plays the manifest itself
    Native,
    /// Plain file URL set directly as the source
    Progressive,
    /// Manifest the runtime cannot play; the element has no source
    Unsupported,
}

/// What the attachment did about an engine error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    Ignored,
    Reloaded,
    RecoveredMedia,
    Recreated,
    GaveUp,
}

pub fn is_adaptive_manifest(url: &str) -> bool {
    url.contains(".m3u8")
}

/// Validate a requested playback rate
pub fn normalize_rate(rate: f64) -> Option<f64> {
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
