pub mod attachment;
pub mod traits;
pub mod types;

pub use attachment::StreamAttachment;
pub use traits::{EngineEventSink, EngineFactory, MediaElement, StreamEngine};
pub use types::{
    AttachStrategy, CanPlay, EngineEvent, PLAYBACK_RATES, ReadyState, RecoveryAction,
    StreamError, StreamErrorKind, is_adaptive_manifest, normalize_rate,
};
