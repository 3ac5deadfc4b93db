use crate::models::{CourseCode, MediaKind, SessionId};
use crate::player::AttachStrategy;
use crate::safeguards::Watermark;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModalPhase {
    #[default]
    Closed,
    /// Media mounted, waiting for metadata and the resume position
    Open,
    Playing,
    /// The link carried a past expiry; nothing is attached
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Button,
    Backdrop,
    Escape,
    Reopen,
    Unmount,
}

/// Element lifecycle notifications forwarded by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    LoadedMetadata,
    CanPlay,
    TimeUpdate,
    Playing,
    Pause,
    Ended,
}

/// Everything a page supplies when opening the modal
#[derive(Debug, Clone, PartialEq)]
pub struct OpenRequest {
    pub kind: MediaKind,
    pub url: String,
    pub title: String,
    pub session_id: SessionId,
    pub course_code: Option<CourseCode>,
    pub initial_time: Option<f64>,
    pub username: Option<String>,
}

impl OpenRequest {
    pub fn new(kind: MediaKind, url: impl Into<String>, session_id: SessionId) -> Self {
        Self {
            kind,
            url: url.into(),
            title: String::new(),
            session_id,
            course_code: None,
            initial_time: None,
            username: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_course(mut self, course_code: CourseCode) -> Self {
        self.course_code = Some(course_code);
        self
    }

    pub fn with_initial_time(mut self, seconds: f64) -> Self {
        self.initial_time = Some(seconds);
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModalInput {
    Open(OpenRequest),
    Close(CloseReason),
    /// Keyboard input while the modal has focus
    Key(String),
    Media(MediaEvent),
    SetPlaybackRate(f64),
    EnterFullscreen,
    ExitFullscreen,
    /// The host entered or left fullscreen on its own
    FullscreenChanged(bool),
    PageUnload,
    Unmount,
}

/// What a rendering host needs to draw the modal
#[derive(Debug, Clone, PartialEq)]
pub struct ModalView {
    pub phase: ModalPhase,
    pub kind: Option<MediaKind>,
    pub title: String,
    pub strategy: Option<AttachStrategy>,
    pub playback_rate: f64,
    pub fullscreen: bool,
    pub capture_warning: bool,
    pub watermark: Option<Watermark>,
}

impl Default for ModalView {
    fn default() -> Self {
        Self {
            phase: ModalPhase::Closed,
            kind: None,
            title: String::new(),
            strategy: None,
            playback_rate: 1.0,
            fullscreen: false,
            capture_warning: false,
            watermark: None,
        }
    }
}
