//! Presentation safeguards: a moving watermark and an advisory capture probe.
//!
//! Neither is an enforcement mechanism. Their failures never reach playback.

pub mod capture;
pub mod watermark;

pub use capture::{
    CaptureProbe, CaptureSink, DeviceEnumerator, DeviceInfo, DeviceKind, capture_suspected,
};
pub use watermark::{Watermark, WatermarkScheduler, WatermarkSink};
