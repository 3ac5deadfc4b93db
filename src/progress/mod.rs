//! Resume resolution, progress reporting and per-course progress badges.

pub mod cache;
pub mod reporter;
pub mod resume;

pub use cache::ProgressCache;
pub use reporter::{AudioResumeReporter, ReporterState, VideoProgressReporter};
pub use resume::{ResumePoint, ResumeRequest, ResumeResolver};
