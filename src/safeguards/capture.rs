use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub kind: DeviceKind,
    pub label: String,
}

impl DeviceInfo {
    pub fn new(kind: DeviceKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
        }
    }
}

/// Host access to the list of media devices. May be unavailable or permission-gated.
#[async_trait]
pub trait DeviceEnumerator: Send + Sync {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>>;
}

/// Label heuristic only; devices that hide their labels are never flagged
pub fn capture_suspected(devices: &[DeviceInfo], label_hint: &str) -> bool {
    devices
        .iter()
        .any(|d| d.kind == DeviceKind::VideoInput && d.label.contains(label_hint))
}

/// Receives the result of each successful probe
pub type CaptureSink = Arc<dyn Fn(bool) + Send + Sync>;

/// Advisory screen-capture probe. Enumeration failures are swallowed.
pub struct CaptureProbe {
    task: Option<JoinHandle<()>>,
}

impl CaptureProbe {
    /// Probe every `period`, the first time one period after start
    pub fn start(
        enumerator: Arc<dyn DeviceEnumerator>,
        period: Duration,
        label_hint: String,
        sink: CaptureSink,
    ) -> Self {
        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match enumerator.enumerate().await {
                    Ok(devices) => sink(capture_suspected(&devices, &label_hint)),
                    Err(e) => trace!("Device enumeration unavailable: {:#}", e),
                }
            }
        });

        debug!("Capture probe started");
        Self { task: Some(task) }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Capture probe stopped");
        }
    }
}

impl Drop for CaptureProbe {
    fn drop(&mut self) {
        self.stop();
    }
}
