use chrono::{DateTime, Local};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Overlay text and where to draw it, as percentages of the player box
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watermark {
    pub text: String,
    pub top_percent: u8,
    pub left_percent: u8,
}

impl Watermark {
    pub fn new(username: &str, at: DateTime<Local>) -> Self {
        let mut rng = rand::rng();
        Self {
            text: format!("{} • {}", username, at.format("%Y-%m-%d %H:%M:%S")),
            top_percent: rng.random_range(10..80),
            left_percent: rng.random_range(10..80),
        }
    }
}

/// Receives the watermark to show, or `None` to hide it
pub type WatermarkSink = Arc<dyn Fn(Option<Watermark>) + Send + Sync>;

/// Shows a watermark immediately and again every period, hiding it after `visible`
pub struct WatermarkScheduler {
    task: Option<JoinHandle<()>>,
    sink: WatermarkSink,
}

impl WatermarkScheduler {
    pub fn start(
        username: String,
        period: Duration,
        visible: Duration,
        sink: WatermarkSink,
    ) -> Self {
        let task_sink = sink.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                task_sink(Some(Watermark::new(&username, Local::now())));
                tokio::time::sleep(visible).await;
                task_sink(None);
            }
        });

        debug!("Watermark scheduler started");
        Self {
            task: Some(task),
            sink,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            (self.sink)(None);
            debug!("Watermark scheduler stopped");
        }
    }
}

impl Drop for WatermarkScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
