#![cfg(test)]

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use crate::config::EngineConfig;
use crate::models::{MediaKind, ProgressRecord, ProgressRow, ProgressSnapshot, SessionId};
use crate::modal::MediaHost;
use crate::player::{
    CanPlay, EngineEvent, EngineEventSink, EngineFactory, MediaElement, ReadyState, StreamEngine,
};
use crate::safeguards::{DeviceEnumerator, DeviceInfo};
use crate::store::{ProgressBackend, ProgressStoreError};

/// Poll `condition` until it holds, advancing (possibly paused) tokio time between checks
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..3000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// Open/closed gate async calls can be parked on
struct Gate(watch::Sender<bool>);

impl Gate {
    fn new() -> Self {
        Self(watch::channel(false).0)
    }

    fn hold(&self) {
        self.0.send_replace(true);
    }

    fn release(&self) {
        self.0.send_replace(false);
    }

    async fn pass(&self) {
        let mut receiver = self.0.subscribe();
        let _ = receiver.wait_for(|held| !*held).await;
    }
}

/// In-memory progress table
pub struct MemoryProgressBackend {
    rows: Mutex<HashMap<(String, SessionId), ProgressRow>>,
    upserts: Mutex<Vec<ProgressRow>>,
    upsert_gate: Gate,
    fetch_gate: Gate,
    active_upserts: AtomicUsize,
    max_concurrent: AtomicUsize,
    fetches: AtomicUsize,
    next_upsert_error: Mutex<Option<ProgressStoreError>>,
    fetch_error: Mutex<Option<ProgressStoreError>>,
}

impl MemoryProgressBackend {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            upserts: Mutex::new(Vec::new()),
            upsert_gate: Gate::new(),
            fetch_gate: Gate::new(),
            active_upserts: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            next_upsert_error: Mutex::new(None),
            fetch_error: Mutex::new(None),
        }
    }

    pub fn seed(&self, username: &str, session_id: &str, last_position: u64, total_seconds: u64) {
        let snapshot = ProgressSnapshot {
            last_position: last_position as f64,
            watched_seconds: last_position as f64,
            total_seconds: total_seconds as f64,
            completed: false,
        };
        let row = ProgressRow::new(username, None, SessionId::new(session_id), &snapshot);
        self.rows
            .lock()
            .unwrap()
            .insert((username.to_string(), row.session_id.clone()), row);
    }

    pub fn hold_upserts(&self) {
        self.upsert_gate.hold();
    }

    pub fn release_upserts(&self) {
        self.upsert_gate.release();
    }

    pub fn hold_fetches(&self) {
        self.fetch_gate.hold();
    }

    pub fn release_fetches(&self) {
        self.fetch_gate.release();
    }

    pub fn fail_next_upsert(&self, error: ProgressStoreError) {
        *self.next_upsert_error.lock().unwrap() = Some(error);
    }

    pub fn fail_fetches(&self, error: ProgressStoreError) {
        *self.fetch_error.lock().unwrap() = Some(error);
    }

    /// Successful upserts, in the order they landed
    pub fn upserts(&self) -> Vec<ProgressRow> {
        self.upserts.lock().unwrap().clone()
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.lock().unwrap().len()
    }

    pub fn max_concurrent_upserts(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn stored(&self, username: &str, session_id: &SessionId) -> Option<ProgressRow> {
        self.rows
            .lock()
            .unwrap()
            .get(&(username.to_string(), session_id.clone()))
            .cloned()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    fn record(row: &ProgressRow) -> ProgressRecord {
        ProgressRecord {
            session_id: Some(row.session_id.clone()),
            course_code: row.course_code.clone(),
            last_position: row.last_position,
            watched_seconds: row.watched_seconds,
            total_seconds: row.total_seconds,
            completed: row.completed,
            updated_at: None,
        }
    }

    async fn begin_fetch(&self) -> Result<(), ProgressStoreError> {
        self.fetch_gate.pass().await;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.fetch_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProgressBackend for MemoryProgressBackend {
    async fn upsert(&self, row: &ProgressRow) -> Result<(), ProgressStoreError> {
        self.upsert_gate.pass().await;

        let active = self.active_upserts.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(active, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.active_upserts.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = self.next_upsert_error.lock().unwrap().take() {
            return Err(error);
        }

        self.rows
            .lock()
            .unwrap()
            .insert((row.username.clone(), row.session_id.clone()), row.clone());
        self.upserts.lock().unwrap().push(row.clone());
        Ok(())
    }

    async fn fetch(
        &self,
        username: &str,
        session_id: &SessionId,
    ) -> Result<Option<ProgressRecord>, ProgressStoreError> {
        self.begin_fetch().await?;
        Ok(self.stored(username, session_id).as_ref().map(Self::record))
    }

    async fn fetch_many(
        &self,
        username: &str,
        session_ids: &[SessionId],
    ) -> Result<Vec<ProgressRecord>, ProgressStoreError> {
        self.begin_fetch().await?;
        Ok(session_ids
            .iter()
            .filter_map(|id| self.stored(username, id))
            .map(|row| Self::record(&row))
            .collect())
    }
}

#[derive(Debug, Default)]
struct ElementState {
    ready_state: ReadyState,
    current_time: f64,
    duration: f64,
    source: Option<String>,
    playback_rate: f64,
    paused: bool,
    seeks: Vec<f64>,
    load_calls: usize,
    play_calls: usize,
    pause_calls: usize,
}

/// Media element whose state is set by the test
pub struct FakeMediaElement {
    state: Mutex<ElementState>,
    native_manifest: bool,
    refuse_play: AtomicBool,
}

impl FakeMediaElement {
    pub fn new() -> Self {
        Self::build(false)
    }

    pub fn with_native_manifest_support() -> Self {
        Self::build(true)
    }

    fn build(native_manifest: bool) -> Self {
        Self {
            state: Mutex::new(ElementState {
                duration: f64::NAN,
                playback_rate: 1.0,
                paused: true,
                ..Default::default()
            }),
            native_manifest,
            refuse_play: AtomicBool::new(false),
        }
    }

    pub fn set_ready(&self, ready_state: ReadyState, duration: f64) {
        let mut state = self.state.lock().unwrap();
        state.ready_state = ready_state;
        state.duration = duration;
    }

    /// Move the playhead without recording a seek
    pub fn set_time(&self, seconds: f64) {
        self.state.lock().unwrap().current_time = seconds;
    }

    pub fn refuse_play(&self, refuse: bool) {
        self.refuse_play.store(refuse, Ordering::SeqCst);
    }

    pub fn source(&self) -> Option<String> {
        self.state.lock().unwrap().source.clone()
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.state.lock().unwrap().seeks.clone()
    }

    pub fn load_calls(&self) -> usize {
        self.state.lock().unwrap().load_calls
    }

    pub fn play_calls(&self) -> usize {
        self.state.lock().unwrap().play_calls
    }

    pub fn pause_calls(&self) -> usize {
        self.state.lock().unwrap().pause_calls
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    pub fn playback_rate(&self) -> f64 {
        self.state.lock().unwrap().playback_rate
    }
}

impl MediaElement for FakeMediaElement {
    fn ready_state(&self) -> ReadyState {
        self.state.lock().unwrap().ready_state
    }

    fn current_time(&self) -> f64 {
        self.state.lock().unwrap().current_time
    }

    fn duration(&self) -> f64 {
        self.state.lock().unwrap().duration
    }

    fn set_current_time(&self, seconds: f64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.current_time = seconds;
        state.seeks.push(seconds);
        Ok(())
    }

    fn play(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.play_calls += 1;
        if self.refuse_play.load(Ordering::SeqCst) {
            anyhow::bail!("play() was refused");
        }
        state.paused = false;
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.state.lock().unwrap();
        state.pause_calls += 1;
        state.paused = true;
    }

    fn set_source(&self, url: Option<&str>) {
        self.state.lock().unwrap().source = url.map(str::to_string);
    }

    fn load(&self) {
        self.state.lock().unwrap().load_calls += 1;
    }

    fn can_play_type(&self, mime: &str) -> CanPlay {
        if self.native_manifest && mime.contains("mpegurl") {
            CanPlay::Maybe
        } else {
            CanPlay::No
        }
    }

    fn set_playback_rate(&self, rate: f64) {
        self.state.lock().unwrap().playback_rate = rate;
    }
}

/// What one fake engine instance was asked to do
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakeEngineState {
    pub attached: bool,
    pub source: Option<String>,
    pub start_loads: usize,
    pub media_recoveries: usize,
    pub destroyed: bool,
}

struct FakeEngine {
    index: usize,
    engines: Arc<Mutex<Vec<FakeEngineState>>>,
}

impl FakeEngine {
    fn update(&self, f: impl FnOnce(&mut FakeEngineState)) {
        if let Some(state) = self.engines.lock().unwrap().get_mut(self.index) {
            f(state);
        }
    }
}

impl StreamEngine for FakeEngine {
    fn attach_media(&mut self, _element: Arc<dyn MediaElement>) -> Result<()> {
        self.update(|s| s.attached = true);
        Ok(())
    }

    fn load_source(&mut self, url: &str) -> Result<()> {
        self.update(|s| s.source = Some(url.to_string()));
        Ok(())
    }

    fn start_load(&mut self) {
        self.update(|s| s.start_loads += 1);
    }

    fn recover_media_error(&mut self) {
        self.update(|s| s.media_recoveries += 1);
    }

    fn destroy(&mut self) {
        self.update(|s| s.destroyed = true);
    }
}

pub struct FakeEngineFactory {
    supported: bool,
    fail_next: AtomicBool,
    engines: Arc<Mutex<Vec<FakeEngineState>>>,
    configs: Mutex<Vec<EngineConfig>>,
    sinks: Mutex<Vec<EngineEventSink>>,
}

impl FakeEngineFactory {
    fn build(supported: bool) -> Self {
        Self {
            supported,
            fail_next: AtomicBool::new(false),
            engines: Arc::new(Mutex::new(Vec::new())),
            configs: Mutex::new(Vec::new()),
            sinks: Mutex::new(Vec::new()),
        }
    }

    pub fn supported() -> Self {
        Self::build(true)
    }

    pub fn unsupported() -> Self {
        Self::build(false)
    }

    pub fn fail_next_create(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn created_count(&self) -> usize {
        self.engines.lock().unwrap().len()
    }

    pub fn engine(&self, index: usize) -> FakeEngineState {
        self.engines.lock().unwrap()[index].clone()
    }

    pub fn configs(&self) -> Vec<EngineConfig> {
        self.configs.lock().unwrap().clone()
    }

    pub fn live_engines(&self) -> usize {
        self.engines
            .lock()
            .unwrap()
            .iter()
            .filter(|e| !e.destroyed)
            .count()
    }

    /// Raise `event` from the engine created `index`-th
    pub fn emit(&self, index: usize, event: EngineEvent) {
        let sink = self.sinks.lock().unwrap()[index].clone();
        sink(event);
    }
}

impl EngineFactory for FakeEngineFactory {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn create(
        &self,
        config: &EngineConfig,
        events: EngineEventSink,
    ) -> Result<Box<dyn StreamEngine>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            anyhow::bail!("engine failed to start");
        }

        let mut engines = self.engines.lock().unwrap();
        engines.push(FakeEngineState::default());
        self.configs.lock().unwrap().push(config.clone());
        self.sinks.lock().unwrap().push(events);

        Ok(Box::new(FakeEngine {
            index: engines.len() - 1,
            engines: self.engines.clone(),
        }))
    }
}

pub struct FakeDeviceEnumerator {
    devices: Mutex<Vec<DeviceInfo>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FakeDeviceEnumerator {
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_devices(&self, devices: Vec<DeviceInfo>) {
        *self.devices.lock().unwrap() = devices;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceEnumerator for FakeDeviceEnumerator {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("device enumeration denied");
        }
        Ok(self.devices.lock().unwrap().clone())
    }
}

/// Host with one reusable element per media kind
pub struct FakeMediaHost {
    video: Arc<FakeMediaElement>,
    audio: Arc<FakeMediaElement>,
    mounts: AtomicUsize,
    unmounts: AtomicUsize,
    fullscreen_requests: AtomicUsize,
    fullscreen_exits: AtomicUsize,
    refuse_fullscreen: AtomicBool,
}

impl FakeMediaHost {
    pub fn new() -> Self {
        Self {
            video: Arc::new(FakeMediaElement::new()),
            audio: Arc::new(FakeMediaElement::new()),
            mounts: AtomicUsize::new(0),
            unmounts: AtomicUsize::new(0),
            fullscreen_requests: AtomicUsize::new(0),
            fullscreen_exits: AtomicUsize::new(0),
            refuse_fullscreen: AtomicBool::new(false),
        }
    }

    pub fn video(&self) -> Arc<FakeMediaElement> {
        self.video.clone()
    }

    pub fn audio(&self) -> Arc<FakeMediaElement> {
        self.audio.clone()
    }

    pub fn mount_count(&self) -> usize {
        self.mounts.load(Ordering::SeqCst)
    }

    pub fn unmount_count(&self) -> usize {
        self.unmounts.load(Ordering::SeqCst)
    }

    pub fn fullscreen_requests(&self) -> usize {
        self.fullscreen_requests.load(Ordering::SeqCst)
    }

    pub fn fullscreen_exits(&self) -> usize {
        self.fullscreen_exits.load(Ordering::SeqCst)
    }

    pub fn refuse_fullscreen(&self, refuse: bool) {
        self.refuse_fullscreen.store(refuse, Ordering::SeqCst);
    }
}

impl MediaHost for FakeMediaHost {
    fn mount(&self, kind: MediaKind) -> Arc<dyn MediaElement> {
        self.mounts.fetch_add(1, Ordering::SeqCst);
        match kind {
            MediaKind::Video => self.video.clone(),
            MediaKind::Audio => self.audio.clone(),
        }
    }

    fn unmount(&self, _kind: MediaKind) {
        self.unmounts.fetch_add(1, Ordering::SeqCst);
    }

    fn request_fullscreen(&self) -> Result<()> {
        if self.refuse_fullscreen.load(Ordering::SeqCst) {
            anyhow::bail!("fullscreen not allowed");
        }
        self.fullscreen_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn exit_fullscreen(&self) -> Result<()> {
        self.fullscreen_exits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_round_trips_rows() {
        let backend = MemoryProgressBackend::new();
        backend.seed("sara", "s1", 30, 120);

        let record = backend
            .fetch("sara", &SessionId::new("s1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.last_position, 30);
        assert_eq!(record.watched_seconds, 30);
        assert!(backend.fetch("omar", &SessionId::new("s1")).await.unwrap().is_none());
        assert_eq!(backend.fetch_count(), 2);
    }
}
