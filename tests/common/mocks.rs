use anyhow::Result;
use async_trait::async_trait;
use nilplayer::config::EngineConfig;
use nilplayer::modal::MediaHost;
use nilplayer::models::{MediaKind, ProgressRecord, ProgressRow, SessionId};
use nilplayer::player::{
    CanPlay, EngineEvent, EngineEventSink, EngineFactory, MediaElement, ReadyState, StreamEngine,
};
use nilplayer::safeguards::{DeviceEnumerator, DeviceInfo};
use nilplayer::store::{ProgressBackend, ProgressStoreError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub struct MockProgressBackend {
    rows: Mutex<HashMap<(String, SessionId), ProgressRow>>,
    upserts: Mutex<Vec<ProgressRow>>,
    fetches: AtomicUsize,
}

impl MockProgressBackend {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            upserts: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn seed(&self, username: &str, session_id: &str, last_position: u64, total_seconds: u64) {
        let row = ProgressRow {
            username: username.to_string(),
            course_code: None,
            session_id: SessionId::new(session_id),
            last_position,
            watched_seconds: last_position,
            total_seconds,
            completed: false,
        };
        self.rows
            .lock()
            .unwrap()
            .insert((username.to_string(), row.session_id.clone()), row);
    }

    pub fn upserts(&self) -> Vec<ProgressRow> {
        self.upserts.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn stored(&self, username: &str, session_id: &str) -> Option<ProgressRow> {
        self.rows
            .lock()
            .unwrap()
            .get(&(username.to_string(), SessionId::new(session_id)))
            .cloned()
    }

    fn record(row: ProgressRow) -> ProgressRecord {
        ProgressRecord {
            session_id: Some(row.session_id),
            course_code: row.course_code,
            last_position: row.last_position,
            watched_seconds: row.watched_seconds,
            total_seconds: row.total_seconds,
            completed: row.completed,
            updated_at: None,
        }
    }
}

#[async_trait]
impl ProgressBackend for MockProgressBackend {
    async fn upsert(&self, row: &ProgressRow) -> Result<(), ProgressStoreError> {
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
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let row = self
            .rows
            .lock()
            .unwrap()
            .get(&(username.to_string(), session_id.clone()))
            .cloned();
        Ok(row.map(Self::record))
    }

    async fn fetch_many(
        &self,
        username: &str,
        session_ids: &[SessionId],
    ) -> Result<Vec<ProgressRecord>, ProgressStoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.lock().unwrap();
        Ok(session_ids
            .iter()
            .filter_map(|id| rows.get(&(username.to_string(), id.clone())).cloned())
            .map(Self::record)
            .collect())
    }
}

#[derive(Default)]
struct ElementState {
    ready_state: ReadyState,
    current_time: f64,
    duration: f64,
    source: Option<String>,
    seeks: Vec<f64>,
    play_calls: usize,
    pause_calls: usize,
}

pub struct MockMediaElement {
    state: Mutex<ElementState>,
}

impl MockMediaElement {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ElementState::default()),
        }
    }

    pub fn set_ready(&self, ready_state: ReadyState, duration: f64) {
        let mut state = self.state.lock().unwrap();
        state.ready_state = ready_state;
        state.duration = duration;
    }

    pub fn set_time(&self, seconds: f64) {
        self.state.lock().unwrap().current_time = seconds;
    }

    pub fn source(&self) -> Option<String> {
        self.state.lock().unwrap().source.clone()
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.state.lock().unwrap().seeks.clone()
    }

    pub fn play_calls(&self) -> usize {
        self.state.lock().unwrap().play_calls
    }

    pub fn pause_calls(&self) -> usize {
        self.state.lock().unwrap().pause_calls
    }
}

impl MediaElement for MockMediaElement {
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
        self.state.lock().unwrap().play_calls += 1;
        Ok(())
    }

    fn pause(&self) {
        self.state.lock().unwrap().pause_calls += 1;
    }

    fn set_source(&self, url: Option<&str>) {
        self.state.lock().unwrap().source = url.map(str::to_string);
    }

    fn load(&self) {}

    fn can_play_type(&self, _mime: &str) -> CanPlay {
        CanPlay::No
    }

    fn set_playback_rate(&self, _rate: f64) {}
}

struct MockEngine {
    index: usize,
    destroyed: Arc<Mutex<Vec<bool>>>,
}

impl StreamEngine for MockEngine {
    fn attach_media(&mut self, _element: Arc<dyn MediaElement>) -> Result<()> {
        Ok(())
    }

    fn load_source(&mut self, _url: &str) -> Result<()> {
        Ok(())
    }

    fn start_load(&mut self) {}

    fn recover_media_error(&mut self) {}

    fn destroy(&mut self) {
        self.destroyed.lock().unwrap()[self.index] = true;
    }
}

/// Engine factory that records every engine it hands out
pub struct MockEngineFactory {
    destroyed: Arc<Mutex<Vec<bool>>>,
    sinks: Mutex<Vec<EngineEventSink>>,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self {
            destroyed: Arc::new(Mutex::new(Vec::new())),
            sinks: Mutex::new(Vec::new()),
        }
    }

    pub fn created_count(&self) -> usize {
        self.destroyed.lock().unwrap().len()
    }

    pub fn live_engines(&self) -> usize {
        self.destroyed.lock().unwrap().iter().filter(|d| !**d).count()
    }

    pub fn emit(&self, index: usize, event: EngineEvent) {
        let sink = self.sinks.lock().unwrap()[index].clone();
        sink(event);
    }
}

impl EngineFactory for MockEngineFactory {
    fn is_supported(&self) -> bool {
        true
    }

    fn create(
        &self,
        _config: &EngineConfig,
        events: EngineEventSink,
    ) -> Result<Box<dyn StreamEngine>> {
        let mut destroyed = self.destroyed.lock().unwrap();
        destroyed.push(false);
        self.sinks.lock().unwrap().push(events);
        Ok(Box::new(MockEngine {
            index: destroyed.len() - 1,
            destroyed: self.destroyed.clone(),
        }))
    }
}

pub struct MockDeviceEnumerator {
    devices: Mutex<Vec<DeviceInfo>>,
}

impl MockDeviceEnumerator {
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(Vec::new()),
        }
    }

    pub fn set_devices(&self, devices: Vec<DeviceInfo>) {
        *self.devices.lock().unwrap() = devices;
    }
}

#[async_trait]
impl DeviceEnumerator for MockDeviceEnumerator {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.devices.lock().unwrap().clone())
    }
}

pub struct MockMediaHost {
    pub video: Arc<MockMediaElement>,
    pub audio: Arc<MockMediaElement>,
    mounts: AtomicUsize,
    unmounts: AtomicUsize,
}

impl MockMediaHost {
    pub fn new() -> Self {
        Self {
            video: Arc::new(MockMediaElement::new()),
            audio: Arc::new(MockMediaElement::new()),
            mounts: AtomicUsize::new(0),
            unmounts: AtomicUsize::new(0),
        }
    }

    pub fn mount_count(&self) -> usize {
        self.mounts.load(Ordering::SeqCst)
    }

    pub fn unmount_count(&self) -> usize {
        self.unmounts.load(Ordering::SeqCst)
    }
}

impl MediaHost for MockMediaHost {
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
        Ok(())
    }

    fn exit_fullscreen(&self) -> Result<()> {
        Ok(())
    }
}
