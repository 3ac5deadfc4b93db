#![allow(dead_code)]

pub mod mocks;

use mocks::{MockDeviceEnumerator, MockEngineFactory, MockMediaHost, MockProgressBackend};
use nilplayer::config::Config;
use nilplayer::events::EventBus;
use nilplayer::local::{LocalResume, MemoryKeyValueStore};
use nilplayer::modal::{
    IdentityGate, MediaEvent, ModalController, ModalHandle, ModalPhase, ModalServices,
};
use nilplayer::player::ReadyState;
use nilplayer::store::ProgressStore;
use std::sync::Arc;
use std::time::Duration;

/// A running modal controller wired to in-memory collaborators
pub struct TestContext {
    pub handle: ModalHandle,
    pub backend: Arc<MockProgressBackend>,
    pub store: ProgressStore,
    pub kv: Arc<MemoryKeyValueStore>,
    pub bus: Arc<EventBus>,
    pub identity: IdentityGate,
    pub engines: Arc<MockEngineFactory>,
    pub devices: Arc<MockDeviceEnumerator>,
    pub host: Arc<MockMediaHost>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let backend = Arc::new(MockProgressBackend::new());
        let bus = Arc::new(EventBus::new(64));
        let store = ProgressStore::new(backend.clone()).with_event_bus(bus.clone());
        let kv = Arc::new(MemoryKeyValueStore::new());
        let identity = IdentityGate::new();
        let engines = Arc::new(MockEngineFactory::new());
        let devices = Arc::new(MockDeviceEnumerator::new());
        let host = Arc::new(MockMediaHost::new());

        let services = ModalServices {
            store: store.clone(),
            local: LocalResume::new(kv.clone()),
            cache: None,
            bus: bus.clone(),
            identity: identity.clone(),
            engines: engines.clone(),
            devices: devices.clone(),
            host: host.clone(),
        };
        let (handle, controller) = ModalController::new(&config, services);
        tokio::spawn(controller.run());

        Self {
            handle,
            backend,
            store,
            kv,
            bus,
            identity,
            engines,
            devices,
            host,
        }
    }

    /// Deliver metadata on the video element and wait until playback has started
    pub async fn start_video(&self, duration: f64) {
        self.host.video.set_ready(ReadyState::HaveMetadata, duration);
        self.handle.media_event(MediaEvent::LoadedMetadata).unwrap();
        self.wait_for_phase(ModalPhase::Playing).await;
        self.settle().await;
    }

    pub async fn start_audio(&self, duration: f64) {
        self.host.audio.set_ready(ReadyState::HaveMetadata, duration);
        self.handle.media_event(MediaEvent::CanPlay).unwrap();
        self.wait_for_phase(ModalPhase::Playing).await;
        self.settle().await;
    }

    pub async fn wait_for_phase(&self, phase: ModalPhase) {
        wait_until(|| self.handle.view().phase == phase).await;
    }

    /// Wait until the controller has handled everything sent so far and no save is in flight
    pub async fn settle(&self) {
        self.handle.flush().await.unwrap();
        wait_until(|| self.store.in_flight() == 0).await;
    }
}

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
