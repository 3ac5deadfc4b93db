use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::expiry::{LinkStatus, check_link};
use super::identity::IdentityGate;
use super::state::{CloseReason, MediaEvent, ModalInput, ModalPhase, ModalView, OpenRequest};
use crate::config::{Config, EngineConfig, PlaybackConfig, SafeguardConfig};
use crate::events::{EventBus, EventType};
use crate::local::LocalResume;
use crate::models::{MediaKind, ProgressSnapshot};
use crate::player::{
    EngineEvent, EngineEventSink, EngineFactory, MediaElement, StreamAttachment, normalize_rate,
};
use crate::progress::{
    AudioResumeReporter, ProgressCache, ReporterState, ResumePoint, ResumeRequest,
    ResumeResolver, VideoProgressReporter,
};
use crate::safeguards::{
    CaptureProbe, CaptureSink, DeviceEnumerator, Watermark, WatermarkScheduler, WatermarkSink,
};
use crate::store::ProgressStore;

/// Rendering host that owns the actual audio and video elements
pub trait MediaHost: Send + Sync {
    /// Mount the element for `kind` and hand it to the controller
    fn mount(&self, kind: MediaKind) -> Arc<dyn MediaElement>;
    fn unmount(&self, kind: MediaKind);
    fn request_fullscreen(&self) -> Result<()>;
    fn exit_fullscreen(&self) -> Result<()>;
}

/// Collaborators shared by every playback session of one modal
#[derive(Clone)]
pub struct ModalServices {
    pub store: ProgressStore,
    pub local: LocalResume,
    pub cache: Option<ProgressCache>,
    pub bus: Arc<EventBus>,
    pub identity: IdentityGate,
    pub engines: Arc<dyn EngineFactory>,
    pub devices: Arc<dyn DeviceEnumerator>,
    pub host: Arc<dyn MediaHost>,
}

enum SafeguardEvent {
    Watermark(Option<Watermark>),
    Capture(bool),
}

/// Everything the controller loop reacts to. Async results carry the generation of the
/// session that started them.
enum ControllerMsg {
    Input(ModalInput),
    ResumeResolved {
        generation: u64,
        point: ResumePoint,
        username: Option<String>,
    },
    Engine {
        generation: u64,
        event: EngineEvent,
    },
    Safeguard {
        generation: u64,
        event: SafeguardEvent,
    },
    Flush {
        respond_to: oneshot::Sender<()>,
    },
}

enum Reporter {
    Video(VideoProgressReporter),
    /// Created once the resume position is known
    Audio(Option<AudioResumeReporter>),
}

/// State of the one media session live in an open modal
struct PlaybackSession {
    generation: u64,
    request: OpenRequest,
    username: Option<String>,
    element: Arc<dyn MediaElement>,
    attachment: StreamAttachment,
    reporter: Reporter,
    resume: Option<ResumePoint>,
    metadata_ready: bool,
    started: bool,
    watermark: Option<WatermarkScheduler>,
    capture: Option<CaptureProbe>,
}

impl PlaybackSession {
    fn submit(&self, store: &ProgressStore, snapshot: ProgressSnapshot) {
        let _ = store.submit(
            self.username.as_deref(),
            self.request.course_code.as_ref(),
            &self.request.session_id,
            &snapshot,
        );
    }

    /// Seek, seed the record and start playback once metadata and the resume position
    /// are both available. Returns true when playback started on this call.
    fn try_start(&mut self, store: &ProgressStore, local: &LocalResume) -> bool {
        if self.started || !self.metadata_ready {
            return false;
        }
        let Some(point) = self.resume else {
            return false;
        };

        if point.position > 0.0
            && let Err(e) = self.element.set_current_time(point.position)
        {
            warn!("Failed to seek to {}s: {:#}", point.position, e);
        }

        let initial = match &mut self.reporter {
            Reporter::Video(reporter) => {
                Some(reporter.on_metadata(self.element.duration(), point, Instant::now()))
            }
            Reporter::Audio(slot) => {
                *slot = Some(AudioResumeReporter::new(
                    local.clone(),
                    self.username.clone(),
                    self.request.session_id.clone(),
                ));
                None
            }
        };
        if let Some(snapshot) = initial {
            self.submit(store, snapshot);
        }

        if let Err(e) = self.element.play() {
            debug!("Playback did not start automatically: {:#}", e);
        }
        self.started = true;
        debug!(
            "Playback started for {} at {}s",
            self.request.session_id, point.position
        );
        true
    }

    fn on_media(&mut self, event: MediaEvent, store: &ProgressStore, local: &LocalResume) -> bool {
        let position = self.element.current_time();
        let snapshot = match (&mut self.reporter, event) {
            (_, MediaEvent::LoadedMetadata | MediaEvent::CanPlay) => {
                self.metadata_ready = true;
                return self.try_start(store, local);
            }
            (Reporter::Video(reporter), MediaEvent::TimeUpdate) => {
                reporter.on_time_update(position, Instant::now())
            }
            (Reporter::Video(reporter), MediaEvent::Playing) => {
                if reporter.state() == ReporterState::Ended {
                    reporter.on_restart();
                } else {
                    reporter.on_playing();
                }
                None
            }
            (Reporter::Video(reporter), MediaEvent::Pause) => reporter.on_pause(position),
            (Reporter::Video(reporter), MediaEvent::Ended) => reporter.on_ended(),
            (Reporter::Audio(Some(reporter)), MediaEvent::TimeUpdate) => {
                reporter.on_time_update(position);
                None
            }
            (Reporter::Audio(Some(reporter)), MediaEvent::Pause) => {
                reporter.on_pause(position);
                None
            }
            (Reporter::Audio(Some(reporter)), MediaEvent::Ended) => {
                reporter.on_ended();
                None
            }
            (Reporter::Audio(Some(reporter)), MediaEvent::Playing) => {
                reporter.on_playing();
                None
            }
            (Reporter::Audio(_), _) => None,
        };

        if let Some(snapshot) = snapshot {
            self.submit(store, snapshot);
        }
        false
    }

    /// Best-effort final snapshot from the current element position
    fn flush(&mut self, store: &ProgressStore) {
        let position = self.element.current_time();
        let snapshot = match &mut self.reporter {
            Reporter::Video(reporter) => reporter.on_unload(position),
            Reporter::Audio(Some(reporter)) => {
                reporter.on_unload(position);
                None
            }
            Reporter::Audio(None) => None,
        };
        if let Some(snapshot) = snapshot {
            self.submit(store, snapshot);
        }
    }
}

/// Actor that owns the modal's playback session and applies every input in order
pub struct ModalController {
    receiver: mpsc::UnboundedReceiver<ControllerMsg>,
    sender: mpsc::WeakUnboundedSender<ControllerMsg>,
    view: watch::Sender<ModalView>,
    services: ModalServices,
    resolver: ResumeResolver,
    playback: PlaybackConfig,
    engine: EngineConfig,
    safeguards: SafeguardConfig,
    phase: ModalPhase,
    generation: u64,
    session: Option<PlaybackSession>,
    playback_rate: f64,
    fullscreen: bool,
}

impl ModalController {
    pub fn new(config: &Config, services: ModalServices) -> (ModalHandle, ModalController) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (view, view_receiver) = watch::channel(ModalView::default());

        let mut resolver = ResumeResolver::new(services.store.clone(), services.local.clone());
        if let Some(cache) = &services.cache {
            resolver = resolver.with_cache(cache.clone());
        }

        let controller = ModalController {
            receiver,
            sender: sender.downgrade(),
            view,
            services,
            resolver,
            playback: config.playback.clone(),
            engine: config.engine.clone(),
            safeguards: config.safeguards.clone(),
            phase: ModalPhase::Closed,
            generation: 0,
            session: None,
            playback_rate: 1.0,
            fullscreen: false,
        };
        let handle = ModalHandle {
            sender,
            view: view_receiver,
        };

        (handle, controller)
    }

    /// Run the controller event loop until unmounted or every handle is dropped
    pub async fn run(mut self) {
        debug!("ModalController event loop started");

        while let Some(msg) = self.receiver.recv().await {
            if !self.dispatch(msg).await {
                break;
            }
        }

        self.close(CloseReason::Unmount).await;
        debug!("ModalController event loop stopped");
    }

    async fn dispatch(&mut self, msg: ControllerMsg) -> bool {
        match msg {
            ControllerMsg::Input(input) => return self.handle_input(input).await,
            ControllerMsg::ResumeResolved {
                generation,
                point,
                username,
            } => self.on_resume_resolved(generation, point, username),
            ControllerMsg::Engine { generation, event } => {
                self.on_engine_event(generation, event)
            }
            ControllerMsg::Safeguard { generation, event } => {
                self.on_safeguard_event(generation, event).await
            }
            ControllerMsg::Flush { respond_to } => {
                let _ = respond_to.send(());
            }
        }
        true
    }

    async fn handle_input(&mut self, input: ModalInput) -> bool {
        match input {
            ModalInput::Open(request) => self.open(request).await,
            ModalInput::Close(reason) => self.close(reason).await,
            ModalInput::Key(key) => {
                if key == "Escape" {
                    self.close(CloseReason::Escape).await;
                }
            }
            ModalInput::Media(event) => self.on_media_event(event),
            ModalInput::SetPlaybackRate(rate) => self.set_playback_rate(rate),
            ModalInput::EnterFullscreen => self.request_fullscreen(true),
            ModalInput::ExitFullscreen => self.request_fullscreen(false),
            ModalInput::FullscreenChanged(active) => self.set_fullscreen(active),
            ModalInput::PageUnload => {
                if let Some(session) = self.session.as_mut() {
                    session.flush(&self.services.store);
                }
            }
            ModalInput::Unmount => {
                self.close(CloseReason::Unmount).await;
                return false;
            }
        }
        true
    }

    async fn open(&mut self, request: OpenRequest) {
        if self.phase != ModalPhase::Closed {
            self.close(CloseReason::Reopen).await;
        }
        if request.url.trim().is_empty() {
            warn!("Ignoring open for {} without a media URL", request.session_id);
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        info!(
            "Opening {} modal for session {}",
            request.kind, request.session_id
        );

        let title = request.title.clone();
        self.view.send_modify(|view| {
            view.kind = Some(request.kind);
            view.title = title;
        });

        if check_link(&request.url, self.playback.disable_url_validation) == LinkStatus::Expired {
            warn!("Media link for {} has expired", request.session_id);
            self.set_phase(ModalPhase::Expired);
            publish(&self.services.bus, EventType::LinkExpired, &request).await;
            return;
        }

        let element = self.services.host.mount(request.kind);
        element.set_playback_rate(self.playback_rate);
        let attachment = StreamAttachment::attach(
            element.clone(),
            &request.url,
            self.services.engines.clone(),
            &self.engine,
            &self.playback.native_manifest_mime,
            engine_sink(&self.sender, generation),
        );
        let strategy = attachment.strategy();

        let reporter = match request.kind {
            MediaKind::Video => {
                let mut reporter = VideoProgressReporter::new(self.playback.report_interval());
                reporter.attach();
                Reporter::Video(reporter)
            }
            MediaKind::Audio => Reporter::Audio(None),
        };

        let username = request
            .username
            .clone()
            .filter(|u| !u.trim().is_empty());
        let display_name = username
            .clone()
            .or_else(|| self.services.identity.current().map(|i| i.username));

        let watermark = display_name.map(|name| {
            WatermarkScheduler::start(
                name,
                self.safeguards.watermark_period(),
                self.safeguards.watermark_visible(),
                watermark_sink(&self.sender, generation),
            )
        });
        let capture = CaptureProbe::start(
            self.services.devices.clone(),
            self.safeguards.capture_probe_period(),
            self.safeguards.capture_label_hint.clone(),
            capture_sink(&self.sender, generation),
        );

        self.spawn_resume(generation, &request, username.clone());

        self.session = Some(PlaybackSession {
            generation,
            request: request.clone(),
            username,
            element,
            attachment,
            reporter,
            resume: None,
            metadata_ready: false,
            started: false,
            watermark,
            capture: Some(capture),
        });

        self.view.send_modify(|view| view.strategy = Some(strategy));
        self.set_phase(ModalPhase::Open);
        publish(&self.services.bus, EventType::ModalOpened, &request).await;
    }

    fn spawn_resume(&self, generation: u64, request: &OpenRequest, username: Option<String>) {
        let Some(sender) = self.sender.upgrade() else {
            return;
        };
        let resolver = self.resolver.clone();
        let identity = self.services.identity.clone();
        let identity_wait = self.playback.identity_wait();
        let kind = request.kind;
        let explicit_start = request.initial_time;
        let session_id = request.session_id.clone();

        tokio::spawn(async move {
            let username = match username {
                Some(username) => Some(username),
                None => identity.wait(identity_wait).await.map(|i| i.username),
            };
            let point = resolver
                .resolve(&ResumeRequest {
                    kind,
                    explicit_start,
                    username: username.as_deref(),
                    session_id: &session_id,
                })
                .await;

            let _ = sender.send(ControllerMsg::ResumeResolved {
                generation,
                point,
                username,
            });
        });
    }

    fn on_resume_resolved(
        &mut self,
        generation: u64,
        point: ResumePoint,
        username: Option<String>,
    ) {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|session| session.generation == generation)
        else {
            debug!("Discarding resume position for a closed session");
            return;
        };

        debug!(
            "Resume position for {} resolved to {}s",
            session.request.session_id, point.position
        );
        session.resume = Some(point);
        if session.username.is_none() {
            session.username = username;
        }
        if session.element.ready_state().has_metadata() {
            session.metadata_ready = true;
        }

        if session.watermark.is_none()
            && let Some(name) = session.username.clone()
        {
            session.watermark = Some(WatermarkScheduler::start(
                name,
                self.safeguards.watermark_period(),
                self.safeguards.watermark_visible(),
                watermark_sink(&self.sender, generation),
            ));
        }

        if session.try_start(&self.services.store, &self.services.local) {
            self.set_phase(ModalPhase::Playing);
        }
    }

    fn on_media_event(&mut self, event: MediaEvent) {
        let Some(session) = self.session.as_mut() else {
            trace!("Media event {:?} without a live session", event);
            return;
        };
        if session.on_media(event, &self.services.store, &self.services.local) {
            self.set_phase(ModalPhase::Playing);
        }
    }

    fn on_engine_event(&mut self, generation: u64, event: EngineEvent) {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|session| session.generation == generation)
        else {
            trace!("Discarding engine event from a previous session");
            return;
        };

        match event {
            EngineEvent::ManifestParsed => {
                if !session.element.ready_state().has_metadata() {
                    return;
                }
                session.metadata_ready = true;
                if session.try_start(&self.services.store, &self.services.local) {
                    self.set_phase(ModalPhase::Playing);
                }
            }
            EngineEvent::Error(error) => {
                let action = session.attachment.handle_error(&error);
                debug!("Stream error handled with {:?}", action);
            }
        }
    }

    async fn on_safeguard_event(&mut self, generation: u64, event: SafeguardEvent) {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|session| session.generation == generation)
        else {
            return;
        };

        match event {
            SafeguardEvent::Watermark(mark) => {
                self.view.send_modify(|view| view.watermark = mark);
            }
            SafeguardEvent::Capture(suspected) => {
                if suspected && session.request.kind == MediaKind::Video {
                    session.element.pause();
                }
                let request = session.request.clone();
                let was_warned = self.view.borrow().capture_warning;
                self.view
                    .send_modify(|view| view.capture_warning = suspected);

                if suspected && !was_warned {
                    warn!("Screen capture suspected during {}", request.session_id);
                    publish(&self.services.bus, EventType::CaptureSuspected, &request).await;
                }
            }
        }
    }

    fn set_playback_rate(&mut self, rate: f64) {
        let Some(rate) = normalize_rate(rate) else {
            warn!("Ignoring invalid playback rate {}", rate);
            return;
        };
        self.playback_rate = rate;
        if let Some(session) = &self.session {
            session.element.set_playback_rate(rate);
        }
        self.view.send_modify(|view| view.playback_rate = rate);
    }

    fn request_fullscreen(&mut self, enter: bool) {
        if self.session.is_none() {
            debug!("Fullscreen request without media ignored");
            return;
        }
        let result = if enter {
            self.services.host.request_fullscreen()
        } else {
            self.services.host.exit_fullscreen()
        };
        match result {
            Ok(()) => self.set_fullscreen(enter),
            Err(e) => warn!("Fullscreen request failed: {:#}", e),
        }
    }

    fn set_fullscreen(&mut self, active: bool) {
        self.fullscreen = active;
        self.view.send_modify(|view| view.fullscreen = active);
    }

    /// Tear down whatever is open. Closing an already closed modal does nothing.
    async fn close(&mut self, reason: CloseReason) {
        if self.phase == ModalPhase::Closed {
            trace!("Close ({:?}) ignored, modal already closed", reason);
            return;
        }
        info!("Closing modal ({:?})", reason);
        self.generation += 1;

        if let Some(session) = self.session.take() {
            self.teardown(session).await;
        }

        if self.fullscreen {
            if let Err(e) = self.services.host.exit_fullscreen() {
                debug!("Failed to leave fullscreen: {:#}", e);
            }
            self.fullscreen = false;
        }

        let playback_rate = self.playback_rate;
        self.phase = ModalPhase::Closed;
        self.view.send_replace(ModalView {
            playback_rate,
            ..ModalView::default()
        });
    }

    async fn teardown(&mut self, mut session: PlaybackSession) {
        if let Some(mut watermark) = session.watermark.take() {
            watermark.stop();
        }
        if let Some(mut capture) = session.capture.take() {
            capture.stop();
        }

        if matches!(session.reporter, Reporter::Video(_)) {
            session.flush(&self.services.store);
        }

        session.attachment.destroy();
        self.services.host.unmount(session.request.kind);

        if let Err(e) = self
            .services
            .bus
            .emit_refresh_requested(
                session.request.session_id.clone(),
                session.request.course_code.clone(),
                session.username.clone().unwrap_or_default(),
            )
            .await
        {
            debug!("Failed to request progress refresh: {}", e);
        }
    }

    fn set_phase(&mut self, phase: ModalPhase) {
        self.phase = phase;
        self.view.send_modify(|view| view.phase = phase);
    }
}

async fn publish(bus: &EventBus, event_type: EventType, request: &OpenRequest) {
    if let Err(e) = bus
        .emit_modal_event(
            event_type,
            request.session_id.clone(),
            request.course_code.clone(),
            request.kind,
        )
        .await
    {
        debug!("Failed to publish {}: {}", event_type.as_str(), e);
    }
}

fn engine_sink(sender: &mpsc::WeakUnboundedSender<ControllerMsg>, generation: u64) -> EngineEventSink {
    let sender = sender.clone();
    Arc::new(move |event| {
        if let Some(sender) = sender.upgrade() {
            let _ = sender.send(ControllerMsg::Engine { generation, event });
        }
    })
}

fn watermark_sink(
    sender: &mpsc::WeakUnboundedSender<ControllerMsg>,
    generation: u64,
) -> WatermarkSink {
    let sender = sender.clone();
    Arc::new(move |mark| {
        if let Some(sender) = sender.upgrade() {
            let _ = sender.send(ControllerMsg::Safeguard {
                generation,
                event: SafeguardEvent::Watermark(mark),
            });
        }
    })
}

fn capture_sink(sender: &mpsc::WeakUnboundedSender<ControllerMsg>, generation: u64) -> CaptureSink {
    let sender = sender.clone();
    Arc::new(move |suspected| {
        if let Some(sender) = sender.upgrade() {
            let _ = sender.send(ControllerMsg::Safeguard {
                generation,
                event: SafeguardEvent::Capture(suspected),
            });
        }
    })
}

/// Handle for driving a [`ModalController`]
#[derive(Clone)]
pub struct ModalHandle {
    sender: mpsc::UnboundedSender<ControllerMsg>,
    view: watch::Receiver<ModalView>,
}

impl ModalHandle {
    pub fn send(&self, input: ModalInput) -> Result<()> {
        self.sender
            .send(ControllerMsg::Input(input))
            .map_err(|_| anyhow::anyhow!("Modal controller disconnected"))
    }

    pub fn open(&self, request: OpenRequest) -> Result<()> {
        self.send(ModalInput::Open(request))
    }

    pub fn close(&self, reason: CloseReason) -> Result<()> {
        self.send(ModalInput::Close(reason))
    }

    pub fn key(&self, key: &str) -> Result<()> {
        self.send(ModalInput::Key(key.to_string()))
    }

    pub fn media_event(&self, event: MediaEvent) -> Result<()> {
        self.send(ModalInput::Media(event))
    }

    pub fn set_playback_rate(&self, rate: f64) -> Result<()> {
        self.send(ModalInput::SetPlaybackRate(rate))
    }

    pub fn enter_fullscreen(&self) -> Result<()> {
        self.send(ModalInput::EnterFullscreen)
    }

    pub fn exit_fullscreen(&self) -> Result<()> {
        self.send(ModalInput::ExitFullscreen)
    }

    pub fn fullscreen_changed(&self, active: bool) -> Result<()> {
        self.send(ModalInput::FullscreenChanged(active))
    }

    pub fn page_unload(&self) -> Result<()> {
        self.send(ModalInput::PageUnload)
    }

    pub fn unmount(&self) -> Result<()> {
        self.send(ModalInput::Unmount)
    }

    /// Resolves once every message sent before it has been handled
    pub async fn flush(&self) -> Result<()> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(ControllerMsg::Flush { respond_to })
            .map_err(|_| anyhow::anyhow!("Modal controller disconnected"))?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("Failed to receive response from modal controller"))
    }

    pub fn view(&self) -> ModalView {
        self.view.borrow().clone()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<ModalView> {
        self.view.clone()
    }
}
