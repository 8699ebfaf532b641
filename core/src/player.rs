//! Dual-route streaming playback
//!
//! One background thread per session streams a [`PcmBuffer`] in fixed-size
//! chunks to a primary output and, when mirroring, to a monitor output in
//! the same iteration. Session lifecycle:
//!
//! ```text
//! Idle → Streaming → Stopping → Idle
//!            └──────────────────↗  (all samples written or write failure)
//! ```
//!
//! `stop` only ever moves `Streaming → Stopping`; the streaming thread
//! performs the final move to `Idle` after releasing both outputs.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::config::PlaybackConfig;
use crate::device::{select_routes, OutputDevice, RouteDescriptor, RouteReport};
use crate::error::{Result, TapecastError};
use crate::pcm::PcmBuffer;

/// Stream parameters requested from a backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinkSpec {
    /// Mono signed 16-bit samples at this rate
    pub sample_rate: u32,
    /// Linear gain applied by the sink, 1.0 for full scale
    pub gain: f32,
}

/// An open streaming output bound to one physical device
///
/// Released on drop. Sinks live on the streaming thread and need not be `Send`.
pub trait AudioSink {
    fn start(&mut self) -> Result<()>;

    /// Queue `samples`, blocking until the platform accepts all of them
    fn write(&mut self, samples: &[i16]) -> Result<()>;

    /// Device the stream is actually bound to, read back from the platform
    fn routed_device(&self) -> Option<RouteDescriptor>;

    /// Wait for queued samples to play out
    fn drain(&mut self);

    fn stop(&mut self);
}

/// Source of output devices and sinks
pub trait AudioBackend: Send + Sync + 'static {
    fn output_devices(&self) -> Result<Vec<OutputDevice>>;

    /// Open a sink on `target`, or on the best available output when `None`
    fn open(&self, target: Option<&OutputDevice>, spec: &SinkSpec) -> Result<Box<dyn AudioSink>>;
}

/// How a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackOutcome {
    Completed,
    Stopped,
    Failed(TapecastError),
}

/// Session notifications
///
/// All methods are called from the streaming thread, not the caller's
/// thread. Implementations marshal to their own thread if needed and must
/// not call [`DualRoutePlayer::play`] synchronously.
pub trait PlaybackObserver: Send + Sync {
    /// Labels of the devices actually bound; re-sent periodically
    fn on_route(&self, routes: &RouteReport);

    /// Fraction of samples written, non-decreasing, ending at 1.0 on completion
    fn on_progress(&self, progress: f32);

    /// Called exactly once per started session
    fn on_end(&self, outcome: &PlaybackOutcome);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Streaming = 1,
    Stopping = 2,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Streaming,
            2 => SessionState::Stopping,
            _ => SessionState::Idle,
        }
    }
}

/// One playback session. Obtained from [`DualRoutePlayer::play`].
pub struct Session {
    id: u64,
    state: AtomicU8,
    outcome: Mutex<Option<PlaybackOutcome>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    fn new(id: u64) -> Self {
        Self {
            id,
            state: AtomicU8::new(SessionState::Idle as u8),
            outcome: Mutex::new(None),
            thread: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// True until the streaming thread has released its outputs
    pub fn is_active(&self) -> bool {
        self.state() != SessionState::Idle
    }

    /// Outcome delivered to `on_end`, once the session has ended
    pub fn outcome(&self) -> Option<PlaybackOutcome> {
        self.outcome.lock().clone()
    }

    /// Request cooperative cancellation at the next chunk boundary
    ///
    /// No-op unless the session is streaming.
    pub fn stop(&self) {
        let stopped = self
            .state
            .compare_exchange(
                SessionState::Streaming as u8,
                SessionState::Stopping as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if stopped {
            log::debug!("Session {} stopping", self.id);
        }
    }

    /// Join the streaming thread
    ///
    /// Returns immediately when called from the streaming thread itself
    /// (for example from an observer callback).
    pub fn wait(&self) {
        let handle = {
            let mut guard = self.thread.lock();
            match guard.as_ref() {
                Some(h) if h.thread().id() == thread::current().id() => return,
                _ => guard.take(),
            }
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Playback thread of session {} panicked", self.id);
            }
        }
    }

    fn should_continue(&self) -> bool {
        self.state() == SessionState::Streaming
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// The session currently allowed to hold outputs, across all players
static ACTIVE: Mutex<Option<Weak<Session>>> = Mutex::new(None);

/// Serializes `play` across all players in the process
static PLAY_LOCK: Mutex<()> = Mutex::new(());

/// Stop and join the process-wide active session, if it is still alive
fn release_active() {
    let previous = ACTIVE.lock().take().and_then(|weak| weak.upgrade());
    if let Some(previous) = previous {
        log::debug!("Releasing session {} before starting a new one", previous.id);
        previous.stop();
        previous.wait();
    }
}

/// Returns the session to `Idle` however the streaming thread exits
struct IdleOnDrop<'a>(&'a Session);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set_state(SessionState::Idle);
    }
}

/// Streams PCM to a primary output and an optional monitor output
///
/// At most one session is active per process, whichever player started it:
/// starting a new one first stops and joins the previous one so two
/// sessions never contend for the same device.
pub struct DualRoutePlayer<B: AudioBackend> {
    backend: Arc<B>,
    current: Mutex<Option<Arc<Session>>>,
}

/// Session ids are unique across players
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

impl<B: AudioBackend> DualRoutePlayer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            current: Mutex::new(None),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The most recently started session, if any
    pub fn current(&self) -> Option<Arc<Session>> {
        self.current.lock().clone()
    }

    /// Start streaming `pcm`
    ///
    /// Returns once the outputs are open and streaming has begun. Failure to
    /// open the primary output is returned here and no session (and no
    /// `on_end`) results.
    pub fn play(
        &self,
        pcm: PcmBuffer,
        config: PlaybackConfig,
        observer: Arc<dyn PlaybackObserver>,
    ) -> Result<Arc<Session>> {
        config.validate()?;
        if pcm.is_empty() {
            return Err(TapecastError::InvalidInput("nothing to play".into()));
        }
        if pcm.sample_rate() != config.sample_rate {
            log::warn!(
                "Buffer sample rate {} differs from playback rate {}",
                pcm.sample_rate(),
                config.sample_rate
            );
        }

        let _serial = PLAY_LOCK.lock();

        let previous = self.current.lock().take();
        if let Some(previous) = previous {
            previous.stop();
            previous.wait();
        }
        release_active();

        let session = Arc::new(Session::new(NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst)));
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let handle = {
            let backend = Arc::clone(&self.backend);
            let session = Arc::clone(&session);
            thread::Builder::new()
                .name(format!("playback-{}", session.id))
                .spawn(move || run_session(&*backend, &session, &pcm, &config, observer, ready_tx))
                .map_err(|e| TapecastError::SessionThread(format!("failed to spawn playback thread: {}", e)))?
        };
        *session.thread.lock() = Some(handle);

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(TapecastError::SessionThread("playback thread exited early".into())));
        if let Err(e) = ready {
            session.wait();
            return Err(e);
        }

        *ACTIVE.lock() = Some(Arc::downgrade(&session));
        *self.current.lock() = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Cooperative cancellation; idempotent
    pub fn stop(&self, session: &Session) {
        session.stop();
    }

    /// Stop the current session, if any, and wait for its teardown
    pub fn stop_current(&self) {
        let current = self.current.lock().clone();
        if let Some(session) = current {
            session.stop();
            session.wait();
        }
    }
}

impl<B: AudioBackend> Drop for DualRoutePlayer<B> {
    fn drop(&mut self) {
        self.stop_current();
    }
}

/// The outputs of one session
struct Routes {
    primary: Box<dyn AudioSink>,
    secondary: Option<Box<dyn AudioSink>>,
}

impl Routes {
    fn report(&self) -> RouteReport {
        RouteReport {
            primary: self.primary.routed_device(),
            secondary: self.secondary.as_ref().and_then(|s| s.routed_device()),
        }
    }

    /// Same chunk to both outputs, primary first, on the calling thread
    fn write(&mut self, chunk: &[i16]) -> Result<()> {
        self.primary.write(chunk)?;
        if let Some(sink) = self.secondary.as_mut() {
            sink.write(chunk)?;
        }
        Ok(())
    }

    fn drain(&mut self) {
        self.primary.drain();
        if let Some(sink) = self.secondary.as_mut() {
            sink.drain();
        }
    }

    fn stop(&mut self) {
        self.primary.stop();
        if let Some(sink) = self.secondary.as_mut() {
            sink.stop();
        }
    }
}

fn open_routes<B: AudioBackend + ?Sized>(backend: &B, config: &PlaybackConfig) -> Result<Routes> {
    let devices = backend.output_devices().unwrap_or_else(|e| {
        log::warn!("Output device enumeration failed: {}", e);
        Vec::new()
    });
    log::debug!("Found {} output devices", devices.len());

    let selection = select_routes(&devices, config.mirror_to_secondary);

    let primary_spec = SinkSpec {
        sample_rate: config.sample_rate,
        gain: 1.0,
    };
    let mut primary = backend.open(selection.primary.as_ref(), &primary_spec)?;
    primary.start()?;

    let secondary = match selection.secondary {
        Some(target) => {
            let spec = SinkSpec {
                sample_rate: config.sample_rate,
                gain: config.secondary_gain(),
            };
            let opened = backend.open(Some(&target), &spec).and_then(|mut sink| {
                sink.start()?;
                Ok(sink)
            });
            match opened {
                Ok(sink) => Some(sink),
                Err(e) => {
                    log::warn!("Monitor output '{}' unavailable, not mirroring: {}", target.id, e);
                    None
                }
            }
        }
        None => {
            if config.mirror_to_secondary {
                log::info!("No distinct monitor output available, not mirroring");
            }
            None
        }
    };

    Ok(Routes { primary, secondary })
}

fn run_session<B: AudioBackend + ?Sized>(
    backend: &B,
    session: &Session,
    pcm: &PcmBuffer,
    config: &PlaybackConfig,
    observer: Arc<dyn PlaybackObserver>,
    ready: SyncSender<Result<()>>,
) {
    let mut routes = match open_routes(backend, config) {
        Ok(routes) => routes,
        Err(e) => {
            log::error!("Session {} could not open an output: {}", session.id, e);
            let _ = ready.send(Err(e));
            return;
        }
    };

    session.set_state(SessionState::Streaming);
    let idle = IdleOnDrop(session);
    let _ = ready.send(Ok(()));

    let report = routes.report();
    log::info!(
        "Session {} streaming {} samples: output {}, monitor {}",
        session.id,
        pcm.len(),
        report.primary_label(),
        report.secondary_label()
    );
    observer.on_route(&report);

    let outcome = stream(session, pcm, config, &mut routes, &*observer);

    if outcome == PlaybackOutcome::Completed {
        routes.drain();
    }
    routes.stop();
    drop(routes);

    match &outcome {
        PlaybackOutcome::Failed(e) => log::warn!("Session {} ended with error: {}", session.id, e),
        other => log::info!("Session {} ended: {:?}", session.id, other),
    }

    *session.outcome.lock() = Some(outcome.clone());
    drop(idle);
    observer.on_end(&outcome);
}

fn stream(
    session: &Session,
    pcm: &PcmBuffer,
    config: &PlaybackConfig,
    routes: &mut Routes,
    observer: &dyn PlaybackObserver,
) -> PlaybackOutcome {
    let total = pcm.len();
    let mut written = 0usize;

    for (index, chunk) in pcm.samples().chunks(config.chunk_samples).enumerate() {
        if !session.should_continue() {
            return PlaybackOutcome::Stopped;
        }

        if let Err(e) = routes.write(chunk) {
            return PlaybackOutcome::Failed(e);
        }

        written += chunk.len();
        observer.on_progress(written as f32 / total as f32);

        if (index + 1) % config.route_report_interval == 0 {
            observer.on_route(&routes.report());
        }
    }

    PlaybackOutcome::Completed
}
