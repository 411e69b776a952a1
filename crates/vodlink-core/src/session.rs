//! Playback Session - one engine, one surface, one event bridge
//!
//! Coordinates:
//! - Engine and surface acquisition
//! - Source resolution at creation
//! - State machine transitions
//! - Translation of engine callbacks into bridge events
//! - Ordered teardown
//!
//! The session state doubles as the gate between command dispatch and
//! engine callbacks: both take the state lock, and a callback that finds the
//! session disposed is dropped without touching anything else.

use crate::{
    bridge::{EventBridge, EventSink},
    engine::{EngineFactory, EngineListener, EventParams, NetStatus, PlaybackEngine},
    source::SourceResolver,
    surface::{RenderSurface, SurfaceProvider},
    translate::{self, EventKind},
    Error, PlaybackConfig, Result, SessionId, SessionState, SourceSpec,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, info, instrument, trace, warn};

/// States in which pause, rate and bitrate changes are accepted
const PREPARED_STATES: &[SessionState] = &[
    SessionState::Ready,
    SessionState::Playing,
    SessionState::Paused,
];

/// States in which play and seek are accepted
const TRANSPORT_STATES: &[SessionState] = &[
    SessionState::Ready,
    SessionState::Playing,
    SessionState::Paused,
    SessionState::Ended,
];

/// Everything callbacks need to reach
struct SessionCore {
    id: SessionId,
    looping: bool,
    auto_play: bool,
    state: Mutex<SessionState>,
    bridge: EventBridge,
    engine: Arc<dyn PlaybackEngine>,
    surface: Mutex<Option<Box<dyn RenderSurface>>>,
}

impl SessionCore {
    /// Apply a transition if the state machine allows it
    fn transition(&self, state: &mut SessionState, target: SessionState) -> bool {
        if *state == target {
            return true;
        }
        if !state.can_transition_to(target) {
            debug!(session_id = %self.id, from = %state, to = %target, "Transition ignored");
            return false;
        }
        info!(session_id = %self.id, from = %state, to = %target, "State transition");
        *state = target;
        true
    }

    fn on_play_event(&self, code: i32, params: &EventParams) {
        let mut state = self.state.lock();
        if *state == SessionState::Disposed {
            trace!(session_id = %self.id, code, "Late engine event ignored");
            return;
        }

        let events = translate::translate(code, params, || self.engine.media_info());

        match translate::kind_for(code) {
            Some(EventKind::Initialized) => {
                if *state == SessionState::Preparing {
                    let target = if self.auto_play {
                        SessionState::Playing
                    } else {
                        SessionState::Ready
                    };
                    self.transition(&mut state, target);
                }
            }
            Some(EventKind::PlayEnd) if !self.looping => {
                self.transition(&mut state, SessionState::Ended);
            }
            Some(EventKind::Disconnect) => {
                // Stop callbacks before anyone hears about the disconnect
                warn!(session_id = %self.id, "Network disconnected, stopping engine");
                self.engine.set_listener(None);
                self.engine.stop(true);
            }
            _ => {}
        }

        if translate::is_error_code(code) {
            warn!(
                session_id = %self.id,
                code,
                description = params.description.as_deref().unwrap_or(""),
                "Engine reported error"
            );
            self.transition(&mut state, SessionState::Error);
        }

        for event in events {
            self.bridge.emit(event);
        }
    }

    fn on_net_status(&self, status: &NetStatus) {
        let state = self.state.lock();
        if *state == SessionState::Disposed {
            return;
        }
        self.bridge.emit(translate::translate_net_status(status));
    }

    /// Tear down in order: listener, gate, engine, surface, bridge
    fn dispose(&self) -> Result<()> {
        if *self.state.lock() == SessionState::Disposed {
            return Err(Error::UnknownSession(self.id));
        }

        self.engine.set_listener(None);
        {
            // Waits for a callback that slipped past the listener swap
            let mut state = self.state.lock();
            if *state == SessionState::Disposed {
                return Err(Error::UnknownSession(self.id));
            }
            info!(session_id = %self.id, from = %state, "Disposing session");
            *state = SessionState::Disposed;
        }

        self.engine.stop(true);
        self.engine.release();
        if let Some(surface) = self.surface.lock().take() {
            surface.release();
        }
        self.bridge.close();
        Ok(())
    }
}

/// Engine listener holding only a weak reference back to the session
struct SessionListener {
    core: Weak<SessionCore>,
}

impl EngineListener for SessionListener {
    fn on_play_event(&self, code: i32, params: &EventParams) {
        if let Some(core) = self.core.upgrade() {
            core.on_play_event(code, params);
        }
    }

    fn on_net_status(&self, status: &NetStatus) {
        if let Some(core) = self.core.upgrade() {
            core.on_net_status(status);
        }
    }
}

/// Resources a session is built from
pub struct SessionResources<'a> {
    pub engines: &'a dyn EngineFactory,
    pub surfaces: &'a dyn SurfaceProvider,
    pub resolver: &'a SourceResolver,
    pub event_buffer_capacity: usize,
}

/// One active playback instance
pub struct PlaybackSession {
    surface_id: i64,
    core: Arc<SessionCore>,
}

impl PlaybackSession {
    /// Acquire engine and surface, wire callbacks, and start the source.
    ///
    /// Returns once playback has been started; readiness is reported later
    /// through the `initialized` event. On failure everything acquired so
    /// far is released before the error is returned.
    #[instrument(skip(config, source, resources), fields(kind = source.kind()))]
    pub fn open(
        id: SessionId,
        config: PlaybackConfig,
        source: SourceSpec,
        resources: SessionResources<'_>,
    ) -> Result<Self> {
        let surface = resources.surfaces.acquire()?;
        let engine = match resources.engines.create(&config) {
            Ok(engine) => engine,
            Err(e) => {
                surface.release();
                return Err(e);
            }
        };
        let surface_id = surface.id();

        let core = Arc::new(SessionCore {
            id,
            looping: config.looping,
            auto_play: config.auto_play,
            state: Mutex::new(SessionState::Created),
            bridge: EventBridge::new(resources.event_buffer_capacity),
            engine: Arc::clone(&engine),
            surface: Mutex::new(Some(surface)),
        });

        engine.set_listener(Some(Arc::new(SessionListener {
            core: Arc::downgrade(&core),
        })));
        engine.attach_surface(surface_id);

        let session = Self { surface_id, core };

        {
            let mut state = session.core.state.lock();
            session.core.transition(&mut state, SessionState::Preparing);
        }

        if let Err(e) = resources.resolver.start(&source, engine.as_ref()) {
            warn!(session_id = %id, error = %e, "Source failed, releasing session");
            let _ = session.core.dispose();
            return Err(e);
        }

        info!(session_id = %id, surface_id, "Session created");
        Ok(session)
    }

    pub fn id(&self) -> SessionId {
        self.core.id
    }

    /// Id of the render surface, reported to the UI as `textureId`
    pub fn surface_id(&self) -> i64 {
        self.surface_id
    }

    pub fn state(&self) -> SessionState {
        *self.core.state.lock()
    }

    /// The session's outbound event stream
    pub fn events(&self) -> &EventBridge {
        &self.core.bridge
    }

    /// Attach the event consumer, flushing anything buffered
    pub fn attach(&self, sink: Box<dyn EventSink>) {
        self.core.bridge.attach(sink);
    }

    /// Detach the event consumer; events buffer until the next attach
    pub fn detach(&self) {
        self.core.bridge.detach();
    }

    /// Lock the state and make sure the operation is allowed in it
    fn guard(
        &self,
        operation: &'static str,
        allowed: &[SessionState],
    ) -> Result<parking_lot::MutexGuard<'_, SessionState>> {
        let state = self.core.state.lock();
        if *state == SessionState::Disposed {
            return Err(Error::UnknownSession(self.core.id));
        }
        if !allowed.contains(&*state) {
            return Err(Error::InvalidState {
                state: *state,
                operation,
            });
        }
        Ok(state)
    }

    /// Start or resume playback; no engine call if it is already playing
    #[instrument(skip(self), fields(session_id = %self.core.id))]
    pub fn play(&self) -> Result<()> {
        let mut state = self.guard("play", TRANSPORT_STATES)?;

        if self.core.engine.is_playing() {
            debug!("Already playing");
        } else {
            self.core.engine.resume();
        }
        self.core.transition(&mut state, SessionState::Playing);
        Ok(())
    }

    #[instrument(skip(self), fields(session_id = %self.core.id))]
    pub fn pause(&self) -> Result<()> {
        let mut state = self.guard("pause", PREPARED_STATES)?;

        self.core.engine.pause();
        self.core.transition(&mut state, SessionState::Paused);
        Ok(())
    }

    /// Seek to a position in milliseconds
    #[instrument(skip(self), fields(session_id = %self.core.id))]
    pub fn seek_to(&self, location_ms: i64) -> Result<()> {
        let _state = self.guard("seek", TRANSPORT_STATES)?;
        self.core.engine.seek(location_ms);
        Ok(())
    }

    #[instrument(skip(self), fields(session_id = %self.core.id))]
    pub fn set_rate(&self, rate: f32) -> Result<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(Error::InvalidArgument(format!("rate must be positive, got {rate}")));
        }
        let _state = self.guard("set rate", PREPARED_STATES)?;
        self.core.engine.set_rate(rate);
        Ok(())
    }

    #[instrument(skip(self), fields(session_id = %self.core.id))]
    pub fn set_bitrate_index(&self, index: i32) -> Result<()> {
        let _state = self.guard("set bitrate index", PREPARED_STATES)?;
        self.core.engine.set_bitrate_index(index);
        Ok(())
    }

    /// Release engine, surface and event consumer.
    ///
    /// Safe from any state. Once this returns no further event for the
    /// session is emitted. A second call yields `UnknownSession`.
    pub fn dispose(&self) -> Result<()> {
        self.core.dispose()
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        if self.state() != SessionState::Disposed {
            debug!(session_id = %self.core.id, "Session dropped without dispose");
            let _ = self.core.dispose();
        }
    }
}
