//! Session registry
//!
//! Process-wide map from session id to session. Built when the host attaches
//! the bridge and torn down (every session disposed) when it is dropped or
//! on an explicit `dispose_all`. Map operations are serialized by one lock;
//! session commands and engine callbacks run outside of it, so a busy
//! session never blocks others.

use crate::{
    bridge::{EventSink, DEFAULT_CAPACITY},
    engine::EngineFactory,
    session::{PlaybackSession, SessionResources},
    source::{AssetBundle, SourceResolver},
    surface::SurfaceProvider,
    Error, PlaybackConfig, Result, SessionId, SourceSpec,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Registry-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Where bundled assets are copied before playback
    pub asset_cache_dir: PathBuf,
    /// Events each session holds while no consumer is attached
    pub event_buffer_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            asset_cache_dir: std::env::temp_dir().join("vodlink-assets"),
            event_buffer_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Owner of every live playback session
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<PlaybackSession>>>,
    next_id: AtomicI64,
    engines: Arc<dyn EngineFactory>,
    surfaces: Arc<dyn SurfaceProvider>,
    resolver: SourceResolver,
    config: RegistryConfig,
}

impl SessionRegistry {
    pub fn new(
        config: RegistryConfig,
        engines: Arc<dyn EngineFactory>,
        surfaces: Arc<dyn SurfaceProvider>,
        assets: Arc<dyn AssetBundle>,
    ) -> Self {
        info!(
            cache_dir = %config.asset_cache_dir.display(),
            event_buffer_capacity = config.event_buffer_capacity,
            "Session registry initialized"
        );
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            engines,
            surfaces,
            resolver: SourceResolver::new(assets, config.asset_cache_dir.clone()),
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Create and register a session, returning its id.
    ///
    /// The session is built (engine, surface, source) before the map lock is
    /// taken; only the insertion is serialized with other map operations.
    #[instrument(skip(self, config, source), fields(kind = source.kind()))]
    pub fn create(&self, config: PlaybackConfig, source: SourceSpec) -> Result<SessionId> {
        config.validate()?;
        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst));

        let session = PlaybackSession::open(
            id,
            config,
            source,
            SessionResources {
                engines: self.engines.as_ref(),
                surfaces: self.surfaces.as_ref(),
                resolver: &self.resolver,
                event_buffer_capacity: self.config.event_buffer_capacity,
            },
        )?;

        let total = {
            let mut sessions = self.sessions.lock();
            sessions.insert(id, Arc::new(session));
            sessions.len()
        };
        info!(session_id = %id, total, "Session registered");
        Ok(id)
    }

    /// Find a live session
    pub fn lookup(&self, id: SessionId) -> Result<Arc<PlaybackSession>> {
        self.sessions
            .lock()
            .get(&id)
            .cloned()
            .ok_or(Error::UnknownSession(id))
    }

    /// Find the session rendering into a surface
    pub fn lookup_surface(&self, surface_id: i64) -> Result<Arc<PlaybackSession>> {
        self.sessions
            .lock()
            .values()
            .find(|s| s.surface_id() == surface_id)
            .cloned()
            .ok_or(Error::UnknownTexture(surface_id))
    }

    /// Remove and tear down a session.
    ///
    /// Yields `UnknownSession` if the id was never registered or is already
    /// gone; callers that do not care can ignore it.
    #[instrument(skip(self))]
    pub fn dispose(&self, id: SessionId) -> Result<()> {
        let session = self
            .sessions
            .lock()
            .remove(&id)
            .ok_or(Error::UnknownSession(id))?;

        session.dispose()?;
        info!(session_id = %id, "Session removed");
        Ok(())
    }

    /// Dispose every session; all are disposed when this returns
    pub fn dispose_all(&self) -> usize {
        let drained: Vec<_> = self.sessions.lock().drain().collect();
        let count = drained.len();

        for (id, session) in drained {
            if let Err(e) = session.dispose() {
                warn!(session_id = %id, error = %e, "Session was already disposed");
            }
        }

        if count > 0 {
            info!(count, "Disposed all sessions");
        }
        count
    }

    /// Attach the event consumer for a session
    pub fn attach(&self, id: SessionId, sink: Box<dyn EventSink>) -> Result<()> {
        self.lookup(id)?.attach(sink);
        debug!(session_id = %id, "Consumer attached");
        Ok(())
    }

    /// Detach the event consumer for a session
    pub fn detach(&self, id: SessionId) -> Result<()> {
        self.lookup(id)?.detach();
        Ok(())
    }

    /// Ids of live sessions, ascending
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
