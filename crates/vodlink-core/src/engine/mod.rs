//! Playback engine seam
//!
//! The bridge never decodes or renders anything itself. It drives an
//! engine through [`PlaybackEngine`] and receives engine callbacks through
//! [`EngineListener`], which engines invoke from their own threads.

pub mod sim;

pub use sim::{SimulatedEngine, SimulatedEngineFactory};

use crate::{PlaybackConfig, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Engine event codes
pub mod codes {
    /// Source prepared, media info available
    pub const PLAY_EVT_VOD_PLAY_PREPARED: i32 = 2013;
    /// Periodic progress report
    pub const PLAY_EVT_PLAY_PROGRESS: i32 = 2005;
    /// Playback stalled waiting for data
    pub const PLAY_EVT_PLAY_LOADING: i32 = 2007;
    /// Data arrived after a stall
    pub const PLAY_EVT_VOD_LOADING_END: i32 = 2014;
    /// End of stream
    pub const PLAY_EVT_PLAY_END: i32 = 2006;
    /// Network connection lost, engine gave up reconnecting
    pub const PLAY_ERR_NET_DISCONNECT: i32 = -2301;
}

/// Values attached to an engine play event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventParams {
    pub progress_ms: Option<i64>,
    pub duration_ms: Option<i64>,
    pub playable_ms: Option<i64>,
    pub description: Option<String>,
}

impl EventParams {
    pub fn progress(progress_ms: i64, duration_ms: i64, playable_ms: i64) -> Self {
        Self {
            progress_ms: Some(progress_ms),
            duration_ms: Some(duration_ms),
            playable_ms: Some(playable_ms),
            description: None,
        }
    }

    pub fn described(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Default::default()
        }
    }
}

/// Network status snapshot reported by the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetStatus {
    /// Download speed in KB/s
    pub net_speed: i64,
    /// Buffered data size
    pub cache_size: i64,
}

/// Media properties known once the source is prepared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaInfo {
    pub duration_ms: i64,
    pub width: u32,
    pub height: u32,
}

/// Resolved source handed to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineSource {
    /// Authenticated remote reference
    Auth { app_id: i64, file_id: String },
    /// File on local storage
    LocalFile(PathBuf),
    /// Local path or network URL, interpreted by the engine
    Uri(String),
}

impl std::fmt::Display for EngineSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineSource::Auth { app_id, file_id } => write!(f, "auth:{app_id}/{file_id}"),
            EngineSource::LocalFile(path) => write!(f, "{}", path.display()),
            EngineSource::Uri(uri) => write!(f, "{uri}"),
        }
    }
}

/// Receiver of engine callbacks
///
/// Called on engine-owned threads, possibly concurrently with commands on
/// the same session. Implementations must not block for long.
pub trait EngineListener: Send + Sync {
    /// Lifecycle, progress and error events; negative codes are errors
    fn on_play_event(&self, code: i32, params: &EventParams);

    /// Periodic network status
    fn on_net_status(&self, status: &NetStatus);
}

/// Handle to one engine instance
///
/// Command methods are called with the session state locked, so an engine
/// must not invoke its listener synchronously from inside them.
pub trait PlaybackEngine: Send + Sync {
    /// Install or remove the callback receiver
    ///
    /// After `set_listener(None)` returns the engine must not start new
    /// callbacks into the previous listener.
    fn set_listener(&self, listener: Option<Arc<dyn EngineListener>>);

    /// Render into the given surface
    fn attach_surface(&self, surface_id: i64);

    /// Begin loading and (with autoplay) playing the source
    fn start(&self, source: EngineSource) -> Result<()>;

    fn is_playing(&self) -> bool;

    fn resume(&self);

    fn pause(&self);

    /// Seek to a position in milliseconds
    fn seek(&self, position_ms: i64);

    fn set_rate(&self, rate: f32);

    fn set_bitrate_index(&self, index: i32);

    /// Media properties; zeroed before the source is prepared
    fn media_info(&self) -> MediaInfo;

    /// Stop playback; safe on an engine that was never started
    fn stop(&self, clear_last_frame: bool);

    /// Free everything the handle owns; the handle is unusable afterwards
    fn release(&self);
}

/// Allocates engine handles with a configuration applied
pub trait EngineFactory: Send + Sync {
    /// Fails with `ResourceExhausted` when no handle can be allocated
    fn create(&self, config: &PlaybackConfig) -> Result<Arc<dyn PlaybackEngine>>;
}
