//! Core types for Vodlink

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

/// Opaque, process-unique identifier for a playback session
///
/// Identifiers come from a monotonic counter owned by the registry and are
/// never handed out twice within one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub i64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-session playback configuration, fixed at creation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackConfig {
    /// Engine cache directory; `None` disables caching
    #[serde(default, rename = "cachePath")]
    pub cache_dir: Option<PathBuf>,
    /// Extra request headers for network sources
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Interval between progress events in milliseconds
    #[serde(rename = "progressInterval")]
    pub progress_interval_ms: u64,
    /// Restart from the beginning at end of stream
    #[serde(rename = "loop")]
    pub looping: bool,
    /// Start position in seconds
    #[serde(default)]
    pub start_time: Option<f64>,
    /// Begin playing as soon as the source is prepared
    pub auto_play: bool,
}

impl PlaybackConfig {
    /// Build a config from a loosely-typed `create` argument map.
    ///
    /// Unknown keys are ignored; missing required keys are rejected.
    pub fn from_args(args: &Value) -> Result<Self> {
        // Headers may arrive as an explicit null
        let mut args = args.clone();
        if let Some(map) = args.as_object_mut() {
            if map.get("headers").is_some_and(Value::is_null) {
                map.remove("headers");
            }
        }

        let config: PlaybackConfig = serde_json::from_value(args)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.progress_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "progressInterval must be greater than zero".to_string(),
            ));
        }
        if let Some(start) = self.start_time {
            if !start.is_finite() || start < 0.0 {
                return Err(Error::InvalidConfig(format!("invalid startTime {start}")));
            }
        }
        Ok(())
    }

    /// Number of items the engine cache may hold
    pub fn max_cache_items(&self) -> u32 {
        if self.cache_dir.is_some() {
            1
        } else {
            0
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            headers: HashMap::new(),
            progress_interval_ms: 500,
            looping: false,
            start_time: None,
            auto_play: true,
        }
    }
}

/// Where the media bytes for a session come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SourceSpec {
    /// Authenticated remote reference
    #[serde(rename_all = "camelCase")]
    AuthToken { app_id: i64, file_id: String },
    /// Bundled resource copied to local storage before playback
    #[serde(rename_all = "camelCase")]
    AssetRef { asset_path: String },
    /// Local path or network URL handed to the engine as-is
    DirectUri { uri: String },
}

impl SourceSpec {
    /// Select the source from a `create` argument map.
    ///
    /// Precedence is `auth` > `asset` > `uri`; the first present key wins
    /// and the others are ignored.
    pub fn from_args(args: &Value) -> Result<Self> {
        if let Some(auth) = present(args, "auth") {
            let app_id = auth
                .get("appId")
                .and_then(Value::as_i64)
                .ok_or_else(|| Error::InvalidSource("auth.appId must be an integer".to_string()))?;
            let file_id = match auth.get("fileId") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => {
                    return Err(Error::InvalidSource(
                        "auth.fileId must be a string".to_string(),
                    ))
                }
            };
            return Ok(SourceSpec::AuthToken { app_id, file_id });
        }

        if let Some(asset) = present(args, "asset") {
            let asset_path = asset
                .as_str()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    Error::InvalidSource("asset must be a non-empty string".to_string())
                })?;
            return Ok(SourceSpec::AssetRef {
                asset_path: asset_path.to_string(),
            });
        }

        if let Some(uri) = present(args, "uri") {
            let uri = uri
                .as_str()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| Error::InvalidSource("uri must be a non-empty string".to_string()))?;
            return Ok(SourceSpec::DirectUri {
                uri: uri.to_string(),
            });
        }

        Err(Error::InvalidSource(
            "one of auth, asset or uri is required".to_string(),
        ))
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            SourceSpec::AuthToken { .. } => "auth",
            SourceSpec::AssetRef { .. } => "asset",
            SourceSpec::DirectUri { .. } => "uri",
        }
    }
}

fn present<'a>(args: &'a Value, key: &str) -> Option<&'a Value> {
    args.get(key).filter(|v| !v.is_null())
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Engine and surface allocated, source not yet resolved
    Created,
    /// Source resolution started, waiting for the engine to prepare
    Preparing,
    /// Prepared, not playing
    Ready,
    Playing,
    Paused,
    /// End of stream reached
    Ended,
    /// Engine error or network disconnect
    Error,
    /// Resources released
    Disposed,
}

impl SessionState {
    /// Check if a transition is valid
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        if target == Disposed {
            return *self != Disposed;
        }
        if target == SessionState::Error {
            return !matches!(self, SessionState::Error | Disposed);
        }
        matches!(
            (self, target),
            // From Created
            (Created, Preparing) |
            // From Preparing
            (Preparing, Ready) | (Preparing, Playing) |
            // From Ready
            (Ready, Playing) | (Ready, Paused) |
            // From Playing
            (Playing, Paused) | (Playing, Ended) |
            // From Paused
            (Paused, Playing) | (Paused, Ended) |
            // From Ended
            (Ended, Playing)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Created => write!(f, "created"),
            SessionState::Preparing => write!(f, "preparing"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Playing => write!(f, "playing"),
            SessionState::Paused => write!(f, "paused"),
            SessionState::Ended => write!(f, "ended"),
            SessionState::Error => write!(f, "error"),
            SessionState::Disposed => write!(f, "disposed"),
        }
    }
}

/// Outbound session event, serialized as `{"event": "<kind>", ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum Event {
    /// Source prepared; all values from the engine
    #[serde(rename = "initialized")]
    Initialized {
        /// Duration in milliseconds
        duration: i64,
        width: u32,
        height: u32,
    },

    /// Periodic position report, all values in milliseconds
    #[serde(rename = "progress")]
    Progress {
        progress: i64,
        duration: i64,
        playable: i64,
    },

    #[serde(rename = "loading")]
    Loading,

    #[serde(rename = "loadingend")]
    LoadingEnd,

    #[serde(rename = "playend")]
    PlayEnd,

    #[serde(rename = "disconnect")]
    Disconnect,

    #[serde(rename = "netStatus", rename_all = "camelCase")]
    NetStatus { net_speed: i64, cache_size: i64 },

    #[serde(rename = "error", rename_all = "camelCase")]
    Error { error_info: String },
}

impl Event {
    /// Wire name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Initialized { .. } => "initialized",
            Event::Progress { .. } => "progress",
            Event::Loading => "loading",
            Event::LoadingEnd => "loadingend",
            Event::PlayEnd => "playend",
            Event::Disconnect => "disconnect",
            Event::NetStatus { .. } => "netStatus",
            Event::Error { .. } => "error",
        }
    }
}
