//! Vodlink Core - session bridge between a UI command protocol and a
//! video playback engine
//!
//! This crate provides:
//! - A registry of concurrently active playback sessions
//! - Per-session state machines driven by commands and engine callbacks
//! - Source resolution (auth token, bundled asset, direct URI)
//! - Translation of engine event codes into a typed event stream
//! - Queuing event delivery that tolerates a late-attaching consumer
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Vodlink Core                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   method call ──► ┌──────────────┐      ┌──────────────┐        │
//! │                   │  Dispatcher  │ ───► │   Session    │        │
//! │                   └──────────────┘      │   Registry   │        │
//! │                                         └──────┬───────┘        │
//! │                                                │ SessionId      │
//! │                                         ┌──────┴───────┐        │
//! │   ┌──────────────┐                      │   Playback   │        │
//! │   │    Source    │ ◄─────────────────── │   Session    │        │
//! │   │   Resolver   │                      └──┬────────▲──┘        │
//! │   └──────────────┘              commands   │        │ callbacks │
//! │                                         ┌──▼────────┴──┐        │
//! │                                         │    Engine    │        │
//! │                                         └──────────────┘        │
//! │                                                                 │
//! │   ┌──────────────┐      ┌──────────────┐                        │
//! │   │  Translate   │ ───► │ Event Bridge │ ───► consumer          │
//! │   └──────────────┘      └──────────────┘                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod engine;
pub mod surface;
pub mod bridge;
pub mod translate;
pub mod source;
pub mod session;
pub mod registry;
pub mod dispatch;

pub use error::{Error, Result};
pub use types::*;
pub use engine::{EngineFactory, EngineListener, PlaybackEngine, SimulatedEngineFactory};
pub use surface::{CountingSurfaceProvider, RenderSurface, SurfaceProvider};
pub use bridge::{EventBridge, EventSink};
pub use source::{AssetBundle, DirAssetBundle, SourceResolver};
pub use session::PlaybackSession;
pub use registry::{RegistryConfig, SessionRegistry};
pub use dispatch::{Dispatcher, MethodCall, Reply};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the bridge library
pub fn init() {
    tracing::info!(version = VERSION, "Vodlink Core initialized");
}
