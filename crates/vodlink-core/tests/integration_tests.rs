//! Integration tests for Vodlink Core

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use vodlink_core::engine::sim::EngineCall;
use vodlink_core::engine::{codes, EventParams, MediaInfo};
use vodlink_core::{
    CountingSurfaceProvider, DirAssetBundle, Dispatcher, Error, Event, EventBridge, MethodCall,
    PlaybackConfig, RegistryConfig, Reply, SessionId, SessionRegistry, SessionState,
    SimulatedEngineFactory, SourceSpec,
};

struct Host {
    engines: Arc<SimulatedEngineFactory>,
    surfaces: Arc<CountingSurfaceProvider>,
    registry: Arc<SessionRegistry>,
    assets: tempfile::TempDir,
}

impl Host {
    fn new(engines: SimulatedEngineFactory) -> Self {
        let assets = tempfile::tempdir().unwrap();
        let engines = Arc::new(engines);
        let surfaces = Arc::new(CountingSurfaceProvider::new());
        let registry = Arc::new(SessionRegistry::new(
            RegistryConfig {
                asset_cache_dir: assets.path().join("cache"),
                event_buffer_capacity: 256,
            },
            engines.clone(),
            surfaces.clone(),
            Arc::new(DirAssetBundle::new(assets.path())),
        ));
        Self {
            engines,
            surfaces,
            registry,
            assets,
        }
    }

    fn manual() -> Self {
        Self::new(SimulatedEngineFactory::manual(MediaInfo {
            duration_ms: 60_000,
            width: 1280,
            height: 720,
        }))
    }

    fn create_uri(&self, config: PlaybackConfig) -> SessionId {
        self.registry
            .create(
                config,
                SourceSpec::DirectUri {
                    uri: "https://cdn.example.com/vod/a.mp4".to_string(),
                },
            )
            .unwrap()
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// =============================================================================
// Event Bridge Tests
// =============================================================================

#[test]
fn test_emit_then_attach_preserves_order() {
    let bridge = EventBridge::default();
    let mut emitted = vec![Event::Loading];
    emitted.extend((1..=20).map(|i| Event::Progress {
        progress: i * 250,
        duration: 60_000,
        playable: i * 500,
    }));
    emitted.push(Event::LoadingEnd);
    emitted.push(Event::PlayEnd);

    for event in &emitted {
        bridge.emit(event.clone());
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    bridge.attach(Box::new(tx));
    assert_eq!(drain(&mut rx), emitted);
    assert_eq!(bridge.dropped(), 0);
}

#[test]
fn test_events_before_attach_reach_late_consumer() {
    let host = Host::manual();
    let id = host.create_uri(PlaybackConfig::default());
    let engine = host.engines.last_engine().unwrap();

    engine.inject_event(codes::PLAY_EVT_VOD_PLAY_PREPARED, EventParams::default());
    engine.inject_event(codes::PLAY_EVT_PLAY_LOADING, EventParams::default());
    engine.inject_event(codes::PLAY_EVT_VOD_LOADING_END, EventParams::default());

    let (tx, mut rx) = mpsc::unbounded_channel();
    host.registry.attach(id, Box::new(tx)).unwrap();
    engine.inject_event(
        codes::PLAY_EVT_PLAY_PROGRESS,
        EventParams::progress(500, 60_000, 4_000),
    );

    let kinds: Vec<_> = drain(&mut rx).iter().map(Event::kind).collect();
    assert_eq!(kinds, vec!["initialized", "loading", "loadingend", "progress"]);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_create_then_dispose_before_any_callback() {
    let host = Host::manual();
    let id = host.create_uri(PlaybackConfig::default());
    assert_eq!(host.engines.live_handles(), 1);
    assert_eq!(host.surfaces.live_surfaces(), 1);

    host.registry.dispose(id).unwrap();
    assert_eq!(host.engines.live_handles(), 0);
    assert_eq!(host.surfaces.live_surfaces(), 0);

    let engine = host.engines.last_engine().unwrap();
    assert!(engine.is_released());
    assert!(!engine.has_listener());
}

#[test]
fn test_concurrent_creates_are_independent() {
    let host = Host::manual();

    let ids: Vec<SessionId> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| host.create_uri(PlaybackConfig::default())))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let distinct: HashSet<_> = ids.iter().copied().collect();
    assert_eq!(distinct.len(), 8);
    assert_eq!(host.registry.len(), 8);

    host.registry.dispose(ids[0]).unwrap();
    for id in &ids[1..] {
        let session = host.registry.lookup(*id).unwrap();
        assert_eq!(session.state(), SessionState::Preparing);
    }
    assert_eq!(host.engines.live_handles(), 7);
}

#[test]
fn test_play_twice_is_single_resume() {
    let host = Host::manual();
    let id = host.create_uri(PlaybackConfig {
        auto_play: false,
        ..Default::default()
    });
    let engine = host.engines.last_engine().unwrap();
    engine.inject_event(codes::PLAY_EVT_VOD_PLAY_PREPARED, EventParams::default());

    let session = host.registry.lookup(id).unwrap();
    session.play().unwrap();
    session.play().unwrap();
    assert_eq!(engine.count_calls(|c| *c == EngineCall::Resume), 1);
}

#[test]
fn test_dispose_unknown_and_twice() {
    let host = Host::manual();
    assert!(matches!(
        host.registry.dispose(SessionId(12345)),
        Err(Error::UnknownSession(SessionId(12345)))
    ));

    let id = host.create_uri(PlaybackConfig::default());
    host.registry.dispose(id).unwrap();
    assert!(matches!(
        host.registry.dispose(id),
        Err(Error::UnknownSession(_))
    ));
    assert_eq!(host.engines.live_handles(), 0);
}

#[test]
fn test_negative_code_yields_single_error_event() {
    let host = Host::manual();
    let id = host.create_uri(PlaybackConfig::default());
    let engine = host.engines.last_engine().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    host.registry.attach(id, Box::new(tx)).unwrap();

    engine.inject_event(-3, EventParams::described("network error"));

    assert_eq!(
        drain(&mut rx),
        vec![Event::Error {
            error_info: "network error".to_string()
        }]
    );
    assert_eq!(
        host.registry.lookup(id).unwrap().state(),
        SessionState::Error
    );
}

#[test]
fn test_disconnect_only_affects_its_session() {
    let host = Host::manual();
    let a = host.create_uri(PlaybackConfig::default());
    let engine_a = host.engines.last_engine().unwrap();
    let b = host.create_uri(PlaybackConfig::default());
    let engine_b = host.engines.last_engine().unwrap();

    engine_a.inject_event(codes::PLAY_ERR_NET_DISCONNECT, EventParams::described("lost"));

    assert_eq!(host.registry.lookup(a).unwrap().state(), SessionState::Error);
    assert_eq!(host.registry.lookup(b).unwrap().state(), SessionState::Preparing);
    assert!(!engine_a.has_listener());
    assert!(engine_b.has_listener());
    assert_eq!(engine_b.count_calls(|c| *c == EngineCall::Stop), 0);
}

// =============================================================================
// Source Tests
// =============================================================================

#[test]
fn test_auth_takes_precedence_end_to_end() {
    let host = Host::manual();
    let config = PlaybackConfig::default();
    let source = SourceSpec::from_args(&json!({
        "auth": {"appId": 1252463788, "fileId": "4564972819220421305"},
        "asset": "videos/intro.mp4",
        "uri": "https://cdn.example.com/a.mp4",
    }))
    .unwrap();

    host.registry.create(config, source).unwrap();
    let calls = host.engines.last_engine().unwrap().calls();
    assert!(calls.iter().any(|c| matches!(
        c,
        EngineCall::Start(vodlink_core::engine::EngineSource::Auth { app_id: 1252463788, .. })
    )));
}

#[test]
fn test_asset_source_plays_cached_copy() {
    let host = Host::manual();
    std::fs::create_dir_all(host.assets.path().join("videos")).unwrap();
    std::fs::write(host.assets.path().join("videos/intro.mp4"), b"not really an mp4").unwrap();

    host.registry
        .create(
            PlaybackConfig::default(),
            SourceSpec::AssetRef {
                asset_path: "videos/intro.mp4".to_string(),
            },
        )
        .unwrap();

    let calls = host.engines.last_engine().unwrap().calls();
    let path = calls
        .iter()
        .find_map(|c| match c {
            EngineCall::Start(vodlink_core::engine::EngineSource::LocalFile(path)) => {
                Some(path.clone())
            }
            _ => None,
        })
        .unwrap();
    assert!(path.starts_with(host.registry.config().asset_cache_dir.as_path()));
    assert_eq!(std::fs::read(path).unwrap(), b"not really an mp4");
}

// =============================================================================
// Threaded Engine Tests
// =============================================================================

#[tokio::test]
async fn test_threaded_playback_runs_to_end() {
    let host = Host::new(SimulatedEngineFactory::new(MediaInfo {
        duration_ms: 300,
        width: 640,
        height: 360,
    }));
    let id = host.create_uri(PlaybackConfig {
        progress_interval_ms: 50,
        ..Default::default()
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    host.registry.attach(id, Box::new(tx)).unwrap();

    let mut events = Vec::new();
    let outcome = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = rx.recv().await {
            let done = event == Event::PlayEnd;
            events.push(event);
            if done {
                break;
            }
        }
    })
    .await;
    assert!(outcome.is_ok(), "playback did not finish: {events:?}");

    assert_eq!(
        events.first(),
        Some(&Event::Initialized {
            duration: 300,
            width: 640,
            height: 360
        })
    );
    assert_eq!(events.last(), Some(&Event::PlayEnd));

    let positions: Vec<i64> = events
        .iter()
        .filter_map(|e| match e {
            Event::Progress { progress, .. } => Some(*progress),
            _ => None,
        })
        .collect();
    assert!(!positions.is_empty());
    assert!(positions.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(positions.last(), Some(&300));

    assert_eq!(host.registry.lookup(id).unwrap().state(), SessionState::Ended);
    host.registry.dispose(id).unwrap();
    assert_eq!(host.engines.live_handles(), 0);
}

#[tokio::test]
async fn test_threaded_dispose_mid_playback() {
    let host = Host::new(SimulatedEngineFactory::new(MediaInfo {
        duration_ms: 60_000,
        width: 640,
        height: 360,
    }));
    let id = host.create_uri(PlaybackConfig {
        progress_interval_ms: 10,
        ..Default::default()
    });
    let (tx, mut rx) = mpsc::unbounded_channel();
    host.registry.attach(id, Box::new(tx)).unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    host.registry.dispose(id).unwrap();
    drain(&mut rx);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(drain(&mut rx).is_empty());
    assert_eq!(host.engines.live_handles(), 0);
    assert_eq!(host.surfaces.live_surfaces(), 0);
}

// =============================================================================
// Dispatcher Tests
// =============================================================================

#[test]
fn test_dispatcher_session_lifecycle() {
    let host = Host::manual();
    let dispatcher = Dispatcher::new(Arc::clone(&host.registry));

    let reply = dispatcher.handle(&MethodCall::new(
        "create",
        json!({
            "uri": "https://cdn.example.com/a.mp4",
            "headers": null,
            "progressInterval": 1000,
            "loop": false,
            "autoPlay": false,
            "unrecognized": "ignored",
        }),
    ));
    let Reply::Success { result } = reply else {
        panic!("create failed");
    };
    let texture = result["textureId"].as_i64().unwrap();

    host.engines
        .last_engine()
        .unwrap()
        .inject_event(codes::PLAY_EVT_VOD_PLAY_PREPARED, EventParams::default());

    for call in [
        MethodCall::new("play", json!({"textureId": texture})),
        MethodCall::new("pause", json!({"textureId": texture})),
        MethodCall::new("seekTo", json!({"textureId": texture, "location": 1500})),
        MethodCall::new("setRate", json!({"textureId": texture, "rate": 1.25})),
        MethodCall::new("setBitrateIndex", json!({"textureId": texture, "index": 0})),
        MethodCall::new("dispose", json!({"textureId": texture})),
    ] {
        let reply = dispatcher.handle(&call);
        assert!(reply.is_success(), "{} failed: {reply:?}", call.method);
    }

    assert!(host.registry.is_empty());
    assert_eq!(host.engines.live_handles(), 0);
    assert_eq!(
        dispatcher.handle(&MethodCall::new("enterPictureInPicture", json!({}))),
        Reply::NotImplemented
    );
}
