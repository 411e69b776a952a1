//! Simulated playback engine
//!
//! A stand-in for a vendor engine. In threaded mode each handle owns a worker
//! thread that reports `prepared`, periodic `progress` and `playend` the way
//! a real VOD engine does. In manual mode nothing happens on its own and
//! callers drive the listener through [`SimulatedEngine::inject_event`].

use super::{
    codes, EngineFactory, EngineListener, EngineSource, EventParams, MediaInfo, NetStatus,
    PlaybackEngine,
};
use crate::{Error, PlaybackConfig, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, trace};

/// Delay between `start` and the prepared event in threaded mode
const PREPARE_DELAY: Duration = Duration::from_millis(10);

/// Command received by a simulated engine, recorded for inspection
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    AttachSurface(i64),
    Start(EngineSource),
    Resume,
    Pause,
    Seek(i64),
    SetRate(f32),
    SetBitrateIndex(i32),
    Stop,
    Release,
}

#[derive(Debug)]
struct SimState {
    started: bool,
    prepared: bool,
    playing: bool,
    position_ms: f64,
    rate: f32,
    stopped: bool,
    released: bool,
}

struct Shared {
    state: Mutex<SimState>,
    wake: Condvar,
    listener: Mutex<Option<Arc<dyn EngineListener>>>,
    calls: Mutex<Vec<EngineCall>>,
}

impl Shared {
    fn record(&self, call: EngineCall) {
        self.calls.lock().push(call);
    }

    fn listener(&self) -> Option<Arc<dyn EngineListener>> {
        self.listener.lock().clone()
    }

    /// Deliver a play event without holding any engine lock
    fn deliver(&self, code: i32, params: &EventParams) {
        if let Some(listener) = self.listener() {
            listener.on_play_event(code, params);
        }
    }
}

/// Engine handle backed by an optional worker thread
pub struct SimulatedEngine {
    config: PlaybackConfig,
    media: MediaInfo,
    manual: bool,
    shared: Arc<Shared>,
    worker: Mutex<Option<(ThreadId, JoinHandle<()>)>>,
    live: Arc<AtomicUsize>,
}

impl SimulatedEngine {
    fn new(
        config: PlaybackConfig,
        media: MediaInfo,
        manual: bool,
        live: Arc<AtomicUsize>,
    ) -> Self {
        let position_ms = config.start_time.unwrap_or(0.0) * 1000.0;
        Self {
            config,
            media,
            manual,
            shared: Arc::new(Shared {
                state: Mutex::new(SimState {
                    started: false,
                    prepared: false,
                    playing: false,
                    position_ms,
                    rate: 1.0,
                    stopped: false,
                    released: false,
                }),
                wake: Condvar::new(),
                listener: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
            }),
            worker: Mutex::new(None),
            live,
        }
    }

    /// Configuration the handle was created with
    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Every command received so far, in order
    pub fn calls(&self) -> Vec<EngineCall> {
        self.shared.calls.lock().clone()
    }

    /// Number of recorded calls matching a predicate
    pub fn count_calls(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.shared.calls.lock().iter().filter(|c| predicate(c)).count()
    }

    /// Whether a listener is currently installed
    pub fn has_listener(&self) -> bool {
        self.shared.listener.lock().is_some()
    }

    pub fn is_released(&self) -> bool {
        self.shared.state.lock().released
    }

    /// Deliver an engine event as if it came from the engine itself
    ///
    /// Applies the same side effects the worker would: `prepared` marks the
    /// media as known and starts playing with autoplay, `playend` stops.
    pub fn inject_event(&self, code: i32, params: EventParams) {
        {
            let mut state = self.shared.state.lock();
            match code {
                codes::PLAY_EVT_VOD_PLAY_PREPARED => {
                    state.prepared = true;
                    state.playing = self.config.auto_play;
                }
                codes::PLAY_EVT_PLAY_END => state.playing = false,
                _ => {}
            }
        }
        self.shared.deliver(code, &params);
    }

    /// Deliver a network status report
    pub fn inject_net_status(&self, status: NetStatus) {
        if let Some(listener) = self.shared.listener() {
            listener.on_net_status(&status);
        }
    }

    fn spawn_worker(&self) {
        let shared = Arc::clone(&self.shared);
        let media = self.media;
        let interval = Duration::from_millis(self.config.progress_interval_ms);
        let auto_play = self.config.auto_play;
        let looping = self.config.looping;

        let handle =
            thread::spawn(move || run_worker(shared, media, interval, auto_play, looping));
        *self.worker.lock() = Some((handle.thread().id(), handle));
    }
}

fn run_worker(
    shared: Arc<Shared>,
    media: MediaInfo,
    interval: Duration,
    auto_play: bool,
    looping: bool,
) {
    {
        let mut state = shared.state.lock();
        if !state.stopped {
            shared.wake.wait_for(&mut state, PREPARE_DELAY);
        }
        if state.stopped {
            return;
        }
        state.prepared = true;
        state.playing = auto_play;
    }
    shared.deliver(codes::PLAY_EVT_VOD_PLAY_PREPARED, &EventParams::default());

    loop {
        let mut pending = Vec::new();
        {
            let mut state = shared.state.lock();
            shared.wake.wait_for(&mut state, interval);
            if state.stopped {
                break;
            }
            if !state.playing {
                continue;
            }

            state.position_ms += interval.as_millis() as f64 * f64::from(state.rate);
            let duration = media.duration_ms as f64;
            if state.position_ms >= duration {
                if looping {
                    state.position_ms = 0.0;
                } else {
                    state.position_ms = duration;
                    state.playing = false;
                    let end = media.duration_ms;
                    pending.push((
                        codes::PLAY_EVT_PLAY_PROGRESS,
                        EventParams::progress(end, end, end),
                    ));
                    pending.push((codes::PLAY_EVT_PLAY_END, EventParams::default()));
                }
            }
            if pending.is_empty() {
                let position = state.position_ms as i64;
                let playable = (position + 10_000).min(media.duration_ms);
                pending.push((
                    codes::PLAY_EVT_PLAY_PROGRESS,
                    EventParams::progress(position, media.duration_ms, playable),
                ));
            }
        }

        for (code, params) in &pending {
            trace!(code, "Simulated engine event");
            shared.deliver(*code, params);
        }
    }
}

impl PlaybackEngine for SimulatedEngine {
    fn set_listener(&self, listener: Option<Arc<dyn EngineListener>>) {
        *self.shared.listener.lock() = listener;
    }

    fn attach_surface(&self, surface_id: i64) {
        self.shared.record(EngineCall::AttachSurface(surface_id));
    }

    fn start(&self, source: EngineSource) -> Result<()> {
        self.shared.record(EngineCall::Start(source.clone()));
        {
            let mut state = self.shared.state.lock();
            if state.released {
                return Err(Error::Engine {
                    code: -1,
                    description: "engine already released".to_string(),
                });
            }
            state.started = true;
        }
        debug!(source = %source, manual = self.manual, "Simulated engine started");
        if !self.manual {
            self.spawn_worker();
        }
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.shared.state.lock().playing
    }

    fn resume(&self) {
        self.shared.record(EngineCall::Resume);
        let mut state = self.shared.state.lock();
        if state.started && state.prepared && !state.stopped {
            state.playing = true;
        }
    }

    fn pause(&self) {
        self.shared.record(EngineCall::Pause);
        self.shared.state.lock().playing = false;
    }

    fn seek(&self, position_ms: i64) {
        self.shared.record(EngineCall::Seek(position_ms));
        let mut state = self.shared.state.lock();
        state.position_ms = position_ms.clamp(0, self.media.duration_ms.max(0)) as f64;
    }

    fn set_rate(&self, rate: f32) {
        self.shared.record(EngineCall::SetRate(rate));
        self.shared.state.lock().rate = rate;
    }

    fn set_bitrate_index(&self, index: i32) {
        self.shared.record(EngineCall::SetBitrateIndex(index));
    }

    fn media_info(&self) -> MediaInfo {
        if self.shared.state.lock().prepared {
            self.media
        } else {
            MediaInfo::default()
        }
    }

    fn stop(&self, _clear_last_frame: bool) {
        self.shared.record(EngineCall::Stop);
        let mut state = self.shared.state.lock();
        state.stopped = true;
        state.playing = false;
        self.shared.wake.notify_all();
    }

    fn release(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.released {
                return;
            }
            state.released = true;
            state.stopped = true;
            self.shared.wake.notify_all();
        }
        self.shared.record(EngineCall::Release);
        *self.shared.listener.lock() = None;

        // The worker may be the caller when a callback tears the session down
        if let Some((id, handle)) = self.worker.lock().take() {
            if id != thread::current().id() {
                let _ = handle.join();
            }
        }
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Hands out [`SimulatedEngine`] handles
pub struct SimulatedEngineFactory {
    media: MediaInfo,
    manual: bool,
    max_handles: Option<usize>,
    live: Arc<AtomicUsize>,
    engines: Mutex<Vec<Arc<SimulatedEngine>>>,
}

impl SimulatedEngineFactory {
    /// Threaded engines playing media with the given properties
    pub fn new(media: MediaInfo) -> Self {
        Self {
            media,
            manual: false,
            max_handles: None,
            live: Arc::new(AtomicUsize::new(0)),
            engines: Mutex::new(Vec::new()),
        }
    }

    /// Engines that only produce events through `inject_event`
    pub fn manual(media: MediaInfo) -> Self {
        Self {
            manual: true,
            ..Self::new(media)
        }
    }

    /// Refuse to allocate more than `max` live handles
    pub fn with_max_handles(mut self, max: usize) -> Self {
        self.max_handles = Some(max);
        self
    }

    /// Handles allocated and not yet released
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Most recently allocated handle
    pub fn last_engine(&self) -> Option<Arc<SimulatedEngine>> {
        self.engines.lock().last().cloned()
    }
}

impl Default for SimulatedEngineFactory {
    fn default() -> Self {
        Self::new(MediaInfo {
            duration_ms: 60_000,
            width: 1280,
            height: 720,
        })
    }
}

impl EngineFactory for SimulatedEngineFactory {
    fn create(&self, config: &PlaybackConfig) -> Result<Arc<dyn PlaybackEngine>> {
        let mut engines = self.engines.lock();
        if let Some(max) = self.max_handles {
            if self.live.load(Ordering::SeqCst) >= max {
                return Err(Error::ResourceExhausted(format!(
                    "engine handle limit of {max} reached"
                )));
            }
        }
        self.live.fetch_add(1, Ordering::SeqCst);

        debug!(
            cache_dir = ?config.cache_dir,
            max_cache_items = config.max_cache_items(),
            headers = config.headers.len(),
            progress_interval_ms = config.progress_interval_ms,
            "Simulated engine allocated"
        );
        let engine = Arc::new(SimulatedEngine::new(
            config.clone(),
            self.media,
            self.manual,
            Arc::clone(&self.live),
        ));
        engines.push(Arc::clone(&engine));
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Mutex<Vec<i32>>);

    impl EngineListener for Recorder {
        fn on_play_event(&self, code: i32, _params: &EventParams) {
            self.0.lock().push(code);
        }

        fn on_net_status(&self, _status: &NetStatus) {}
    }

    fn short_media() -> MediaInfo {
        MediaInfo {
            duration_ms: 200,
            width: 640,
            height: 360,
        }
    }

    #[test]
    fn test_handle_limit() {
        let factory = SimulatedEngineFactory::manual(short_media()).with_max_handles(1);
        let config = PlaybackConfig::default();

        let first = factory.create(&config).unwrap();
        assert!(matches!(
            factory.create(&config),
            Err(Error::ResourceExhausted(_))
        ));

        first.release();
        assert_eq!(factory.live_handles(), 0);
        assert!(factory.create(&config).is_ok());
    }

    #[test]
    fn test_threaded_playback_reaches_end() {
        let factory = SimulatedEngineFactory::new(short_media());
        let config = PlaybackConfig {
            progress_interval_ms: 50,
            ..Default::default()
        };
        let engine = factory.create(&config).unwrap();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        engine.set_listener(Some(recorder.clone() as Arc<dyn EngineListener>));
        engine.start(EngineSource::Uri("file:///a.mp4".into())).unwrap();

        for _ in 0..100 {
            if recorder.0.lock().contains(&codes::PLAY_EVT_PLAY_END) {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        engine.release();

        let seen = recorder.0.lock().clone();
        assert_eq!(seen.first(), Some(&codes::PLAY_EVT_VOD_PLAY_PREPARED));
        assert_eq!(seen.last(), Some(&codes::PLAY_EVT_PLAY_END));
        assert!(seen.contains(&codes::PLAY_EVT_PLAY_PROGRESS));
    }

    #[test]
    fn test_seek_with_unknown_duration() {
        let factory = SimulatedEngineFactory::manual(MediaInfo {
            duration_ms: -1,
            width: 0,
            height: 0,
        });
        let engine = factory.create(&PlaybackConfig::default()).unwrap();
        engine.seek(1000);
        engine.seek(-50);

        let sim = factory.last_engine().unwrap();
        assert_eq!(sim.count_calls(|c| matches!(c, EngineCall::Seek(_))), 2);
        engine.release();
    }

    #[test]
    fn test_release_without_start() {
        let factory = SimulatedEngineFactory::default();
        let engine = factory.create(&PlaybackConfig::default()).unwrap();
        engine.stop(true);
        engine.release();
        engine.release();
        assert_eq!(factory.live_handles(), 0);
    }
}
