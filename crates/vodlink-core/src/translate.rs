//! Engine callback to event translation
//!
//! A fixed table maps engine event codes to event kinds; fields are then
//! pulled out of the callback parameters per kind. Unmapped positive codes
//! produce nothing. Every negative code additionally produces an `error`
//! event carrying the engine's description.

use crate::engine::{codes, EventParams, MediaInfo, NetStatus};
use crate::Event;

/// Event kinds reachable from a play event code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Initialized,
    Progress,
    Loading,
    LoadingEnd,
    PlayEnd,
    Disconnect,
}

const CODE_TABLE: &[(i32, EventKind)] = &[
    (codes::PLAY_EVT_VOD_PLAY_PREPARED, EventKind::Initialized),
    (codes::PLAY_EVT_PLAY_PROGRESS, EventKind::Progress),
    (codes::PLAY_EVT_PLAY_LOADING, EventKind::Loading),
    (codes::PLAY_EVT_VOD_LOADING_END, EventKind::LoadingEnd),
    (codes::PLAY_EVT_PLAY_END, EventKind::PlayEnd),
    (codes::PLAY_ERR_NET_DISCONNECT, EventKind::Disconnect),
];

/// Look up the kind for an engine code
pub fn kind_for(code: i32) -> Option<EventKind> {
    CODE_TABLE
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, kind)| *kind)
}

/// True for codes the engine uses to report failures
pub fn is_error_code(code: i32) -> bool {
    code < 0
}

/// Translate one play event into zero, one or two outbound events.
///
/// `media` is only consulted for the prepared event.
pub fn translate(
    code: i32,
    params: &EventParams,
    media: impl FnOnce() -> MediaInfo,
) -> Vec<Event> {
    let mut events = Vec::with_capacity(2);

    if let Some(kind) = kind_for(code) {
        events.push(extract(kind, params, media));
    }

    if is_error_code(code) {
        let error_info = params
            .description
            .clone()
            .unwrap_or_else(|| format!("engine error {code}"));
        events.push(Event::Error { error_info });
    }

    events
}

fn extract(kind: EventKind, params: &EventParams, media: impl FnOnce() -> MediaInfo) -> Event {
    match kind {
        EventKind::Initialized => {
            let info = media();
            Event::Initialized {
                duration: info.duration_ms,
                width: info.width,
                height: info.height,
            }
        }
        EventKind::Progress => Event::Progress {
            progress: params.progress_ms.unwrap_or(0),
            duration: params.duration_ms.unwrap_or(0),
            playable: params.playable_ms.unwrap_or(0),
        },
        EventKind::Loading => Event::Loading,
        EventKind::LoadingEnd => Event::LoadingEnd,
        EventKind::PlayEnd => Event::PlayEnd,
        EventKind::Disconnect => Event::Disconnect,
    }
}

/// Translate a network status report
pub fn translate_net_status(status: &NetStatus) -> Event {
    Event::NetStatus {
        net_speed: status.net_speed,
        cache_size: status.cache_size,
    }
}
