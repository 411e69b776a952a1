//! Queuing event bridge
//!
//! Engine callbacks start producing events as soon as a session is
//! prepared, which is usually before the UI side has subscribed. The bridge
//! buffers events until a consumer attaches, flushes them in emission order,
//! then forwards directly. Detaching switches back to buffering.
//!
//! The buffer is bounded. When it is full the oldest event is dropped and
//! counted; a consumer that never attaches cannot grow memory without limit.

use crate::Event;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Default number of events held while no consumer is attached
pub const DEFAULT_CAPACITY: usize = 4096;

/// Consumer end of a bridge
pub trait EventSink: Send {
    /// Deliver one event, or hand it back if the consumer has gone away
    fn send(&mut self, event: Event) -> std::result::Result<(), Event>;
}

impl EventSink for mpsc::UnboundedSender<Event> {
    fn send(&mut self, event: Event) -> std::result::Result<(), Event> {
        mpsc::UnboundedSender::send(self, event).map_err(|err| err.0)
    }
}

struct BridgeInner {
    queue: VecDeque<Event>,
    sink: Option<Box<dyn EventSink>>,
    dropped: u64,
    closed: bool,
}

/// Single-consumer, order-preserving event sink
pub struct EventBridge {
    inner: Mutex<BridgeInner>,
    capacity: usize,
}

impl EventBridge {
    /// Create a bridge holding at most `capacity` events while detached
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BridgeInner {
                queue: VecDeque::new(),
                sink: None,
                dropped: 0,
                closed: false,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Emit an event; never fails from the producer's point of view
    pub fn emit(&self, event: Event) {
        let mut inner = self.inner.lock();
        if inner.closed {
            trace!(kind = event.kind(), "Event after close ignored");
            return;
        }

        let event = match inner.sink.as_mut() {
            Some(sink) => match sink.send(event) {
                Ok(()) => return,
                Err(event) => {
                    debug!("Event consumer went away, buffering");
                    inner.sink = None;
                    event
                }
            },
            None => event,
        };
        self.buffer(&mut inner, event);
    }

    fn buffer(&self, inner: &mut BridgeInner, event: Event) {
        if inner.queue.len() >= self.capacity {
            inner.queue.pop_front();
            inner.dropped += 1;
            if inner.dropped == 1 || inner.dropped % 1024 == 0 {
                warn!(
                    dropped = inner.dropped,
                    capacity = self.capacity,
                    "Event buffer full, dropping oldest"
                );
            }
        }
        inner.queue.push_back(event);
    }

    /// Attach a consumer, replacing any previous one
    ///
    /// Buffered events are flushed to it in emission order before any newer
    /// event can be forwarded.
    pub fn attach(&self, sink: Box<dyn EventSink>) {
        let mut inner = self.inner.lock();
        if inner.closed {
            debug!("Attach to closed bridge ignored");
            return;
        }

        let mut sink = sink;
        let mut flushed = 0usize;
        while let Some(event) = inner.queue.pop_front() {
            if let Err(event) = sink.send(event) {
                inner.queue.push_front(event);
                debug!(flushed, "Consumer closed during flush");
                return;
            }
            flushed += 1;
        }

        debug!(flushed, "Event consumer attached");
        inner.sink = Some(sink);
    }

    /// Detach the consumer; later events are buffered again
    pub fn detach(&self) {
        if self.inner.lock().sink.take().is_some() {
            debug!("Event consumer detached");
        }
    }

    /// Drop the consumer and all buffered events; later emits are ignored
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.sink = None;
        inner.queue.clear();
        inner.closed = true;
    }

    pub fn is_attached(&self) -> bool {
        self.inner.lock().sink.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Events waiting for a consumer
    pub fn buffered(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Events discarded because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }
}

impl Default for EventBridge {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
