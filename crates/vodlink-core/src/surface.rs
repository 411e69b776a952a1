//! Render surface seam
//!
//! A surface is the drawable target an engine renders into. The presentation
//! layer only knows it by its id, which is also what the `create` reply
//! reports as `textureId`.

use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Drawable target owned by one session
pub trait RenderSurface: Send + Sync {
    /// Opaque identifier used by the presentation layer
    fn id(&self) -> i64;

    /// Give the surface back to its provider; idempotent
    fn release(&self);
}

/// Allocates render surfaces
pub trait SurfaceProvider: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn RenderSurface>>;
}

/// In-process provider with monotonically increasing ids
///
/// Tracks live surfaces so leaks are observable.
#[derive(Default)]
pub struct CountingSurfaceProvider {
    next_id: AtomicI64,
    live: Arc<Mutex<HashSet<i64>>>,
    limit: Option<usize>,
}

impl CountingSurfaceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to hand out more than `limit` live surfaces
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Surfaces acquired and not yet released
    pub fn live_surfaces(&self) -> usize {
        self.live.lock().len()
    }
}

impl SurfaceProvider for CountingSurfaceProvider {
    fn acquire(&self) -> Result<Box<dyn RenderSurface>> {
        let mut live = self.live.lock();
        if let Some(limit) = self.limit {
            if live.len() >= limit {
                return Err(Error::ResourceExhausted(format!(
                    "render surface limit of {limit} reached"
                )));
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        live.insert(id);
        debug!(surface_id = id, "Surface acquired");

        Ok(Box::new(CountedSurface {
            id,
            live: Arc::clone(&self.live),
        }))
    }
}

struct CountedSurface {
    id: i64,
    live: Arc<Mutex<HashSet<i64>>>,
}

impl RenderSurface for CountedSurface {
    fn id(&self) -> i64 {
        self.id
    }

    fn release(&self) {
        if self.live.lock().remove(&self.id) {
            debug!(surface_id = self.id, "Surface released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_distinct_and_release_is_idempotent() {
        let provider = CountingSurfaceProvider::new();
        let a = provider.acquire().unwrap();
        let b = provider.acquire().unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(provider.live_surfaces(), 2);

        a.release();
        a.release();
        assert_eq!(provider.live_surfaces(), 1);
    }

    #[test]
    fn test_limit() {
        let provider = CountingSurfaceProvider::new().with_limit(1);
        let _surface = provider.acquire().unwrap();
        assert!(matches!(provider.acquire(), Err(Error::ResourceExhausted(_))));
    }
}
