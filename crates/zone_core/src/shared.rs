//! # Shared Zone
//!
//! The zone assumes exclusive, non-reentrant access. When other subsystems
//! run on worker threads, every call goes through this single lock.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::config::ZoneConfig;
use crate::error::ZoneResult;
use crate::zone::Zone;

/// A zone behind one mutex, cheap to clone across threads.
///
/// # Example
///
/// ```rust,ignore
/// let zone = SharedZone::init(&ZoneConfig::default())?;
/// let worker = zone.clone();
/// std::thread::spawn(move || worker.with(|zone| zone.alloc_static(64)));
/// ```
#[derive(Clone, Debug)]
pub struct SharedZone {
    inner: Arc<Mutex<Zone>>,
}

impl SharedZone {
    /// Wraps an initialized zone.
    #[must_use]
    pub fn new(zone: Zone) -> Self {
        Self {
            inner: Arc::new(Mutex::new(zone)),
        }
    }

    /// Initializes a zone and wraps it.
    ///
    /// # Errors
    ///
    /// See [`Zone::init`].
    pub fn init(config: &ZoneConfig) -> ZoneResult<Self> {
        Zone::init(config).map(Self::new)
    }

    /// Locks the zone for a sequence of operations.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, Zone> {
        self.inner.lock()
    }

    /// Runs `f` with the zone locked.
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut Zone) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threads_serialize_on_the_lock() {
        let zone = SharedZone::init(&ZoneConfig::with_target_bytes(64 * 1024)).unwrap();

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let zone = zone.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let ptr = zone.with(|zone| zone.alloc_static(48)).unwrap();
                        zone.with(|zone| zone.free(Some(ptr))).unwrap();
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        let zone = zone.lock();
        assert_eq!(zone.used_bytes(), 0);
        zone.check_heap().unwrap();
    }
}
