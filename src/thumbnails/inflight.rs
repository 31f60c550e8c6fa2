//! At most one load in progress per key.
//!
//! The first caller for a key becomes the owner and does the work; later
//! callers find the registered flight and block until the owner publishes
//! its result. Unrelated keys only contend on the brief map lookup.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::buffer::ThumbnailBuffer;
use super::key::ThumbnailKey;
use crate::error::ThumbnailError;

pub type FlightResult = Result<ThumbnailBuffer, ThumbnailError>;

/// Result slot shared by the owner and its waiters.
struct Flight {
    result: Mutex<Option<FlightResult>>,
    cv: Condvar,
}

impl Flight {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    fn set(&self, result: FlightResult) {
        let mut slot = self.result.lock();
        if slot.is_none() {
            *slot = Some(result);
        }
        self.cv.notify_all();
    }

    fn wait(&self) -> FlightResult {
        let mut slot = self.result.lock();
        while slot.is_none() {
            self.cv.wait(&mut slot);
        }
        match slot.as_ref() {
            Some(result) => result.clone(),
            None => unreachable!("woken without a result"),
        }
    }
}

/// Outcome of joining a flight.
pub enum Joined<'a> {
    /// No load was running; the caller must perform it and complete the guard.
    Owner(FlightGuard<'a>),
    /// Another caller finished the load; this is its result.
    Waited(FlightResult),
}

/// Registry of loads currently in progress.
#[derive(Default)]
pub struct InFlight {
    flights: Mutex<HashMap<ThumbnailKey, Arc<Flight>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `key`, blocking if another caller owns it.
    pub fn join(&self, key: ThumbnailKey) -> Joined<'_> {
        let flight = {
            let mut flights = self.flights.lock();
            match flights.get(&key) {
                Some(existing) => Arc::clone(existing),
                None => {
                    let flight = Arc::new(Flight::new());
                    flights.insert(key, Arc::clone(&flight));
                    return Joined::Owner(FlightGuard {
                        registry: self,
                        key,
                        flight,
                        completed: false,
                    });
                }
            }
        };
        Joined::Waited(flight.wait())
    }

    /// Number of keys currently being loaded.
    pub fn len(&self) -> usize {
        self.flights.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.lock().is_empty()
    }

    /// Callers currently blocked on `key`.
    #[cfg(test)]
    fn waiters(&self, key: ThumbnailKey) -> usize {
        // One reference is held by the map and one by the owner's guard.
        self.flights
            .lock()
            .get(&key)
            .map_or(0, |f| Arc::strong_count(f).saturating_sub(2))
    }

    fn finish(&self, key: ThumbnailKey, flight: &Arc<Flight>, result: FlightResult) {
        {
            let mut flights = self.flights.lock();
            if flights.get(&key).is_some_and(|f| Arc::ptr_eq(f, flight)) {
                flights.remove(&key);
            }
        }
        flight.set(result);
    }
}

/// Ownership of a flight. Dropping it without completing releases waiters
/// with an error so they never block forever.
pub struct FlightGuard<'a> {
    registry: &'a InFlight,
    key: ThumbnailKey,
    flight: Arc<Flight>,
    completed: bool,
}

impl FlightGuard<'_> {
    /// Publish the result to every waiter and deregister the key.
    pub fn complete(mut self, result: FlightResult) -> FlightResult {
        self.completed = true;
        self.registry.finish(self.key, &self.flight, result.clone());
        result
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            let err = ThumbnailError::Decode {
                handle: self.key.to_string(),
                reason: "thumbnail load abandoned".to_string(),
            };
            self.registry.finish(self.key, &self.flight, Err(err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use std::thread;
    use std::time::Duration;

    fn key(id: u64) -> ThumbnailKey {
        ThumbnailKey::from_photo_id(id)
    }

    #[test]
    fn test_first_caller_owns() {
        let registry = InFlight::new();
        let Joined::Owner(guard) = registry.join(key(1)) else {
            panic!("expected ownership");
        };
        assert_eq!(registry.len(), 1);

        let result = guard.complete(Ok(ThumbnailBuffer::new(RgbaImage::new(2, 2))));
        assert!(result.is_ok());
        assert!(registry.is_empty());

        assert!(matches!(registry.join(key(1)), Joined::Owner(_)));
    }

    #[test]
    fn test_waiters_receive_owner_result() {
        let registry = Arc::new(InFlight::new());
        let Joined::Owner(guard) = registry.join(key(5)) else {
            panic!("expected ownership");
        };

        let waiter = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || match registry.join(key(5)) {
                Joined::Waited(result) => result.map(|b| b.dimensions()),
                Joined::Owner(_) => panic!("second caller must wait"),
            })
        };

        while registry.waiters(key(5)) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        guard.complete(Ok(ThumbnailBuffer::new(RgbaImage::new(3, 4))));

        assert_eq!(waiter.join().unwrap().unwrap(), (3, 4));
    }

    #[test]
    fn test_abandoned_flight_releases_waiters() {
        let registry = Arc::new(InFlight::new());
        let Joined::Owner(guard) = registry.join(key(9)) else {
            panic!("expected ownership");
        };

        let waiter = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || match registry.join(key(9)) {
                Joined::Waited(result) => result.is_err(),
                Joined::Owner(_) => false,
            })
        };

        while registry.waiters(key(9)) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        drop(guard);

        assert!(waiter.join().unwrap());
        assert!(registry.is_empty());
    }
}
