//! Per-key registry of conversions currently in flight.
//!
//! The first caller for a key becomes the leader and performs the work;
//! callers arriving while it runs become followers and receive the leader's
//! published result instead of repeating the work.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

type FlightMap<K, T> = Arc<Mutex<HashMap<K, watch::Receiver<Option<T>>>>>;

/// Registry of pending results keyed by `K`.
pub struct InFlightRegistry<K, T> {
    flights: FlightMap<K, T>,
}

/// Outcome of joining the registry for a key.
pub enum Flight<K: Eq + Hash, T> {
    /// No conversion was running; the caller must produce and publish.
    Leader(FlightGuard<K, T>),
    /// A conversion is running; the caller awaits its result.
    Follower(FlightWaiter<T>),
}

impl<K, T> InFlightRegistry<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Joins the flight for `key`, becoming leader if none is running.
    pub fn join(&self, key: &K) -> Flight<K, T> {
        let mut flights = self.flights.lock();
        if let Some(existing) = flights.get(key) {
            return Flight::Follower(FlightWaiter {
                rx: existing.clone(),
            });
        }

        let (tx, rx) = watch::channel(None);
        flights.insert(key.clone(), rx);
        Flight::Leader(FlightGuard {
            key: key.clone(),
            tx,
            flights: Arc::clone(&self.flights),
            completed: false,
        })
    }

    /// Returns the number of keys currently in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flights.lock().len()
    }

    /// Returns true if nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, T> Default for InFlightRegistry<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> std::fmt::Debug for InFlightRegistry<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightRegistry")
            .field("in_flight", &self.flights.lock().len())
            .finish()
    }
}

/// Leader's handle on a flight.
///
/// Dropping it without [`complete`](Self::complete) clears the entry and
/// wakes followers with no result.
pub struct FlightGuard<K: Eq + Hash, T> {
    key: K,
    tx: watch::Sender<Option<T>>,
    flights: FlightMap<K, T>,
    completed: bool,
}

impl<K: Eq + Hash, T> FlightGuard<K, T> {
    /// Publishes the result to all followers and clears the entry.
    pub fn complete(mut self, value: T) {
        let mut flights = self.flights.lock();
        self.tx.send_replace(Some(value));
        flights.remove(&self.key);
        self.completed = true;
    }
}

impl<K: Eq + Hash, T> Drop for FlightGuard<K, T> {
    fn drop(&mut self) {
        if !self.completed {
            self.flights.lock().remove(&self.key);
        }
    }
}

/// Follower's handle on a flight.
pub struct FlightWaiter<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> FlightWaiter<T> {
    /// Waits for the leader's result.
    ///
    /// Returns `None` if the leader went away without publishing.
    pub async fn wait(mut self) -> Option<T> {
        loop {
            if let Some(value) = self.rx.borrow_and_update().clone() {
                return Some(value);
            }
            if self.rx.changed().await.is_err() {
                return self.rx.borrow().clone();
            }
        }
    }
}
