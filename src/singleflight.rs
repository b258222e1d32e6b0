//! Collapses concurrent identical loads into a single in-flight operation.
//!
//! When a burst of callers asks for the same key at the same time, only the
//! first one actually executes the load. Everybody else joins the pending
//! flight and receives the very same outcome - value or error - once it is
//! published. This is what shields a slow backing store from thundering-herd
//! load when a hot key expires.
//!
//! Once a flight has published its outcome it is forgotten, so a later caller
//! computes a fresh result. Joined callers cannot cancel a flight; they share
//! a single fate with the executor.
//!
//! # Examples
//! ```
//! use callisto::singleflight::SingleFlight;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! #[tokio::main]
//! async fn main() {
//!     let flights: SingleFlight<u32> = SingleFlight::new();
//!     let executions = AtomicUsize::new(0);
//!
//!     let (first, second) = tokio::join!(
//!         flights.run("answer", || async {
//!             executions.fetch_add(1, Ordering::SeqCst);
//!             tokio::time::sleep(std::time::Duration::from_millis(20)).await;
//!             Ok(42)
//!         }),
//!         flights.run("answer", || async { Ok(0) }),
//!     );
//!
//!     // The second caller joined the first flight, so the operation ran
//!     // exactly once and both observed its result.
//!     assert_eq!(first.unwrap(), 42);
//!     assert_eq!(second.unwrap(), 42);
//!     assert_eq!(executions.load(Ordering::SeqCst), 1);
//! }
//! ```
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// The error form shared between all callers of a flight.
///
/// `anyhow::Error` itself cannot be cloned, so the coalescer hands the same
/// reference-counted instance to every joined caller.
pub type SharedError = Arc<anyhow::Error>;

/// The outcome of a flight as observed by every caller.
pub type Outcome<T> = Result<T, SharedError>;

/// Deduplicates concurrent loads by key.
///
/// See the [module docs](crate::singleflight) for the semantics and an
/// example.
pub struct SingleFlight<T> {
    flights: Mutex<HashMap<String, broadcast::Sender<Outcome<T>>>>,
}

impl<T: Clone> SingleFlight<T> {
    /// Creates a coalescer with no flights in progress.
    pub fn new() -> Self {
        SingleFlight {
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Executes `operation` unless a flight for `key` is already in progress,
    /// in which case its outcome is awaited and shared.
    ///
    /// For a given key, at most one operation executes at any time. Every
    /// caller which joined while the operation was running observes the same
    /// value or error. If the executing task panics or is cancelled at an
    /// await point, the joined callers are woken with an error instead of
    /// waiting forever.
    pub async fn run<F, Fut>(&self, key: &str, operation: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        // Either join the pending flight or announce a new one. The lock is
        // only held for the map access, never while executing or waiting.
        let pending = {
            let mut flights = self.flights.lock().unwrap();
            match flights.get(key) {
                Some(flight) => Some(flight.subscribe()),
                None => {
                    let (publisher, _) = broadcast::channel(1);
                    let _ = flights.insert(key.to_owned(), publisher);
                    None
                }
            }
        };

        if let Some(mut pending) = pending {
            return match pending.recv().await {
                Ok(outcome) => outcome,
                // The channel closed without a message: the executor died
                // before publishing. Surface this as an error rather than a
                // hang.
                Err(_) => Err(Arc::new(anyhow::anyhow!(
                    "the load for '{}' was aborted before it produced a result",
                    key
                ))),
            };
        }

        // We are the executor. The guard unregisters the flight if we never
        // reach the publication below (panic or cancellation), which closes
        // the channel and wakes all joined callers.
        let mut guard = FlightGuard {
            flights: &self.flights,
            key,
            armed: true,
        };

        let outcome = operation().await.map_err(Arc::new);
        guard.armed = false;

        // Unregister before publishing: anyone who found the flight in the
        // map has already subscribed, anyone who looks it up afterwards
        // starts a fresh flight.
        let publisher = self.flights.lock().unwrap().remove(key);
        if let Some(publisher) = publisher {
            let _ = publisher.send(outcome.clone());
        }

        outcome
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        SingleFlight::new()
    }
}

/// Removes an announced flight if its executor dies before publishing.
struct FlightGuard<'a, T> {
    flights: &'a Mutex<HashMap<String, broadcast::Sender<Outcome<T>>>>,
    key: &'a str,
    armed: bool,
}

impl<T> Drop for FlightGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            if let Ok(mut flights) = self.flights.lock() {
                let _ = flights.remove(self.key);
            }
        }
    }
}
