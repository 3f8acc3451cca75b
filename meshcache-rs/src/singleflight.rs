//! Coalesces concurrent loads for the same key into a single execution.
//!
//! When several tasks miss the cache for the same key at the same time, only the first one
//! actually invokes the (potentially expensive) load. All others wait on the promise of
//! that winner and receive its result, whether value or error. Once the winner has
//! finished, the promise is removed so that a later call starts a fresh load.
//!
//! Internally a promise is a [watch](tokio::sync::watch) channel: the pending state is
//! **None**, completing the load publishes **Some(outcome)** to every waiter. The group
//! lock is only held around map mutation, never while waiting or loading.
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

/// Contains the shared outcome of a coalesced load.
///
/// Errors are wrapped into an [Arc] as all waiters observe the very same failure.
pub type Outcome<V> = Result<V, Arc<anyhow::Error>>;

type Promise<V> = watch::Receiver<Option<Outcome<V>>>;

/// Deduplicates concurrent invocations of a load per key.
pub struct SingleFlight<V> {
    promises: Mutex<HashMap<String, Promise<V>>>,
}

/// Removes the promise for a key once its flight is over.
///
/// This is performed by a guard so that the promise also disappears if the winning task
/// is dropped before completion. Waiters of such an abandoned flight receive an error and
/// the next caller starts a fresh load instead of waiting forever.
struct FlightGuard<'a, V> {
    group: &'a SingleFlight<V>,
    key: &'a str,
}

impl<V> Drop for FlightGuard<'_, V> {
    fn drop(&mut self) {
        let _ = self.group.promises.lock().unwrap().remove(self.key);
    }
}

impl<V: Clone> SingleFlight<V> {
    /// Creates a new, empty group.
    pub fn new() -> Self {
        SingleFlight {
            promises: Mutex::new(HashMap::new()),
        }
    }

    /// Executes the given task unless a load for the same key is already in flight.
    ///
    /// The first caller for a key becomes the winner and runs **task** to completion. All
    /// callers arriving while that flight is ongoing simply wait and share the winner's
    /// outcome. After the flight has ended, the next call for the key starts a new one.
    pub async fn execute<F, Fut>(&self, key: &str, task: F) -> Outcome<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
    {
        enum Slot<V> {
            Existing(Promise<V>),
            Winner(watch::Sender<Option<Outcome<V>>>),
        }

        let slot = {
            let mut promises = self.promises.lock().unwrap();
            if let Some(promise) = promises.get(key) {
                Slot::Existing(promise.clone())
            } else {
                let (sender, receiver) = watch::channel(None);
                let _ = promises.insert(key.to_owned(), receiver);
                Slot::Winner(sender)
            }
        };

        let sender = match slot {
            Slot::Existing(promise) => return Self::await_outcome(key, promise).await,
            Slot::Winner(sender) => sender,
        };

        // We are the winner: make sure the promise is removed again, even if we are
        // dropped before the load completes...
        let guard = FlightGuard { group: self, key };

        let outcome = task().await.map_err(Arc::new);
        let _ = sender.send_replace(Some(outcome.clone()));

        drop(guard);

        outcome
    }

    /// Waits until the winner publishes its outcome and returns a copy of it.
    async fn await_outcome(key: &str, mut promise: Promise<V>) -> Outcome<V> {
        match promise.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => outcome
                .clone()
                .expect("A published outcome vanished from its promise"),
            // The sender was dropped without ever publishing a result...
            Err(_) => Err(Arc::new(anyhow::anyhow!(
                "The in-flight load for '{}' was abandoned before it completed",
                key
            ))),
        }
    }
}

impl<V: Clone> Default for SingleFlight<V> {
    fn default() -> Self {
        SingleFlight::new()
    }
}
