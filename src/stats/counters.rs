//! Named Concurrent Counters
//!
//! Every connection task bumps counters by name, so the store has to be
//! safe under concurrent use from any number of tasks.
//!
//! ## Design
//!
//! Counters live in a `HashMap<String, AtomicI64>` behind an `RwLock`.
//! Creating a counter takes the write lock once; every later update only
//! takes the read lock and does an atomic add, so connections never
//! serialize on each other while updating existing counters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

/// Counter: total number of connections accepted
pub const CONNECTIONS_ACCEPTED: &str = "connections_accepted";

/// Counter: connections currently open
pub const CONNECTIONS_ACTIVE: &str = "connections_active";

/// Counter: panics caught at the connection boundary
pub const PANICS_RECOVERED: &str = "panics_recovered";

/// Counter: messages that matched a command and were dispatched
pub const COMMANDS_DISPATCHED: &str = "commands_dispatched";

/// Counter: messages that matched no command
pub const COMMANDS_REJECTED: &str = "commands_rejected";

/// A statistics store that can be bumped by name.
///
/// Both operations are fire-and-forget. Implementations must tolerate
/// concurrent calls from every connection task.
pub trait StatsStore: Send + Sync {
    /// Adds one to the named counter, creating it if needed.
    fn increment(&self, name: &str);

    /// Subtracts one from the named counter, creating it if needed.
    fn decrement(&self, name: &str);

    /// Returns every counter and its current value.
    ///
    /// Stores that cannot enumerate their counters return nothing.
    fn snapshot(&self) -> Vec<(String, i64)> {
        Vec::new()
    }
}

/// The default [`StatsStore`]: in-memory named atomic counters.
#[derive(Debug, Default)]
pub struct Counters {
    counters: RwLock<HashMap<String, AtomicI64>>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current value of a counter (0 if it was never touched).
    pub fn get(&self, name: &str) -> i64 {
        let counters = self.counters.read().unwrap_or_else(|e| e.into_inner());
        counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Applies `delta` to the named counter.
    fn add(&self, name: &str, delta: i64) {
        {
            let counters = self.counters.read().unwrap_or_else(|e| e.into_inner());
            if let Some(counter) = counters.get(name) {
                counter.fetch_add(delta, Ordering::Relaxed);
                return;
            }
        }

        // First touch: another task may have created it since we dropped the
        // read lock, so go through the entry API.
        let mut counters = self.counters.write().unwrap_or_else(|e| e.into_inner());
        counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }
}

impl StatsStore for Counters {
    fn increment(&self, name: &str) {
        self.add(name, 1);
    }

    fn decrement(&self, name: &str) {
        self.add(name, -1);
    }

    fn snapshot(&self) -> Vec<(String, i64)> {
        let counters = self.counters.read().unwrap_or_else(|e| e.into_inner());
        let mut values: Vec<(String, i64)> = counters
            .iter()
            .map(|(name, c)| (name.clone(), c.load(Ordering::Relaxed)))
            .collect();
        values.sort_by(|a, b| a.0.cmp(&b.0));
        values
    }
}
