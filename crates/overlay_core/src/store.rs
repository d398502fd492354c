//! Append-only observable event store shared by the log, network and analytics captures.
//!
//! Producers append from any thread. Every mutation bumps a revision and is published on a
//! broadcast channel while the state lock is held, so observers see changes in exactly the
//! order they were applied. Entries are immutable once appended; the only other mutation is
//! clearing the whole store.

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use futures::{stream, Stream};
use serde::{Serialize, Serializer};
use shared::{SortOrder, Timestamped};
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tracing::debug;

use crate::lock::lock_or_recover;

pub const DEFAULT_CHANGE_CAPACITY: usize = 1024;

pub enum StoreChange<T> {
    Appended { revision: u64, event: Arc<T> },
    Cleared { revision: u64 },
}

impl<T> StoreChange<T> {
    pub fn revision(&self) -> u64 {
        match self {
            StoreChange::Appended { revision, .. } | StoreChange::Cleared { revision } => *revision,
        }
    }
}

impl<T> Clone for StoreChange<T> {
    fn clone(&self) -> Self {
        match self {
            StoreChange::Appended { revision, event } => StoreChange::Appended {
                revision: *revision,
                event: Arc::clone(event),
            },
            StoreChange::Cleared { revision } => StoreChange::Cleared {
                revision: *revision,
            },
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for StoreChange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreChange::Appended { revision, event } => f
                .debug_struct("Appended")
                .field("revision", revision)
                .field("event", event)
                .finish(),
            StoreChange::Cleared { revision } => {
                f.debug_struct("Cleared").field("revision", revision).finish()
            }
        }
    }
}

/// Point-in-time copy of a store. Ordering views never touch the store itself.
pub struct Snapshot<T> {
    revision: u64,
    events: Vec<Arc<T>>,
}

impl<T> Snapshot<T> {
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<T>> {
        self.events.iter()
    }

    pub fn as_slice(&self) -> &[Arc<T>] {
        &self.events
    }

    pub fn into_vec(self) -> Vec<Arc<T>> {
        self.events
    }

    /// Reverse arrival order.
    pub fn newest_first(&self) -> Vec<Arc<T>> {
        self.events.iter().rev().cloned().collect()
    }
}

impl<T: Timestamped> Snapshot<T> {
    /// Stable sort by timestamp; entries with equal timestamps keep arrival order.
    pub fn sorted(&self, order: SortOrder) -> Vec<Arc<T>> {
        let mut events = self.events.clone();
        match order {
            SortOrder::Ascending => events.sort_by_key(|event| event.timestamp_ms()),
            SortOrder::Descending => {
                events.sort_by_key(|event| std::cmp::Reverse(event.timestamp_ms()))
            }
        }
        events
    }
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            revision: self.revision,
            events: self.events.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("revision", &self.revision)
            .field("events", &self.events)
            .finish()
    }
}

impl<'a, T> IntoIterator for &'a Snapshot<T> {
    type Item = &'a Arc<T>;
    type IntoIter = std::slice::Iter<'a, Arc<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

impl<T: Serialize> Serialize for Snapshot<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.events.iter().map(|event| event.as_ref()))
    }
}

struct StoreState<T> {
    revision: u64,
    events: Vec<Arc<T>>,
}

pub struct EventStore<T> {
    name: String,
    state: Mutex<StoreState<T>>,
    changes: broadcast::Sender<StoreChange<T>>,
}

impl<T: Send + Sync + 'static> EventStore<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_change_capacity(name, DEFAULT_CHANGE_CAPACITY)
    }

    /// `capacity` bounds how far an observer may fall behind before it resynchronises
    /// from a fresh snapshot. It never bounds the store itself.
    pub fn with_change_capacity(name: impl Into<String>, capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            name: name.into(),
            state: Mutex::new(StoreState {
                revision: 0,
                events: Vec::new(),
            }),
            changes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Never fails and never blocks on observers. Returns the revision of the append.
    pub fn append(&self, event: T) -> u64 {
        let event = Arc::new(event);
        let mut state = lock_or_recover(&self.state, "event store append");
        state.revision += 1;
        let revision = state.revision;
        state.events.push(Arc::clone(&event));
        let _ = self.changes.send(StoreChange::Appended { revision, event });
        revision
    }

    pub fn clear(&self) {
        let (revision, removed) = {
            let mut state = lock_or_recover(&self.state, "event store clear");
            state.revision += 1;
            let removed = state.events.len();
            state.events.clear();
            let revision = state.revision;
            let _ = self.changes.send(StoreChange::Cleared { revision });
            (revision, removed)
        };
        debug!(store = %self.name, revision, removed, "cleared event store");
    }

    pub fn snapshot(&self) -> Snapshot<T> {
        let state = lock_or_recover(&self.state, "event store snapshot");
        Snapshot {
            revision: state.revision,
            events: state.events.clone(),
        }
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.state, "event store len").events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn revision(&self) -> u64 {
        lock_or_recover(&self.state, "event store revision").revision
    }

    /// Raw change feed. A lagging receiver gets `RecvError::Lagged` and should resnapshot.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange<T>> {
        self.changes.subscribe()
    }

    /// Current snapshot followed by a fresh snapshot after each batch of changes.
    /// Changes already queued when the observer wakes are folded into one snapshot.
    pub fn observe(self: &Arc<Self>) -> impl Stream<Item = Snapshot<T>> + Send + 'static {
        // Subscribe before snapshotting so nothing falls between the two.
        let changes = self.changes.subscribe();
        let initial = self.snapshot();
        let state = ObserveState {
            store: Arc::clone(self),
            changes,
            initial: Some(initial),
            last_revision: 0,
        };

        stream::unfold(state, |mut state| async move {
            if let Some(initial) = state.initial.take() {
                state.last_revision = initial.revision();
                return Some((initial, state));
            }

            loop {
                match state.changes.recv().await {
                    Ok(change) if change.revision() <= state.last_revision => continue,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(store = %state.store.name, skipped, "store observer lagged; resnapshotting");
                    }
                    Err(RecvError::Closed) => return None,
                }

                loop {
                    match state.changes.try_recv() {
                        Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                    }
                }

                let snapshot = state.store.snapshot();
                if snapshot.revision() <= state.last_revision {
                    continue;
                }
                state.last_revision = snapshot.revision();
                return Some((snapshot, state));
            }
        })
    }
}

struct ObserveState<T> {
    store: Arc<EventStore<T>>,
    changes: broadcast::Receiver<StoreChange<T>>,
    initial: Option<Snapshot<T>>,
    last_revision: u64,
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
