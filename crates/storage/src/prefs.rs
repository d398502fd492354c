use std::{collections::BTreeMap, sync::Arc};

use anyhow::Result;
use futures::{future, stream, Stream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::{KeyValueStore, PrefChange, PrefKind, PrefValue, PrefsError};

pub trait PrefType: Clone + PartialEq + Send + Sync + 'static {
    const KIND: PrefKind;

    fn from_pref(value: PrefValue) -> Option<Self>;
    fn into_pref(self) -> PrefValue;
}

macro_rules! pref_type {
    ($ty:ty, $variant:ident) => {
        impl PrefType for $ty {
            const KIND: PrefKind = PrefKind::$variant;

            fn from_pref(value: PrefValue) -> Option<Self> {
                match value {
                    PrefValue::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_pref(self) -> PrefValue {
                PrefValue::$variant(self)
            }
        }
    };
}

pref_type!(bool, Bool);
pref_type!(i32, Int);
pref_type!(i64, Long);
pref_type!(f32, Float);
pref_type!(f64, Double);
pref_type!(String, String);

/// Typed accessor over a [`KeyValueStore`]. Reads are observable streams of distinct values.
pub struct Prefs<S: KeyValueStore + ?Sized> {
    store: Arc<S>,
}

impl<S: KeyValueStore + ?Sized> Clone for Prefs<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: KeyValueStore + ?Sized + 'static> Prefs<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Current value followed by every change; `default` stands in for absent keys.
    pub fn get<T: PrefType>(
        &self,
        key: impl Into<String>,
        default: T,
    ) -> impl Stream<Item = T> + Send + 'static {
        let key = key.into();
        let typed_key = key.clone();
        distinct(self.observe_raw(key).map(move |raw| {
            typed(&typed_key, raw).unwrap_or_else(|| default.clone())
        }))
    }

    pub fn get_nullable<T: PrefType>(
        &self,
        key: impl Into<String>,
        default: Option<T>,
    ) -> impl Stream<Item = Option<T>> + Send + 'static {
        let key = key.into();
        let typed_key = key.clone();
        distinct(
            self.observe_raw(key)
                .map(move |raw| typed(&typed_key, raw).or_else(|| default.clone())),
        )
    }

    /// One-shot typed read that reports a stored value of another kind as an error.
    pub async fn read<T: PrefType>(&self, key: &str) -> Result<Option<T>> {
        match self.store.read(key).await? {
            None => Ok(None),
            Some(value) => {
                let found = value.kind();
                T::from_pref(value).map(Some).ok_or_else(|| {
                    PrefsError::KindMismatch {
                        key: key.to_string(),
                        expected: T::KIND,
                        found,
                    }
                    .into()
                })
            }
        }
    }

    /// `None` removes the key. Returns whether the write reached the store.
    pub async fn set<T: PrefType>(&self, key: &str, value: Option<T>) -> bool {
        self.set_value(key, value.map(PrefType::into_pref)).await
    }

    pub async fn set_value(&self, key: &str, value: Option<PrefValue>) -> bool {
        match self.store.write(key, value).await {
            Ok(()) => true,
            Err(error) => {
                warn!(%key, error = %format!("{error:#}"), "failed to write preference");
                false
            }
        }
    }

    pub async fn entries(&self) -> Result<BTreeMap<String, PrefValue>> {
        self.store.entries().await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }

    fn observe_raw(&self, key: String) -> impl Stream<Item = Option<PrefValue>> + Send + 'static {
        let changes = self.store.subscribe_changes();
        let state = ObserveState {
            store: Arc::clone(&self.store),
            changes,
            key,
            started: false,
        };

        stream::unfold(state, |mut state| async move {
            if state.started {
                loop {
                    match state.changes.recv().await {
                        Ok(change) if change.affects(&state.key) => break,
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(key = %state.key, skipped, "preference observer lagged; re-reading");
                            break;
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
            state.started = true;

            let current = match state.store.read(&state.key).await {
                Ok(value) => value,
                Err(error) => {
                    warn!(key = %state.key, error = %format!("{error:#}"), "failed to read preference");
                    None
                }
            };
            Some((current, state))
        })
    }
}

struct ObserveState<S: ?Sized> {
    store: Arc<S>,
    changes: broadcast::Receiver<PrefChange>,
    key: String,
    started: bool,
}

fn typed<T: PrefType>(key: &str, raw: Option<PrefValue>) -> Option<T> {
    let value = raw?;
    let found = value.kind();
    let converted = T::from_pref(value);
    if converted.is_none() {
        warn!(%key, expected = %T::KIND, %found, "preference holds a value of another kind");
    }
    converted
}

fn distinct<T, St>(items: St) -> impl Stream<Item = T> + Send + 'static
where
    T: Clone + PartialEq + Send + 'static,
    St: Stream<Item = T> + Send + 'static,
{
    items
        .scan(None::<T>, |last, item| {
            let fresh = last.as_ref() != Some(&item);
            if fresh {
                *last = Some(item.clone());
            }
            future::ready(Some(fresh.then_some(item)))
        })
        .filter_map(future::ready)
}

#[cfg(test)]
#[path = "tests/prefs_tests.rs"]
mod tests;
