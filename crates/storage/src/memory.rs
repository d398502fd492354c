use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use crate::{KeyValueStore, PrefChange, PrefValue, CHANGE_CHANNEL_CAPACITY};

/// Process-local preferences, for hosts without a database and for tests.
pub struct MemoryPrefsStore {
    entries: RwLock<BTreeMap<String, PrefValue>>,
    changes: broadcast::Sender<PrefChange>,
}

impl MemoryPrefsStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            changes: broadcast::channel(CHANGE_CHANNEL_CAPACITY).0,
        }
    }
}

impl Default for MemoryPrefsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryPrefsStore {
    async fn read(&self, key: &str) -> Result<Option<PrefValue>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: Option<PrefValue>) -> Result<()> {
        {
            let mut entries = self.entries.write().await;
            match value {
                Some(value) => {
                    entries.insert(key.to_string(), value);
                }
                None => {
                    entries.remove(key);
                }
            }
        }
        let _ = self.changes.send(PrefChange::Key(key.to_string()));
        Ok(())
    }

    async fn entries(&self) -> Result<BTreeMap<String, PrefValue>> {
        Ok(self.entries.read().await.clone())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        let _ = self.changes.send(PrefChange::Cleared);
        Ok(())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<PrefChange> {
        self.changes.subscribe()
    }
}
