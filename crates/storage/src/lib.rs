use std::{collections::BTreeMap, fmt, str::FromStr};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::ParseError;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use thiserror::Error;
use tokio::sync::broadcast;

mod database_url;
mod memory;
mod prefs;

pub use database_url::{
    normalize_database_url, prepare_database_url, DEFAULT_PREFS_DATABASE_URL,
};
pub use memory::MemoryPrefsStore;
pub use prefs::{PrefType, Prefs};

const CHANGE_CHANNEL_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefKind {
    Bool,
    Int,
    Long,
    Float,
    Double,
    String,
}

impl PrefKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PrefKind::Bool => "bool",
            PrefKind::Int => "int",
            PrefKind::Long => "long",
            PrefKind::Float => "float",
            PrefKind::Double => "double",
            PrefKind::String => "string",
        }
    }
}

impl fmt::Display for PrefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrefKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(PrefKind::Bool),
            "int" | "i32" => Ok(PrefKind::Int),
            "long" | "i64" => Ok(PrefKind::Long),
            "float" | "f32" => Ok(PrefKind::Float),
            "double" | "f64" => Ok(PrefKind::Double),
            "string" | "str" => Ok(PrefKind::String),
            other => Err(ParseError::unknown("preference kind", other)),
        }
    }
}

/// A stored preference; the variant is the key's declared type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PrefValue {
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl PrefValue {
    pub fn kind(&self) -> PrefKind {
        match self {
            PrefValue::Bool(_) => PrefKind::Bool,
            PrefValue::Int(_) => PrefKind::Int,
            PrefValue::Long(_) => PrefKind::Long,
            PrefValue::Float(_) => PrefKind::Float,
            PrefValue::Double(_) => PrefKind::Double,
            PrefValue::String(_) => PrefKind::String,
        }
    }

    pub fn parse(kind: PrefKind, raw: &str) -> Result<Self, ParseError> {
        let invalid = |reason: &dyn fmt::Display| ParseError::invalid(kind.as_str(), raw, reason);
        Ok(match kind {
            PrefKind::Bool => PrefValue::Bool(raw.trim().parse().map_err(|e| invalid(&e))?),
            PrefKind::Int => PrefValue::Int(raw.trim().parse().map_err(|e| invalid(&e))?),
            PrefKind::Long => PrefValue::Long(raw.trim().parse().map_err(|e| invalid(&e))?),
            PrefKind::Float => PrefValue::Float(raw.trim().parse().map_err(|e| invalid(&e))?),
            PrefKind::Double => PrefValue::Double(raw.trim().parse().map_err(|e| invalid(&e))?),
            PrefKind::String => PrefValue::String(raw.to_string()),
        })
    }
}

impl fmt::Display for PrefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefValue::Bool(v) => write!(f, "{v}"),
            PrefValue::Int(v) => write!(f, "{v}"),
            PrefValue::Long(v) => write!(f, "{v}"),
            PrefValue::Float(v) => write!(f, "{v}"),
            PrefValue::Double(v) => write!(f, "{v}"),
            PrefValue::String(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefChange {
    Key(String),
    Cleared,
}

impl PrefChange {
    pub fn affects(&self, key: &str) -> bool {
        match self {
            PrefChange::Key(changed) => changed == key,
            PrefChange::Cleared => true,
        }
    }
}

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("preference '{key}' holds a {found} value, expected {expected}")]
    KindMismatch {
        key: String,
        expected: PrefKind,
        found: PrefKind,
    },
    #[error("preference '{key}' could not be decoded: {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },
}

/// Asynchronous key/value map behind the preferences screen.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<PrefValue>>;
    /// `None` removes the key.
    async fn write(&self, key: &str, value: Option<PrefValue>) -> Result<()>;
    async fn entries(&self) -> Result<BTreeMap<String, PrefValue>>;
    async fn clear(&self) -> Result<()>;
    fn subscribe_changes(&self) -> broadcast::Receiver<PrefChange>;
}

#[derive(Clone)]
pub struct SqlitePrefsStore {
    pool: Pool<Sqlite>,
    changes: broadcast::Sender<PrefChange>,
}

impl SqlitePrefsStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        database_url::ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to an in-memory url opens its own empty database.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open preferences database '{database_url}'"))?;

        let store = Self {
            pool,
            changes: broadcast::channel(CHANGE_CHANNEL_CAPACITY).0,
        };
        store.ensure_preferences_table().await?;
        Ok(store)
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_preferences_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS preferences (
                key         TEXT PRIMARY KEY NOT NULL,
                kind        TEXT NOT NULL,
                value_json  TEXT NOT NULL,
                updated_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure preferences table exists")?;
        Ok(())
    }

    fn notify(&self, change: PrefChange) {
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }
}

fn decode_value(key: &str, value_json: &str) -> Result<PrefValue> {
    serde_json::from_str(value_json).map_err(|source| {
        PrefsError::Decode {
            key: key.to_string(),
            source,
        }
        .into()
    })
}

#[async_trait]
impl KeyValueStore for SqlitePrefsStore {
    async fn read(&self, key: &str) -> Result<Option<PrefValue>> {
        let row = sqlx::query("SELECT value_json FROM preferences WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read preference '{key}'"))?;

        row.map(|row| decode_value(key, &row.get::<String, _>("value_json")))
            .transpose()
    }

    async fn write(&self, key: &str, value: Option<PrefValue>) -> Result<()> {
        match value {
            Some(value) => {
                let value_json = serde_json::to_string(&value)?;
                sqlx::query(
                    r#"
                    INSERT INTO preferences (key, kind, value_json, updated_at)
                    VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP)
                    ON CONFLICT(key) DO UPDATE SET
                        kind = excluded.kind,
                        value_json = excluded.value_json,
                        updated_at = CURRENT_TIMESTAMP
                    "#,
                )
                .bind(key)
                .bind(value.kind().as_str())
                .bind(value_json)
                .execute(&self.pool)
                .await
                .with_context(|| format!("failed to write preference '{key}'"))?;
            }
            None => {
                sqlx::query("DELETE FROM preferences WHERE key = ?1")
                    .bind(key)
                    .execute(&self.pool)
                    .await
                    .with_context(|| format!("failed to remove preference '{key}'"))?;
            }
        }
        self.notify(PrefChange::Key(key.to_string()));
        Ok(())
    }

    async fn entries(&self) -> Result<BTreeMap<String, PrefValue>> {
        let rows = sqlx::query("SELECT key, value_json FROM preferences ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .context("failed to list preferences")?;

        rows.into_iter()
            .map(|row| {
                let key: String = row.get("key");
                let value = decode_value(&key, &row.get::<String, _>("value_json"))?;
                Ok((key, value))
            })
            .collect()
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM preferences")
            .execute(&self.pool)
            .await
            .context("failed to clear preferences")?;
        self.notify(PrefChange::Cleared);
        Ok(())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<PrefChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
