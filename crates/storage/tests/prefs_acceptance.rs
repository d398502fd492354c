use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use storage::{KeyValueStore, PrefValue, Prefs, SqlitePrefsStore};

#[tokio::test]
async fn sqlite_backed_prefs_stream_changes_made_through_another_handle() {
    let store = Arc::new(SqlitePrefsStore::new("sqlite::memory:").await.expect("db"));
    let prefs = Prefs::new(Arc::clone(&store));
    let editor = prefs.clone();

    let mut base_url = Box::pin(prefs.get("base_url", "https://prod".to_string()));
    let first = tokio::time::timeout(Duration::from_secs(2), base_url.next())
        .await
        .expect("initial value in time");
    assert_eq!(first.as_deref(), Some("https://prod"));

    assert!(
        editor
            .set("base_url", Some("https://staging".to_string()))
            .await
    );
    let second = tokio::time::timeout(Duration::from_secs(2), base_url.next())
        .await
        .expect("update in time");
    assert_eq!(second.as_deref(), Some("https://staging"));

    assert_eq!(
        store.read("base_url").await.expect("raw read"),
        Some(PrefValue::String("https://staging".into()))
    );
}
