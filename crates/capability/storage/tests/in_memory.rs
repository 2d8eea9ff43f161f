use edge_storage::{
    AlarmLogRecord, AlarmLogStore, InMemoryAlarmLogStore, InMemoryInternalStore,
    InMemoryLostCacheStore, InternalStore, LostCacheStore,
};

#[tokio::test]
async fn lost_cache_is_fifo_per_uuid() {
    let store = InMemoryLostCacheStore::new(10);
    store.create_table("t1").await.expect("create");
    store.create_table("t1").await.expect("create again");
    store.save("t1", "a").await.expect("save a");
    store.save("t1", "b").await.expect("save b");
    store.save("t2", "x").await.expect("save x");

    let records = store.get("t1").await.expect("get");
    let data: Vec<&str> = records.iter().map(|r| r.data.as_str()).collect();
    assert_eq!(data, vec!["a", "b"]);
    assert!(records[0].id < records[1].id);

    assert!(store.delete_one("t1", records[0].id).await.expect("delete"));
    assert!(!store.delete_one("t1", records[0].id).await.expect("delete again"));
    assert_eq!(store.get("t1").await.expect("get").len(), 1);

    store.clear("t1").await.expect("clear");
    assert!(store.get("t1").await.expect("get").is_empty());
    assert_eq!(store.get("t2").await.expect("get").len(), 1);
}

#[tokio::test]
async fn lost_cache_drops_oldest_over_limit() {
    let store = InMemoryLostCacheStore::new(2);
    for value in ["1", "2", "3"] {
        store.save("t1", value).await.expect("save");
    }
    let data: Vec<String> = store
        .get("t1")
        .await
        .expect("get")
        .into_iter()
        .map(|r| r.data)
        .collect();
    assert_eq!(data, vec!["2".to_string(), "3".to_string()]);
}

fn alarm(rule: &str, n: i64) -> AlarmLogRecord {
    AlarmLogRecord {
        uuid: format!("log-{}", n),
        ts: n,
        rule_id: rule.to_string(),
        source: "s1".to_string(),
        event_type: "HIGH".to_string(),
        summary: "EventType:[ HIGH ] | Source:[ s1 ]".to_string(),
        info: String::new(),
    }
}

#[tokio::test]
async fn alarm_log_bounded_newest_first() {
    let store = InMemoryAlarmLogStore::new(3);
    let batch: Vec<AlarmLogRecord> = (1..=5).map(|n| alarm("r1", n)).collect();
    store.append_batch(&batch).await.expect("append");
    assert_eq!(store.count().await.expect("count"), 3);
    let recent = store.list_recent(2).await.expect("list");
    assert_eq!(recent[0].ts, 5);
    assert_eq!(recent[1].ts, 4);
}

#[tokio::test]
async fn internal_store_roundtrip() {
    let store = InMemoryInternalStore::new();
    store.set("b", "2").await.expect("set");
    store.set("a", "1").await.expect("set");
    assert_eq!(store.get("a").await.expect("get").as_deref(), Some("1"));
    assert_eq!(store.keys().await.expect("keys"), vec!["a", "b"]);
    assert!(store.delete("a").await.expect("delete"));
    assert_eq!(store.get("a").await.expect("get"), None);
}
