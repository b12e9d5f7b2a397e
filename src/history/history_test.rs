use bytes::Bytes;
use chrono::{TimeZone, Utc};

use super::*;

fn text(text: &str, repeat: bool) -> Message {
    Message::GeneralText {
        text: text.to_owned(),
        repeat,
        priority: MessagePriority::Medium,
        part_no: 1,
        total_parts: 1,
    }
}

fn flight(flight_id: &str, update_type: FlightUpdateType) -> Message {
    Message::FlightUpdate {
        flight_id: flight_id.to_owned(),
        update_type,
        repeat: false,
        priority: MessagePriority::Urgent,
    }
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

#[test]
fn test_novel_message_accepted() {
    let mut history = MessageHistory::default();
    let m = text("gate B12", false);

    assert!(history.should_accept(&m));
    history.record(m.clone(), now());
    assert_eq!(history.len(), 1);
    assert!(history.head().unwrap().message.content_eq(&m));
}

#[test]
fn test_duplicate_rejected() {
    let mut history = MessageHistory::default();
    let m = text("gate B12", false);

    history.record(m.clone(), now());
    assert!(!history.should_accept(&m));
    assert_eq!(history.len(), 1);
}

#[test]
fn test_repeat_reenters_once() {
    let mut history = MessageHistory::default();

    // Original arrives without the repeat flag.
    let original = text("boarding", false);
    assert!(history.should_accept(&original));
    history.record(original, now());

    // A retransmission with repeat set re-enters circulation.
    let repeated = text("boarding", true);
    assert!(history.should_accept(&repeated));
    history.record(repeated.clone(), now());
    assert_eq!(history.len(), 2);

    // A second repeated copy is suppressed for good.
    assert!(!history.should_accept(&repeated));
}

#[test]
fn test_repeated_message_never_loops() {
    let mut history = MessageHistory::default();

    let m = text("delay 30min", true);
    assert!(history.should_accept(&m));
    history.record(m.clone(), now());
    assert!(!history.should_accept(&m));
}

#[test]
fn test_capacity_evicts_oldest() {
    let mut history = MessageHistory::default();

    for i in 0..55 {
        let m = text(&format!("update {i}"), false);
        history.record(m, now());
    }
    assert_eq!(history.len(), 50);

    // The newest entry is the head, the oldest five fell off.
    match &history.head().unwrap().message {
        Message::GeneralText { text, .. } => assert_eq!(text, "update 54"),
        other => panic!("unexpected head {other:?}"),
    }
    let entries = history.list();
    match &entries.last().unwrap().message {
        Message::GeneralText { text, .. } => assert_eq!(text, "update 5"),
        other => panic!("unexpected tail {other:?}"),
    }
}

#[test]
fn test_duplicate_window_is_bounded() {
    let mut history = MessageHistory::default();

    let m = text("old news", false);
    history.record(m.clone(), now());

    // Push the entry past the 10-entry duplicate window.
    for i in 0..10 {
        history.record(text(&format!("filler {i}"), false), now());
    }

    // Identical content is novel again once outside the window.
    assert!(history.should_accept(&m));
}

#[test]
fn test_clear() {
    let mut history = MessageHistory::default();
    history.record(text("x", false), now());
    history.clear();
    assert!(history.is_empty());
}

#[test]
fn test_stored_record_field_names() {
    let entry = StoredMessage::new(flight("FL123", FlightUpdateType::Delay), now());
    let json = serde_json::to_string(&StoredRecord::from(&entry)).unwrap();

    assert!(json.contains("\"messageType\":\"flightUpdate\""), "{json}");
    assert!(json.contains("\"priority\":\"urgent\""), "{json}");
    assert!(json.contains("\"updateType\":\"delay\""), "{json}");
    assert!(json.contains("\"flightId\":\"FL123\""), "{json}");
    assert!(json.contains("\"repeatFlag\":false"), "{json}");
    assert!(json.contains("\"receivedTimestamp\""), "{json}");
    // Fields of other message shapes stay absent.
    assert!(!json.contains("content_base64"), "{json}");
}

#[test]
fn test_record_round_trip_all_types() {
    let entries = vec![
        StoredMessage::new(
            Message::GeneralBasic {
                content: Bytes::from_static(b"\x00\x01\xfe"),
                repeat: true,
                priority: MessagePriority::Low,
            },
            now(),
        ),
        StoredMessage::new(text("boarding now", false), now()),
        StoredMessage::new(flight("FL42", FlightUpdateType::GateChange), now()),
        StoredMessage::new(
            Message::FlightUpdateGeneral {
                flight_id: "FL42".to_owned(),
                text: "new gate C7".to_owned(),
                repeat: false,
                priority: MessagePriority::High,
                part_no: 1,
                total_parts: 1,
            },
            now(),
        ),
    ];

    for entry in entries {
        let record = StoredRecord::from(&entry);
        let json = serde_json::to_string(&record).unwrap();
        let parsed: StoredRecord = serde_json::from_str(&json).unwrap();
        let restored = StoredMessage::try_from(parsed).unwrap();
        assert_eq!(restored, entry);
    }
}

#[test]
fn test_unknown_fields_ignored() {
    let json = r#"{
        "messageType": "generalText",
        "priority": "medium",
        "repeatFlag": false,
        "partNumber": 1,
        "totalParts": 1,
        "textContent": "hello",
        "receivedTimestamp": "2025-06-01T12:00:00Z",
        "radioChannel": 37
    }"#;
    let record: StoredRecord = serde_json::from_str(json).unwrap();
    let entry = StoredMessage::try_from(record).unwrap();
    assert!(entry.message.content_eq(&text("hello", false)));
}

fn scratch_store(name: &str) -> JsonFileStore {
    let path = std::env::temp_dir().join(format!("vuelink-{name}-{}.json", std::process::id()));
    let _ = std::fs::remove_file(&path);
    JsonFileStore::new(path)
}

#[tokio::test]
async fn test_json_file_store_round_trip() -> Result<()> {
    let store = scratch_store("round-trip");

    let entries = vec![
        StoredMessage::new(text("first", false), now()),
        StoredMessage::new(flight("FL1", FlightUpdateType::Boarding), now()),
    ];
    store.save(&entries).await?;

    let loaded = store.load().await?;
    assert_eq!(loaded, entries);

    store.clear().await?;
    assert!(store.load().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_missing_file_loads_empty() -> Result<()> {
    let store = scratch_store("missing");
    assert!(store.load().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_corrupt_entries_skipped() -> Result<()> {
    let store = scratch_store("corrupt");

    let good = StoredMessage::new(text("survivor", false), now());
    let good_json = serde_json::to_string(&StoredRecord::from(&good))?;
    let raw = format!(
        "[{good_json},{{\"messageType\":\"system\",\"priority\":\"low\",\"repeatFlag\":false,\"partNumber\":1,\"totalParts\":1,\"receivedTimestamp\":\"2025-06-01T12:00:00Z\"}},{{\"messageType\":12}}]"
    );
    tokio::fs::write(store_path(&store), raw).await?;

    let loaded = store.load().await?;
    assert_eq!(loaded.len(), 1);
    assert!(loaded[0].message.content_eq(&good.message));

    store.clear().await?;
    Ok(())
}

fn store_path(store: &JsonFileStore) -> std::path::PathBuf {
    store.path().to_path_buf()
}

#[tokio::test]
async fn test_memory_store_round_trip() -> Result<()> {
    let store = MemoryStore::new();
    let entries = vec![StoredMessage::new(text("kept", true), now())];

    store.save(&entries).await?;
    assert_eq!(store.load().await?, entries);

    store.clear().await?;
    assert!(store.load().await?.is_empty());
    Ok(())
}
