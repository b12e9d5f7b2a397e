use bytes::Bytes;
use tokio::time::Duration;

use super::*;
use crate::message::MessagePriority;

const TIMEOUT: Duration = Duration::from_secs(60);

fn text_fragment(part_no: u8, total_parts: u8, text: &str) -> Message {
    Message::GeneralText {
        text: text.to_owned(),
        repeat: false,
        priority: MessagePriority::Medium,
        part_no,
        total_parts,
    }
}

fn flight_fragment(part_no: u8, total_parts: u8, flight_id: &str, text: &str) -> Message {
    Message::FlightUpdateGeneral {
        flight_id: flight_id.to_owned(),
        text: text.to_owned(),
        repeat: false,
        priority: MessagePriority::Medium,
        part_no,
        total_parts,
    }
}

fn basic_fragment(content: &'static [u8]) -> Message {
    Message::GeneralBasic {
        content: Bytes::from_static(content),
        repeat: false,
        priority: MessagePriority::Medium,
    }
}

fn key_at(millis: u64) -> ReassemblyKey {
    ReassemblyKey::new("GATE3", MessageType::GeneralText, millis)
}

#[test]
fn test_out_of_order_completion() {
    let mut buffer = ReassemblyBuffer::new();

    assert_eq!(
        buffer.push(key_at(1000), 2, 3, text_fragment(2, 3, "BB"), false, 1000),
        None
    );
    assert_eq!(
        buffer.push(key_at(1100), 3, 3, text_fragment(3, 3, "CC"), false, 1100),
        None
    );
    let completed = buffer
        .push(key_at(1200), 1, 3, text_fragment(1, 3, "AA"), false, 1200)
        .expect("third fragment completes the message");

    match completed.message {
        Message::GeneralText {
            text,
            part_no,
            total_parts,
            ..
        } => {
            assert_eq!(text, "AABBCC");
            assert_eq!((part_no, total_parts), (1, 1));
        }
        other => panic!("unexpected message {other:?}"),
    }
    assert!(buffer.is_empty());
}

#[test]
fn test_forward_decision_from_first_fragment() {
    let mut buffer = ReassemblyBuffer::new();

    buffer.push(key_at(0), 1, 2, text_fragment(1, 2, "A"), true, 0);
    // The later fragment scores differently; the stored decision wins.
    let completed = buffer
        .push(key_at(10), 2, 2, text_fragment(2, 2, "B"), false, 10)
        .expect("completion");
    assert!(completed.will_forward);
}

#[test]
fn test_flight_id_from_first_fragment() {
    let mut buffer = ReassemblyBuffer::new();
    let key = ReassemblyKey::new("GATE3", MessageType::FlightUpdateGeneral, 0);

    buffer.push(
        key.clone(),
        1,
        2,
        flight_fragment(1, 2, "FL9", "dela"),
        false,
        0,
    );
    let completed = buffer
        .push(key, 2, 2, flight_fragment(2, 2, "FL9", "yed"), false, 10)
        .expect("completion");

    match completed.message {
        Message::FlightUpdateGeneral {
            flight_id, text, ..
        } => {
            assert_eq!(flight_id, "FL9");
            assert_eq!(text, "delayed");
        }
        other => panic!("unexpected message {other:?}"),
    }
}

#[test]
fn test_general_basic_concatenates_bytes() {
    let mut buffer = ReassemblyBuffer::new();
    let key = ReassemblyKey::new("GATE3", MessageType::GeneralBasic, 0);

    assert_eq!(
        buffer.push(key.clone(), 1, 2, basic_fragment(b"\x01\x02"), false, 0),
        None
    );
    let completed = buffer
        .push(key, 2, 2, basic_fragment(b"\x03"), false, 10)
        .expect("completion");

    match completed.message {
        Message::GeneralBasic { content, .. } => {
            assert_eq!(&content[..], b"\x01\x02\x03");
        }
        other => panic!("unexpected message {other:?}"),
    }
}

#[test]
fn test_distinct_sources_use_distinct_buckets() {
    let mut buffer = ReassemblyBuffer::new();

    let a = ReassemblyKey::new("GATE1", MessageType::GeneralText, 1000);
    let b = ReassemblyKey::new("GATE2", MessageType::GeneralText, 1000);
    assert_ne!(a, b);

    buffer.push(a, 1, 2, text_fragment(1, 2, "A"), false, 1000);
    let completed = buffer.push(b, 2, 2, text_fragment(2, 2, "B"), false, 1000);
    assert_eq!(completed, None);
    assert_eq!(buffer.len(), 2);
}

#[test]
fn test_same_bucket_within_five_seconds() {
    assert_eq!(key_at(1000), key_at(4999));
    assert_ne!(key_at(1000), key_at(6000));
}

#[test]
fn test_duplicate_part_keeps_first() {
    let mut buffer = ReassemblyBuffer::new();
    let key = key_at(0);

    buffer.push(key.clone(), 1, 2, text_fragment(1, 2, "AB"), false, 0);
    buffer.push(key.clone(), 1, 2, text_fragment(1, 2, "XY"), false, 5);
    let completed = buffer
        .push(key, 2, 2, text_fragment(2, 2, "CD"), false, 10)
        .expect("completion");

    match completed.message {
        Message::GeneralText { text, .. } => assert_eq!(text, "ABCD"),
        other => panic!("unexpected message {other:?}"),
    }
}

#[test]
fn test_prune_drops_stale_buckets() {
    let mut buffer = ReassemblyBuffer::new();
    let key = key_at(0);

    buffer.push(key.clone(), 1, 3, text_fragment(1, 3, "A"), false, 0);
    assert_eq!(buffer.len(), 1);

    // Within the timeout nothing is collected.
    assert_eq!(buffer.prune(60_000, TIMEOUT), 0);
    assert_eq!(buffer.len(), 1);

    // Past the timeout the bucket goes away; later fragments start over.
    assert_eq!(buffer.prune(61_000, TIMEOUT), 1);
    assert!(buffer.is_empty());

    assert_eq!(
        buffer.push(key.clone(), 2, 3, text_fragment(2, 3, "B"), false, 61_500),
        None
    );
    assert_eq!(
        buffer.push(key, 3, 3, text_fragment(3, 3, "C"), false, 61_600),
        None
    );
    assert_eq!(buffer.len(), 1);
}
