use bytes::Bytes;

use super::*;
use crate::error::Result;
use crate::message::FlightUpdateType;

fn entries() -> Vec<SnapshotEntry> {
    vec![
        SnapshotEntry {
            message: Message::GeneralBasic {
                content: Bytes::from_static(b"\xff\xfe\x00raw"),
                repeat: false,
                priority: MessagePriority::Low,
            },
            should_forward: false,
        },
        SnapshotEntry {
            message: Message::GeneralText {
                // Longer than one advertisement; snapshots carry whole
                // reassembled messages.
                text: "x".repeat(100),
                repeat: false,
                priority: MessagePriority::Medium,
                part_no: 1,
                total_parts: 1,
            },
            should_forward: true,
        },
        SnapshotEntry {
            message: Message::FlightUpdate {
                flight_id: "FL123".to_owned(),
                update_type: FlightUpdateType::Cancellation,
                repeat: false,
                priority: MessagePriority::Urgent,
            },
            should_forward: true,
        },
        SnapshotEntry {
            message: Message::FlightUpdateGeneral {
                flight_id: "FL123".to_owned(),
                text: "diverted to alternate".to_owned(),
                repeat: false,
                priority: MessagePriority::Emergency,
                part_no: 1,
                total_parts: 1,
            },
            should_forward: false,
        },
    ]
}

#[test]
fn test_round_trip() -> Result<()> {
    let original = entries();
    let encoded = encode(&original)?;
    let decoded = decode(&encoded)?;
    assert_eq!(decoded, original);
    Ok(())
}

#[test]
fn test_empty_round_trip() -> Result<()> {
    let encoded = encode(&[])?;
    assert_eq!(decode(&encoded)?, vec![]);
    Ok(())
}

#[test]
fn test_url_safe_alphabet() -> Result<()> {
    let encoded = encode(&entries())?;
    assert!(
        encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
        "{encoded}"
    );
    Ok(())
}

#[test]
fn test_rejects_wrong_version() {
    let raw = BASE64_URL_SAFE_NO_PAD.encode([2u8, 0]);
    assert_eq!(decode(&raw), Err(Error::ErrSnapshotVersion(2)));
}

#[test]
fn test_rejects_bad_base64() {
    assert_eq!(decode("not base64!!"), Err(Error::ErrSnapshotEncoding));
}

#[test]
fn test_rejects_truncated_header() {
    let raw = BASE64_URL_SAFE_NO_PAD.encode([SNAPSHOT_VERSION]);
    assert_eq!(decode(&raw), Err(Error::ErrSnapshotTruncated));
}

#[test]
fn test_rejects_truncated_entry() {
    // Claims one message but stops after the flags byte.
    let raw = BASE64_URL_SAFE_NO_PAD.encode([SNAPSHOT_VERSION, 1, 0x09]);
    assert_eq!(decode(&raw), Err(Error::ErrSnapshotTruncated));
}

#[test]
fn test_rejects_content_length_overrun() {
    // Content length of 5 with only 2 bytes remaining.
    let raw = BASE64_URL_SAFE_NO_PAD.encode([SNAPSHOT_VERSION, 1, 0x09, 0, 0, 5, b'a', b'b']);
    assert_eq!(decode(&raw), Err(Error::ErrSnapshotTruncated));
}

#[test]
fn test_rejects_too_many_messages() {
    let entry = SnapshotEntry {
        message: Message::GeneralText {
            text: "x".to_owned(),
            repeat: false,
            priority: MessagePriority::Medium,
            part_no: 1,
            total_parts: 1,
        },
        should_forward: false,
    };
    let oversized = vec![entry; 256];
    assert_eq!(encode(&oversized), Err(Error::ErrSnapshotTooLarge(256)));
}

#[test]
fn test_unrepresentable_entry_skipped() -> Result<()> {
    // A system-type entry decodes to nothing but does not break the stream.
    let raw = BASE64_URL_SAFE_NO_PAD.encode([
        SNAPSHOT_VERSION,
        2,
        0x05, // system type, low priority
        0,
        0,
        1,
        b'x',
        0x02, // generalText, low priority
        0,
        0,
        2,
        b'h',
        b'i',
    ]);
    let decoded = decode(&raw)?;
    assert_eq!(decoded.len(), 1);
    match &decoded[0].message {
        Message::GeneralText { text, .. } => assert_eq!(text, "hi"),
        other => panic!("unexpected message {other:?}"),
    }
    Ok(())
}
