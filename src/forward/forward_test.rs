use bytes::Bytes;

use super::*;
use crate::message::FlightUpdateType;

fn message(repeat: bool, priority: MessagePriority) -> Message {
    Message::FlightUpdate {
        flight_id: "FL1".to_owned(),
        update_type: FlightUpdateType::Delay,
        repeat,
        priority,
    }
}

#[test]
fn test_forward_policy() {
    let tests = vec![
        // (enabled, repeat, priority, expected)
        (true, false, MessagePriority::Medium, false),
        (true, true, MessagePriority::Medium, true),
        (true, false, MessagePriority::Urgent, true),
        (true, false, MessagePriority::Emergency, true),
        (true, true, MessagePriority::Low, true),
        (true, false, MessagePriority::High, false),
        (false, true, MessagePriority::Emergency, false),
        (false, false, MessagePriority::Urgent, false),
    ];

    for (enabled, repeat, priority, expected) in tests {
        let forwarder = Forwarder::new(enabled);
        let got = forwarder.should_forward(&message(repeat, priority));
        assert_eq!(
            got, expected,
            "enabled={enabled} repeat={repeat} priority={priority}"
        );
    }
}

#[test]
fn test_toggle() {
    let forwarder = Forwarder::default();
    assert!(forwarder.is_enabled());

    forwarder.set_enabled(false);
    assert!(!forwarder.is_enabled());
    assert!(!forwarder.should_forward(&message(true, MessagePriority::Emergency)));

    forwarder.set_enabled(true);
    assert!(forwarder.should_forward(&message(true, MessagePriority::Low)));
}

#[test]
fn test_prepare_forces_repeat() {
    let forwarder = Forwarder::default();

    let original = Message::GeneralBasic {
        content: Bytes::from_static(b"hi"),
        repeat: false,
        priority: MessagePriority::Urgent,
    };
    let rebroadcast = forwarder.prepare(&original);

    assert!(rebroadcast.repeat());
    assert!(rebroadcast.content_eq(&original));
    // The original is untouched.
    assert!(!original.repeat());
}
