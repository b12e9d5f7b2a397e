
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// MessageType occupies 3 bits of the on-air flags byte.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "unknown")]
    #[default]
    Unknown = 0,

    /// A raw-bytes broadcast with no further structure.
    #[serde(rename = "generalBasic")]
    GeneralBasic = 1,

    /// A free-text broadcast, possibly split across up to 7 parts.
    #[serde(rename = "generalText")]
    GeneralText = 2,

    /// A structured flight event (gate change, boarding, ...). Single packet.
    #[serde(rename = "flightUpdate")]
    FlightUpdate = 3,

    /// A flight event with free text attached, possibly multi-part.
    #[serde(rename = "flightUpdateGeneral")]
    FlightUpdateGeneral = 4,

    #[serde(rename = "system")]
    System = 5,
    #[serde(rename = "emergency")]
    Emergency = 6,
    #[serde(rename = "reserved")]
    Reserved = 7,
}

impl From<u8> for MessageType {
    fn from(v: u8) -> Self {
        match v & 0x7 {
            1 => MessageType::GeneralBasic,
            2 => MessageType::GeneralText,
            3 => MessageType::FlightUpdate,
            4 => MessageType::FlightUpdateGeneral,
            5 => MessageType::System,
            6 => MessageType::Emergency,
            7 => MessageType::Reserved,
            _ => MessageType::Unknown,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            MessageType::Unknown => "unknown",
            MessageType::GeneralBasic => "generalBasic",
            MessageType::GeneralText => "generalText",
            MessageType::FlightUpdate => "flightUpdate",
            MessageType::FlightUpdateGeneral => "flightUpdateGeneral",
            MessageType::System => "system",
            MessageType::Emergency => "emergency",
            MessageType::Reserved => "reserved",
        };
        write!(f, "{s}")
    }
}

/// MessagePriority occupies 3 bits of the on-air flags byte.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessagePriority {
    #[serde(rename = "low")]
    Low = 0,
    #[serde(rename = "medium")]
    #[default]
    Medium = 1,
    #[serde(rename = "high")]
    High = 2,
    #[serde(rename = "urgent")]
    Urgent = 3,
    #[serde(rename = "emergency")]
    Emergency = 4,
    #[serde(rename = "system")]
    System = 5,
    #[serde(rename = "test")]
    Test = 6,
    #[serde(rename = "reserved")]
    Reserved = 7,
}

impl From<u8> for MessagePriority {
    fn from(v: u8) -> Self {
        match v & 0x7 {
            0 => MessagePriority::Low,
            1 => MessagePriority::Medium,
            2 => MessagePriority::High,
            3 => MessagePriority::Urgent,
            4 => MessagePriority::Emergency,
            5 => MessagePriority::System,
            6 => MessagePriority::Test,
            _ => MessagePriority::Reserved,
        }
    }
}

impl fmt::Display for MessagePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            MessagePriority::Low => "low",
            MessagePriority::Medium => "medium",
            MessagePriority::High => "high",
            MessagePriority::Urgent => "urgent",
            MessagePriority::Emergency => "emergency",
            MessagePriority::System => "system",
            MessagePriority::Test => "test",
            MessagePriority::Reserved => "reserved",
        };
        write!(f, "{s}")
    }
}

/// FlightUpdateType is byte-sized on the wire, leading the content of a
/// flight-update packet. Unknown bytes decode to `General`.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlightUpdateType {
    #[serde(rename = "general")]
    #[default]
    General = 0,
    #[serde(rename = "gateChange")]
    GateChange = 1,
    #[serde(rename = "boarding")]
    Boarding = 2,
    #[serde(rename = "delay")]
    Delay = 3,
    #[serde(rename = "cancellation")]
    Cancellation = 4,
    #[serde(rename = "emergency")]
    Emergency = 5,
}

impl From<u8> for FlightUpdateType {
    fn from(v: u8) -> Self {
        match v {
            1 => FlightUpdateType::GateChange,
            2 => FlightUpdateType::Boarding,
            3 => FlightUpdateType::Delay,
            4 => FlightUpdateType::Cancellation,
            5 => FlightUpdateType::Emergency,
            _ => FlightUpdateType::General,
        }
    }
}

impl fmt::Display for FlightUpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            FlightUpdateType::General => "general",
            FlightUpdateType::GateChange => "gateChange",
            FlightUpdateType::Boarding => "boarding",
            FlightUpdateType::Delay => "delay",
            FlightUpdateType::Cancellation => "cancellation",
            FlightUpdateType::Emergency => "emergency",
        };
        write!(f, "{s}")
    }
}

/// Message is the logical value exchanged over the mesh.
///
/// `part_no`/`total_parts` on the splittable text variants describe a wire
/// fragment; a whole message carries `1/1`. The codec fills them during
/// splitting and the reassembler normalizes them back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    GeneralBasic {
        content: Bytes,
        repeat: bool,
        priority: MessagePriority,
    },
    GeneralText {
        text: String,
        repeat: bool,
        priority: MessagePriority,
        part_no: u8,
        total_parts: u8,
    },
    FlightUpdate {
        flight_id: String,
        update_type: FlightUpdateType,
        repeat: bool,
        priority: MessagePriority,
    },
    FlightUpdateGeneral {
        flight_id: String,
        text: String,
        repeat: bool,
        priority: MessagePriority,
        part_no: u8,
        total_parts: u8,
    },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::GeneralBasic { .. } => MessageType::GeneralBasic,
            Message::GeneralText { .. } => MessageType::GeneralText,
            Message::FlightUpdate { .. } => MessageType::FlightUpdate,
            Message::FlightUpdateGeneral { .. } => MessageType::FlightUpdateGeneral,
        }
    }

    pub fn priority(&self) -> MessagePriority {
        match self {
            Message::GeneralBasic { priority, .. }
            | Message::GeneralText { priority, .. }
            | Message::FlightUpdate { priority, .. }
            | Message::FlightUpdateGeneral { priority, .. } => *priority,
        }
    }

    pub fn repeat(&self) -> bool {
        match self {
            Message::GeneralBasic { repeat, .. }
            | Message::GeneralText { repeat, .. }
            | Message::FlightUpdate { repeat, .. }
            | Message::FlightUpdateGeneral { repeat, .. } => *repeat,
        }
    }

    pub fn set_repeat(&mut self, value: bool) {
        match self {
            Message::GeneralBasic { repeat, .. }
            | Message::GeneralText { repeat, .. }
            | Message::FlightUpdate { repeat, .. }
            | Message::FlightUpdateGeneral { repeat, .. } => *repeat = value,
        }
    }

    /// Wire part numbering of this value; `(1, 1)` for whole messages and
    /// single-packet types.
    pub fn part_info(&self) -> (u8, u8) {
        match self {
            Message::GeneralText {
                part_no,
                total_parts,
                ..
            }
            | Message::FlightUpdateGeneral {
                part_no,
                total_parts,
                ..
            } => (*part_no, *total_parts),
            _ => (1, 1),
        }
    }

    /// Only the text-bearing general types and basic messages split into
    /// multiple packets; flight updates are single-packet.
    pub fn is_splittable(&self) -> bool {
        matches!(
            self,
            Message::GeneralBasic { .. }
                | Message::GeneralText { .. }
                | Message::FlightUpdateGeneral { .. }
        )
    }

    /// Content equivalence used for duplicate suppression: same type and the
    /// same semantic content fields. Timestamps, part numbering, the repeat
    /// flag, and radio metadata never participate.
    pub fn content_eq(&self, other: &Message) -> bool {
        match (self, other) {
            (
                Message::GeneralBasic { content: a, .. },
                Message::GeneralBasic { content: b, .. },
            ) => a == b,
            (Message::GeneralText { text: a, .. }, Message::GeneralText { text: b, .. }) => a == b,
            (
                Message::FlightUpdate {
                    flight_id: fa,
                    update_type: ua,
                    ..
                },
                Message::FlightUpdate {
                    flight_id: fb,
                    update_type: ub,
                    ..
                },
            ) => fa == fb && ua == ub,
            (
                Message::FlightUpdateGeneral {
                    flight_id: fa,
                    text: ta,
                    ..
                },
                Message::FlightUpdateGeneral {
                    flight_id: fb,
                    text: tb,
                    ..
                },
            ) => fa == fb && ta == tb,
            _ => false,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::GeneralBasic { content, priority, .. } => {
                write!(f, "generalBasic({} bytes, {priority})", content.len())
            }
            Message::GeneralText {
                text,
                priority,
                part_no,
                total_parts,
                ..
            } => write!(
                f,
                "generalText({} chars, {priority}, part {part_no}/{total_parts})",
                text.chars().count()
            ),
            Message::FlightUpdate {
                flight_id,
                update_type,
                priority,
                ..
            } => write!(f, "flightUpdate({flight_id}, {update_type}, {priority})"),
            Message::FlightUpdateGeneral {
                flight_id,
                priority,
                part_no,
                total_parts,
                ..
            } => write!(
                f,
                "flightUpdateGeneral({flight_id}, {priority}, part {part_no}/{total_parts})"
            ),
        }
    }
}

/// StoredMessage is a history record: the message plus the instant it was
/// accepted. Identity for deduplication uses only the message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub message: Message,
    pub received_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new(message: Message, received_at: DateTime<Utc>) -> Self {
        StoredMessage {
            message,
            received_at,
        }
    }
}
