
use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::warn;

use crate::error::{Error, Result};
use crate::message::{FlightUpdateType, Message, MessagePriority, MessageType};

/// Two header bytes precede the content in every advertisement payload.
pub const HEADER_LENGTH: usize = 2;
pub const MIN_PACKET_LENGTH: usize = 2;
pub const MAX_PACKET_LENGTH: usize = 23;
/// Content capacity of a single advertisement.
pub const MAX_CONTENT_LENGTH: usize = 21;
/// The 3-bit part fields cap a multi-part message at 7 fragments.
pub const MAX_PARTS: usize = 7;

pub const PART_NO_MASK: u8 = 0x7;
pub const TOTAL_PARTS_SHIFT: u8 = 3;
pub const TOTAL_PARTS_MASK: u8 = 0x7;
pub const REPEAT_SHIFT: u8 = 6;
pub const REPEAT_MASK: u8 = 0x1;
pub const MESSAGE_TYPE_MASK: u8 = 0x7;
pub const PRIORITY_SHIFT: u8 = 3;
pub const PRIORITY_MASK: u8 = 0x7;

/// Packet is one Vuelink advertisement payload.
///
/// ```text
///  0                   1
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | part| total |R|0| type | prio|0 0|
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |         content (0..21)       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// `part_no` and `total_parts` are 1-based and at most 7; bit 7 of the part
/// byte and bits 6..7 of the flags byte are reserved and zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub part_no: u8,
    pub total_parts: u8,
    pub repeat: bool,
    pub message_type: MessageType,
    pub priority: MessagePriority,
    pub content: Bytes,
}

impl Default for Packet {
    fn default() -> Self {
        Packet {
            part_no: 1,
            total_parts: 1,
            repeat: false,
            message_type: MessageType::Unknown,
            priority: MessagePriority::default(),
            content: Bytes::new(),
        }
    }
}

impl Packet {
    /// Parses one advertisement payload. Anything outside the 2..=23 byte
    /// envelope or with nonsensical part numbering is malformed.
    pub fn unmarshal<B: Buf>(raw_packet: &mut B) -> Result<Self> {
        let raw_packet_len = raw_packet.remaining();
        if raw_packet_len < MIN_PACKET_LENGTH {
            return Err(Error::ErrShortPacket);
        }
        if raw_packet_len > MAX_PACKET_LENGTH {
            return Err(Error::ErrPacketTooLarge(raw_packet_len));
        }

        let b0 = raw_packet.get_u8();
        let part_no = b0 & PART_NO_MASK;
        let total_parts = (b0 >> TOTAL_PARTS_SHIFT) & TOTAL_PARTS_MASK;
        let repeat = (b0 >> REPEAT_SHIFT) & REPEAT_MASK > 0;

        if part_no == 0 || total_parts == 0 || part_no > total_parts {
            return Err(Error::ErrInvalidPartNumbering);
        }

        let b1 = raw_packet.get_u8();
        let message_type = MessageType::from(b1 & MESSAGE_TYPE_MASK);
        let priority = MessagePriority::from((b1 >> PRIORITY_SHIFT) & PRIORITY_MASK);

        let content = raw_packet.copy_to_bytes(raw_packet.remaining());

        Ok(Packet {
            part_no,
            total_parts,
            repeat,
            message_type,
            priority,
            content,
        })
    }

    /// Size of the payload once marshaled, after oversize truncation.
    pub fn marshal_size(&self) -> usize {
        HEADER_LENGTH + self.content.len().min(MAX_CONTENT_LENGTH)
    }

    /// Serializes the packet into `buf` and returns the number of bytes
    /// written. Content up to twice the advertisement capacity is truncated
    /// with a warning; anything larger fails.
    pub fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if self.content.is_empty() {
            return Err(Error::ErrContentEmpty);
        }
        if self.part_no == 0
            || self.total_parts == 0
            || self.part_no > self.total_parts
            || usize::from(self.total_parts) > MAX_PARTS
        {
            return Err(Error::ErrInvalidPartNumbering);
        }

        let content = if self.content.len() > MAX_CONTENT_LENGTH {
            if self.content.len() > 2 * MAX_CONTENT_LENGTH {
                return Err(Error::ErrPayloadTooLarge(self.content.len()));
            }
            warn!(
                "truncating {} byte content to the {} byte advertisement capacity",
                self.content.len(),
                MAX_CONTENT_LENGTH
            );
            self.content.slice(..MAX_CONTENT_LENGTH)
        } else {
            self.content.clone()
        };

        if buf.remaining_mut() < HEADER_LENGTH + content.len() {
            return Err(Error::ErrBufferTooSmall);
        }

        let mut b0 = (self.part_no & PART_NO_MASK)
            | ((self.total_parts & TOTAL_PARTS_MASK) << TOTAL_PARTS_SHIFT);
        if self.repeat {
            b0 |= 1 << REPEAT_SHIFT;
        }
        buf.put_u8(b0);

        let b1 =
            (self.message_type as u8 & MESSAGE_TYPE_MASK) | ((self.priority as u8) << PRIORITY_SHIFT);
        buf.put_u8(b1);

        buf.put(&*content);

        Ok(HEADER_LENGTH + content.len())
    }

    /// Serializes the packet into a freshly allocated buffer.
    pub fn marshal(&self) -> Result<Bytes> {
        let mut buf = vec![0u8; self.marshal_size()];
        let n = self.marshal_to(&mut buf)?;
        buf.truncate(n);
        Ok(Bytes::from(buf))
    }

    /// Reconstructs the logical message this packet carries. Returns `None`
    /// for types the mesh cannot represent as messages.
    pub fn to_message(&self) -> Option<Message> {
        decode_content(
            self.message_type,
            &self.content,
            self.repeat,
            self.priority,
            self.part_no,
            self.total_parts,
        )
    }
}

/// Decodes per-type content bytes into a message. Missing fields fall back
/// to defaults and text is decoded lossily, so a packet that parsed is never
/// rejected here for content reasons.
pub fn decode_content(
    message_type: MessageType,
    content: &[u8],
    repeat: bool,
    priority: MessagePriority,
    part_no: u8,
    total_parts: u8,
) -> Option<Message> {
    match message_type {
        MessageType::GeneralBasic => Some(Message::GeneralBasic {
            content: Bytes::copy_from_slice(content),
            repeat,
            priority,
        }),
        MessageType::GeneralText => Some(Message::GeneralText {
            text: String::from_utf8_lossy(content).into_owned(),
            repeat,
            priority,
            part_no,
            total_parts,
        }),
        MessageType::FlightUpdate => {
            let (update_type, flight_id) = match content.split_first() {
                Some((first, rest)) => (
                    FlightUpdateType::from(*first),
                    String::from_utf8_lossy(rest).into_owned(),
                ),
                None => (FlightUpdateType::General, String::new()),
            };
            Some(Message::FlightUpdate {
                flight_id,
                update_type,
                repeat,
                priority,
            })
        }
        MessageType::FlightUpdateGeneral => {
            let (flight_id, text) = match content.split_first() {
                Some((len, rest)) => {
                    let id_len = usize::from(*len).min(rest.len());
                    (
                        String::from_utf8_lossy(&rest[..id_len]).into_owned(),
                        String::from_utf8_lossy(&rest[id_len..]).into_owned(),
                    )
                }
                None => (String::new(), String::new()),
            };
            Some(Message::FlightUpdateGeneral {
                flight_id,
                text,
                repeat,
                priority,
                part_no,
                total_parts,
            })
        }
        MessageType::Unknown
        | MessageType::System
        | MessageType::Emergency
        | MessageType::Reserved => None,
    }
}

/// Encodes the full per-type content of a whole message, uncapped. The
/// splitter and the snapshot codec both build on this.
pub fn encode_content(message: &Message) -> Result<Bytes> {
    match message {
        Message::GeneralBasic { content, .. } => Ok(content.clone()),
        Message::GeneralText { text, .. } => Ok(Bytes::copy_from_slice(text.as_bytes())),
        Message::FlightUpdate {
            flight_id,
            update_type,
            ..
        } => {
            let mut buf = BytesMut::with_capacity(1 + flight_id.len());
            buf.put_u8(*update_type as u8);
            buf.put(flight_id.as_bytes());
            Ok(buf.freeze())
        }
        Message::FlightUpdateGeneral {
            flight_id, text, ..
        } => {
            if flight_id.len() > u8::MAX as usize {
                return Err(Error::ErrPayloadTooLarge(flight_id.len()));
            }
            let mut buf = BytesMut::with_capacity(1 + flight_id.len() + text.len());
            buf.put_u8(flight_id.len() as u8);
            buf.put(flight_id.as_bytes());
            buf.put(text.as_bytes());
            Ok(buf.freeze())
        }
    }
}

/// Splits a message into the packets that advertise it, in part order.
///
/// Splitting happens on raw UTF-8 byte boundaries; a multi-byte codepoint can
/// straddle two fragments and decodes to replacement characters on the other
/// side. Messages that would need more than 7 parts are refused because the
/// wire cannot number them.
pub fn split(message: &Message) -> Result<Vec<Packet>> {
    let repeat = message.repeat();
    let priority = message.priority();

    match message {
        Message::FlightUpdate { .. } => {
            let content = encode_content(message)?;
            Ok(vec![Packet {
                part_no: 1,
                total_parts: 1,
                repeat,
                message_type: MessageType::FlightUpdate,
                priority,
                content,
            }])
        }
        Message::GeneralBasic { content, .. } => {
            let chunks = chunk_bytes(content, MAX_CONTENT_LENGTH)?;
            let total = chunks.len() as u8;
            Ok(chunks
                .into_iter()
                .enumerate()
                .map(|(i, chunk)| Packet {
                    part_no: i as u8 + 1,
                    total_parts: total,
                    repeat,
                    message_type: MessageType::GeneralBasic,
                    priority,
                    content: chunk,
                })
                .collect())
        }
        Message::GeneralText { text, .. } => {
            let chunks = chunk_bytes(&Bytes::copy_from_slice(text.as_bytes()), MAX_CONTENT_LENGTH)?;
            let total = chunks.len() as u8;
            Ok(chunks
                .into_iter()
                .enumerate()
                .map(|(i, chunk)| Packet {
                    part_no: i as u8 + 1,
                    total_parts: total,
                    repeat,
                    message_type: MessageType::GeneralText,
                    priority,
                    content: chunk,
                })
                .collect())
        }
        Message::FlightUpdateGeneral {
            flight_id, text, ..
        } => {
            // Every chunk repeats the length-prefixed flight id, so the text
            // capacity shrinks by the prefix size.
            let prefix_len = flight_id.len() + 1;
            if prefix_len >= MAX_CONTENT_LENGTH {
                return Err(Error::ErrPayloadTooLarge(flight_id.len()));
            }
            let chunk_size = MAX_CONTENT_LENGTH - prefix_len;
            let chunks = chunk_bytes(&Bytes::copy_from_slice(text.as_bytes()), chunk_size)?;
            let total = chunks.len() as u8;
            Ok(chunks
                .into_iter()
                .enumerate()
                .map(|(i, chunk)| {
                    let mut content = BytesMut::with_capacity(prefix_len + chunk.len());
                    content.put_u8(flight_id.len() as u8);
                    content.put(flight_id.as_bytes());
                    content.put(&*chunk);
                    Packet {
                        part_no: i as u8 + 1,
                        total_parts: total,
                        repeat,
                        message_type: MessageType::FlightUpdateGeneral,
                        priority,
                        content: content.freeze(),
                    }
                })
                .collect())
        }
    }
}

fn chunk_bytes(payload: &Bytes, chunk_size: usize) -> Result<Vec<Bytes>> {
    if payload.is_empty() {
        return Err(Error::ErrContentEmpty);
    }
    let parts = (payload.len() + chunk_size - 1) / chunk_size;
    if parts > MAX_PARTS {
        return Err(Error::ErrTooManyParts(parts));
    }

    let mut chunks = Vec::with_capacity(parts);
    let mut offset = 0;
    while offset < payload.len() {
        let end = (offset + chunk_size).min(payload.len());
        chunks.push(payload.slice(offset..end));
        offset = end;
    }
    Ok(chunks)
}
