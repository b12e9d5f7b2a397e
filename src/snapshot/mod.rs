#[cfg(test)]
mod snapshot_test;

use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::warn;

use crate::error::{Error, Result};
use crate::message::{Message, MessagePriority, MessageType};
use crate::packet::{self, MESSAGE_TYPE_MASK, PRIORITY_MASK, PRIORITY_SHIFT};

pub const SNAPSHOT_VERSION: u8 = 1;
pub const MAX_SNAPSHOT_MESSAGES: usize = 255;

/// One message in a shared snapshot, together with the forward flag the
/// sharing device attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub message: Message,
    pub should_forward: bool,
}

/// Encodes messages into the v1 shared-snapshot stream, URL-safe base64
/// without padding:
///
/// ```text
/// byte 0:        version = 1
/// byte 1:        message count (0..=255)
/// per message:
///   byte +0:     flags (packet flags byte layout: type | priority << 3)
///   byte +1:     shouldForward (0/1)
///   bytes +2..3: content length, big-endian u16
///   bytes +4..:  per-type content
/// ```
///
/// Entries carry whole messages, so content is not capped at advertisement
/// size; only the u16 length field bounds it.
pub fn encode(entries: &[SnapshotEntry]) -> Result<String> {
    if entries.len() > MAX_SNAPSHOT_MESSAGES {
        return Err(Error::ErrSnapshotTooLarge(entries.len()));
    }

    let mut buf = BytesMut::with_capacity(2 + entries.len() * 8);
    buf.put_u8(SNAPSHOT_VERSION);
    buf.put_u8(entries.len() as u8);

    for entry in entries {
        let content = packet::encode_content(&entry.message)?;
        if content.len() > u16::MAX as usize {
            return Err(Error::ErrPayloadTooLarge(content.len()));
        }

        let flags = (entry.message.message_type() as u8 & MESSAGE_TYPE_MASK)
            | ((entry.message.priority() as u8 & PRIORITY_MASK) << PRIORITY_SHIFT);
        buf.put_u8(flags);
        buf.put_u8(u8::from(entry.should_forward));
        buf.put_u16(content.len() as u16);
        buf.put(content);
    }

    Ok(BASE64_URL_SAFE_NO_PAD.encode(buf))
}

/// Decodes a v1 shared-snapshot stream. Unknown versions are rejected and
/// every length field is checked against the bytes that remain; entries of a
/// type the mesh cannot represent are skipped.
pub fn decode(data: &str) -> Result<Vec<SnapshotEntry>> {
    let raw = BASE64_URL_SAFE_NO_PAD
        .decode(data)
        .map_err(|_| Error::ErrSnapshotEncoding)?;
    let mut buf = Bytes::from(raw);

    if buf.remaining() < 2 {
        return Err(Error::ErrSnapshotTruncated);
    }
    let version = buf.get_u8();
    if version != SNAPSHOT_VERSION {
        return Err(Error::ErrSnapshotVersion(version));
    }
    let count = usize::from(buf.get_u8());

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        if buf.remaining() < 4 {
            return Err(Error::ErrSnapshotTruncated);
        }
        let flags = buf.get_u8();
        let should_forward = buf.get_u8() != 0;
        let content_len = usize::from(buf.get_u16());
        if buf.remaining() < content_len {
            return Err(Error::ErrSnapshotTruncated);
        }
        let content = buf.copy_to_bytes(content_len);

        let message_type = MessageType::from(flags & MESSAGE_TYPE_MASK);
        let priority = MessagePriority::from((flags >> PRIORITY_SHIFT) & PRIORITY_MASK);

        match packet::decode_content(message_type, &content, false, priority, 1, 1) {
            Some(message) => entries.push(SnapshotEntry {
                message,
                should_forward,
            }),
            None => warn!("skipping snapshot entry of type {message_type}"),
        }
    }

    Ok(entries)
}
