#[cfg(test)]
mod reassembly_test;

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};
use log::{debug, trace};
use tokio::time::Duration;

use crate::message::{Message, MessageType};

/// Fragments of one logical message cluster into 5 second time buckets.
pub const TIME_BUCKET_MILLIS: u64 = 5000;

/// ReassemblyKey groups fragments that belong to the same in-progress
/// message: same source device, same message type, same coarse time bucket.
///
/// The bucket is deliberately coarse. Chunks emitted within one dwell cycle
/// land in the same bucket; unrelated messages of the same type from the same
/// source separated by several seconds do not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReassemblyKey {
    source: String,
    message_type: MessageType,
    time_bucket: u64,
}

impl ReassemblyKey {
    pub fn new(source: &str, message_type: MessageType, received_millis: u64) -> Self {
        ReassemblyKey {
            source: source.to_owned(),
            message_type,
            time_bucket: received_millis / TIME_BUCKET_MILLIS,
        }
    }
}

/// A reassembled whole message together with the forwarding decision that was
/// made when its first fragment arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassembledMessage {
    pub message: Message,
    pub will_forward: bool,
}

#[derive(Debug)]
struct Bucket {
    total_parts: u8,
    fragments: HashMap<u8, Message>,
    first_seen_millis: u64,
    /// Forward/drop decision from the first fragment, applied to the whole
    /// message on completion so later fragments cannot flip it.
    will_forward: bool,
}

impl Bucket {
    fn new(total_parts: u8, now_millis: u64, will_forward: bool) -> Self {
        Bucket {
            total_parts,
            fragments: HashMap::with_capacity(usize::from(total_parts)),
            first_seen_millis: now_millis,
            will_forward,
        }
    }

    fn is_complete(&self) -> bool {
        (1..=self.total_parts).all(|part| self.fragments.contains_key(&part))
    }

    /// Combines fragments in part order. Text types concatenate their text
    /// segments; basic messages concatenate raw content. The flight id comes
    /// from the first fragment.
    fn combine(&self) -> Option<Message> {
        let first = self.fragments.get(&1)?;

        match first {
            Message::GeneralText {
                repeat, priority, ..
            } => {
                let mut text = String::new();
                for part in 1..=self.total_parts {
                    if let Some(Message::GeneralText { text: segment, .. }) =
                        self.fragments.get(&part)
                    {
                        text.push_str(segment);
                    }
                }
                Some(Message::GeneralText {
                    text,
                    repeat: *repeat,
                    priority: *priority,
                    part_no: 1,
                    total_parts: 1,
                })
            }
            Message::FlightUpdateGeneral {
                flight_id,
                repeat,
                priority,
                ..
            } => {
                let mut text = String::new();
                for part in 1..=self.total_parts {
                    if let Some(Message::FlightUpdateGeneral { text: segment, .. }) =
                        self.fragments.get(&part)
                    {
                        text.push_str(segment);
                    }
                }
                Some(Message::FlightUpdateGeneral {
                    flight_id: flight_id.clone(),
                    text,
                    repeat: *repeat,
                    priority: *priority,
                    part_no: 1,
                    total_parts: 1,
                })
            }
            Message::GeneralBasic {
                repeat, priority, ..
            } => {
                let mut content = BytesMut::new();
                for part in 1..=self.total_parts {
                    if let Some(Message::GeneralBasic { content: piece, .. }) =
                        self.fragments.get(&part)
                    {
                        content.put(piece.clone());
                    }
                }
                Some(Message::GeneralBasic {
                    content: content.freeze(),
                    repeat: *repeat,
                    priority: *priority,
                })
            }
            // Single-packet types never reach multi-part reassembly.
            Message::FlightUpdate { .. } => None,
        }
    }
}

/// ReassemblyBuffer holds the in-progress multi-part messages. The scanner
/// pipeline is its only owner; time is passed in so tests control the clock.
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    buckets: HashMap<ReassemblyKey, Bucket>,
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        ReassemblyBuffer::default()
    }

    /// Deposits a fragment under its wire part numbering. Returns the
    /// combined whole message once all of `1..=total_parts` are present; the
    /// bucket is discarded on completion.
    ///
    /// Part numbering comes from the packet header, not the message, because
    /// basic fragments carry no part fields of their own. `will_forward` is
    /// only consulted for the fragment that opens a bucket. Arbitrary arrival
    /// order is tolerated; a duplicate part number leaves the fragment
    /// already held.
    pub fn push(
        &mut self,
        key: ReassemblyKey,
        part_no: u8,
        total_parts: u8,
        fragment: Message,
        will_forward: bool,
        now_millis: u64,
    ) -> Option<ReassembledMessage> {
        let bucket = self
            .buckets
            .entry(key.clone())
            .or_insert_with(|| Bucket::new(total_parts, now_millis, will_forward));

        bucket.fragments.entry(part_no).or_insert(fragment);
        trace!(
            "fragment {part_no}/{} deposited for {key:?} ({} held)",
            bucket.total_parts,
            bucket.fragments.len()
        );

        if !bucket.is_complete() {
            return None;
        }

        let combined = bucket.combine();
        let will_forward = bucket.will_forward;
        self.buckets.remove(&key);

        combined.map(|message| ReassembledMessage {
            message,
            will_forward,
        })
    }

    /// Drops buckets whose oldest fragment is older than `timeout`. Returns
    /// the number of buckets collected.
    pub fn prune(&mut self, now_millis: u64, timeout: Duration) -> usize {
        let timeout_millis = timeout.as_millis() as u64;
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now_millis.saturating_sub(bucket.first_seen_millis) <= timeout_millis);
        let dropped = before - self.buckets.len();
        if dropped > 0 {
            debug!("dropped {dropped} incomplete reassembly buckets");
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
