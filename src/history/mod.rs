#[cfg(test)]
mod history_test;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_DUPLICATE_WINDOW, DEFAULT_HISTORY_CAPACITY};
use crate::error::{Error, Result};
use crate::message::{FlightUpdateType, Message, MessagePriority, MessageType, StoredMessage};

/// Opaque key the persisted history list lives under.
pub const STORAGE_KEY: &str = "vuelink_saved_messages_json";

/// MessageHistory is the bounded, time-ordered log of accepted messages.
/// The newest entry sits at the front; the oldest falls off at capacity.
#[derive(Debug)]
pub struct MessageHistory {
    entries: VecDeque<StoredMessage>,
    capacity: usize,
    duplicate_window: usize,
}

impl Default for MessageHistory {
    fn default() -> Self {
        MessageHistory::new(DEFAULT_HISTORY_CAPACITY, DEFAULT_DUPLICATE_WINDOW)
    }
}

impl MessageHistory {
    pub fn new(capacity: usize, duplicate_window: usize) -> Self {
        MessageHistory {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            duplicate_window,
        }
    }

    /// The accept policy, computed over the most recent window entries only.
    ///
    /// A novel payload is always accepted. A duplicate is accepted only when
    /// it carries the repeat flag and no matching entry did; this lets one
    /// retransmission re-enter circulation while an already-repeated message
    /// is suppressed for good.
    pub fn should_accept(&self, message: &Message) -> bool {
        let mut dup = false;
        let mut dup_with_repeat = false;
        for entry in self.entries.iter().take(self.duplicate_window) {
            if entry.message.content_eq(message) {
                dup = true;
                if entry.message.repeat() {
                    dup_with_repeat = true;
                }
            }
        }
        !dup || (message.repeat() && !dup_with_repeat)
    }

    /// Appends an accepted message. The caller is responsible for having
    /// consulted [`should_accept`](Self::should_accept) first.
    pub fn record(&mut self, message: Message, received_at: DateTime<Utc>) {
        self.entries
            .push_front(StoredMessage::new(message, received_at));
        self.entries.truncate(self.capacity);
    }

    /// Newest-first snapshot of the log.
    pub fn list(&self) -> Vec<StoredMessage> {
        self.entries.iter().cloned().collect()
    }

    /// Replaces the log with previously persisted entries (newest first).
    pub fn restore(&mut self, entries: Vec<StoredMessage>) {
        self.entries = entries.into_iter().take(self.capacity).collect();
    }

    pub fn head(&self) -> Option<&StoredMessage> {
        self.entries.front()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// StoredRecord is the JSON shape of one persisted history entry. Enums are
/// stored by symbolic name and binary content as base64; unknown fields are
/// ignored on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(rename = "messageType")]
    pub message_type: MessageType,
    #[serde(rename = "priority")]
    pub priority: MessagePriority,
    #[serde(rename = "updateType", default, skip_serializing_if = "Option::is_none")]
    pub update_type: Option<FlightUpdateType>,
    #[serde(rename = "repeatFlag")]
    pub repeat_flag: bool,
    #[serde(rename = "partNumber")]
    pub part_number: u8,
    #[serde(rename = "totalParts")]
    pub total_parts: u8,
    #[serde(rename = "flightId", default, skip_serializing_if = "Option::is_none")]
    pub flight_id: Option<String>,
    #[serde(rename = "textContent", default, skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    #[serde(rename = "content_base64", default, skip_serializing_if = "Option::is_none")]
    pub content_base64: Option<String>,
    #[serde(rename = "receivedTimestamp")]
    pub received_timestamp: DateTime<Utc>,
}

impl From<&StoredMessage> for StoredRecord {
    fn from(entry: &StoredMessage) -> Self {
        let (part_number, total_parts) = entry.message.part_info();
        let mut record = StoredRecord {
            message_type: entry.message.message_type(),
            priority: entry.message.priority(),
            update_type: None,
            repeat_flag: entry.message.repeat(),
            part_number,
            total_parts,
            flight_id: None,
            text_content: None,
            content_base64: None,
            received_timestamp: entry.received_at,
        };
        match &entry.message {
            Message::GeneralBasic { content, .. } => {
                record.content_base64 = Some(BASE64_STANDARD.encode(content));
            }
            Message::GeneralText { text, .. } => {
                record.text_content = Some(text.clone());
            }
            Message::FlightUpdate {
                flight_id,
                update_type,
                ..
            } => {
                record.flight_id = Some(flight_id.clone());
                record.update_type = Some(*update_type);
            }
            Message::FlightUpdateGeneral {
                flight_id, text, ..
            } => {
                record.flight_id = Some(flight_id.clone());
                record.text_content = Some(text.clone());
            }
        }
        record
    }
}

impl TryFrom<StoredRecord> for StoredMessage {
    type Error = Error;

    fn try_from(record: StoredRecord) -> Result<Self> {
        let message = match record.message_type {
            MessageType::GeneralBasic => {
                let encoded = record.content_base64.unwrap_or_default();
                let content = BASE64_STANDARD
                    .decode(encoded)
                    .map_err(|e| Error::Other(format!("invalid content_base64: {e}")))?;
                Message::GeneralBasic {
                    content: Bytes::from(content),
                    repeat: record.repeat_flag,
                    priority: record.priority,
                }
            }
            MessageType::GeneralText => Message::GeneralText {
                text: record.text_content.unwrap_or_default(),
                repeat: record.repeat_flag,
                priority: record.priority,
                part_no: record.part_number.max(1),
                total_parts: record.total_parts.max(1),
            },
            MessageType::FlightUpdate => Message::FlightUpdate {
                flight_id: record.flight_id.unwrap_or_default(),
                update_type: record.update_type.unwrap_or_default(),
                repeat: record.repeat_flag,
                priority: record.priority,
            },
            MessageType::FlightUpdateGeneral => Message::FlightUpdateGeneral {
                flight_id: record.flight_id.unwrap_or_default(),
                text: record.text_content.unwrap_or_default(),
                repeat: record.repeat_flag,
                priority: record.priority,
                part_no: record.part_number.max(1),
                total_parts: record.total_parts.max(1),
            },
            other => {
                return Err(Error::Other(format!(
                    "message type {other} has no stored form"
                )))
            }
        };
        Ok(StoredMessage::new(message, record.received_timestamp))
    }
}

/// HistoryStore persists the history log across process restarts.
#[async_trait]
pub trait HistoryStore {
    /// Loads the persisted entries, newest first. Corrupt entries are
    /// skipped, never fatal.
    async fn load(&self) -> Result<Vec<StoredMessage>>;
    async fn save(&self, entries: &[StoredMessage]) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// JsonFileStore keeps the history as a single JSON list in one file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore { path: path.into() }
    }

    /// Store under `dir` with the conventional storage key as file name.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        JsonFileStore {
            path: dir.as_ref().join(STORAGE_KEY),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryStore for JsonFileStore {
    async fn load(&self) -> Result<Vec<StoredMessage>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(err.into()),
        };

        // Entries deserialize one by one so a corrupt record only costs
        // itself, not the whole log.
        let values: Vec<serde_json::Value> = match serde_json::from_slice(&raw) {
            Ok(values) => values,
            Err(err) => {
                warn!("history store unreadable, starting empty: {err}");
                return Ok(vec![]);
            }
        };
        let mut entries = Vec::with_capacity(values.len());
        for value in values {
            match serde_json::from_value::<StoredRecord>(value)
                .map_err(Error::from)
                .and_then(StoredMessage::try_from)
            {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!("skipping corrupt history entry: {err}"),
            }
        }
        debug!("loaded {} history entries from {:?}", entries.len(), self.path);
        Ok(entries)
    }

    async fn save(&self, entries: &[StoredMessage]) -> Result<()> {
        let records: Vec<StoredRecord> = entries.iter().map(StoredRecord::from).collect();
        let raw = serde_json::to_vec(&records)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// MemoryStore holds the history in memory only. Useful in tests and on
/// hosts without durable storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: tokio::sync::Mutex<Vec<StoredMessage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn load(&self) -> Result<Vec<StoredMessage>> {
        let entries = self.entries.lock().await;
        Ok(entries.clone())
    }

    async fn save(&self, entries: &[StoredMessage]) -> Result<()> {
        let mut slot = self.entries.lock().await;
        *slot = entries.to_vec();
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut slot = self.entries.lock().await;
        slot.clear();
        Ok(())
    }
}
