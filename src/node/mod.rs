
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, warn};
use tokio::sync::{watch, Mutex};
use tokio::time::Duration;

use crate::adapter::{AdapterEvents, AdapterState, BleAdapter};
use crate::advertiser::{Advertiser, OnCompleteHdlrFn};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::forward::Forwarder;
use crate::history::{HistoryStore, MessageHistory};
use crate::message::{Message, StoredMessage};
use crate::scanner::{OnMessageHdlrFn, Scanner};
use crate::snapshot::{self, SnapshotEntry, MAX_SNAPSHOT_MESSAGES};

/// VuelinkNode is the host-facing surface of the mesh core. It wires the
/// codec, reassembler, history, forwarder, scanner, and advertiser together
/// over one BLE adapter.
///
/// Construction is cheap; [`start`](Self::start) loads persisted history and
/// asks the platform for permissions. Until a start succeeds, scanning and
/// advertising fail with [`Error::ErrPermissionDenied`].
pub struct VuelinkNode {
    config: Config,
    adapter: Arc<dyn BleAdapter + Send + Sync>,
    advertiser: Arc<Advertiser>,
    scanner: Arc<Scanner>,
    forwarder: Arc<Forwarder>,
    history: Arc<Mutex<MessageHistory>>,
    store: Arc<dyn HistoryStore + Send + Sync>,
    authorized: AtomicBool,
    states: watch::Receiver<AdapterState>,
}

impl VuelinkNode {
    pub fn new(
        config: Config,
        adapter: Arc<dyn BleAdapter + Send + Sync>,
        events: AdapterEvents,
        store: Arc<dyn HistoryStore + Send + Sync>,
    ) -> Result<Self> {
        config.validate()?;

        let history = Arc::new(Mutex::new(MessageHistory::new(
            config.history_capacity,
            config.duplicate_window,
        )));
        let forwarder = Arc::new(Forwarder::default());
        let advertiser = Arc::new(Advertiser::new(Arc::clone(&adapter), config.clone()));
        let scanner = Arc::new(Scanner::new(
            Arc::clone(&adapter),
            Arc::clone(&advertiser),
            Arc::clone(&forwarder),
            Arc::clone(&history),
            Arc::clone(&store),
            events.advertisements,
            config.clone(),
        ));

        Ok(VuelinkNode {
            config,
            adapter,
            advertiser,
            scanner,
            forwarder,
            history,
            store,
            authorized: AtomicBool::new(false),
            states: events.states,
        })
    }

    /// Loads persisted history and requests platform permissions. Denial
    /// leaves the node unauthorized; a later call can try again.
    pub async fn start(&self) -> Result<()> {
        match self.store.load().await {
            Ok(entries) => {
                let mut history = self.history.lock().await;
                history.restore(entries);
            }
            Err(err) => warn!("history unavailable, starting empty: {err}"),
        }

        let granted = self.adapter.request_permissions().await?;
        self.authorized.store(granted, Ordering::SeqCst);
        if !granted {
            warn!("bluetooth permissions denied, mesh disabled");
            return Err(Error::ErrPermissionDenied);
        }
        debug!("node started as {:?}", self.config.device_name);
        Ok(())
    }

    fn ensure_authorized(&self) -> Result<()> {
        if self.authorized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::ErrPermissionDenied)
        }
    }

    /// Advertises a message with the configured dwell, suspending until the
    /// last chunk leaves the air.
    pub async fn advertise(&self, message: &Message) -> Result<()> {
        self.ensure_authorized()?;
        self.advertiser.advertise(message).await
    }

    pub async fn advertise_with_dwell(&self, message: &Message, dwell: Duration) -> Result<()> {
        self.ensure_authorized()?;
        self.advertiser.advertise_with_dwell(message, dwell).await
    }

    /// Cancels an in-flight advertising sequence. Returns whether one was
    /// running.
    pub async fn cancel_advertise(&self) -> bool {
        self.advertiser.cancel().await
    }

    pub async fn scan_start(&self) -> Result<()> {
        self.ensure_authorized()?;
        self.scanner.start().await
    }

    pub async fn scan_stop(&self) -> Result<()> {
        self.scanner.stop().await
    }

    /// on_message subscribes to accepted inbound messages.
    pub fn on_message(&self, f: OnMessageHdlrFn) {
        self.scanner.on_message(f);
    }

    /// on_advertise_complete fires after the final chunk of an outbound
    /// sequence stops.
    pub fn on_advertise_complete(&self, f: OnCompleteHdlrFn) {
        self.advertiser.on_complete(f);
    }

    pub fn set_forwarding_enabled(&self, enabled: bool) {
        self.forwarder.set_enabled(enabled);
    }

    pub fn is_forwarding_enabled(&self) -> bool {
        self.forwarder.is_enabled()
    }

    /// Newest-first snapshot of the accepted-message log.
    pub async fn history(&self) -> Vec<StoredMessage> {
        let history = self.history.lock().await;
        history.list()
    }

    /// Wipes both the in-memory log and its persisted form.
    pub async fn clear_history(&self) -> Result<()> {
        {
            let mut history = self.history.lock().await;
            history.clear();
        }
        self.store.clear().await
    }

    /// Imports a shared snapshot received out-of-band. Each entry runs
    /// through the same accept policy as radio traffic; the count of newly
    /// accepted messages is returned.
    pub async fn import_snapshot(&self, data: &str) -> Result<usize> {
        let entries = snapshot::decode(data)?;

        let (imported, list) = {
            let mut history = self.history.lock().await;
            let mut imported = 0;
            for entry in entries {
                if history.should_accept(&entry.message) {
                    history.record(entry.message, Utc::now());
                    imported += 1;
                }
            }
            (imported, history.list())
        };
        if imported > 0 {
            self.store.save(&list).await?;
        }
        debug!("imported {imported} messages from shared snapshot");
        Ok(imported)
    }

    /// Encodes the current history as a shareable snapshot string.
    pub async fn export_snapshot(&self) -> Result<String> {
        let entries: Vec<SnapshotEntry> = {
            let history = self.history.lock().await;
            history
                .list()
                .into_iter()
                .take(MAX_SNAPSHOT_MESSAGES)
                .map(|stored| SnapshotEntry {
                    should_forward: self.forwarder.should_forward(&stored.message),
                    message: stored.message,
                })
                .collect()
        };
        snapshot::encode(&entries)
    }

    /// Count of successfully parsed Vuelink packets seen by the scanner.
    pub fn received_count(&self) -> u64 {
        self.scanner.received_count()
    }

    /// Adapter power/authorization transitions.
    pub fn adapter_states(&self) -> watch::Receiver<AdapterState> {
        self.states.clone()
    }

    pub fn adapter_state(&self) -> AdapterState {
        *self.states.borrow()
    }
}
