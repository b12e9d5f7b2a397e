
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use log::{debug, trace, warn};
use portable_atomic::AtomicU64;
use tokio::sync::{mpsc, Mutex};

use crate::adapter::{Advertisement, BleAdapter};
use crate::advertiser::Advertiser;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::forward::Forwarder;
use crate::history::{HistoryStore, MessageHistory};
use crate::message::Message;
use crate::packet::Packet;
use crate::reassembly::{ReassemblyBuffer, ReassemblyKey};

/// ReceivedMessage is the event subscribers get for every accepted message.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    /// Best-effort source identifier from the advertisement.
    pub source: Option<String>,
    pub received_at: DateTime<Utc>,
    pub message: Message,
    /// Whether the forwarder re-broadcasts this message.
    pub will_forward: bool,
    /// True when the message was combined from multiple fragments.
    pub is_reassembled: bool,
    /// Signal strength at discovery, when the adapter reported one.
    pub rssi: Option<i32>,
}

pub type OnMessageHdlrFn = Box<
    dyn (FnMut(ReceivedMessage) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

/// Scanner drives the inbound pipeline: manufacturer filter, parse, dedup,
/// reassembly, subscriber emit, forward. One advertisement is processed to
/// completion before the next, so history is never read in a torn state.
pub struct Scanner {
    adapter: Arc<dyn BleAdapter + Send + Sync>,
    advertiser: Arc<Advertiser>,
    forwarder: Arc<Forwarder>,
    history: Arc<Mutex<MessageHistory>>,
    store: Arc<dyn HistoryStore + Send + Sync>,
    config: Config,
    received_count: AtomicU64,
    on_message_handler: ArcSwapOption<Mutex<OnMessageHdlrFn>>,
    close_tx: Mutex<Option<mpsc::Sender<()>>>,
    /// The adapter's discovery stream, parked here while not scanning and
    /// owned by the pipeline task while running.
    advertisements: Mutex<Option<mpsc::Receiver<Advertisement>>>,
}

impl Scanner {
    pub fn new(
        adapter: Arc<dyn BleAdapter + Send + Sync>,
        advertiser: Arc<Advertiser>,
        forwarder: Arc<Forwarder>,
        history: Arc<Mutex<MessageHistory>>,
        store: Arc<dyn HistoryStore + Send + Sync>,
        advertisements: mpsc::Receiver<Advertisement>,
        config: Config,
    ) -> Self {
        Scanner {
            adapter,
            advertiser,
            forwarder,
            history,
            store,
            config,
            received_count: AtomicU64::new(0),
            on_message_handler: ArcSwapOption::empty(),
            close_tx: Mutex::new(None),
            advertisements: Mutex::new(Some(advertisements)),
        }
    }

    /// on_message sets the handler fired for every accepted message.
    pub fn on_message(&self, f: OnMessageHdlrFn) {
        self.on_message_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    /// Count of successfully parsed Vuelink packets, including duplicates.
    pub fn received_count(&self) -> u64 {
        self.received_count.load(Ordering::SeqCst)
    }

    pub async fn is_running(&self) -> bool {
        let close_tx = self.close_tx.lock().await;
        close_tx.is_some()
    }

    /// Starts discovery and spawns the pipeline task. The task also ticks
    /// the reassembly garbage collector.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut advertisements = {
            let mut slot = self.advertisements.lock().await;
            match slot.take() {
                Some(rx) => rx,
                None => return Err(Error::ErrAlreadyScanning),
            }
        };

        let (close_tx, mut close_rx) = mpsc::channel(1);
        {
            let mut slot = self.close_tx.lock().await;
            *slot = Some(close_tx);
        }

        if let Err(err) = self.adapter.start_scanning().await {
            let mut slot = self.advertisements.lock().await;
            *slot = Some(advertisements);
            let mut close = self.close_tx.lock().await;
            *close = None;
            return Err(err);
        }

        let scanner = Arc::clone(self);
        tokio::spawn(async move {
            let mut reassembly = ReassemblyBuffer::new();
            let mut gc_interval = tokio::time::interval(scanner.config.gc_interval);
            loop {
                tokio::select! {
                    _ = close_rx.recv() => break,
                    _ = gc_interval.tick() => {
                        reassembly.prune(
                            Utc::now().timestamp_millis() as u64,
                            scanner.config.fragment_timeout,
                        );
                    }
                    advertisement = advertisements.recv() => {
                        match advertisement {
                            Some(advertisement) => {
                                scanner
                                    .process_advertisement(advertisement, &mut reassembly)
                                    .await;
                            }
                            None => {
                                debug!("advertisement stream ended, stopping pipeline");
                                break;
                            }
                        }
                    }
                }
            }

            // Park the stream again so a later start() can resume it.
            let mut slot = scanner.advertisements.lock().await;
            *slot = Some(advertisements);
        });

        Ok(())
    }

    /// Idempotently halts discovery delivery.
    pub async fn stop(&self) -> Result<()> {
        let close_tx = { self.close_tx.lock().await.take() };
        if let Some(close_tx) = close_tx {
            let _ = close_tx.send(()).await;
        }
        self.adapter.stop_scanning().await
    }

    async fn process_advertisement(
        &self,
        advertisement: Advertisement,
        reassembly: &mut ReassemblyBuffer,
    ) {
        let source = advertisement.device_name.clone();
        let rssi = advertisement.rssi;

        for record in &advertisement.manufacturer_data {
            if record.id != self.config.manufacturer_id {
                trace!("ignoring foreign manufacturer id {:#06x}", record.id);
                continue;
            }

            let mut raw = record.data.clone();
            let packet = match Packet::unmarshal(&mut raw) {
                Ok(packet) => packet,
                Err(err) => {
                    trace!("dropping malformed advertisement: {err}");
                    continue;
                }
            };
            let message = match packet.to_message() {
                Some(message) => message,
                None => {
                    trace!("dropping unrepresentable {} packet", packet.message_type);
                    continue;
                }
            };

            self.received_count.fetch_add(1, Ordering::SeqCst);
            self.process_message(&packet, message, source.as_deref(), rssi, reassembly)
                .await;
        }
    }

    async fn process_message(
        &self,
        packet: &Packet,
        message: Message,
        source: Option<&str>,
        rssi: Option<i32>,
        reassembly: &mut ReassemblyBuffer,
    ) {
        let received_at = Utc::now();

        {
            let history = self.history.lock().await;
            if !history.should_accept(&message) {
                debug!("suppressing duplicate {message}");
                return;
            }
        }

        // The forward/drop decision for a multi-part message is computed on
        // the first fragment and applied unchanged on completion.
        let will_forward = self.forwarder.should_forward(&message);

        if packet.total_parts == 1 {
            self.accept(message, received_at, source, rssi, will_forward, false)
                .await;
            return;
        }

        let now_millis = received_at.timestamp_millis() as u64;
        let key = ReassemblyKey::new(
            source.unwrap_or_default(),
            message.message_type(),
            now_millis,
        );
        if let Some(completed) = reassembly.push(
            key,
            packet.part_no,
            packet.total_parts,
            message,
            will_forward,
            now_millis,
        ) {
            self.accept(
                completed.message,
                Utc::now(),
                source,
                rssi,
                completed.will_forward,
                true,
            )
            .await;
        }
    }

    async fn accept(
        &self,
        message: Message,
        received_at: DateTime<Utc>,
        source: Option<&str>,
        rssi: Option<i32>,
        will_forward: bool,
        is_reassembled: bool,
    ) {
        let entries = {
            let mut history = self.history.lock().await;
            history.record(message.clone(), received_at);
            history.list()
        };
        if let Err(err) = self.store.save(&entries).await {
            warn!("failed to persist history: {err}");
        }

        if let Some(handler) = &*self.on_message_handler.load() {
            let mut f = handler.lock().await;
            f(ReceivedMessage {
                source: source.map(str::to_owned),
                received_at,
                message: message.clone(),
                will_forward,
                is_reassembled,
                rssi,
            })
            .await;
        }

        if will_forward {
            debug!("forwarding {message}");
            let rebroadcast = self.forwarder.prepare(&message);
            let advertiser = Arc::clone(&self.advertiser);
            let dwell = self.config.forward_dwell;
            tokio::spawn(async move {
                match advertiser.advertise_with_dwell(&rebroadcast, dwell).await {
                    Ok(()) | Err(Error::ErrAdvertiseCancelled) => {}
                    Err(err) => warn!("forwarding failed: {err}"),
                }
            });
        }
    }
}
