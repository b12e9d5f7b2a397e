
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use log::{debug, warn};
use portable_atomic::{AtomicU64, AtomicU8};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Duration;

use crate::adapter::BleAdapter;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::packet::{self, Packet};

pub type OnCompleteHdlrFn =
    Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

/// Sequencer state: `Idle -> Advertising(i) -> Gap -> Advertising(i+1) ...
/// -> Idle`, with cancel reaching `Idle` from anywhere.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum AdvertiserState {
    #[default]
    Idle = 0,
    Advertising = 1,
    Gap = 2,
}

impl From<u8> for AdvertiserState {
    fn from(v: u8) -> Self {
        match v {
            1 => AdvertiserState::Advertising,
            2 => AdvertiserState::Gap,
            _ => AdvertiserState::Idle,
        }
    }
}

impl fmt::Display for AdvertiserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            AdvertiserState::Idle => "idle",
            AdvertiserState::Advertising => "advertising",
            AdvertiserState::Gap => "gap",
        };
        write!(f, "{s}")
    }
}

/// Advertiser serializes outbound messages onto the radio: each chunk is
/// advertised for a dwell period, chunks are spaced by a small gap, and a
/// cancel drops whatever remains.
///
/// Starting a new message while one is in flight cancels the prior sequence;
/// the superseded call returns [`Error::ErrAdvertiseCancelled`].
pub struct Advertiser {
    adapter: Arc<dyn BleAdapter + Send + Sync>,
    config: Config,
    state: AtomicU8,
    /// Cancel handle of the sequence that currently owns the radio. Only the
    /// running sequence registers here, so cancel() always reaches the
    /// sequence actually in flight.
    cancel_tx: Mutex<Option<mpsc::Sender<()>>>,
    /// Held while one chunk sequence runs; a replacing call cancels the
    /// holder and waits here for the radio to be released.
    sequence_lock: Mutex<()>,
    /// Monotonic ticket; a queued call that is no longer the newest bails
    /// before it ever touches the radio.
    generation: AtomicU64,
    on_complete_handler: ArcSwapOption<Mutex<OnCompleteHdlrFn>>,
}

impl Advertiser {
    pub fn new(adapter: Arc<dyn BleAdapter + Send + Sync>, config: Config) -> Self {
        Advertiser {
            adapter,
            config,
            state: AtomicU8::new(AdvertiserState::Idle as u8),
            cancel_tx: Mutex::new(None),
            sequence_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            on_complete_handler: ArcSwapOption::empty(),
        }
    }

    /// on_complete sets a handler that fires after the final chunk of a
    /// sequence stops. It does not fire for cancelled or failed sequences.
    pub fn on_complete(&self, f: OnCompleteHdlrFn) {
        self.on_complete_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    pub fn state(&self) -> AdvertiserState {
        self.state.load(Ordering::SeqCst).into()
    }

    fn set_state(&self, s: AdvertiserState) {
        self.state.store(s as u8, Ordering::SeqCst);
    }

    /// Advertises the message with the configured dwell.
    pub async fn advertise(&self, message: &Message) -> Result<()> {
        self.advertise_with_dwell(message, self.config.advertise_dwell)
            .await
    }

    /// Splits the message and advertises each chunk for `dwell`, pausing the
    /// configured gap between chunks. Suspends until the sequence finishes,
    /// fails, or is cancelled.
    pub async fn advertise_with_dwell(&self, message: &Message, dwell: Duration) -> Result<()> {
        let packets = packet::split(message)?;

        // Take a ticket, cancel whatever sequence is on the air, then wait
        // for it to release the radio.
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.cancel().await;
        let _sequence = self.sequence_lock.lock().await;

        // A newer message replaced this one while it queued for the radio.
        if self.generation.load(Ordering::SeqCst) != ticket {
            return Err(Error::ErrAdvertiseCancelled);
        }

        // Register the cancel handle now that this sequence owns the radio.
        let (cancel_tx, mut cancel_rx) = mpsc::channel(1);
        {
            let mut slot = self.cancel_tx.lock().await;
            *slot = Some(cancel_tx);
        }

        let result = self.run_sequence(&packets, dwell, &mut cancel_rx).await;

        // cancel() empties the slot when it fires; on natural completion it
        // still holds this sequence's sender.
        {
            let mut slot = self.cancel_tx.lock().await;
            *slot = None;
        }
        self.set_state(AdvertiserState::Idle);

        if result.is_ok() {
            if let Some(handler) = &*self.on_complete_handler.load() {
                let mut f = handler.lock().await;
                f().await;
            }
        }
        result
    }

    async fn run_sequence(
        &self,
        packets: &[Packet],
        dwell: Duration,
        cancel_rx: &mut mpsc::Receiver<()>,
    ) -> Result<()> {
        // Cancelled before the first chunk: never start the radio.
        if cancel_rx.try_recv().is_ok() {
            return Err(Error::ErrAdvertiseCancelled);
        }

        for (i, p) in packets.iter().enumerate() {
            let payload = p.marshal()?;

            self.set_state(AdvertiserState::Advertising);
            if let Err(err) = self
                .adapter
                .start_advertising(
                    &self.config.device_name,
                    self.config.manufacturer_id,
                    &payload,
                    self.config.include_service_uuid,
                )
                .await
            {
                warn!("adapter refused chunk {}/{}: {err}", i + 1, packets.len());
                return Err(err);
            }
            debug!(
                "advertising chunk {}/{} ({} bytes) for {dwell:?}",
                i + 1,
                packets.len(),
                payload.len()
            );

            let cancelled = tokio::select! {
                _ = tokio::time::sleep(dwell) => false,
                _ = cancel_rx.recv() => true,
            };
            self.adapter.stop_advertising().await?;
            if cancelled {
                debug!("sequence cancelled at chunk {}/{}", i + 1, packets.len());
                return Err(Error::ErrAdvertiseCancelled);
            }

            if i + 1 < packets.len() {
                self.set_state(AdvertiserState::Gap);
                let cancelled = tokio::select! {
                    _ = tokio::time::sleep(self.config.chunk_gap) => false,
                    _ = cancel_rx.recv() => true,
                };
                if cancelled {
                    debug!("sequence cancelled in gap after chunk {}", i + 1);
                    return Err(Error::ErrAdvertiseCancelled);
                }
            }
        }
        Ok(())
    }

    /// Cancels the in-flight sequence, if any. Idempotent; returns whether a
    /// sequence was there to cancel.
    pub async fn cancel(&self) -> bool {
        let tx = { self.cancel_tx.lock().await.take() };
        match tx {
            Some(tx) => {
                let _ = tx.send(()).await;
                true
            }
            None => false,
        }
    }
}
