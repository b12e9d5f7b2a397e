use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use super::{AdapterEvents, AdapterState, Advertisement, BleAdapter};
use crate::error::{Error, Result};

/// One recorded `start_advertising` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisedPayload {
    pub name: String,
    pub manufacturer_id: u16,
    pub payload: Bytes,
    pub include_service_uuid: bool,
}

/// MockBleAdapter is an in-memory BleAdapter for testing. It records every
/// advertising call, lets tests inject discovered advertisements and state
/// transitions, and can be told to fail or deny permissions.
pub struct MockBleAdapter {
    advertising: AtomicBool,
    scanning: AtomicBool,
    grant_permissions: AtomicBool,
    fail_advertising: AtomicBool,
    started: Mutex<Vec<AdvertisedPayload>>,
    stop_advertising_calls: AtomicUsize,
    advertisement_tx: mpsc::Sender<Advertisement>,
    state_tx: watch::Sender<AdapterState>,
}

impl MockBleAdapter {
    pub fn new() -> (Arc<Self>, AdapterEvents) {
        let (advertisement_tx, advertisements) = mpsc::channel(64);
        let (state_tx, states) = watch::channel(AdapterState::PoweredOn);
        let adapter = Arc::new(MockBleAdapter {
            advertising: AtomicBool::new(false),
            scanning: AtomicBool::new(false),
            grant_permissions: AtomicBool::new(true),
            fail_advertising: AtomicBool::new(false),
            started: Mutex::new(vec![]),
            stop_advertising_calls: AtomicUsize::new(0),
            advertisement_tx,
            state_tx,
        });
        (
            adapter,
            AdapterEvents {
                advertisements,
                states,
            },
        )
    }

    /// Delivers a discovered advertisement to the scanner under test.
    pub async fn inject(&self, advertisement: Advertisement) {
        let _ = self.advertisement_tx.send(advertisement).await;
    }

    pub fn set_state(&self, state: AdapterState) {
        let _ = self.state_tx.send(state);
    }

    pub fn deny_permissions(&self) {
        self.grant_permissions.store(false, Ordering::SeqCst);
    }

    pub fn grant_permissions(&self) {
        self.grant_permissions.store(true, Ordering::SeqCst);
    }

    pub fn fail_advertising(&self, fail: bool) {
        self.fail_advertising.store(fail, Ordering::SeqCst);
    }

    /// Every payload handed to `start_advertising`, in call order.
    pub fn advertised(&self) -> Vec<AdvertisedPayload> {
        let started = self.started.lock().unwrap();
        started.clone()
    }

    pub fn stop_advertising_count(&self) -> usize {
        self.stop_advertising_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BleAdapter for MockBleAdapter {
    async fn start_advertising(
        &self,
        name: &str,
        manufacturer_id: u16,
        payload: &[u8],
        include_service_uuid: bool,
    ) -> Result<()> {
        if self.fail_advertising.load(Ordering::SeqCst) {
            return Err(Error::ErrAdapter("mock advertising failure".to_owned()));
        }
        {
            let mut started = self.started.lock().unwrap();
            started.push(AdvertisedPayload {
                name: name.to_owned(),
                manufacturer_id,
                payload: Bytes::copy_from_slice(payload),
                include_service_uuid,
            });
        }
        self.advertising.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_advertising(&self) -> Result<()> {
        self.stop_advertising_calls.fetch_add(1, Ordering::SeqCst);
        self.advertising.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_advertising(&self) -> bool {
        self.advertising.load(Ordering::SeqCst)
    }

    async fn start_scanning(&self) -> Result<()> {
        self.scanning.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_scanning(&self) -> Result<()> {
        self.scanning.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    async fn request_permissions(&self) -> Result<bool> {
        Ok(self.grant_permissions.load(Ordering::SeqCst))
    }
}
