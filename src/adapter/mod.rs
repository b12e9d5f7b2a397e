pub mod mock;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use crate::error::Result;

/// Power/authorization state reported by the platform BLE stack.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum AdapterState {
    #[default]
    Unknown,
    PoweredOn,
    PoweredOff,
    Unauthorized,
    Unsupported,
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            AdapterState::Unknown => "unknown",
            AdapterState::PoweredOn => "poweredOn",
            AdapterState::PoweredOff => "poweredOff",
            AdapterState::Unauthorized => "unauthorized",
            AdapterState::Unsupported => "unsupported",
        };
        write!(f, "{s}")
    }
}

/// One manufacturer-specific record inside an advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManufacturerData {
    pub id: u16,
    pub data: Bytes,
}

/// A discovered advertisement as delivered by the platform adapter.
#[derive(Debug, Clone, Default)]
pub struct Advertisement {
    /// Advertised device name, when the platform surfaced one.
    pub device_name: Option<String>,
    pub manufacturer_data: Vec<ManufacturerData>,
    /// Signal strength at discovery, when the platform reports it.
    pub rssi: Option<i32>,
}

/// Event streams produced by a [`BleAdapter`] implementation: discovered
/// advertisements while scanning, and adapter state transitions.
pub struct AdapterEvents {
    pub advertisements: mpsc::Receiver<Advertisement>,
    pub states: watch::Receiver<AdapterState>,
}

/// BleAdapter abstracts the platform calls that start and stop radio
/// activity. The core never assumes advertising and scanning can run with
/// conflicting configurations at once.
#[async_trait]
pub trait BleAdapter {
    async fn start_advertising(
        &self,
        name: &str,
        manufacturer_id: u16,
        payload: &[u8],
        include_service_uuid: bool,
    ) -> Result<()>;
    async fn stop_advertising(&self) -> Result<()>;
    fn is_advertising(&self) -> bool;

    async fn start_scanning(&self) -> Result<()>;
    async fn stop_scanning(&self) -> Result<()>;
    fn is_scanning(&self) -> bool;

    /// Asks the host OS for the capabilities the core needs. `false` means
    /// the user or platform declined.
    async fn request_permissions(&self) -> Result<bool>;
}
