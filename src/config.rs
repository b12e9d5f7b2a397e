use tokio::time::Duration;

use crate::error::{Error, Result};

/// Manufacturer ID carried in every Vuelink advertisement. The testing
/// allocation 0xFFFF is the default; deployments override it.
pub const DEFAULT_MANUFACTURER_ID: u16 = 0xFFFF;

/// Local device name included in advertisements, at most 8 bytes.
pub const DEFAULT_DEVICE_NAME: &str = "VL";
pub const MAX_DEVICE_NAME_LENGTH: usize = 8;

/// How long a single chunk stays on the air before the next one.
pub const DEFAULT_ADVERTISE_DWELL: Duration = Duration::from_secs(3);

/// Dwell used when rebroadcasting a forwarded message.
pub const DEFAULT_FORWARD_DWELL: Duration = Duration::from_secs(3);

/// Idle gap between consecutive chunks of one message.
pub const DEFAULT_CHUNK_GAP: Duration = Duration::from_millis(100);

/// How long an incomplete reassembly bucket is kept before it is dropped.
pub const DEFAULT_FRAGMENT_TIMEOUT: Duration = Duration::from_secs(60);

/// How often stale reassembly buckets are collected while scanning.
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(30);

/// Bounded history length; the oldest entry is evicted on overflow.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// How many recent history entries a duplicate check consults.
pub const DEFAULT_DUPLICATE_WINDOW: usize = 10;

/// Config collects the tunables of a Vuelink node. `Config::default()` is a
/// working production configuration; tests shorten the timing knobs.
#[derive(Debug, Clone)]
pub struct Config {
    /// Manufacturer ID that tags our advertisements and filters inbound ones.
    pub manufacturer_id: u16,
    /// Advertised device name, at most [`MAX_DEVICE_NAME_LENGTH`] bytes.
    pub device_name: String,
    /// Whether advertisements also carry the Vuelink service UUID.
    pub include_service_uuid: bool,
    pub advertise_dwell: Duration,
    pub forward_dwell: Duration,
    pub chunk_gap: Duration,
    pub fragment_timeout: Duration,
    pub gc_interval: Duration,
    pub history_capacity: usize,
    pub duplicate_window: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            manufacturer_id: DEFAULT_MANUFACTURER_ID,
            device_name: DEFAULT_DEVICE_NAME.to_owned(),
            include_service_uuid: false,
            advertise_dwell: DEFAULT_ADVERTISE_DWELL,
            forward_dwell: DEFAULT_FORWARD_DWELL,
            chunk_gap: DEFAULT_CHUNK_GAP,
            fragment_timeout: DEFAULT_FRAGMENT_TIMEOUT,
            gc_interval: DEFAULT_GC_INTERVAL,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            duplicate_window: DEFAULT_DUPLICATE_WINDOW,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.device_name.len() > MAX_DEVICE_NAME_LENGTH {
            return Err(Error::ErrDeviceNameTooLong);
        }
        Ok(())
    }
}
