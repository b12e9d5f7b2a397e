//! Offline, delay-tolerant messaging over BLE advertisements.
//!
//! Vuelink propagates flight-operations events (gate changes, boarding,
//! delays, cancellations, free text) device to device as a broadcast mesh,
//! with no Wi-Fi, no cellular, and no connection-oriented BLE session. Every
//! packet is a manufacturer-specific record inside a non-connectable
//! advertisement: a 2-byte header plus up to 21 content bytes.
//!
//! Large messages split into at most 7 fragments that receivers reassemble;
//! a bounded history of accepted messages suppresses duplicates and decides
//! which messages re-enter the mesh. Delivery is best effort: no ordering
//! across senders, no acknowledgements, no authentication.
//!
//! The platform's BLE stack stays behind the [`adapter::BleAdapter`] trait;
//! [`node::VuelinkNode`] is the surface hosts build on.

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod adapter;
pub mod advertiser;
pub mod config;
pub mod error;
pub mod forward;
pub mod history;
pub mod message;
pub mod node;
pub mod packet;
pub mod reassembly;
pub mod scanner;
pub mod snapshot;

pub use adapter::{AdapterEvents, AdapterState, Advertisement, BleAdapter, ManufacturerData};
pub use config::Config;
pub use error::Error;
pub use history::{HistoryStore, JsonFileStore, MemoryStore};
pub use message::{FlightUpdateType, Message, MessagePriority, MessageType, StoredMessage};
pub use node::VuelinkNode;
pub use scanner::ReceivedMessage;
