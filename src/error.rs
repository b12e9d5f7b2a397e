use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum Error {
    /// ErrContentEmpty indicates an attempt to encode a packet with no
    /// content bytes.
    #[error("packet content must not be empty")]
    ErrContentEmpty,

    /// ErrPayloadTooLarge indicates content that cannot fit an advertisement
    /// even after truncation.
    #[error("payload of {0} bytes exceeds advertisement capacity")]
    ErrPayloadTooLarge(usize),

    /// ErrInvalidPartNumbering indicates part fields outside
    /// `1 <= part_no <= total_parts <= 7`.
    #[error("invalid part numbering")]
    ErrInvalidPartNumbering,

    /// ErrTooManyParts indicates a message that would split into more parts
    /// than the 3-bit wire fields can carry.
    #[error("message needs {0} parts but the wire carries at most 7")]
    ErrTooManyParts(usize),

    #[error("packet is not large enough")]
    ErrShortPacket,
    #[error("packet of {0} bytes exceeds the 23 byte advertisement limit")]
    ErrPacketTooLarge(usize),
    #[error("buffer too small")]
    ErrBufferTooSmall,

    /// ErrAdvertiseCancelled is returned from an in-flight advertising
    /// sequence that was cancelled or replaced.
    #[error("advertising sequence cancelled")]
    ErrAdvertiseCancelled,

    /// ErrAdapter indicates a BLE adapter call that reported failure.
    #[error("BLE adapter failure: {0}")]
    ErrAdapter(String),

    /// ErrPermissionDenied indicates the host denied Bluetooth permissions.
    /// Scanning and advertising stay disabled until a later grant.
    #[error("bluetooth permissions denied")]
    ErrPermissionDenied,

    #[error("scanner already running")]
    ErrAlreadyScanning,

    #[error("unsupported snapshot version {0}")]
    ErrSnapshotVersion(u8),
    #[error("snapshot data truncated")]
    ErrSnapshotTruncated,
    #[error("snapshot is not valid base64")]
    ErrSnapshotEncoding,
    #[error("snapshot cannot carry {0} messages")]
    ErrSnapshotTooLarge(usize),

    #[error("device name exceeds 8 bytes")]
    ErrDeviceNameTooLong,

    #[error("io error: {0}")]
    ErrIo(String),
    #[error("serialization error: {0}")]
    ErrJson(String),

    #[error("{0}")]
    Other(String),
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::ErrIo(error.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::ErrJson(error.to_string())
    }
}
