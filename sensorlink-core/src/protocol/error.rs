pub type ParseResult<T> = core::result::Result<T, FramingError>;

/// A frame that cannot be trusted. Fatal for that frame only; the caller
/// discards it and resyncs the stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("frame too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },

    #[error("invalid start byte {0:#04X}")]
    InvalidStartByte(u8),

    #[error("invalid end byte {0:#04X}")]
    InvalidEndByte(u8),

    #[error("length byte declares {declared} body bytes, frame carries {actual}")]
    LengthMismatch { declared: u8, actual: usize },

    #[error("checksum mismatch: trailer {expected:#04X}, computed {actual:#04X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("subpacket at offset {offset} needs {needed} bytes, body has {available}")]
    SubpacketTruncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("body of {size} bytes exceeds the {max} byte limit")]
    BodyTooLong { size: usize, max: usize },

    #[error("subpacket for sensor {sensor_id} carries {size} bytes, limit is {max}")]
    SubpacketTooLong { sensor_id: u8, size: usize, max: usize },
}
