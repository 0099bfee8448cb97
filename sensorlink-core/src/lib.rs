//! Wire format and calibration layer for environmental sensor boards.
//!
//! A board emits framed packets; each frame body carries one subpacket per
//! sensor. Decoding runs frame validation, subpacket splitting, field
//! slicing against a declarative sensor table, and per-sensor calibration.

pub mod calibration;
pub mod decoder;
pub mod field;
pub mod protocol;
pub mod spec;

pub use calibration::{
    CalibrationSource, CalibrationStore, Conversion, ConversionError, Measurement, Reading, Unit,
    Value,
};
pub use decoder::{DecodedPacket, Decoder, SensorReadings, SubpacketError};
pub use field::{FieldLengthError, RawValue, decode_fields};
pub use protocol::{FramingError, Packet, Subpacket, checksum8, decode_packet, split_subpackets};
pub use spec::{SpecError, SpecRegistry, UnknownSensorError, load_spec};
