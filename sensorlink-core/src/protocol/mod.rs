mod crc;
mod error;
mod packet;
mod subpacket;

pub use crc::{CRC8_POLYNOMIAL, checksum8};
pub use error::{FramingError, ParseResult};
pub use packet::{Packet, decode_packet};
pub use subpacket::{Subpacket, split_subpackets};

// frame structure : start(1) + version(1) + length(1) + body + crc(1) + end(1)

pub const START_BYTE: u8 = 0xAA;
pub const END_BYTE: u8 = 0x55;
pub const FRAME_HEADER_SIZE: usize = 3;
pub const FRAME_TRAILER_SIZE: usize = 2;
pub const MIN_FRAME_SIZE: usize = FRAME_HEADER_SIZE + FRAME_TRAILER_SIZE;
pub const MAX_BODY_SIZE: usize = u8::MAX as usize;
pub const MAX_FRAME_SIZE: usize = MIN_FRAME_SIZE + MAX_BODY_SIZE;

pub const SUBPACKET_HEADER_SIZE: usize = 2;
pub const SUBPACKET_VALID_FLAG: u8 = 0x80;
pub const SUBPACKET_LENGTH_MASK: u8 = 0x7F;
pub const MAX_SUBPACKET_SIZE: usize = SUBPACKET_LENGTH_MASK as usize;
