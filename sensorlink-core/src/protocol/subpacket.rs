use super::*;

// subpacket structure : sensor_id(1) + valid(bit 7) | length(bits 0-6) + raw

/// One sensor's contribution within a frame body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subpacket {
    pub sensor_id: u8,
    /// Whether the board itself trusts this reading.
    pub valid: bool,
    pub raw: Box<[u8]>,
}

impl Subpacket {
    pub fn new(sensor_id: u8, valid: bool, raw: &[u8]) -> ParseResult<Self> {
        if raw.len() > MAX_SUBPACKET_SIZE {
            return Err(FramingError::SubpacketTooLong {
                sensor_id,
                size: raw.len(),
                max: MAX_SUBPACKET_SIZE,
            });
        }

        Ok(Self {
            sensor_id,
            valid,
            raw: raw.into(),
        })
    }

    /// Number of body bytes this subpacket occupies, header included.
    pub fn encoded_len(&self) -> usize {
        SUBPACKET_HEADER_SIZE + self.raw.len()
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        let flag = if self.valid { SUBPACKET_VALID_FLAG } else { 0 };

        out.push(self.sensor_id);
        out.push(flag | (self.raw.len() as u8 & SUBPACKET_LENGTH_MASK));
        out.extend_from_slice(&self.raw);
    }
}

/// Walks a frame body and splits it into subpackets.
///
/// The walk must land exactly on the end of the body; a header or raw
/// slice running past it fails the whole body.
pub fn split_subpackets(body: &[u8]) -> ParseResult<Box<[Subpacket]>> {
    let mut subpackets = Vec::new();
    let mut offset = 0;

    while offset < body.len() {
        if offset + SUBPACKET_HEADER_SIZE > body.len() {
            return Err(FramingError::SubpacketTruncated {
                offset,
                needed: SUBPACKET_HEADER_SIZE,
                available: body.len() - offset,
            });
        }

        let sensor_id = body[offset];
        let length = (body[offset + 1] & SUBPACKET_LENGTH_MASK) as usize;
        let valid = body[offset + 1] & SUBPACKET_VALID_FLAG != 0;

        let start = offset + SUBPACKET_HEADER_SIZE;
        let end = start + length;

        if end > body.len() {
            return Err(FramingError::SubpacketTruncated {
                offset,
                needed: SUBPACKET_HEADER_SIZE + length,
                available: body.len() - offset,
            });
        }

        subpackets.push(Subpacket {
            sensor_id,
            valid,
            raw: body[start..end].into(),
        });

        offset = end;
    }

    Ok(subpackets.into_boxed_slice())
}
