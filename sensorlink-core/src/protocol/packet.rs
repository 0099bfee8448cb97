use super::*;

/// One validated physical frame.
///
/// Only produced by [`decode_packet`] or by [`Packet::new`]; both prove
/// the sentinel, length and checksum invariants hold for the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    version: u8,
    body: Box<[u8]>,
    subpackets: Box<[Subpacket]>,
}

impl Packet {
    pub fn new(version: u8, subpackets: Vec<Subpacket>) -> ParseResult<Self> {
        let size: usize = subpackets.iter().map(Subpacket::encoded_len).sum();
        if size > MAX_BODY_SIZE {
            return Err(FramingError::BodyTooLong {
                size,
                max: MAX_BODY_SIZE,
            });
        }

        let mut body = Vec::with_capacity(size);
        for subpacket in &subpackets {
            subpacket.write_to(&mut body);
        }

        Ok(Self {
            version: version & 0x0F,
            body: body.into_boxed_slice(),
            subpackets: subpackets.into_boxed_slice(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> ParseResult<Self> {
        if bytes.len() < MIN_FRAME_SIZE {
            return Err(FramingError::TooShort {
                len: bytes.len(),
                min: MIN_FRAME_SIZE,
            });
        }

        if bytes[0] != START_BYTE {
            return Err(FramingError::InvalidStartByte(bytes[0]));
        }

        let footer = bytes[bytes.len() - 1];
        if footer != END_BYTE {
            return Err(FramingError::InvalidEndByte(footer));
        }

        let version = bytes[1] >> 4;
        let declared = bytes[2];
        let body = &bytes[FRAME_HEADER_SIZE..bytes.len() - FRAME_TRAILER_SIZE];

        if declared as usize != body.len() {
            return Err(FramingError::LengthMismatch {
                declared,
                actual: body.len(),
            });
        }

        let expected = bytes[bytes.len() - 2];
        let actual = checksum8(body, 0);
        if expected != actual {
            return Err(FramingError::ChecksumMismatch { expected, actual });
        }

        Ok(Self {
            version,
            body: body.into(),
            subpackets: split_subpackets(body)?,
        })
    }

    /// Protocol version nibble (0-15).
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn subpackets(&self) -> &[Subpacket] {
        &self.subpackets
    }

    /// Total frame size on the wire.
    pub fn frame_len(&self) -> usize {
        MIN_FRAME_SIZE + self.body.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        debug_assert!(self.version <= 0x0F && self.body.len() <= MAX_BODY_SIZE);

        let mut bytes = Vec::with_capacity(self.frame_len());

        bytes.push(START_BYTE);
        bytes.push(self.version << 4);
        bytes.push(self.body.len() as u8);
        bytes.extend_from_slice(&self.body);
        bytes.push(checksum8(&self.body, 0));
        bytes.push(END_BYTE);

        bytes
    }
}

/// Validates one frame and splits its body into subpackets.
pub fn decode_packet(bytes: &[u8]) -> ParseResult<Packet> {
    Packet::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn sample_frame() -> Vec<u8> {
        let body = [0x01, 0x82, 0x0C, 0x80, 0x03, 0x82, 0x00, 0x05];
        let mut frame = vec![START_BYTE, 0x50, body.len() as u8];
        frame.extend_from_slice(&body);
        frame.push(checksum8(&body, 0));
        frame.push(END_BYTE);
        frame
    }

    fn random_packet(rng: &mut impl Rng) -> Packet {
        let mut subpackets = Vec::new();
        let mut size = 0;

        loop {
            let len = rng.random_range(0..24usize);
            if size + SUBPACKET_HEADER_SIZE + len > MAX_BODY_SIZE || rng.random_ratio(1, 6) {
                break;
            }

            let raw: Vec<u8> = (0..len).map(|_| rng.random()).collect();
            size += SUBPACKET_HEADER_SIZE + len;
            subpackets.push(Subpacket::new(rng.random(), rng.random(), &raw).unwrap());
        }

        Packet::new(rng.random_range(0..16), subpackets).unwrap()
    }

    #[test]
    fn decodes_valid_frame() {
        let packet = decode_packet(&sample_frame()).unwrap();

        assert_eq!(packet.version, 5);
        assert_eq!(&*packet.body, &[0x01, 0x82, 0x0C, 0x80, 0x03, 0x82, 0x00, 0x05]);
        assert_eq!(packet.subpackets.len(), 2);
        assert_eq!(packet.subpackets[1].sensor_id, 0x03);
    }

    #[test]
    fn constructed_packet_keeps_header_in_range() {
        let packet = Packet::new(0x1F, vec![Subpacket::new(3, true, &[0, 5]).unwrap()]).unwrap();

        assert_eq!(packet.version(), 0x0F);
        assert_eq!(packet.body(), &[0x03, 0x82, 0x00, 0x05]);
        assert_eq!(packet.subpackets().len(), 1);

        let bytes = packet.to_bytes();
        assert_eq!(&bytes[..3], &[START_BYTE, 0xF0, 4]);
        assert_eq!(decode_packet(&bytes).unwrap(), packet);
    }

    #[test]
    fn reserved_nibble_is_ignored() {
        let mut frame = sample_frame();
        frame[1] = 0x5F;
        assert_eq!(decode_packet(&frame).unwrap().version, 5);
    }

    #[test]
    fn empty_body_frame() {
        let frame = [START_BYTE, 0x10, 0x00, 0x00, END_BYTE];
        let packet = decode_packet(&frame).unwrap();

        assert_eq!(packet.version, 1);
        assert!(packet.body.is_empty());
        assert!(packet.subpackets.is_empty());
    }

    #[test]
    fn too_short() {
        assert_eq!(
            decode_packet(&[START_BYTE, 0x10, 0x00, END_BYTE]),
            Err(FramingError::TooShort { len: 4, min: 5 })
        );
    }

    #[test]
    fn bad_sentinels() {
        let mut frame = sample_frame();
        frame[0] = 0xAB;
        assert_eq!(decode_packet(&frame), Err(FramingError::InvalidStartByte(0xAB)));

        let mut frame = sample_frame();
        let last = frame.len() - 1;
        frame[last] = 0x54;
        assert_eq!(decode_packet(&frame), Err(FramingError::InvalidEndByte(0x54)));
    }

    #[test]
    fn length_mismatch() {
        let mut frame = sample_frame();
        frame[2] = 9;
        assert_eq!(
            decode_packet(&frame),
            Err(FramingError::LengthMismatch {
                declared: 9,
                actual: 8,
            })
        );
    }

    #[test]
    fn checksum_mismatch() {
        let mut frame = sample_frame();
        let crc_at = frame.len() - 2;
        frame[crc_at] ^= 0xFF;
        assert!(matches!(
            decode_packet(&frame),
            Err(FramingError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn truncated_subpacket_with_good_checksum() {
        let body = [0x01, 0x85, 0x0C, 0x80];
        let mut frame = vec![START_BYTE, 0x50, body.len() as u8];
        frame.extend_from_slice(&body);
        frame.push(checksum8(&body, 0));
        frame.push(END_BYTE);

        assert!(matches!(
            decode_packet(&frame),
            Err(FramingError::SubpacketTruncated { offset: 0, .. })
        ));
    }

    #[test]
    fn encode_decode_reproduces_frame() {
        let mut rng = rand::rng();

        for _ in 0..200 {
            let packet = random_packet(&mut rng);
            let bytes = packet.to_bytes();
            assert_eq!(bytes.len(), packet.frame_len());

            let decoded = decode_packet(&bytes).unwrap();
            assert_eq!(decoded, packet);
            assert_eq!(decoded.to_bytes(), bytes);
        }
    }

    #[test]
    fn single_bit_corruption_is_detected() {
        let mut rng = rand::rng();

        for _ in 0..50 {
            let packet = random_packet(&mut rng);
            let bytes = packet.to_bytes();

            // length byte, body and checksum byte
            let mut detected = 0;
            for index in 2..bytes.len() - 1 {
                for bit in 0..8 {
                    let mut corrupt = bytes.clone();
                    corrupt[index] ^= 1 << bit;
                    if decode_packet(&corrupt).is_err() {
                        detected += 1;
                    }
                }
            }

            assert!(detected > 0);
        }
    }

    #[test]
    fn oversized_body_is_rejected() {
        let raw = [0u8; 127];
        let subpackets = (0..3)
            .map(|id| Subpacket::new(id, true, &raw).unwrap())
            .collect();

        assert!(matches!(
            Packet::new(1, subpackets),
            Err(FramingError::BodyTooLong { size: 387, .. })
        ));
    }
}
