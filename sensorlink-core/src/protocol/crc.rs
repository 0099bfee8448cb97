/// Reflected form of the x^8 + x^5 + x^4 + 1 polynomial.
pub const CRC8_POLYNOMIAL: u8 = 0x8C;

/// Computes the 8-bit checksum carried in every frame trailer.
///
/// Bitwise and table free; `seed` lets a caller continue a running
/// checksum across several slices.
pub fn checksum8(data: &[u8], seed: u8) -> u8 {
    let mut crc = seed;

    for &byte in data {
        crc ^= byte;

        for _ in 0..8 {
            if crc & 0x01 != 0 {
                crc = (crc >> 1) ^ CRC8_POLYNOMIAL;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}
