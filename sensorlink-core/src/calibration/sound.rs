use super::round_to;

const ADC_FULL_SCALE: f64 = 1024.0;
const SUPPLY_VOLTS: f64 = 5.0;
/// Output volts per pascal.
const SENSITIVITY: f64 = 0.035_607_78;
const REFERENCE_PASCALS: f64 = 0.0002;

/// Sound pressure level in dB from a block of big-endian u16 samples.
///
/// A trailing odd byte is dropped. `None` when there are no samples.
pub(crate) fn spv1840(raw: &[u8]) -> Option<f64> {
    let samples: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();

    let max = *samples.iter().max()?;
    let min = *samples.iter().min()?;

    let mut peak_to_peak = (max - min) as f64;
    // Near-silent blocks: use the fraction of samples above the floor
    // instead of a one-count swing.
    if peak_to_peak <= 1.0 {
        let above = samples.iter().filter(|&&s| s != min).count().max(1);
        peak_to_peak = above as f64 / samples.len() as f64;
    }

    let volts = peak_to_peak * SUPPLY_VOLTS / ADC_FULL_SCALE;
    let pascals = volts / SENSITIVITY;

    Some(round_to(20.0 * (pascals / REFERENCE_PASCALS).log10(), 2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(samples: &[u16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_be_bytes()).collect()
    }

    #[test]
    fn peak_to_peak_level() {
        assert_eq!(spv1840(&block(&[512, 612, 560, 530])), Some(96.72));
    }

    #[test]
    fn single_count_swing_uses_fraction_above_floor() {
        assert_eq!(spv1840(&block(&[512, 513, 512, 512])), Some(44.68));
    }

    #[test]
    fn flat_block_counts_one_sample() {
        assert_eq!(spv1840(&block(&[500, 500])), Some(50.7));
    }

    #[test]
    fn odd_trailing_byte_is_dropped() {
        let mut raw = block(&[512, 612, 560, 530]);
        raw.push(0xFF);
        assert_eq!(spv1840(&raw), Some(96.72));
    }

    #[test]
    fn no_samples() {
        assert_eq!(spv1840(&[]), None);
        assert_eq!(spv1840(&[0x01]), None);
    }
}
