use super::round_to;

const DEGREES_PER_COUNT: f64 = 0.0625;

/// TMP112 register to degrees Celsius.
///
/// Bit 15 of the register is the sign; a negative reading is the one's
/// complement of both bytes.
pub(crate) fn tmp112(raw: u16) -> f64 {
    let [high, low] = raw.to_be_bytes();

    if high & 0x80 == 0 {
        round_to(magnitude(high, low) as f64 * DEGREES_PER_COUNT, 2)
    } else {
        round_to(-(magnitude(!high, !low) as f64) * DEGREES_PER_COUNT, 2)
    }
}

fn magnitude(high: u8, low: u8) -> u16 {
    (((high as u16) << 5) | (low as u16 >> 3)) & 0x0FFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_readings() {
        assert_eq!(tmp112(0x0C80), 25.0);
        assert_eq!(tmp112(0x0000), 0.0);
        assert_eq!(tmp112(0x7FF0), 255.88);
    }

    #[test]
    fn low_three_bits_are_ignored() {
        assert_eq!(tmp112(0x0C87), tmp112(0x0C80));
    }

    #[test]
    fn negative_readings_use_ones_complement() {
        assert_eq!(tmp112(0xFF38), -1.5);
        assert_eq!(tmp112(0xF37F), -25.0);
    }

    #[test]
    fn eighth_degree_ties_round_to_even() {
        assert_eq!(tmp112(0x0C90), 25.12);
        assert_eq!(tmp112(0x0010), 0.12);
        assert_eq!(tmp112(0x0050), 0.62);
        assert_eq!(tmp112(0x0030), 0.38);
        assert_eq!(tmp112(0xFFEF), -0.12);
    }

    #[test]
    fn every_positive_count_matches_exact_hundredths() {
        for count in 0u16..0x1000 {
            // count / 16 degrees, in hundredths, as an exact fraction over 4
            let quarter_hundredths = count as u32 * 25;
            let (mut hundredths, remainder) = (quarter_hundredths / 4, quarter_hundredths % 4);
            if remainder > 2 || (remainder == 2 && hundredths % 2 == 1) {
                hundredths += 1;
            }

            let expected = hundredths as f64 / 100.0;
            assert_eq!(tmp112(count << 3), expected, "count {count}");
        }
    }
}
