use super::round_to;

const ADC_FULL_SCALE: f64 = 1024.0;
const SUPPLY_VOLTS: f64 = 5.0;

/// HIH4030 ADC count to relative humidity at the 5 V slope.
pub(crate) fn hih4030(raw: f64) -> f64 {
    let volts = raw / ADC_FULL_SCALE * SUPPLY_VOLTS;
    round_to(volts * 30.68 + 0.958, 2)
}
