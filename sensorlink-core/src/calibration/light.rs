const ADC_FULL_SCALE: f64 = 1024.0;
const SUPPLY_VOLTS: f64 = 5.0;
const DIVIDER_OHMS: f64 = 23_000.0;

/// Photocell resistance in whole ohms from the divider's ADC count.
///
/// `None` when the divider reads zero volts.
pub(crate) fn photocell(raw: f64) -> Option<i64> {
    let volts = raw / ADC_FULL_SCALE * SUPPLY_VOLTS;
    if volts == 0.0 {
        return None;
    }

    let ohms = DIVIDER_OHMS * (SUPPLY_VOLTS / volts - 1.0);
    Some(ohms.trunc() as i64)
}
